//! Property tests for the cursor invariant `pos <= size <= capacity`.

use buffers::Buffer;
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Write(Vec<u8>),
    Read(usize),
    AdvanceRead(usize),
    AdvanceWrite(usize),
    Rewind(usize),
    Tidy,
    Reset,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        proptest::collection::vec(any::<u8>(), 0..48).prop_map(Op::Write),
        (0usize..48).prop_map(Op::Read),
        (0usize..48).prop_map(Op::AdvanceRead),
        (0usize..48).prop_map(Op::AdvanceWrite),
        (0usize..48).prop_map(Op::Rewind),
        Just(Op::Tidy),
        Just(Op::Reset),
    ]
}

proptest! {
    #[test]
    fn cursors_stay_ordered(capacity in 1usize..64, ops in proptest::collection::vec(op(), 0..64)) {
        let mut buffer = Buffer::unpooled(capacity).expect("capacity");
        let mut model: Vec<u8> = Vec::new();

        for op in ops {
            match op {
                Op::Write(bytes) => {
                    let written = buffer.write_from(&bytes);
                    model.extend_from_slice(&bytes[..written]);
                }
                Op::Read(count) => {
                    let mut out = vec![0u8; count];
                    let read = buffer.read_into(&mut out);
                    prop_assert_eq!(&out[..read], &model[..read]);
                    model.drain(..read);
                }
                Op::AdvanceRead(count) => {
                    if buffer.advance_read(count).is_ok() {
                        model.drain(..count);
                    } else {
                        prop_assert!(count > model.len());
                    }
                }
                Op::AdvanceWrite(count) => {
                    let before = buffer.size();
                    if buffer.advance_write(count).is_ok() {
                        prop_assert_eq!(buffer.size(), before + count);
                        model = buffer.readable().to_vec();
                    }
                }
                Op::Rewind(count) => {
                    if buffer.rewind_read(count).is_ok() {
                        model = buffer.readable().to_vec();
                    } else {
                        prop_assert!(count > buffer.pos());
                    }
                }
                Op::Tidy => {
                    buffer.tidy();
                    prop_assert_eq!(buffer.pos(), 0);
                }
                Op::Reset => {
                    buffer.reset();
                    model.clear();
                }
            }

            prop_assert!(buffer.pos() <= buffer.size());
            prop_assert!(buffer.size() <= buffer.capacity());
            prop_assert_eq!(buffer.readable(), model.as_slice());
            prop_assert_eq!(
                buffer.available_write(),
                buffer.capacity() - buffer.size() + buffer.pos()
            );
        }
    }
}
