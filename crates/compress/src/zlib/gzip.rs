//! GZip member framing (RFC 1952): header parsing and generation.

use flate2::Crc;

use crate::algorithm::CompressionAlgorithm;
use crate::error::CompressionError;

/// First two bytes of every GZip member.
pub(crate) const MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Size of the CRC-32 + ISIZE trailer.
pub(crate) const TRAILER_LEN: usize = 8;

/// Longest member header the streaming decoder stages.
pub(crate) const MAX_HEADER_LEN: usize = 1 << 20;

const HEADER_LEN: usize = 10;
const METHOD_DEFLATE: u8 = 8;
const OS_UNKNOWN: u8 = 255;

const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;
const RESERVED: u8 = 0xe0;

/// Builds the fixed ten byte header written before the deflate body.
pub(crate) const fn header(level: i32) -> [u8; HEADER_LEN] {
    let extra_flags = match level {
        9 => 2,
        1 => 4,
        _ => 0,
    };
    [
        MAGIC[0],
        MAGIC[1],
        METHOD_DEFLATE,
        0,
        0,
        0,
        0,
        0,
        extra_flags,
        OS_UNKNOWN,
    ]
}

/// Builds the trailer from the running CRC of the uncompressed member.
pub(crate) fn trailer(crc: &Crc) -> [u8; TRAILER_LEN] {
    let mut out = [0u8; TRAILER_LEN];
    out[..4].copy_from_slice(&crc.sum().to_le_bytes());
    out[4..].copy_from_slice(&crc.amount().to_le_bytes());
    out
}

/// Parses a member header at the start of `bytes`.
///
/// Returns `Ok(None)` while the header is incomplete and `Ok(Some(len))`
/// with the header length once all optional fields are present.
pub(crate) fn parse_header(bytes: &[u8]) -> Result<Option<usize>, CompressionError> {
    if bytes.len() < HEADER_LEN {
        if bytes.len() >= 2 && bytes[..2] != MAGIC {
            return Err(corrupt("missing gzip magic"));
        }
        return Ok(None);
    }
    if bytes[..2] != MAGIC {
        return Err(corrupt("missing gzip magic"));
    }
    if bytes[2] != METHOD_DEFLATE {
        return Err(corrupt(format!("unsupported compression method {}", bytes[2])));
    }
    let flags = bytes[3];
    if flags & RESERVED != 0 {
        return Err(corrupt("reserved header flags set"));
    }

    let mut at = HEADER_LEN;
    if flags & FEXTRA != 0 {
        let Some(length) = bytes.get(at..at + 2) else {
            return Ok(None);
        };
        at += 2 + usize::from(u16::from_le_bytes([length[0], length[1]]));
        if bytes.len() < at {
            return Ok(None);
        }
    }
    for flag in [FNAME, FCOMMENT] {
        if flags & flag != 0 {
            let Some(end) = bytes[at..].iter().position(|&byte| byte == 0) else {
                return Ok(None);
            };
            at += end + 1;
        }
    }
    if flags & FHCRC != 0 {
        let Some(stored) = bytes.get(at..at + 2) else {
            return Ok(None);
        };
        let mut crc = Crc::new();
        crc.update(&bytes[..at]);
        if u16::from_le_bytes([stored[0], stored[1]]) != (crc.sum() & 0xffff) as u16 {
            return Err(CompressionError::data(
                CompressionAlgorithm::GZip,
                crate::error::DataFaultKind::Checksum,
                "header crc mismatch",
            ));
        }
        at += 2;
    }
    Ok(Some(at))
}

/// Splits a trailer into its CRC-32 and ISIZE fields.
pub(crate) fn parse_trailer(bytes: &[u8; TRAILER_LEN]) -> (u32, u32) {
    (
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
    )
}

fn corrupt(detail: impl Into<String>) -> CompressionError {
    CompressionError::corrupt(CompressionAlgorithm::GZip, detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_header_parses() {
        assert_eq!(parse_header(&header(6)).expect("parse"), Some(10));
    }

    #[test]
    fn partial_header_needs_more_input() {
        let full = header(6);
        assert_eq!(parse_header(&full[..1]).expect("parse"), None);
        assert_eq!(parse_header(&full[..9]).expect("parse"), None);
    }

    #[test]
    fn optional_fields_are_skipped() {
        let mut bytes = header(6).to_vec();
        bytes[3] = FEXTRA | FNAME | FCOMMENT;
        bytes.extend_from_slice(&[3, 0, b'a', b'b', b'c']);
        bytes.extend_from_slice(b"name.txt\0");
        bytes.extend_from_slice(b"comment\0");
        let expected = bytes.len();
        bytes.extend_from_slice(b"deflate body");

        assert_eq!(parse_header(&bytes).expect("parse"), Some(expected));
        assert_eq!(parse_header(&bytes[..expected - 3]).expect("parse"), None);
    }

    #[test]
    fn header_crc_is_verified() {
        let mut bytes = header(6).to_vec();
        bytes[3] = FHCRC;
        let mut crc = Crc::new();
        crc.update(&bytes);
        let stored = (crc.sum() & 0xffff) as u16;
        bytes.extend_from_slice(&stored.to_le_bytes());
        assert_eq!(parse_header(&bytes).expect("parse"), Some(12));

        bytes[10] ^= 0xff;
        let err = parse_header(&bytes).expect_err("crc mismatch");
        assert_eq!(err.data_fault(), Some(crate::error::DataFaultKind::Checksum));
    }

    #[test]
    fn wrong_magic_is_corrupt() {
        assert!(parse_header(b"PK\x03\x04").is_err());
    }

    #[test]
    fn trailer_round_trips_crc_and_size() {
        let mut crc = Crc::new();
        crc.update(b"hello");
        let (sum, size) = parse_trailer(&trailer(&crc));
        assert_eq!(sum, crc.sum());
        assert_eq!(size, 5);
    }
}
