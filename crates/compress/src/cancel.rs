//! Cooperative cancellation for long running stream operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::CompressionError;

/// A token checked by the engine at the top of every read, write, flush and
/// finish loop iteration.
///
/// Clones share state: cancelling one clone cancels them all.
///
/// ```
/// use compress::CancellableToken;
///
/// let token = CancellableToken::new();
/// let observer = token.clone();
/// assert!(observer.check().is_ok());
/// token.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancellableToken {
    inner: TokenInner,
}

#[derive(Clone, Debug, Default)]
enum TokenInner {
    #[default]
    Never,
    Flag(Arc<AtomicBool>),
    #[cfg(feature = "async")]
    Tokio(tokio_util::sync::CancellationToken),
}

impl CancellableToken {
    /// A token that can never be cancelled.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: TokenInner::Flag(Arc::new(AtomicBool::new(false))),
        }
    }

    /// Requests cancellation. Has no effect on [`none`](Self::none) tokens.
    pub fn cancel(&self) {
        match &self.inner {
            TokenInner::Never => {}
            TokenInner::Flag(flag) => flag.store(true, Ordering::Release),
            #[cfg(feature = "async")]
            TokenInner::Tokio(token) => token.cancel(),
        }
    }

    /// Reports whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match &self.inner {
            TokenInner::Never => false,
            TokenInner::Flag(flag) => flag.load(Ordering::Acquire),
            #[cfg(feature = "async")]
            TokenInner::Tokio(token) => token.is_cancelled(),
        }
    }

    /// Reports whether this token could ever be cancelled.
    #[must_use]
    pub const fn can_be_cancelled(&self) -> bool {
        !matches!(self.inner, TokenInner::Never)
    }

    /// Fails with [`CompressionError::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> Result<(), CompressionError> {
        if self.is_cancelled() {
            Err(CompressionError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(feature = "async")]
impl From<tokio_util::sync::CancellationToken> for CancellableToken {
    fn from(token: tokio_util::sync::CancellationToken) -> Self {
        Self {
            inner: TokenInner::Tokio(token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_token_never_cancels() {
        let token = CancellableToken::none();
        token.cancel();
        assert!(!token.is_cancelled());
        assert!(!token.can_be_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn clones_share_cancellation() {
        let token = CancellableToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(matches!(token.check(), Err(CompressionError::Cancelled)));
    }

    #[cfg(feature = "async")]
    #[test]
    fn wraps_tokio_cancellation_token() {
        let source = tokio_util::sync::CancellationToken::new();
        let token = CancellableToken::from(source.clone());
        assert!(token.can_be_cancelled());
        source.cancel();
        assert!(token.is_cancelled());
    }
}
