//! Resumable operation protocol.
//!
//! Every public-key operation is a value that owns its scratch state and
//! advances by a bounded amount of work per [`StepOp::poll`] call. The
//! caller decides when to poll; nothing here blocks or spawns.

use pssl_types::CryptoError;

/// Exponent windows processed per RSA poll.
pub const RSA_WINDOWS_PER_POLL: usize = 32;

/// Scalar bits processed per elliptic-curve poll.
pub const ECC_BITS_PER_POLL: usize = 64;

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress<T> {
    Pending,
    Done(T),
}

impl<T> Progress<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Progress::Pending)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Progress<U> {
        match self {
            Progress::Pending => Progress::Pending,
            Progress::Done(v) => Progress::Done(f(v)),
        }
    }
}

/// A public-key operation that can be advanced incrementally.
pub trait StepOp {
    type Output;

    /// Perform one bounded unit of work.
    ///
    /// Polling again after `Done` or an error is a caller bug and returns
    /// `InvalidArg`.
    fn poll(&mut self) -> Result<Progress<Self::Output>, CryptoError>;

    /// Drive the operation to completion in one call.
    fn run(mut self) -> Result<Self::Output, CryptoError>
    where
        Self: Sized,
    {
        loop {
            if let Progress::Done(out) = self.poll()? {
                return Ok(out);
            }
        }
    }
}
