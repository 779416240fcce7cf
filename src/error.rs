//! Crate-wide error type.
//!
//! Recoverable conditions surface here. Precondition violations and
//! `fsck` failures are fatal per the spec and still panic — but through
//! [`StoreError::Corrupted`]/[`StoreError::PreconditionViolated`]'s display
//! text, so the panic message and a would-be `Result` read identically.

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("index {index} out of range (len {len})")]
    OutOfRange { index: usize, len: usize },

    #[error("key not found")]
    KeyNotFound,

    #[error("allocator out of space")]
    AllocatorFull,

    #[error("precondition violated: {0}")]
    PreconditionViolated(&'static str),

    #[error("structural corruption: {0}")]
    Corrupted(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported on this backend: {0}")]
    Unsupported(&'static str),
}

/// Panic with a [`StoreError::Corrupted`]-shaped message. Used at every
/// `fsck` call site — corruption is fatal, never returned as an `Err`.
pub(crate) fn fsck_fail(reason: &'static str) -> ! {
    tracing::error!(reason, "fsck failed");
    panic!("{}", StoreError::Corrupted(reason));
}

/// Panic with a [`StoreError::PreconditionViolated`]-shaped message.
pub(crate) fn precondition_fail(reason: &'static str) -> ! {
    panic!("{}", StoreError::PreconditionViolated(reason));
}
