//! Crate-wide error type.

use thiserror::Error;

/// Errors surfaced by the link, the T=1 engine and the channel manager.
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no response from the secure element within the block waiting time")]
    Timeout,

    #[error("inconsistent block received: {0}")]
    Consistency(&'static str),

    #[error("secure element performed a software reset")]
    Reset,

    #[error("abort requested by the secure element")]
    Abort,

    #[error("invalid answer-to-protocol: {0}")]
    InvalidAtp(String),

    #[error("invalid data length: at most {max} bytes allowed, got {actual}")]
    InvalidLength { max: usize, actual: usize },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
