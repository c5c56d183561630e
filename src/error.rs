use thiserror::Error;

/// Errors surfaced by the engine.
///
/// Ordering and level preconditions of the algorithms are not represented here:
/// those are programmer errors and are checked with debug assertions.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller-supplied configuration or arguments are malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An id, label or counter exceeded its bit width.
    #[error("{what} overflow: maximum is {max}")]
    Overflow { what: &'static str, max: u128 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// A stream, sorter or queue was read past its end.
    pub(crate) fn exhausted(what: &str) -> Self {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("{} is exhausted", what),
        ))
    }
}
