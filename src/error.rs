use thiserror::Error;

/// Errors raised while loading a distance matrix or rendering it.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors (matrix file, option files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed distance matrix
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A sample named in the order/rename list is not in the matrix
    #[error("sample '{0}' is not present in the distance matrix")]
    UnknownSample(String),

    #[error("invalid normalization range: {0}")]
    InvalidRange(String),
}

impl Error {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
