//! Document backends shipped with the crate

mod plain_text;

pub use plain_text::{PlainTextGenerator, TextLayout};

/// Failures inside a backend before they are reduced to the contract's
/// `false`/`None` results
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("could not move export into place: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("{detail}")]
    Generic { detail: String },
}

impl BackendError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}
