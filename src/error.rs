use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Upstream call attempted without stored credentials
    #[error("Missing credentials. Run `tutorcal credentials` to set them.")]
    MissingCredentials,

    /// Empty or invalid user input
    #[error("{0}")]
    Validation(String),

    /// Course name collision, carries the stored key
    #[error("\"{0}\" already exists.")]
    Duplicate(String),

    #[error("Remote fetch failed ({status})")]
    RemoteFetch { status: u16 },

    #[error("Remote save failed ({status})")]
    RemoteSave { status: u16 },

    /// Remote write token mismatch
    #[error("Unauthorized")]
    Unauthorized,

    /// Remote write body is not an object
    #[error("{0}")]
    MalformedPayload(String),

    /// Local store file holds something other than a JSON object
    #[error("{} does not hold a JSON object", .0.display())]
    CorruptStore(PathBuf),

    /// Terminal prompt could not be shown or read
    #[error("Prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("Upstream request failed ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
