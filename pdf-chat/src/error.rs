use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Document not found: {}", .0.display())]
    DocumentNotFound(PathBuf),

    #[error("Failed to extract text from {}: {message}", .path.display())]
    DocumentParse { path: PathBuf, message: String },

    #[error("Generation API error: {0}")]
    Generation(String),
}

impl ChatError {
    /// Errors that only affect the current turn; the session stays usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ChatError::Generation(_))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
