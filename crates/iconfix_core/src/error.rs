use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Input not found: {0}")]
    NotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("{tool} failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Heuristic patch failed: {0}")]
    PatchFailed(String),
}

pub type Result<T> = std::result::Result<T, RepairError>;
