use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BoardError>;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Board not found: {0}")]
    BoardNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Card not found: {0}")]
    CardNotFound(String),

    #[error("Invalid {field}: {message}")]
    InvalidInput { field: &'static str, message: String },

    #[error("Failed to persist {operation}: {message}")]
    Persistence {
        operation: &'static str,
        message: String,
    },

    #[error("Timed out during {operation}")]
    Timeout { operation: &'static str },

    /// Failure of a load that this caller waited on rather than performed.
    #[error("Loading board {board_id} failed: {source}")]
    LoadFailed {
        board_id: String,
        #[source]
        source: Arc<BoardError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BoardError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    pub fn persistence(operation: &'static str, message: impl ToString) -> Self {
        Self::Persistence {
            operation,
            message: message.to_string(),
        }
    }

    /// True for any "does not exist" failure, including one shared from another caller's load.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::BoardNotFound(_) | Self::ColumnNotFound(_) | Self::CardNotFound(_) => true,
            Self::LoadFailed { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// True when a repository write or read failed, timed out, or hit the filesystem.
    pub fn is_persistence(&self) -> bool {
        match self {
            Self::Persistence { .. }
            | Self::Timeout { .. }
            | Self::Io(_)
            | Self::Serialization(_) => true,
            Self::LoadFailed { source, .. } => source.is_persistence(),
            _ => false,
        }
    }
}
