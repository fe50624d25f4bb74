//! Error types for the fraud console service

/// Errors that can occur in the fraud console service
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("{detail}")]
    Api { status: Option<u16>, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Dashboard error: {0}")]
    Dashboard(String),
}

impl ConsoleError {
    /// HTTP status of a backend reply, if the error came from one
    pub fn status(&self) -> Option<u16> {
        match self {
            ConsoleError::Api { status, .. } => *status,
            _ => None,
        }
    }

    /// Operator-facing message, falling back when the error carries no text
    pub fn user_message(&self, fallback: &str) -> String {
        let message = match self {
            ConsoleError::Api { detail, .. } => detail.clone(),
            ConsoleError::Http(msg) | ConsoleError::Export(msg) => msg.clone(),
            other => other.to_string(),
        };
        if message.trim().is_empty() {
            fallback.to_string()
        } else {
            message
        }
    }
}

/// Result type alias for fraud console operations
pub type Result<T> = std::result::Result<T, ConsoleError>;
