//! Error types for drivetag.
//!
//! Library code returns [`DriveTagResult`]; the binary wraps these in
//! `anyhow` at the command boundary.

use thiserror::Error;

/// Result type alias for drivetag operations
pub type DriveTagResult<T> = Result<T, DriveTagError>;

/// Main error type for drivetag operations
#[derive(Error, Debug)]
pub enum DriveTagError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Drive API error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unrecognised Drive link: {0}")]
    InvalidLink(String),

    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DriveTagError {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        DriveTagError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        DriveTagError::Auth(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        DriveTagError::Config(message.into())
    }

    /// Map an HTTP status and body into the matching error kind.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => DriveTagError::Auth(message),
            404 => DriveTagError::NotFound(message),
            _ => DriveTagError::Remote { status, message },
        }
    }
}

impl From<ureq::Error> for DriveTagError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let body = response.into_string().unwrap_or_default();
                DriveTagError::from_status(status, google_error_message(&body))
            }
            ureq::Error::Transport(transport) => DriveTagError::Transport(transport.to_string()),
        }
    }
}

/// Pull `error.message` out of a Google API error body, falling back to the raw text.
fn google_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}
