//! Error types for the chat core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatloomError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ChatloomResult<T> = Result<T, ChatloomError>;

impl ChatloomError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<reqwest::Error> for ChatloomError {
    fn from(value: reqwest::Error) -> Self {
        if let Some(status) = value.status() {
            return Self::Http {
                status: status.as_u16(),
                body: value.to_string(),
            };
        }
        Self::Transport(value.to_string())
    }
}

impl From<toml::de::Error> for ChatloomError {
    fn from(value: toml::de::Error) -> Self {
        Self::Config(value.to_string())
    }
}
