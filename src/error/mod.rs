use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Token decode error: {0}")]
    TokenDecode(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code, used as a log field
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::TokenDecode(_) => "TOKEN_DECODE_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Transport(_) => "TRANSPORT_ERROR",
            AppError::Protocol(_) => "PROTOCOL_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
