use async_trait::async_trait;
use thiserror::Error;

/// Math typesetting engine behind the render manager.
///
/// Implementations may be slow and are never called concurrently by the
/// manager: every invocation goes through the single scheduler worker.
#[async_trait]
pub trait TypesetBackend: Send + Sync {
    /// One-time startup. Called at most once per manager.
    async fn initialize(&self) -> Result<(), BackendError>;

    /// Typeset a formula that sits inside a line of text.
    async fn typeset_inline(&self, tex: &str) -> Result<String, BackendError>;

    /// Typeset a formula as a display block.
    async fn typeset_block(&self, tex: &str) -> Result<String, BackendError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend initialization failed: {message}")]
    Init { message: String },
    #[error("typesetting failed: {message}")]
    Typeset { message: String },
    #[error("backend unavailable: {message}")]
    Unavailable { message: String },
}

impl BackendError {
    pub fn typeset(message: impl Into<String>) -> Self {
        Self::Typeset {
            message: message.into(),
        }
    }
}
