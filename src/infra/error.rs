use thiserror::Error;

use crate::application::render::RenderError;
use crate::dom::DomError;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid solution file: {0}")]
    Solution(#[from] serde_json::Error),
    #[error("document error: {0}")]
    Document(#[from] DomError),
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl InfraError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
