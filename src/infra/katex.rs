//! KaTeX typesetting backend.

use async_trait::async_trait;
use katex::{OptsBuilder, OutputType};
use tracing::debug;

use crate::application::render::{BackendError, TypesetBackend};

/// Formula rendered once at startup to prove the engine loads.
const PROBE_FORMULA: &str = "x^2";

/// Runs KaTeX on the blocking pool. Each call builds a fresh JS context, so
/// the backend itself holds no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct KatexBackend;

impl KatexBackend {
    pub fn new() -> Self {
        Self
    }

    async fn render(&self, literal: &str, display_mode: bool) -> Result<String, BackendError> {
        let literal = literal.to_string();
        tokio::task::spawn_blocking(move || render_math_html(&literal, display_mode))
            .await
            .map_err(|err| BackendError::Unavailable {
                message: format!("KaTeX task failed: {err}"),
            })?
    }
}

#[async_trait]
impl TypesetBackend for KatexBackend {
    async fn initialize(&self) -> Result<(), BackendError> {
        self.render(PROBE_FORMULA, false)
            .await
            .map_err(|err| BackendError::Init {
                message: err.to_string(),
            })?;
        debug!("KaTeX engine loaded");
        Ok(())
    }

    async fn typeset_inline(&self, tex: &str) -> Result<String, BackendError> {
        self.render(tex, false).await
    }

    async fn typeset_block(&self, tex: &str) -> Result<String, BackendError> {
        self.render(tex, true).await
    }
}

/// Render a KaTeX expression to HTML, returning an inline (`<span>`) or block (`<div>`) fragment.
fn render_math_html(literal: &str, display_mode: bool) -> Result<String, BackendError> {
    let mut builder = OptsBuilder::default();
    builder.display_mode(display_mode);
    builder.output_type(OutputType::Html);

    let opts = builder
        .build()
        .map_err(|err| BackendError::typeset(format!("failed to build KaTeX options: {err}")))?;

    katex::render_with_opts(literal, opts)
        .map_err(|err| BackendError::typeset(format!("KaTeX rendering failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inline_and_block_output_differ() {
        let backend = KatexBackend::new();
        backend.initialize().await.expect("katex loads");

        let inline = backend.typeset_inline("\\frac{1}{2}").await.expect("inline");
        let block = backend.typeset_block("\\frac{1}{2}").await.expect("block");

        assert!(inline.contains("katex"));
        assert!(block.contains("katex-display"));
        assert!(!inline.contains("katex-display"));
    }

    #[tokio::test]
    async fn invalid_tex_is_a_typeset_error() {
        let backend = KatexBackend::new();
        let err = backend
            .typeset_inline("\\frac{1}{")
            .await
            .expect_err("unbalanced group must fail");
        assert!(matches!(err, BackendError::Typeset { .. }));
    }
}
