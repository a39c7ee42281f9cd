use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, warn};

use crate::cache::{CacheEntry, RenderKey, RenderedOutput};
use crate::dom::{Document, DomError, NodeId};
use crate::domain::ContentKind;

use super::backend::{BackendError, TypesetBackend};
use super::classify::{Segment, split_segments};
use super::markers::{MATH_RENDERED_CLASS, RENDER_ERROR_CLASS, RENDERED_CLASSES};

const METRIC_RENDER_MS: &str = "typeset_render_ms";
const METRIC_FALLBACK: &str = "typeset_render_fallback_total";

/// Performs one typesetting unit against the backend and writes the outcome
/// into the target node.
///
/// Backend errors never escape: the node falls back to its raw content with
/// the `render-error` class.
pub struct Executor {
    backend: Arc<dyn TypesetBackend>,
    document: Arc<Document>,
}

impl Executor {
    pub fn new(backend: Arc<dyn TypesetBackend>, document: Arc<Document>) -> Self {
        Self { backend, document }
    }

    pub async fn execute(&self, node: NodeId, key: &RenderKey) -> CacheEntry {
        let started = Instant::now();
        let outcome = self.produce(key).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_RENDER_MS, "kind" => key.kind.as_str()).record(elapsed_ms);

        let output = match outcome {
            Ok(output) => output,
            Err(err) => {
                counter!(METRIC_FALLBACK, "kind" => key.kind.as_str()).increment(1);
                warn!(
                    key = %key,
                    node = %node,
                    error = %err,
                    "Typesetting failed, showing raw content"
                );
                RenderedOutput::Fallback(key.content.clone())
            }
        };

        let entry = CacheEntry::new(key.clone(), output, elapsed_ms);
        self.apply_entry(node, &entry);
        entry
    }

    /// Write a finished entry into `node`. Used for fresh renders, cache hits
    /// and coalesced followers alike, so all three leave identical nodes.
    pub fn apply_entry(&self, node: NodeId, entry: &CacheEntry) {
        if let Err(err) = write_entry(&self.document, node, entry) {
            warn!(node = %node, key = %entry.key, error = %err, "Could not write render output");
        }
    }

    async fn produce(&self, key: &RenderKey) -> Result<RenderedOutput, BackendError> {
        let content = key.content.trim();
        match key.kind {
            ContentKind::Text => Ok(RenderedOutput::Text(key.content.clone())),
            ContentKind::PureLatex => self
                .formula(content, key.display_mode.is_block())
                .await
                .map(RenderedOutput::Markup),
            ContentKind::InlineMath | ContentKind::MixedContent => {
                let segments = split_segments(content);
                if segments.iter().any(Segment::is_math) {
                    self.interleave(&segments).await.map(RenderedOutput::Markup)
                } else if key.kind == ContentKind::InlineMath {
                    // Declared inline math without delimiters: the whole
                    // fragment is the formula.
                    self.formula(content, false).await.map(RenderedOutput::Markup)
                } else {
                    Ok(RenderedOutput::Markup(escape_prose(content)))
                }
            }
        }
    }

    async fn formula(&self, tex: &str, block: bool) -> Result<String, BackendError> {
        if block {
            self.backend.typeset_block(tex).await
        } else {
            self.backend.typeset_inline(tex).await
        }
    }

    /// Escape prose segments and typeset formulas in place.
    async fn interleave(&self, segments: &[Segment<'_>]) -> Result<String, BackendError> {
        let mut markup = String::new();
        for segment in segments {
            match segment {
                Segment::Prose(text) => markup.push_str(&escape_prose(text)),
                Segment::Inline(tex) => markup.push_str(&self.formula(tex.trim(), false).await?),
                Segment::Display(tex) => markup.push_str(&self.formula(tex.trim(), true).await?),
            }
        }
        debug!(segments = segments.len(), "Typeset mixed fragment");
        Ok(markup)
    }
}

fn escape_prose(text: &str) -> String {
    ammonia::clean_text(&text.replace("\\$", "$"))
}

fn write_entry(document: &Document, node: NodeId, entry: &CacheEntry) -> Result<(), DomError> {
    match &entry.output {
        RenderedOutput::Markup(markup) => document.set_inner_markup(node, markup)?,
        RenderedOutput::Text(text) | RenderedOutput::Fallback(text) => {
            document.set_text_content(node, text)?
        }
    }

    // A node re-rendered with other content keeps only the latest outcome.
    for class in RENDERED_CLASSES {
        document.remove_class(node, class)?;
    }
    if entry.is_fallback() {
        return document.add_class(node, RENDER_ERROR_CLASS);
    }
    document.remove_class(node, RENDER_ERROR_CLASS)?;
    if entry.kind_used.is_math() {
        document.add_class(node, MATH_RENDERED_CLASS)?;
    }
    document.add_class(node, entry.kind_used.rendered_class())
}
