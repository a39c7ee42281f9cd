use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a fragment should be typeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Plain prose, assigned as text without touching the backend.
    Text,
    /// A formula wrapped in `$…$` (or a bare formula meant to sit in a line).
    InlineMath,
    /// LaTeX source without any `$` delimiters.
    PureLatex,
    /// Prose interleaved with `$…$` segments.
    MixedContent,
}

impl ContentKind {
    pub const ALL: [ContentKind; 4] = [
        ContentKind::Text,
        ContentKind::InlineMath,
        ContentKind::PureLatex,
        ContentKind::MixedContent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::InlineMath => "inline_math",
            ContentKind::PureLatex => "pure_latex",
            ContentKind::MixedContent => "mixed_content",
        }
    }

    /// Class added to a node once content of this kind has been written.
    pub fn rendered_class(self) -> &'static str {
        match self {
            ContentKind::Text => "rendered-text",
            ContentKind::InlineMath => "rendered-inline_math",
            ContentKind::PureLatex => "rendered-pure_latex",
            ContentKind::MixedContent => "rendered-mixed_content",
        }
    }

    pub fn is_math(self) -> bool {
        !matches!(self, ContentKind::Text)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = UnknownKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ContentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value.trim())
            .ok_or_else(|| UnknownKind(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown content kind `{0}`")]
pub struct UnknownKind(pub String);

/// Typesetting layout requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Inline,
    Block,
}

impl DisplayMode {
    pub fn is_block(self) -> bool {
        matches!(self, DisplayMode::Block)
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DisplayMode::Inline => "inline",
            DisplayMode::Block => "block",
        })
    }
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(DisplayMode::Inline),
            "block" | "display" => Ok(DisplayMode::Block),
            other => Err(format!("expected `inline` or `block`, got `{other}`")),
        }
    }
}
