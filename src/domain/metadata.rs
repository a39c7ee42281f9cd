//! Typed render hints carried alongside a parsed solution.
//!
//! The producer attaches a `renderMetadata` object that maps solution field
//! names to the content kind used in that field. Field names form a closed
//! set; anything else falls back to structural classification.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::kinds::ContentKind;

/// Solution fields that can carry a declared content kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldId {
    #[serde(rename = "adimAciklamasi")]
    StepDescription,
    #[serde(rename = "cozum_lateks")]
    StepLatex,
    #[serde(rename = "odak_alan_lateks")]
    FocusLatex,
    #[serde(rename = "ipucu")]
    Hint,
    #[serde(rename = "hataAciklamasi")]
    ErrorExplanation,
    #[serde(rename = "tamCozumLateks")]
    FullSolutionLatex,
    #[serde(rename = "sonucKontrolu")]
    ResultCheck,
    #[serde(rename = "metin_lateks")]
    OptionText,
}

impl FieldId {
    pub const ALL: [FieldId; 8] = [
        FieldId::StepDescription,
        FieldId::StepLatex,
        FieldId::FocusLatex,
        FieldId::Hint,
        FieldId::ErrorExplanation,
        FieldId::FullSolutionLatex,
        FieldId::ResultCheck,
        FieldId::OptionText,
    ];

    /// Name used by the producer and by `data-field` attributes.
    pub fn wire_name(self) -> &'static str {
        match self {
            FieldId::StepDescription => "adimAciklamasi",
            FieldId::StepLatex => "cozum_lateks",
            FieldId::FocusLatex => "odak_alan_lateks",
            FieldId::Hint => "ipucu",
            FieldId::ErrorExplanation => "hataAciklamasi",
            FieldId::FullSolutionLatex => "tamCozumLateks",
            FieldId::ResultCheck => "sonucKontrolu",
            FieldId::OptionText => "metin_lateks",
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for FieldId {
    type Err = MetadataError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        FieldId::ALL
            .into_iter()
            .find(|field| field.wire_name() == trimmed)
            .ok_or_else(|| MetadataError::UnknownField(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MathComplexity {
    None,
    Low,
    Medium,
    High,
}

/// Boolean feature flags the producer reports for the whole solution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderHints {
    pub has_fractions: bool,
    pub has_exponents: bool,
    pub has_roots: bool,
    pub has_matrices: bool,
    pub has_equations: bool,
    pub estimated_render_time: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("solution payload must be a JSON object")]
    NotAnObject,
    #[error("malformed renderMetadata: {0}")]
    Malformed(String),
    #[error("unknown solution field `{0}`")]
    UnknownField(String),
}

/// Declared kinds per field plus scheduling hints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderMetadata {
    content_types: HashMap<FieldId, ContentKind>,
    priority: Vec<FieldId>,
    pub complexity: Option<MathComplexity>,
    pub hints: RenderHints,
}

impl RenderMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, field: FieldId, kind: ContentKind) -> Self {
        self.content_types.insert(field, kind);
        self
    }

    pub fn with_priority(mut self, field: FieldId) -> Self {
        if !self.priority.contains(&field) {
            self.priority.push(field);
        }
        self
    }

    /// Extract the metadata block from a parsed solution.
    ///
    /// A solution without `renderMetadata` yields empty metadata. Unknown field
    /// names and unknown kinds are skipped, leaving those fields to the
    /// structural classifier.
    pub fn from_solution(solution: &Value) -> Result<Self, MetadataError> {
        let object = solution.as_object().ok_or(MetadataError::NotAnObject)?;
        let Some(raw) = object.get("renderMetadata") else {
            return Ok(Self::default());
        };

        let raw: RawRenderMetadata = serde_json::from_value(raw.clone())
            .map_err(|err| MetadataError::Malformed(err.to_string()))?;

        let mut content_types = HashMap::new();
        for (name, kinds) in raw.content_types {
            let field = match name.parse::<FieldId>() {
                Ok(field) => field,
                Err(_) => {
                    debug!(field = %name, "Ignoring render metadata for unknown field");
                    continue;
                }
            };
            match kinds.first_known() {
                Some(kind) => {
                    content_types.insert(field, kind);
                }
                None => debug!(field = %name, "No recognised content kind declared"),
            }
        }

        let priority = raw
            .priority_elements
            .iter()
            .filter_map(|name| name.parse::<FieldId>().ok())
            .fold(Vec::new(), |mut acc, field| {
                if !acc.contains(&field) {
                    acc.push(field);
                }
                acc
            });

        let complexity = raw
            .math_complexity
            .as_deref()
            .and_then(|value| serde_json::from_value(Value::String(value.to_string())).ok());

        Ok(Self {
            content_types,
            priority,
            complexity,
            hints: raw.render_hints,
        })
    }

    pub fn declared_kind(&self, field: FieldId) -> Option<ContentKind> {
        self.content_types.get(&field).copied()
    }

    /// Position of the field in the priority list, if listed.
    pub fn priority_rank(&self, field: FieldId) -> Option<usize> {
        self.priority.iter().position(|candidate| *candidate == field)
    }

    pub fn is_empty(&self) -> bool {
        self.content_types.is_empty() && self.priority.is_empty()
    }

    pub fn len(&self) -> usize {
        self.content_types.len()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawRenderMetadata {
    content_types: HashMap<String, KindList>,
    math_complexity: Option<String>,
    priority_elements: Vec<String>,
    render_hints: RenderHints,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KindList {
    One(String),
    Many(Vec<String>),
}

impl KindList {
    fn first_known(&self) -> Option<ContentKind> {
        match self {
            KindList::One(kind) => kind.parse().ok(),
            KindList::Many(kinds) => kinds.iter().find_map(|kind| kind.parse().ok()),
        }
    }
}
