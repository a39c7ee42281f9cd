//! Cache key definitions.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::domain::{ContentKind, DisplayMode};

/// Identity of one logical unit of typesetting work.
///
/// Used both for cache lookup and for coalescing concurrent requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderKey {
    pub content: String,
    pub display_mode: DisplayMode,
    pub kind: ContentKind,
}

impl RenderKey {
    pub fn new(content: impl Into<String>, display_mode: DisplayMode, kind: ContentKind) -> Self {
        Self {
            content: content.into(),
            display_mode,
            kind,
        }
    }

    /// Short stable fingerprint for log fields.
    pub fn fingerprint(&self) -> u64 {
        hash_value(self)
    }
}

impl fmt::Display for RenderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{:016x}",
            self.kind,
            self.display_mode,
            self.fingerprint()
        )
    }
}

/// Compute a hash for any hashable value.
pub fn hash_value<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_differ_by_mode_and_kind() {
        let inline = RenderKey::new("x^2", DisplayMode::Inline, ContentKind::PureLatex);
        let block = RenderKey::new("x^2", DisplayMode::Block, ContentKind::PureLatex);
        let mixed = RenderKey::new("x^2", DisplayMode::Inline, ContentKind::MixedContent);

        assert_ne!(inline, block);
        assert_ne!(inline, mixed);
        assert_eq!(
            inline,
            RenderKey::new("x^2".to_string(), DisplayMode::Inline, ContentKind::PureLatex)
        );
    }

    #[test]
    fn fingerprint_is_stable_for_equal_keys() {
        let a = RenderKey::new("$2x=10$", DisplayMode::Inline, ContentKind::InlineMath);
        let b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert!(a.to_string().starts_with("inline_math/inline/"));
    }
}
