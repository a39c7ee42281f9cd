pub mod kinds;
pub mod metadata;

pub use kinds::{ContentKind, DisplayMode};
pub use metadata::{FieldId, MathComplexity, MetadataError, RenderHints, RenderMetadata};
