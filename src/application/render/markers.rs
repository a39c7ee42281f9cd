//! Marker discovery and field inference inside a container.

use tracing::debug;

use crate::dom::{Document, NodeId};
use crate::domain::{DisplayMode, FieldId};

pub const SMART_CONTENT_CLASS: &str = "smart-content";
pub const LATEX_CONTENT_CLASS: &str = "latex-content";
pub const DATA_CONTENT: &str = "data-content";
pub const DATA_LATEX: &str = "data-latex";
pub const DATA_FIELD: &str = "data-field";
/// Generic opt-in marker: any element carrying this attribute plus
/// `data-content`.
pub const DATA_RENDER: &str = "data-render";

pub const MATH_RENDERED_CLASS: &str = "math-rendered";
pub const RENDER_ERROR_CLASS: &str = "render-error";

/// Classes that mark a node as successfully written.
pub const RENDERED_CLASSES: [&str; 5] = [
    MATH_RENDERED_CLASS,
    "rendered-text",
    "rendered-inline_math",
    "rendered-pure_latex",
    "rendered-mixed_content",
];

/// Ancestor classes that identify which solution field a marker belongs to.
const ANCESTOR_FIELDS: [(&str, FieldId); 6] = [
    ("solution-step", FieldId::StepDescription),
    ("interactive-workspace", FieldId::StepDescription),
    ("option-label", FieldId::OptionText),
    ("hint-container", FieldId::Hint),
    ("error-container", FieldId::ErrorExplanation),
    ("result-container", FieldId::ResultCheck),
];

const OWN_FIELDS: [(&str, FieldId); 3] = [
    ("step-description", FieldId::StepDescription),
    ("option-text", FieldId::OptionText),
    ("hint-text", FieldId::Hint),
];

/// A node inside a container that asks to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub node: NodeId,
    pub payload: String,
    pub display_mode: DisplayMode,
    pub field: Option<FieldId>,
}

/// Find every marker under `root` in document order. Markers with an empty
/// payload are skipped.
pub fn discover(document: &Document, root: NodeId, inline_mode: DisplayMode) -> Vec<Marker> {
    document
        .query_all(root, |doc, node| marker_payload(doc, node, inline_mode).is_some())
        .into_iter()
        .filter_map(|node| {
            let (payload, display_mode) = marker_payload(document, node, inline_mode)?;
            Some(Marker {
                node,
                payload,
                display_mode,
                field: infer_field(document, node),
            })
        })
        .collect()
}

fn marker_payload(
    document: &Document,
    node: NodeId,
    inline_mode: DisplayMode,
) -> Option<(String, DisplayMode)> {
    let (payload, mode) = if document.has_class(node, LATEX_CONTENT_CLASS) {
        (document.attribute(node, DATA_LATEX)?, DisplayMode::Block)
    } else if document.has_class(node, SMART_CONTENT_CLASS)
        || document.has_attribute(node, DATA_RENDER)
    {
        (document.attribute(node, DATA_CONTENT)?, inline_mode)
    } else {
        return None;
    };

    if payload.trim().is_empty() {
        None
    } else {
        Some((payload, mode))
    }
}

pub fn is_rendered(document: &Document, node: NodeId) -> bool {
    document.has_any_class(node, &RENDERED_CLASSES)
}

/// Which solution field a node displays.
///
/// An explicit `data-field` wins, then the nearest known ancestor container,
/// then the node's own class.
pub fn infer_field(document: &Document, node: NodeId) -> Option<FieldId> {
    if let Some(name) = document.attribute(node, DATA_FIELD) {
        match name.parse::<FieldId>() {
            Ok(field) => return Some(field),
            Err(_) => debug!(node = %node, field = %name, "Unknown data-field, inferring from context"),
        }
    }

    for (class, field) in ANCESTOR_FIELDS {
        if document
            .closest(node, |doc, candidate| doc.has_class(candidate, class))
            .is_some()
        {
            return Some(field);
        }
    }

    OWN_FIELDS
        .iter()
        .find(|(class, _)| document.has_class(node, class))
        .map(|(_, field)| *field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(doc: &Document, parent: NodeId, class: &str, attr: &str, value: &str) -> NodeId {
        let node = doc.create_element("div");
        doc.append_child(parent, node).expect("append");
        doc.add_class(node, class).expect("class");
        doc.set_attribute(node, attr, value).expect("attr");
        node
    }

    #[test]
    fn discovers_both_marker_styles_in_order() {
        let doc = Document::new();
        let root = doc.create_element("section");
        let smart = marker(&doc, root, SMART_CONTENT_CLASS, DATA_CONTENT, "Solve $x$ now");
        let latex = marker(&doc, root, LATEX_CONTENT_CLASS, DATA_LATEX, "\\frac{1}{2}");
        marker(&doc, root, SMART_CONTENT_CLASS, DATA_CONTENT, "   ");
        let generic = doc.create_element("span");
        doc.append_child(root, generic).expect("append");
        doc.set_attribute(generic, DATA_RENDER, "").expect("attr");
        doc.set_attribute(generic, DATA_CONTENT, "$y$").expect("attr");

        let found = discover(&doc, root, DisplayMode::Inline);
        let nodes: Vec<_> = found.iter().map(|m| m.node).collect();
        assert_eq!(nodes, vec![smart, latex, generic]);
        assert_eq!(found[0].display_mode, DisplayMode::Inline);
        assert_eq!(found[1].display_mode, DisplayMode::Block);
        assert_eq!(found[1].payload, "\\frac{1}{2}");
    }

    #[test]
    fn field_inference_prefers_explicit_then_ancestor_then_own_class() {
        let doc = Document::new();
        let step = doc.create_element("div");
        doc.add_class(step, "solution-step").expect("class");
        let inside = marker(&doc, step, "hint-text", DATA_CONTENT, "x");
        assert_eq!(infer_field(&doc, inside), Some(FieldId::StepDescription));

        doc.set_attribute(inside, DATA_FIELD, "ipucu").expect("attr");
        assert_eq!(infer_field(&doc, inside), Some(FieldId::Hint));

        doc.set_attribute(inside, DATA_FIELD, "notAField").expect("attr");
        assert_eq!(infer_field(&doc, inside), Some(FieldId::StepDescription));

        let loose = doc.create_element("span");
        doc.add_class(loose, "option-text").expect("class");
        assert_eq!(infer_field(&doc, loose), Some(FieldId::OptionText));

        let bare = doc.create_element("span");
        assert_eq!(infer_field(&doc, bare), None);
    }

    #[test]
    fn rendered_means_any_rendered_class() {
        let doc = Document::new();
        let node = doc.create_element("span");
        assert!(!is_rendered(&doc, node));
        doc.add_class(node, RENDER_ERROR_CLASS).expect("class");
        assert!(!is_rendered(&doc, node));
        doc.add_class(node, "rendered-text").expect("class");
        assert!(is_rendered(&doc, node));
    }
}
