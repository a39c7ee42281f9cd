//! In-process element tree the render manager reads markers from and writes
//! typeset output into.
//!
//! The tree mirrors the subset of DOM behaviour the renderer relies on:
//! class lists, string attributes, text vs. markup content, parent links, and
//! whether a node is connected to the document body. All mutation goes through
//! `&self`, so a [`Document`] is shared as `Arc<Document>` between UI glue and
//! render tasks.

mod serialize;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::debug;

use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "dom";

/// Handle to a node inside one [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Content directly owned by a node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodeContent {
    #[default]
    Empty,
    /// Literal text; escaped when serialized.
    Text(String),
    /// Trusted markup emitted by the typesetting backend.
    Markup(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("node {0} does not belong to this document")]
    UnknownNode(NodeId),
    #[error("cannot append {child} under {parent}: it would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },
    #[error("the document body cannot be detached")]
    DetachBody,
}

#[derive(Debug, Default)]
struct NodeData {
    tag: String,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    content: NodeContent,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
pub struct Document {
    nodes: RwLock<Vec<NodeData>>,
    body: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document containing only an empty `body`.
    pub fn new() -> Self {
        let body = NodeData {
            tag: "body".to_string(),
            ..Default::default()
        };
        Self {
            nodes: RwLock::new(vec![body]),
            body: NodeId(0),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        let mut nodes = rw_write(&self.nodes, SOURCE, "create_element");
        nodes.push(NodeData {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        });
        NodeId(nodes.len() - 1)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        node.0 < rw_read(&self.nodes, SOURCE, "contains").len()
    }

    /// Move `child` to the end of `parent`'s children.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        let mut nodes = rw_write(&self.nodes, SOURCE, "append_child");
        check(&nodes, parent)?;
        check(&nodes, child)?;
        if child == self.body || is_ancestor_or_self(&nodes, child, parent) {
            return Err(DomError::Cycle { parent, child });
        }

        unlink(&mut nodes, child);
        nodes[child.0].parent = Some(parent);
        nodes[parent.0].children.push(child);
        Ok(())
    }

    /// Remove `node` from its parent. The subtree stays alive and can be
    /// re-attached later.
    pub fn detach(&self, node: NodeId) -> Result<(), DomError> {
        if node == self.body {
            return Err(DomError::DetachBody);
        }
        let mut nodes = rw_write(&self.nodes, SOURCE, "detach");
        check(&nodes, node)?;
        unlink(&mut nodes, node);
        Ok(())
    }

    /// Attach `node` to the body until the returned guard is dropped.
    pub fn attach_scoped(self: &Arc<Self>, node: NodeId) -> Result<AttachGuard, DomError> {
        self.append_child(self.body, node)?;
        Ok(AttachGuard {
            document: Arc::clone(self),
            node,
        })
    }

    /// Whether the node is reachable from the body.
    pub fn is_connected(&self, node: NodeId) -> bool {
        let nodes = rw_read(&self.nodes, SOURCE, "is_connected");
        if check(&nodes, node).is_err() {
            return false;
        }
        is_ancestor_or_self(&nodes, self.body, node)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        rw_read(&self.nodes, SOURCE, "parent")
            .get(node.0)
            .and_then(|data| data.parent)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        rw_read(&self.nodes, SOURCE, "children")
            .get(node.0)
            .map(|data| data.children.clone())
            .unwrap_or_default()
    }

    pub fn tag(&self, node: NodeId) -> Option<String> {
        rw_read(&self.nodes, SOURCE, "tag")
            .get(node.0)
            .map(|data| data.tag.clone())
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let mut nodes = rw_write(&self.nodes, SOURCE, "set_attribute");
        check(&nodes, node)?;
        nodes[node.0]
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        rw_read(&self.nodes, SOURCE, "attribute")
            .get(node.0)
            .and_then(|data| data.attributes.get(name).cloned())
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        rw_read(&self.nodes, SOURCE, "has_attribute")
            .get(node.0)
            .is_some_and(|data| data.attributes.contains_key(name))
    }

    pub fn add_class(&self, node: NodeId, class: &str) -> Result<(), DomError> {
        let mut nodes = rw_write(&self.nodes, SOURCE, "add_class");
        check(&nodes, node)?;
        let classes = &mut nodes[node.0].classes;
        if !classes.iter().any(|existing| existing == class) {
            classes.push(class.to_string());
        }
        Ok(())
    }

    pub fn remove_class(&self, node: NodeId, class: &str) -> Result<(), DomError> {
        let mut nodes = rw_write(&self.nodes, SOURCE, "remove_class");
        check(&nodes, node)?;
        nodes[node.0].classes.retain(|existing| existing != class);
        Ok(())
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        rw_read(&self.nodes, SOURCE, "has_class")
            .get(node.0)
            .is_some_and(|data| data.classes.iter().any(|existing| existing == class))
    }

    pub fn has_any_class(&self, node: NodeId, classes: &[&str]) -> bool {
        rw_read(&self.nodes, SOURCE, "has_any_class")
            .get(node.0)
            .is_some_and(|data| {
                data.classes
                    .iter()
                    .any(|existing| classes.contains(&existing.as_str()))
            })
    }

    pub fn classes(&self, node: NodeId) -> Vec<String> {
        rw_read(&self.nodes, SOURCE, "classes")
            .get(node.0)
            .map(|data| data.classes.clone())
            .unwrap_or_default()
    }

    /// Replace everything under `node` with literal text.
    pub fn set_text_content(&self, node: NodeId, text: &str) -> Result<(), DomError> {
        self.replace_content(node, NodeContent::Text(text.to_string()))
    }

    /// Replace everything under `node` with trusted markup.
    pub fn set_inner_markup(&self, node: NodeId, markup: &str) -> Result<(), DomError> {
        self.replace_content(node, NodeContent::Markup(markup.to_string()))
    }

    pub fn content(&self, node: NodeId) -> Option<NodeContent> {
        rw_read(&self.nodes, SOURCE, "content")
            .get(node.0)
            .map(|data| data.content.clone())
    }

    /// Concatenated literal text of the subtree; markup is included verbatim.
    pub fn text_content(&self, node: NodeId) -> String {
        let nodes = rw_read(&self.nodes, SOURCE, "text_content");
        let mut buffer = String::new();
        collect_text(&nodes, node, &mut buffer);
        buffer
    }

    /// Serialize the children and content of `node`.
    pub fn inner_html(&self, node: NodeId) -> String {
        let nodes = rw_read(&self.nodes, SOURCE, "inner_html");
        let mut buffer = String::new();
        if let Some(data) = nodes.get(node.0) {
            serialize::write_inner(&nodes, data, &mut buffer);
        }
        buffer
    }

    /// Descendants of `root` (excluding `root`) in document order that match
    /// the predicate.
    pub fn query_all<F>(&self, root: NodeId, mut predicate: F) -> Vec<NodeId>
    where
        F: FnMut(&Document, NodeId) -> bool,
    {
        let order = self.descendants(root);
        order
            .into_iter()
            .filter(|node| predicate(self, *node))
            .collect()
    }

    /// Nearest node, starting at `node` itself and walking up, that matches.
    pub fn closest<F>(&self, node: NodeId, mut predicate: F) -> Option<NodeId>
    where
        F: FnMut(&Document, NodeId) -> bool,
    {
        let mut current = Some(node);
        while let Some(candidate) = current {
            if predicate(self, candidate) {
                return Some(candidate);
            }
            current = self.parent(candidate);
        }
        None
    }

    fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let nodes = rw_read(&self.nodes, SOURCE, "descendants");
        let mut order = Vec::new();
        let Some(data) = nodes.get(root.0) else {
            return order;
        };
        let mut stack: Vec<NodeId> = data.children.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            order.push(node);
            stack.extend(nodes[node.0].children.iter().rev().copied());
        }
        order
    }

    fn replace_content(&self, node: NodeId, content: NodeContent) -> Result<(), DomError> {
        let mut nodes = rw_write(&self.nodes, SOURCE, "replace_content");
        check(&nodes, node)?;
        let children = std::mem::take(&mut nodes[node.0].children);
        for child in children {
            nodes[child.0].parent = None;
        }
        nodes[node.0].content = content;
        Ok(())
    }
}

/// Keeps a node attached to the document body; detaches it on drop.
#[derive(Debug)]
pub struct AttachGuard {
    document: Arc<Document>,
    node: NodeId,
}

impl AttachGuard {
    pub fn node(&self) -> NodeId {
        self.node
    }
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        if let Err(err) = self.document.detach(self.node) {
            debug!(node = %self.node, error = %err, "Scoped node already gone");
        }
    }
}

fn check(nodes: &[NodeData], node: NodeId) -> Result<(), DomError> {
    if node.0 < nodes.len() {
        Ok(())
    } else {
        Err(DomError::UnknownNode(node))
    }
}

fn unlink(nodes: &mut [NodeData], node: NodeId) {
    if let Some(parent) = nodes[node.0].parent.take() {
        nodes[parent.0].children.retain(|child| *child != node);
    }
}

fn is_ancestor_or_self(nodes: &[NodeData], ancestor: NodeId, node: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(candidate) = current {
        if candidate == ancestor {
            return true;
        }
        current = nodes[candidate.0].parent;
    }
    false
}

fn collect_text(nodes: &[NodeData], node: NodeId, buffer: &mut String) {
    let Some(data) = nodes.get(node.0) else {
        return;
    };
    match &data.content {
        NodeContent::Empty => {}
        NodeContent::Text(text) | NodeContent::Markup(text) => buffer.push_str(text),
    }
    for child in &data.children {
        collect_text(nodes, *child, buffer);
    }
}
