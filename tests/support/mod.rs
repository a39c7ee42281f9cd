#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use typeset_manager::application::render::{
    BackendError, DATA_CONTENT, DATA_FIELD, DATA_LATEX, LATEX_CONTENT_CLASS, RenderManager,
    RenderManagerConfig, SMART_CONTENT_CLASS, TypesetBackend,
};
use typeset_manager::dom::{AttachGuard, Document, NodeId};

/// Backend double that records every call and how many overlapped.
#[derive(Default)]
pub struct ScriptedBackend {
    pub delay: Duration,
    pub fail_all: bool,
    pub hang: bool,
    init_calls: AtomicUsize,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    async fn typeset(&self, tex: &str, mode: &str) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("{mode}:{tex}"));

        if self.hang {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_all || tex.contains("\\fail") {
            return Err(BackendError::typeset(format!("cannot typeset {tex}")));
        }
        Ok(format!("<span class=\"katex\" data-mode=\"{mode}\">{tex}</span>"))
    }
}

#[async_trait]
impl TypesetBackend for ScriptedBackend {
    async fn initialize(&self) -> Result<(), BackendError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn typeset_inline(&self, tex: &str) -> Result<String, BackendError> {
        self.typeset(tex, "inline").await
    }

    async fn typeset_block(&self, tex: &str) -> Result<String, BackendError> {
        self.typeset(tex, "block").await
    }
}

pub fn test_config() -> RenderManagerConfig {
    RenderManagerConfig {
        verification_delay: Duration::from_millis(10),
        ..RenderManagerConfig::default()
    }
}

/// Manager over a fresh document, already initialized.
pub async fn ready_manager(backend: Arc<ScriptedBackend>) -> RenderManager {
    let manager = RenderManager::create(Document::shared(), backend, test_config())
        .expect("inside a runtime");
    manager.initialize().await.expect("backend initializes");
    manager
}

/// Detached container with no markers.
pub fn container(document: &Document) -> NodeId {
    document.create_element("div")
}

pub fn attach(document: &Arc<Document>, node: NodeId) -> AttachGuard {
    document.attach_scoped(node).expect("attach container")
}

pub fn smart_marker(document: &Document, parent: NodeId, content: &str) -> NodeId {
    let node = document.create_element("span");
    document.append_child(parent, node).expect("append marker");
    document.add_class(node, SMART_CONTENT_CLASS).expect("class");
    document.set_attribute(node, DATA_CONTENT, content).expect("content");
    node
}

pub fn field_marker(document: &Document, parent: NodeId, field: &str, content: &str) -> NodeId {
    let node = smart_marker(document, parent, content);
    document.set_attribute(node, DATA_FIELD, field).expect("field");
    node
}

pub fn latex_marker(document: &Document, parent: NodeId, latex: &str) -> NodeId {
    let node = document.create_element("div");
    document.append_child(parent, node).expect("append marker");
    document.add_class(node, LATEX_CONTENT_CLASS).expect("class");
    document.set_attribute(node, DATA_LATEX, latex).expect("latex");
    node
}
