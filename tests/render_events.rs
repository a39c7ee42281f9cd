mod support;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use typeset_manager::application::render::{
    BatchEvent, BatchProgress, ContainerOptions, RENDER_ERROR_CLASS, RenderError,
};

use support::{ScriptedBackend, attach, container, ready_manager, smart_marker};

#[tokio::test]
async fn event_stream_reports_each_completion_then_finishes() {
    let backend = Arc::new(ScriptedBackend::with_delay(Duration::from_millis(2)));
    let manager = ready_manager(backend).await;
    let document = Arc::clone(manager.document());
    let root = container(&document);
    for formula in ["$a$", "$b$", "$c$"] {
        smart_marker(&document, root, formula);
    }
    let _attached = attach(&document, root);

    let events: Vec<BatchEvent> = manager
        .render_container_events(root, ContainerOptions::default())
        .collect()
        .await;

    let progress: Vec<BatchProgress> = events
        .iter()
        .filter_map(|event| match event {
            BatchEvent::Progress(progress) => Some(*progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 3);
    assert_eq!(
        progress.iter().map(|p| p.completed).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(progress.iter().all(|p| p.total == 3));

    match events.last() {
        Some(BatchEvent::Finished(stats)) => {
            assert_eq!(stats.total, 3);
            assert_eq!(stats.successful, 3);
        }
        other => panic!("expected a final Finished event, got {other:?}"),
    }
}

#[tokio::test]
async fn event_stream_surfaces_precondition_failures() {
    let backend = Arc::new(ScriptedBackend::new());
    let manager = ready_manager(backend).await;
    let document = manager.document();
    let root = container(document);
    smart_marker(document, root, "$x$");

    let events: Vec<BatchEvent> = manager
        .render_container_events(root, ContainerOptions::default())
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        BatchEvent::Failed(RenderError::DetachedContainer { .. })
    ));
}

#[tokio::test]
async fn progress_sender_receives_every_completion() {
    let backend = Arc::new(ScriptedBackend::new());
    let manager = ready_manager(backend).await;
    let document = Arc::clone(manager.document());
    let root = container(&document);
    smart_marker(&document, root, "$x$");
    smart_marker(&document, root, "$x$");
    let _attached = attach(&document, root);

    let (tx, mut rx) = mpsc::unbounded_channel();
    manager
        .render_container(root, ContainerOptions::default().with_progress(tx))
        .await
        .expect("container renders");

    let mut seen = Vec::new();
    while let Some(progress) = rx.recv().await {
        seen.push(progress);
    }
    assert_eq!(
        seen,
        vec![
            BatchProgress {
                completed: 1,
                total: 2
            },
            BatchProgress {
                completed: 2,
                total: 2
            },
        ]
    );
}

#[tokio::test]
async fn empty_container_finishes_without_backend_calls() {
    let backend = Arc::new(ScriptedBackend::new());
    let manager = ready_manager(backend.clone()).await;
    let document = Arc::clone(manager.document());
    let root = container(&document);
    smart_marker(&document, root, "");
    let _attached = attach(&document, root);

    let stats = manager
        .render_container(root, ContainerOptions::default())
        .await
        .expect("container renders");

    assert_eq!(stats.total, 0);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn watchdog_forces_plain_text_when_backend_hangs() {
    let backend = Arc::new(ScriptedBackend::hanging());
    let manager = ready_manager(backend).await;
    let document = Arc::clone(manager.document());
    let root = container(&document);
    let first = smart_marker(&document, root, " $x+1$ ");
    let second = smart_marker(&document, root, "Plain words here");
    let _attached = attach(&document, root);

    let stats = manager
        .render_container_with_watchdog(
            root,
            ContainerOptions::default(),
            Some(Duration::from_millis(50)),
        )
        .await
        .expect("watchdog reports instead of erroring");

    assert!(stats.timed_out);
    assert_eq!(stats.total, 2);
    assert_eq!(stats.forced_text, 2);
    assert_eq!(document.text_content(first), "$x+1$");
    assert_eq!(document.text_content(second), "Plain words here");
    for node in [first, second] {
        assert!(document.has_class(node, RENDER_ERROR_CLASS));
        assert!(document.has_class(node, "rendered-text"));
    }
}

#[tokio::test]
async fn watchdog_passes_through_a_normal_batch() {
    let backend = Arc::new(ScriptedBackend::new());
    let manager = ready_manager(backend).await;
    let document = Arc::clone(manager.document());
    let root = container(&document);
    let node = smart_marker(&document, root, "$z$");
    let _attached = attach(&document, root);

    let stats = manager
        .render_container_with_watchdog(root, ContainerOptions::default(), None)
        .await
        .expect("container renders");

    assert!(!stats.timed_out);
    assert_eq!(stats.successful, 1);
    assert!(!document.has_class(node, RENDER_ERROR_CLASS));
}
