use std::{fs, process, sync::Arc};

use futures::StreamExt;
use serde_json::Value;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use typeset_manager::{
    application::render::{
        BatchEvent, ContainerOptions, DATA_CONTENT, DATA_FIELD, RenderManager,
        RenderManagerConfig, SMART_CONTENT_CLASS,
    },
    config,
    dom::{Document, NodeId},
    domain::FieldId,
    infra::{error::InfraError, katex::KatexBackend, telemetry},
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_error(&error);
        process::exit(1);
    }
}

fn report_error(error: &InfraError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "typeset_dump failed");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "typeset_dump failed");
    });
}

async fn run() -> Result<(), InfraError> {
    let (cli, settings) = config::load_with_cli().map_err(|err| {
        InfraError::configuration(format!("failed to load configuration: {err}"))
    })?;
    telemetry::init(&settings.logging)?;

    let solution: Value = serde_json::from_str(&fs::read_to_string(&cli.solution)?)?;

    let document = Document::shared();
    let manager = RenderManager::create(
        Arc::clone(&document),
        Arc::new(KatexBackend::new()),
        RenderManagerConfig::from(&settings),
    )?;
    manager.initialize().await?;
    manager.set_solution_metadata(&solution)?;

    let container = build_container(&document, &collect_fields(&solution))?;
    let _attached = document.attach_scoped(container)?;

    let mut events = Box::pin(manager.render_container_events(container, ContainerOptions::default()));
    let mut summary = None;
    while let Some(event) = events.next().await {
        match event {
            BatchEvent::Progress(progress) => {
                info!(
                    completed = progress.completed,
                    total = progress.total,
                    "Render progress"
                );
            }
            BatchEvent::Finished(stats) => summary = Some(stats),
            BatchEvent::Failed(err) => return Err(err.into()),
        }
    }

    println!("{}", document.inner_html(container));
    if cli.stats {
        if let Some(stats) = summary {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        println!("{}", serde_json::to_string_pretty(&manager.stats())?);
    }
    Ok(())
}

/// Every string (or list of strings) stored under a known field name,
/// anywhere in the solution.
fn collect_fields(value: &Value) -> Vec<(FieldId, String)> {
    let mut fields = Vec::new();
    walk(value, &mut fields);
    fields
}

fn walk(value: &Value, fields: &mut Vec<(FieldId, String)>) {
    match value {
        Value::Object(map) => {
            for (name, child) in map {
                if name == "renderMetadata" {
                    continue;
                }
                match (name.parse::<FieldId>(), child) {
                    (Ok(field), Value::String(text)) => fields.push((field, text.clone())),
                    (Ok(field), Value::Array(items)) => fields.extend(
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|text| (field, text.to_string())),
                    ),
                    _ => walk(child, fields),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| walk(item, fields)),
        _ => {}
    }
}

fn build_container(
    document: &Document,
    fields: &[(FieldId, String)],
) -> Result<NodeId, InfraError> {
    let container = document.create_element("div");
    for (field, text) in fields {
        let node = document.create_element("div");
        document.append_child(container, node)?;
        document.add_class(node, SMART_CONTENT_CLASS)?;
        document.set_attribute(node, DATA_CONTENT, text)?;
        document.set_attribute(node, DATA_FIELD, field.wire_name())?;
    }
    Ok(container)
}
