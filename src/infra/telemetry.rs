use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "typeset_cache_hit_total",
            Unit::Count,
            "Total number of typeset cache hits."
        );
        describe_counter!(
            "typeset_cache_miss_total",
            Unit::Count,
            "Total number of typeset cache misses."
        );
        describe_counter!(
            "typeset_cache_trim_total",
            Unit::Count,
            "Total number of bulk cache trims due to capacity."
        );
        describe_counter!(
            "typeset_jobs_coalesced_total",
            Unit::Count,
            "Requests that joined an already queued or running job."
        );
        describe_counter!(
            "typeset_render_fallback_total",
            Unit::Count,
            "Renders that fell back to plain text after a backend failure."
        );
        describe_counter!(
            "typeset_verification_forced_total",
            Unit::Count,
            "Markers forced to plain text by the verification pass."
        );
        describe_histogram!(
            "typeset_render_ms",
            Unit::Milliseconds,
            "Backend render latency in milliseconds."
        );
    });
}
