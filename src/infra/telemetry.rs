use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};
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
            "blogers_sign_in_total",
            Unit::Count,
            "Sign-in reconciliations, labelled by outcome."
        );
        describe_counter!(
            "blogers_session_hydration_failures_total",
            Unit::Count,
            "Session reads whose author lookup or post count failed."
        );
        describe_counter!(
            "blogers_page_cache_hit_total",
            Unit::Count,
            "Public pages served from the regeneration cache."
        );
        describe_counter!(
            "blogers_page_cache_miss_total",
            Unit::Count,
            "Public pages rendered because no fresh cached copy existed."
        );
        describe_counter!(
            "blogers_page_cache_invalidation_total",
            Unit::Count,
            "Page cache flushes triggered by content writes."
        );
        describe_gauge!(
            "blogers_page_cache_entries",
            Unit::Count,
            "Pages currently held in the regeneration cache."
        );
    });
}
