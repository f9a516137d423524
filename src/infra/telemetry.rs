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

pub const ARTICLES_LOADED_TOTAL: &str = "lantern_articles_loaded_total";
pub const ARTICLES_REMOVED_TOTAL: &str = "lantern_articles_removed_total";
pub const ARTICLES_SKIPPED_TOTAL: &str = "lantern_articles_skipped_total";
pub const PUBLISH_ATTEMPTS_TOTAL: &str = "lantern_publish_attempts_total";
pub const PUBLISH_FAILURES_TOTAL: &str = "lantern_publish_failures_total";
pub const INDEXED_ARTICLES: &str = "lantern_indexed_articles";

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
            ARTICLES_LOADED_TOTAL,
            Unit::Count,
            "Article sources extracted and written to the content index."
        );
        describe_counter!(
            ARTICLES_REMOVED_TOTAL,
            Unit::Count,
            "Index entries removed because their source file disappeared."
        );
        describe_counter!(
            ARTICLES_SKIPPED_TOTAL,
            Unit::Count,
            "Article sources that failed extraction and were skipped."
        );
        describe_counter!(
            PUBLISH_ATTEMPTS_TOTAL,
            Unit::Count,
            "Relay publications started."
        );
        describe_counter!(
            PUBLISH_FAILURES_TOTAL,
            Unit::Count,
            "Relay publications that no relay accepted."
        );
        describe_gauge!(
            INDEXED_ARTICLES,
            Unit::Count,
            "Articles currently held in the content index."
        );
    });
}
