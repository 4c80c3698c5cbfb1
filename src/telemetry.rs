use crate::config::ObservabilityConfig;
use tracing_subscriber::{fmt, fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber, logging to stdout.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(config: &ObservabilityConfig) {
    init_tracing_with(config, std::io::stdout);
}

/// Same as [`init_tracing`] with a custom writer
pub fn init_tracing_with<W>(config: &ObservabilityConfig, writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "water_quality_monitor={level},wq_server={level},wq_cli={level},tower_http={level}",
            level = config.log_level
        )
        .into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    // a subscriber may already be installed (tests, embedding)
    let _ = if config.json_logs {
        registry.with(fmt::layer().json().with_writer(writer)).try_init()
    } else {
        registry.with(fmt::layer().with_writer(writer)).try_init()
    };
}
