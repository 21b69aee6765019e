use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize structured logging.
///
/// Defaults to `info` level unless overridden by `WATCHWORD_LOG`.
pub fn init() {
    init_with_default("info");
}

/// Initialize logging with an explicit default directive (typically the
/// `log_level` field from [`crate::config::Config`]).
///
/// `WATCHWORD_LOG` still wins when set. Safe to call more than once.
pub fn init_with_default(default_directive: &str) {
    let filter = EnvFilter::builder()
        .with_env_var("WATCHWORD_LOG")
        .with_default_directive(
            default_directive
                .parse()
                .unwrap_or(tracing::level_filters::LevelFilter::INFO.into()),
        )
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init();
}
