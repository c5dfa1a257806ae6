//! Process-level setup for embedding applications.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Directives used when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVES: &str = "info,clinic_audit=debug,sqlx=warn,chromiumoxide=warn";

/// Initialize logging with tracing_subscriber.
///
/// `log` records emitted by the engine are bridged into the subscriber.
/// `RUST_LOG`, when set, fully decides the filter; otherwise the engine logs
/// at debug and sqlx/chromiumoxide are held at warn.
pub fn init_logging() {
    let filter = log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .with_target(false)
        .with_ansi(true)
        .try_init();
}

fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    let directives = rust_log
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_DIRECTIVES);

    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives)
}
