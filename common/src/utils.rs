// common/src/utils.rs
use crate::config::Config;
use crate::reporting::init_reporting;
use sentry::ClientInitGuard;
use sentry_tracing::EventFilter;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::FmtSubscriber;

/// Setup tracing for consistent logging across services.
///
/// Unknown levels fall back to INFO. Log events become breadcrumbs on error
/// reports; only explicit `report_error` calls create reports. Fails only
/// if a global subscriber is already installed.
pub fn setup_tracing(level: &str) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let level = Level::from_str(level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish()
        .with(sentry_tracing::layer().event_filter(|metadata| match metadata.level() {
            &Level::ERROR | &Level::WARN | &Level::INFO => EventFilter::Breadcrumb,
            _ => EventFilter::Ignore,
        }));

    tracing::subscriber::set_global_default(subscriber)
}

/// Install logging at the configured level, then start error reporting.
///
/// Configuration has to be loaded first so `log_level` is honoured
/// whichever source it came from.
pub fn init_observability(config: &Config, release: &'static str) -> Option<ClientInitGuard> {
    if let Err(e) = setup_tracing(&config.log_level) {
        eprintln!("Failed to set up tracing: {}", e);
    }
    init_reporting(&config.reporting, &config.run_mode, release)
}

/// Mask all but the last four characters of a secret for log output
pub fn redact(secret: &str) -> String {
    let visible: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("****{}", visible)
    }
}
