// common/src/reporting.rs
use crate::config::ReportingConfig;
use sentry::types::Dsn;
use sentry::ClientInitGuard;
use std::error::Error;

/// Start the error-reporting client.
///
/// Returns `None` when no DSN is configured or the DSN does not parse; the
/// service then runs with local logging only. Keep the guard alive for the
/// life of the process so queued reports are flushed on exit.
pub fn init_reporting(
    config: &ReportingConfig,
    run_mode: &str,
    release: &'static str,
) -> Option<ClientInitGuard> {
    let raw = config.dsn.as_deref()?;
    let dsn = match raw.parse::<Dsn>() {
        Ok(dsn) => dsn,
        Err(e) => {
            tracing::warn!("Error reporting disabled, invalid DSN: {}", e);
            return None;
        }
    };

    let environment = config.environment.clone().unwrap_or_else(|| run_mode.to_string());
    let guard = sentry::init(sentry::ClientOptions {
        dsn: Some(dsn),
        release: Some(release.into()),
        environment: Some(environment.into()),
        sample_rate: config.sample_rate.clamp(0.0, 1.0),
        ..Default::default()
    });

    tracing::info!("Error reporting enabled for {}", release);
    Some(guard)
}

/// Report an error tagged with the component it came from.
///
/// `context` pairs are attached as extra data. A no-op when reporting was
/// never initialised.
pub fn report_error<E>(error: &E, component: &'static str, context: &[(&str, &str)])
where
    E: Error + ?Sized,
{
    sentry::with_scope(
        |scope| {
            scope.set_tag("component", component);
            for (key, value) in context {
                scope.set_extra(key, (*value).into());
            }
        },
        || sentry::capture_error(error),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("platform refused the connection")]
    struct Refused;

    #[test]
    fn test_report_carries_component_and_context() {
        let events = sentry::test::with_captured_events(|| {
            report_error(&Refused, "session_manager", &[("user_id", "user_1")]);
        });

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.tags.get("component").map(String::as_str), Some("session_manager"));
        assert_eq!(event.extra.get("user_id").and_then(|v| v.as_str()), Some("user_1"));
        assert_eq!(
            event.exception.values[0].value.as_deref(),
            Some("platform refused the connection")
        );
    }

    #[test]
    fn test_reporting_stays_off_without_a_usable_dsn() {
        let mut config = ReportingConfig::default();
        assert!(init_reporting(&config, "test", "common@0.0.0").is_none());

        config.dsn = Some("not a dsn".to_string());
        assert!(init_reporting(&config, "test", "common@0.0.0").is_none());
    }
}
