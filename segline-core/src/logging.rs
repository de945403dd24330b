use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

use crate::config::SegmentSettings;
use crate::errors::{Result, SegmentError};

/// Target used for lifecycle events forwarded to `tracing`.
pub const EVENTS_TARGET: &str = "segline::events";

/// Filter applied when `RUST_LOG` is unset. Lifecycle events are emitted at
/// debug level and stay hidden unless `trace_events` is on.
pub fn default_directives(level: &str, trace_events: bool) -> String {
    let events = if trace_events { "debug" } else { "off" };
    format!("{},{}={}", level, EVENTS_TARGET, events)
}

/// Initializes the default tracing subscriber for binaries embedding Segline.
pub fn init_tracing(level: Option<&str>) -> Result<()> {
    install(default_directives(level.unwrap_or("info"), false))
}

/// Same as [`init_tracing`] with level and event tracing taken from settings.
pub fn init_tracing_for(settings: &SegmentSettings) -> Result<()> {
    install(default_directives(&settings.log_level, settings.trace_events))
}

fn install(directives: String) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(atty::is(atty::Stream::Stdout))
        .try_init()
        .map_err(|err| SegmentError::Config(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_events_are_hidden_by_default() {
        assert_eq!(default_directives("info", false), "info,segline::events=off");
        assert_eq!(default_directives("warn", true), "warn,segline::events=debug");
    }

    #[test]
    fn directives_parse_as_a_filter() {
        let settings = SegmentSettings::default();
        let directives = default_directives(&settings.log_level, settings.trace_events);
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
