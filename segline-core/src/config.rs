use std::env;
use std::fmt;
use std::str::FromStr;

use crate::errors::{ConfigError, SegmentError};

/// What happens to segments pointing at a segment that is hard deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreviousOnDelete {
    /// Delete the pointing segment as well.
    Cascade,
    /// Refuse the delete.
    Protect,
    /// Clear the pointer; relationship repair relinks afterwards.
    SetNull,
    /// Leave the pointer dangling.
    DoNothing,
}

impl Default for PreviousOnDelete {
    fn default() -> Self {
        PreviousOnDelete::SetNull
    }
}

impl PreviousOnDelete {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreviousOnDelete::Cascade => "cascade",
            PreviousOnDelete::Protect => "protect",
            PreviousOnDelete::SetNull => "set_null",
            PreviousOnDelete::DoNothing => "do_nothing",
        }
    }
}

impl fmt::Display for PreviousOnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreviousOnDelete {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().replace('-', "_").as_str() {
            "cascade" => Ok(PreviousOnDelete::Cascade),
            "protect" => Ok(PreviousOnDelete::Protect),
            "set_null" | "null" => Ok(PreviousOnDelete::SetNull),
            "do_nothing" | "nothing" => Ok(PreviousOnDelete::DoNothing),
            other => Err(ConfigError::InvalidEnvVar {
                key: "PREVIOUS_ON_DELETE".into(),
                value: other.to_string(),
            }),
        }
    }
}

/// Global defaults applied to every span and segment model that does not
/// override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSettings {
    pub allow_span_gaps: bool,
    pub allow_segment_gaps: bool,
    pub soft_delete: bool,
    pub previous_on_delete: PreviousOnDelete,
    pub database_url: Option<String>,
    /// Upper bound of the Postgres pool.
    pub max_connections: u32,
    /// Default level for [`crate::logging::init_tracing_for`].
    pub log_level: String,
    /// Show every lifecycle event in the log.
    pub trace_events: bool,
}

impl Default for SegmentSettings {
    fn default() -> Self {
        Self {
            allow_span_gaps: true,
            allow_segment_gaps: true,
            soft_delete: true,
            previous_on_delete: PreviousOnDelete::default(),
            database_url: None,
            max_connections: 5,
            log_level: "info".into(),
            trace_events: false,
        }
    }
}

impl SegmentSettings {
    /// Loads settings from the process environment (`SEGLINE_*`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_with_prefix("SEGLINE_")
    }

    /// Loads settings from env vars prefixed with the provided value (e.g. `BILLING_`).
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let key = |suffix: &str| format!("{}{}", prefix, suffix);
        let defaults = Self::default();

        let allow_span_gaps = read_bool(&key("ALLOW_SPAN_GAPS"), defaults.allow_span_gaps)?;
        let allow_segment_gaps =
            read_bool(&key("ALLOW_SEGMENT_GAPS"), defaults.allow_segment_gaps)?;
        let soft_delete = read_bool(&key("SOFT_DELETE"), defaults.soft_delete)?;

        let previous_key = key("PREVIOUS_ON_DELETE");
        let previous_on_delete = match env::var(&previous_key) {
            Ok(raw) => raw.parse::<PreviousOnDelete>().map_err(|_| ConfigError::InvalidEnvVar {
                key: previous_key.clone(),
                value: raw,
            })?,
            Err(_) => defaults.previous_on_delete,
        };

        let database_url = env::var(key("DATABASE_URL")).ok();

        let connections_key = key("MAX_CONNECTIONS");
        let max_connections = match env::var(&connections_key) {
            Ok(raw) => match raw.trim().parse::<u32>() {
                Ok(value) if value > 0 => value,
                _ => {
                    return Err(ConfigError::InvalidEnvVar {
                        key: connections_key,
                        value: raw,
                    })
                }
            },
            Err(_) => defaults.max_connections,
        };
        let log_level = env::var(key("LOG_LEVEL")).unwrap_or(defaults.log_level);
        let trace_events = read_bool(&key("TRACE_EVENTS"), defaults.trace_events)?;

        Ok(Self {
            allow_span_gaps,
            allow_segment_gaps,
            soft_delete,
            previous_on_delete,
            database_url,
            max_connections,
            log_level,
            trace_events,
        })
    }

    /// Returns the database URL or fails when none was configured.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("SEGLINE_DATABASE_URL".into()))
    }
}

fn read_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidEnvVar {
            key: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Helper that loads settings and converts to the canonical Segline error type.
pub fn load_settings() -> Result<SegmentSettings, SegmentError> {
    Ok(SegmentSettings::from_env()?)
}
