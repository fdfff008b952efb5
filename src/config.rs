//! Configuration types.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default silence threshold before a nudge is generated.
pub const DEFAULT_NUDGE_AFTER_SILENT_HOURS: u32 = 72;

/// Process-wide database location, used when no override is configured.
pub const DB_PATH_ENV: &str = "SOVEREIGN_DB_PATH";

const DEFAULT_DB_PATH: &str = "./data/sovereign.db";

/// Filter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterConfig {
    /// When false every message is delivered immediately and nothing is touched.
    pub enabled: bool,
    /// When batched messages go out. Stored here, executed by the host scheduler.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_schedule: Option<BatchSchedule>,
    /// Silence threshold for relationship nudges.
    pub nudge_after_silent_hours: u32,
    /// Registry database override. Falls back to `SOVEREIGN_DB_PATH`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_schedule: None,
            nudge_after_silent_hours: DEFAULT_NUDGE_AFTER_SILENT_HOURS,
            database_path: None,
        }
    }
}

impl FilterConfig {
    /// Build from `SOVEREIGN_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (used by `from_env` and tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("SOVEREIGN_FILTER_ENABLED") {
            config.enabled = parse_bool("SOVEREIGN_FILTER_ENABLED", &raw)?;
        }

        if let Some(raw) = lookup("SOVEREIGN_BATCH_SCHEDULE") {
            if !raw.trim().is_empty() {
                config.batch_schedule = Some(raw.parse()?);
            }
        }

        if let Some(raw) = lookup("SOVEREIGN_NUDGE_AFTER_SILENT_HOURS") {
            config.nudge_after_silent_hours = raw.trim().parse().map_err(|e| {
                ConfigError::InvalidValue {
                    key: "SOVEREIGN_NUDGE_AFTER_SILENT_HOURS".into(),
                    message: format!("{e}"),
                }
            })?;
        }

        if let Some(raw) = lookup("SOVEREIGN_DATABASE_PATH") {
            if !raw.trim().is_empty() {
                config.database_path = Some(PathBuf::from(raw));
            }
        }

        Ok(config)
    }

    /// Where the registry lives: explicit override, then `SOVEREIGN_DB_PATH`, then default.
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            std::env::var(DB_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH))
        })
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

/// A cron expression for batch delivery.
///
/// Validated on construction, kept verbatim. Both classic 5-field and
/// seconds-first 6/7-field expressions are accepted.
#[derive(Clone)]
pub struct BatchSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl BatchSchedule {
    /// The expression exactly as configured.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Next fire time strictly after `after`. A preview for the host scheduler.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

impl FromStr for BatchSchedule {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expression = s.trim().to_string();
        // The cron crate wants a leading seconds field.
        let with_seconds = if expression.split_whitespace().count() == 5 {
            format!("0 {expression}")
        } else {
            expression.clone()
        };

        let schedule =
            cron::Schedule::from_str(&with_seconds).map_err(|e| ConfigError::InvalidSchedule {
                expression: expression.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            expression,
            schedule,
        })
    }
}

impl fmt::Debug for BatchSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BatchSchedule").field(&self.expression).finish()
    }
}

impl fmt::Display for BatchSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl PartialEq for BatchSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Serialize for BatchSchedule {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.expression)
    }
}

impl<'de> Deserialize<'de> for BatchSchedule {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
