//! Fixed time windows and their bucket labels

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of a fixed rate-limit window.
///
/// Buckets are aligned to the UTC calendar: a minute window covers
/// `12:04:00..12:05:00`, not the sixty seconds after the first call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    /// One second
    Second,
    /// One minute
    Minute,
    /// One hour
    Hour,
    /// One UTC day
    Day,
}

impl Window {
    /// Window length
    #[must_use]
    pub const fn duration(self) -> Duration {
        match self {
            Self::Second => Duration::from_secs(1),
            Self::Minute => Duration::from_secs(60),
            Self::Hour => Duration::from_secs(3_600),
            Self::Day => Duration::from_secs(86_400),
        }
    }

    /// Name used in keys and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    /// Label of the bucket containing `now`
    #[must_use]
    pub fn label(self, now: DateTime<Utc>) -> String {
        let pattern = match self {
            Self::Second => "%Y%m%d%H%M%S",
            Self::Minute => "%Y%m%d%H%M",
            Self::Hour => "%Y%m%d%H",
            Self::Day => "%Y%m%d",
        };
        format!("{}:{}", self.as_str(), now.format(pattern))
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
