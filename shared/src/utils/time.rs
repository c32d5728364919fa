//! Time-related utilities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp format used for `created_at` columns
pub const STORAGE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How viewers print record timestamps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeDisplay {
    #[default]
    Relative,
    Absolute,
}

impl TimeDisplay {
    pub fn toggled(self) -> Self {
        match self {
            TimeDisplay::Relative => TimeDisplay::Absolute,
            TimeDisplay::Absolute => TimeDisplay::Relative,
        }
    }

    pub fn format(self, ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
        match self {
            TimeDisplay::Relative => format_relative(ts, now),
            TimeDisplay::Absolute => ts.format(STORAGE_TIMESTAMP_FORMAT).to_string(),
        }
    }
}

impl std::str::FromStr for TimeDisplay {
    type Err = crate::SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "relative" => Ok(TimeDisplay::Relative),
            "absolute" => Ok(TimeDisplay::Absolute),
            other => Err(crate::SharedError::InvalidTimeDisplay(other.to_string())),
        }
    }
}

/// "just now", "5 seconds ago", "2 minutes ago", "3 hours ago", "4 days ago"
pub fn format_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - ts).num_seconds();
    if secs < 1 {
        return "just now".to_string();
    }

    let (value, unit) = if secs < 60 {
        (secs, "second")
    } else if secs < 3600 {
        (secs / 60, "minute")
    } else if secs < 86_400 {
        (secs / 3600, "hour")
    } else {
        (secs / 86_400, "day")
    };

    if value == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", value, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_relative() {
        let now = Utc::now();
        assert_eq!(format_relative(now, now), "just now");
        assert_eq!(format_relative(now - Duration::seconds(5), now), "5 seconds ago");
        assert_eq!(format_relative(now - Duration::seconds(60), now), "1 minute ago");
        assert_eq!(format_relative(now - Duration::minutes(150), now), "2 hours ago");
        assert_eq!(format_relative(now - Duration::days(3), now), "3 days ago");
    }

    #[test]
    fn test_future_timestamps_read_as_now() {
        let now = Utc::now();
        assert_eq!(format_relative(now + Duration::seconds(30), now), "just now");
    }

    #[test]
    fn test_toggle() {
        assert_eq!(TimeDisplay::Relative.toggled(), TimeDisplay::Absolute);
        assert_eq!("absolute".parse::<TimeDisplay>().unwrap(), TimeDisplay::Absolute);
    }
}
