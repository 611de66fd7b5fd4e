//! Rebuild policy settings and cron-based triggers.

use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Quiet period after the last file change before a rebuild starts
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5);

/// Freshness policy for one workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Rebuild after file changes settle
    pub index_on_save: bool,
    /// Recurring rebuild schedule (five or six cron fields)
    pub cron_schedule: Option<String>,
    /// Measure index size and build duration after successful builds
    pub enable_performance_metrics: bool,
    /// Debounce window for file-change bursts
    pub debounce: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            index_on_save: true,
            cron_schedule: None,
            enable_performance_metrics: false,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("cron expression `{expression}` has {fields} field(s), expected 5 or 6")]
    FieldCount { expression: String, fields: usize },

    #[error("invalid cron expression `{expression}`: {message}")]
    Parse { expression: String, message: String },
}

/// A parsed cron schedule plus the last fire time handed out.
///
/// Five-field expressions (minute hour day month weekday) are run at second
/// zero; six-field expressions carry a leading seconds field.
#[derive(Debug, Clone)]
pub struct CronTrigger {
    expression: String,
    schedule: cron::Schedule,
    cursor: DateTime<Utc>,
}

impl CronTrigger {
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        Self::parse_at(expression, Utc::now())
    }

    /// Parse with an explicit starting point for the first fire time
    pub fn parse_at(expression: &str, now: DateTime<Utc>) -> Result<Self, ScheduleError> {
        let trimmed = expression.trim();
        let fields = trimmed.split_whitespace().count();
        let normalized = match fields {
            5 => format!("0 {}", trimmed),
            6 => trimmed.to_string(),
            _ => {
                return Err(ScheduleError::FieldCount {
                    expression: trimmed.to_string(),
                    fields,
                })
            }
        };

        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| ScheduleError::Parse {
            expression: trimmed.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
            cursor: now,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Advance to the next fire time strictly after the previous one (or
    /// after `now`, whichever is later). Returns the fire time and how long to
    /// wait for it, or `None` if the schedule has no future occurrence.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, Duration)> {
        let base = self.cursor.max(now);
        let next = self.schedule.after(&base).next()?;
        let wait = (next - base).to_std().unwrap_or(Duration::ZERO);
        self.cursor = next;
        Some((next, wait))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, s).unwrap()
    }

    #[test]
    fn test_wrong_field_count_rejected() {
        let err = CronTrigger::parse("* * * *").unwrap_err();
        assert_eq!(
            err,
            ScheduleError::FieldCount {
                expression: "* * * *".to_string(),
                fields: 4
            }
        );
        assert!(CronTrigger::parse("").is_err());
        assert!(CronTrigger::parse("0 0 0 * * * 2030 extra").is_err());
    }

    #[test]
    fn test_garbage_fields_rejected() {
        assert!(matches!(
            CronTrigger::parse("61 * * * *"),
            Err(ScheduleError::Parse { .. })
        ));
        assert!(matches!(
            CronTrigger::parse("a b c d e"),
            Err(ScheduleError::Parse { .. })
        ));
    }

    #[test]
    fn test_five_field_runs_at_second_zero() {
        let mut trigger = CronTrigger::parse_at("*/15 * * * *", at(10, 7, 30)).unwrap();
        let (next, wait) = trigger.advance(at(10, 7, 30)).unwrap();
        assert_eq!(next, at(10, 15, 0));
        assert_eq!(wait, Duration::from_secs(7 * 60 + 30));
    }

    #[test]
    fn test_six_field_with_seconds() {
        let mut trigger = CronTrigger::parse_at("*/10 * * * * *", at(10, 0, 1)).unwrap();
        let (next, wait) = trigger.advance(at(10, 0, 1)).unwrap();
        assert_eq!(next, at(10, 0, 10));
        assert_eq!(wait, Duration::from_secs(9));
    }

    #[test]
    fn test_advance_never_repeats_a_fire_time() {
        let start = at(9, 0, 0);
        let mut trigger = CronTrigger::parse_at("* * * * * *", start).unwrap();
        let (first, _) = trigger.advance(start).unwrap();
        // Clock has not moved past the first fire time yet
        let (second, wait) = trigger.advance(start).unwrap();
        assert!(second > first);
        assert_eq!(wait, Duration::from_secs(1));
    }

    #[test]
    fn test_expression_is_trimmed() {
        let trigger = CronTrigger::parse("  0 3 * * *  ").unwrap();
        assert_eq!(trigger.expression(), "0 3 * * *");
    }

    #[test]
    fn test_default_schedule_config() {
        let config = ScheduleConfig::default();
        assert!(config.index_on_save);
        assert!(config.cron_schedule.is_none());
        assert!(!config.enable_performance_metrics);
        assert_eq!(config.debounce, Duration::from_secs(5));
    }
}
