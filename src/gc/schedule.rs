//! Sweep schedules.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Shortest delay between two ticks.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// When a sweep fires.
///
/// Cron expressions use the `cron` crate's syntax. That syntax starts with
/// a seconds field, so a classic five-field expression (`*/5 * * * *`) gets
/// `0` prepended and fires at second zero. Six- and seven-field expressions
/// are used as given. Day-of-week numbering follows the `cron` crate
/// (`1` = Sunday); names such as `Mon` are accepted in every form.
#[derive(Debug, Clone)]
pub struct GcSchedule {
    kind: ScheduleKind,
}

#[derive(Debug, Clone)]
enum ScheduleKind {
    Cron {
        expression: String,
        schedule: cron::Schedule,
    },
    Every(Duration),
}

impl GcSchedule {
    /// Parses a cron expression.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the expression does not have five
    /// to seven fields or does not parse.
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        let normalized = match expression.split_whitespace().count() {
            5 => format!("0 {expression}"),
            6 | 7 => expression.to_string(),
            n => {
                return Err(Error::InvalidInput(format!(
                    "cron expression '{expression}' has {n} fields, expected 5 to 7"
                )));
            },
        };
        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| {
            Error::InvalidInput(format!("invalid cron expression '{expression}': {e}"))
        })?;
        Ok(Self {
            kind: ScheduleKind::Cron {
                expression: expression.to_string(),
                schedule,
            },
        })
    }

    /// Fires every `interval`.
    #[must_use]
    pub fn every(interval: Duration) -> Self {
        Self {
            kind: ScheduleKind::Every(interval.max(MIN_DELAY)),
        }
    }

    /// Returns the next fire time after `after`, or `None` if the schedule
    /// has no future occurrence.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.kind {
            ScheduleKind::Cron { schedule, .. } => schedule.after(&after).next(),
            ScheduleKind::Every(interval) => {
                chrono::Duration::from_std(*interval)
                    .ok()
                    .and_then(|step| after.checked_add_signed(step))
            },
        }
    }

    /// Delay from now until the next fire time.
    #[must_use]
    pub fn next_delay(&self) -> Option<Duration> {
        match &self.kind {
            ScheduleKind::Every(interval) => Some(*interval),
            ScheduleKind::Cron { .. } => {
                let now = Utc::now();
                let next = self.next_after(now)?;
                Some((next - now).to_std().unwrap_or(MIN_DELAY).max(MIN_DELAY))
            },
        }
    }
}

impl FromStr for GcSchedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for GcSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ScheduleKind::Cron { expression, .. } => f.write_str(expression),
            ScheduleKind::Every(interval) => write!(f, "every {interval:?}"),
        }
    }
}
