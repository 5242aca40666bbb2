//! Cron expressions.
//!
//! Accepts classic 5-field crontab syntax (`min hour dom month dow`) and the
//! 6/7-field form with a leading seconds field and optional trailing year.
//! All schedules are evaluated in UTC.
//!
//! In 5-field input, numeric days of week follow crontab (`0` and `7` are
//! Sunday). Numeric lists, ranges and steps are expanded to an explicit list
//! of day names before parsing, since the underlying parser numbers days
//! from 1.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CronError {
    #[error("cron expression is empty")]
    Empty,

    #[error("cron expression must have 5, 6 or 7 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid cron expression {expression:?}: {reason}")]
    Invalid { expression: String, reason: String },
}

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: ::cron::Schedule,
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expression).finish()
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl FromStr for CronSchedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(CronError::Empty);
        }

        let fields: Vec<&str> = expression.split_whitespace().collect();
        let normalized = match fields.len() {
            5 => {
                let dow = translate_day_of_week(fields[4]).ok_or_else(|| CronError::Invalid {
                    expression: expression.to_string(),
                    reason: format!("bad day-of-week field {:?}", fields[4]),
                })?;
                format!("0 {} {} {} {} {}", fields[0], fields[1], fields[2], fields[3], dow)
            }
            6 | 7 => fields.join(" "),
            n => return Err(CronError::FieldCount(n)),
        };

        let schedule = ::cron::Schedule::from_str(&normalized).map_err(|e| CronError::Invalid {
            expression: expression.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    /// The expression as written by the user.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First occurrence strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// The next `count` occurrences strictly after `after`.
    pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&after).take(count).collect()
    }

    /// Occurrences strictly after `after`, in order.
    pub fn iter_after(&self, after: DateTime<Utc>) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.schedule.after(&after)
    }
}

/// Rewrite crontab day-of-week numbers (0-7, Sunday at both ends) to names.
/// Parts already written with names are passed through.
fn translate_day_of_week(field: &str) -> Option<String> {
    if field == "*" || field == "?" {
        return Some(field.to_string());
    }

    let mut days = [false; 7];
    let mut named = Vec::new();
    for part in field.split(',') {
        if part.chars().any(|c| c.is_ascii_alphabetic()) {
            named.push(part);
        } else {
            for day in expand_dow_part(part)? {
                days[day] = true;
            }
        }
    }

    let mut out: Vec<&str> = DAY_NAMES
        .iter()
        .zip(days)
        .filter_map(|(name, set)| set.then_some(*name))
        .collect();
    out.extend(named);
    if out.is_empty() {
        return None;
    }
    Some(out.join(","))
}

/// Days (0 = Sunday) selected by one numeric list element: `n`, `a-b`,
/// `*/s`, `a-b/s` or `n/s`. A range may wrap past Saturday (`6-0`).
fn expand_dow_part(part: &str) -> Option<Vec<usize>> {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => (range, Some(step.parse::<usize>().ok().filter(|s| *s > 0)?)),
        None => (part, None),
    };

    let (start, end) = if range == "*" || range == "?" {
        (0, 6)
    } else if let Some((start, end)) = range.split_once('-') {
        let (start, end) = (dow_number(start)?, dow_number(end)?);
        if start <= end {
            (start, end)
        } else {
            (start, end + 7)
        }
    } else {
        let day = dow_number(range)?;
        // "n/s" steps from n through the end of the week
        (day, if step.is_some() { day.max(6) } else { day })
    };

    Some(
        (start..=end)
            .step_by(step.unwrap_or(1))
            .map(|day| day % 7)
            .collect(),
    )
}

fn dow_number(value: &str) -> Option<usize> {
    value.parse::<usize>().ok().filter(|n| *n <= 7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_five_field_every_fifteen_minutes() {
        let cron = CronSchedule::parse("*/15 * * * *").unwrap();
        let next = cron.upcoming(at(2026, 3, 2, 10, 7), 3);
        assert_eq!(
            next,
            vec![at(2026, 3, 2, 10, 15), at(2026, 3, 2, 10, 30), at(2026, 3, 2, 10, 45)]
        );
    }

    #[test]
    fn test_next_after_is_strict() {
        let cron = CronSchedule::parse("0 9 * * *").unwrap();
        let nine = at(2026, 3, 2, 9, 0);
        assert_eq!(cron.next_after(nine), Some(at(2026, 3, 3, 9, 0)));
    }

    #[test]
    fn test_numeric_sunday_is_zero_or_seven() {
        // 2026-03-01 is a Sunday
        let after = at(2026, 2, 26, 0, 0);
        for expr in ["0 8 * * 0", "0 8 * * 7"] {
            let next = CronSchedule::parse(expr).unwrap().next_after(after).unwrap();
            assert_eq!(next.weekday(), Weekday::Sun, "{}", expr);
            assert_eq!(next, at(2026, 3, 1, 8, 0));
        }
    }

    #[test]
    fn test_weekday_range() {
        let cron = CronSchedule::parse("30 7 * * 1-5").unwrap();
        let days: Vec<Weekday> = cron
            .upcoming(at(2026, 2, 28, 0, 0), 5)
            .iter()
            .map(|t| t.weekday())
            .collect();
        assert_eq!(
            days,
            vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri]
        );
    }

    #[test]
    fn test_range_ending_on_seven_includes_sunday() {
        let cron = CronSchedule::parse("0 12 * * 5-7").unwrap();
        let days: Vec<Weekday> = cron
            .upcoming(at(2026, 3, 2, 0, 0), 3)
            .iter()
            .map(|t| t.weekday())
            .collect();
        assert_eq!(days, vec![Weekday::Fri, Weekday::Sat, Weekday::Sun]);
    }

    fn weekdays(expr: &str, count: usize) -> Vec<Weekday> {
        // 2026-03-01 is a Sunday
        CronSchedule::parse(expr)
            .unwrap()
            .upcoming(at(2026, 2, 28, 23, 0), count)
            .iter()
            .map(|t| t.weekday())
            .collect()
    }

    #[test]
    fn test_zero_to_seven_is_every_day() {
        assert_eq!(
            weekdays("0 9 * * 0-7", 7),
            vec![
                Weekday::Sun,
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat
            ]
        );
    }

    #[test]
    fn test_stepped_day_of_week() {
        assert_eq!(
            weekdays("0 9 * * 1-7/2", 4),
            vec![Weekday::Sun, Weekday::Mon, Weekday::Wed, Weekday::Fri]
        );
        assert_eq!(
            weekdays("0 9 * * */2", 4),
            vec![Weekday::Sun, Weekday::Tue, Weekday::Thu, Weekday::Sat]
        );
    }

    #[test]
    fn test_wrapping_day_of_week_range() {
        assert_eq!(
            weekdays("0 9 * * 6-0", 3),
            vec![Weekday::Sun, Weekday::Sat, Weekday::Sun]
        );
    }

    #[test]
    fn test_named_and_listed_days() {
        assert_eq!(
            weekdays("0 9 * * Mon-Wed", 3),
            vec![Weekday::Mon, Weekday::Tue, Weekday::Wed]
        );
        assert_eq!(weekdays("0 9 * * 3,0", 2), vec![Weekday::Sun, Weekday::Wed]);
    }

    #[test]
    fn test_six_field_with_seconds() {
        let cron = CronSchedule::parse("30 * * * * *").unwrap();
        let next = cron.next_after(at(2026, 3, 2, 10, 0)).unwrap();
        assert_eq!(next.second(), 30);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn test_rejects_bad_expressions() {
        assert!(matches!(CronSchedule::parse("  "), Err(CronError::Empty)));
        assert!(matches!(
            CronSchedule::parse("* * *"),
            Err(CronError::FieldCount(3))
        ));
        assert!(matches!(
            CronSchedule::parse("61 * * * *"),
            Err(CronError::Invalid { .. })
        ));
        assert!(matches!(
            CronSchedule::parse("0 0 * * 9"),
            Err(CronError::Invalid { .. })
        ));
        assert!(matches!(
            CronSchedule::parse("0 0 * * 1-5/0"),
            Err(CronError::Invalid { .. })
        ));
    }

    #[test]
    fn test_keeps_original_expression() {
        let cron: CronSchedule = "0 9 * * 1".parse().unwrap();
        assert_eq!(cron.to_string(), "0 9 * * 1");
    }
}
