//! Five-field schedules and the interval shapes the scheduler offers.

use crate::error::{Result, SchedulerError};
use std::fmt;
use std::str::FromStr;

/// Check that `schedule` has exactly five fields of schedule syntax and
/// return it with single-space separators.
pub fn normalize_schedule(schedule: &str) -> Result<String> {
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(SchedulerError::InvalidSchedule(format!(
            "expected 5 fields, found {} in {:?}",
            fields.len(),
            schedule
        )));
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '*' | '/' | ',' | '-');
    if let Some(field) = fields.iter().find(|f| !f.chars().all(allowed)) {
        return Err(SchedulerError::InvalidSchedule(format!(
            "unexpected characters in field {:?}",
            field
        )));
    }

    Ok(fields.join(" "))
}

/// Recurrence shapes with a friendly form. Anything else is `Custom`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interval {
    Minutes(u32),
    Hours(u32),
    Days(u32),
    /// Weekday, 0 (Sunday) to 6 (Saturday), at midnight
    Weekly(u32),
    /// Every N months on the first day at midnight
    Monthly(u32),
    Custom(String),
}

impl Interval {
    /// Render as a five-field schedule, checking the value range
    pub fn to_schedule(&self) -> Result<String> {
        let check = |value: u32, min: u32, max: u32, what: &str| {
            if (min..=max).contains(&value) {
                Ok(value)
            } else {
                Err(SchedulerError::InvalidSchedule(format!(
                    "{} must be between {} and {}, got {}",
                    what, min, max, value
                )))
            }
        };

        match self {
            Self::Minutes(n) => Ok(format!("*/{} * * * *", check(*n, 1, 59, "minute interval")?)),
            Self::Hours(n) => Ok(format!("0 */{} * * *", check(*n, 1, 23, "hour interval")?)),
            Self::Days(n) => Ok(format!("0 0 */{} * *", check(*n, 1, 31, "day interval")?)),
            Self::Weekly(day) => Ok(format!("0 0 * * {}", check(*day, 0, 6, "weekday")?)),
            Self::Monthly(n) => Ok(format!("0 0 1 */{} *", check(*n, 1, 12, "month interval")?)),
            Self::Custom(schedule) => normalize_schedule(schedule),
        }
    }

    /// Recognize the friendly shapes in a five-field schedule
    pub fn from_schedule(schedule: &str) -> Self {
        let fields: Vec<&str> = schedule.split_whitespace().collect();
        let custom = || Self::Custom(fields.join(" "));
        let [minute, hour, day, month, weekday] = fields[..] else {
            return custom();
        };
        let every = |field: &str| field.strip_prefix("*/").and_then(|n| n.parse::<u32>().ok());

        match (minute, hour, day, month, weekday) {
            (m, "*", "*", "*", "*") if every(m).is_some() => every(m).map_or_else(custom, Self::Minutes),
            ("0", h, "*", "*", "*") if every(h).is_some() => every(h).map_or_else(custom, Self::Hours),
            ("0", "0", d, "*", "*") if every(d).is_some() => every(d).map_or_else(custom, Self::Days),
            ("0", "0", "*", "*", w) if w != "*" => w.parse().map_or_else(|_| custom(), Self::Weekly),
            ("0", "0", "1", m, "*") if every(m).is_some() => every(m).map_or_else(custom, Self::Monthly),
            _ => custom(),
        }
    }

    pub fn describe(&self) -> String {
        const WEEKDAYS: [&str; 7] = [
            "Sunday",
            "Monday",
            "Tuesday",
            "Wednesday",
            "Thursday",
            "Friday",
            "Saturday",
        ];

        match self {
            Self::Minutes(n) => format!("every {} minutes", n),
            Self::Hours(n) => format!("every {} hours", n),
            Self::Days(n) => format!("every {} days", n),
            Self::Weekly(day) => match WEEKDAYS.get(*day as usize) {
                Some(name) => format!("every {}", name),
                None => format!("weekly on day {}", day),
            },
            Self::Monthly(n) => format!("every {} months", n),
            Self::Custom(_) => "custom schedule".to_string(),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// `<kind>:<value>` as typed on the command line, e.g. `minutes:30`,
/// `weekly:0`, `monthly:2`
impl FromStr for Interval {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| SchedulerError::InvalidSchedule(format!("expected <kind>:<value>, got {:?}", s)))?;
        let value: u32 = value
            .trim()
            .parse()
            .map_err(|_| SchedulerError::InvalidSchedule(format!("not a number: {:?}", value)))?;

        let interval = match kind.trim().to_ascii_lowercase().as_str() {
            "minute" | "minutes" => Self::Minutes(value),
            "hour" | "hours" | "hourly" => Self::Hours(value),
            "day" | "days" | "daily" => Self::Days(value),
            "weekly" => Self::Weekly(value),
            "month" | "months" | "monthly" => Self::Monthly(value),
            other => {
                return Err(SchedulerError::InvalidSchedule(format!(
                    "unknown interval kind {:?}",
                    other
                )))
            }
        };
        interval.to_schedule()?;
        Ok(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_schedule() {
        assert_eq!(Interval::Minutes(15).to_schedule().unwrap(), "*/15 * * * *");
        assert_eq!(Interval::Hours(2).to_schedule().unwrap(), "0 */2 * * *");
        assert_eq!(Interval::Days(1).to_schedule().unwrap(), "0 0 */1 * *");
        assert_eq!(Interval::Weekly(0).to_schedule().unwrap(), "0 0 * * 0");
        assert_eq!(Interval::Monthly(3).to_schedule().unwrap(), "0 0 1 */3 *");
    }

    #[test]
    fn test_range_checks() {
        assert!(Interval::Minutes(0).to_schedule().is_err());
        assert!(Interval::Minutes(60).to_schedule().is_err());
        assert!(Interval::Hours(24).to_schedule().is_err());
        assert!(Interval::Weekly(7).to_schedule().is_err());
        assert!(Interval::Monthly(13).to_schedule().is_err());
    }

    #[test]
    fn test_from_schedule() {
        assert_eq!(Interval::from_schedule("*/5 * * * *"), Interval::Minutes(5));
        assert_eq!(Interval::from_schedule("0 */6 * * *"), Interval::Hours(6));
        assert_eq!(Interval::from_schedule("0 0 */2 * *"), Interval::Days(2));
        assert_eq!(Interval::from_schedule("0 0 * * 3"), Interval::Weekly(3));
        assert_eq!(Interval::from_schedule("0 0 1 */4 *"), Interval::Monthly(4));
        assert_eq!(
            Interval::from_schedule("30 4  * * 1-5"),
            Interval::Custom("30 4 * * 1-5".to_string())
        );
        assert_eq!(
            Interval::from_schedule("0 0 * * MON"),
            Interval::Custom("0 0 * * MON".to_string())
        );
    }

    #[test]
    fn test_describe() {
        assert_eq!(Interval::Weekly(0).describe(), "every Sunday");
        assert_eq!(Interval::Minutes(10).to_string(), "every 10 minutes");
        assert_eq!(Interval::Custom("1 2 3 4 5".into()).describe(), "custom schedule");
    }

    #[test]
    fn test_parse_cli_form() {
        assert_eq!("minutes:30".parse::<Interval>().unwrap(), Interval::Minutes(30));
        assert_eq!("daily:1".parse::<Interval>().unwrap(), Interval::Days(1));
        assert!("weekly:9".parse::<Interval>().is_err());
        assert!("yearly:1".parse::<Interval>().is_err());
        assert!("minutes".parse::<Interval>().is_err());
    }

    #[test]
    fn test_normalize_schedule() {
        assert_eq!(normalize_schedule(" 0  3 * * * ").unwrap(), "0 3 * * *");
        assert!(normalize_schedule("0 3 * *").is_err());
        assert!(normalize_schedule("0 3 * * * #").is_err());
    }
}
