//! Parses a `ScheduledTask`'s `scheduleType`/`scheduleExpression` into a
//! concrete trigger and computes its next fire time (spec §4.7).

use std::str::FromStr;

use chrono::TimeZone;
use cron::Schedule;

use crate::error::GatewayError;
use crate::model::{EpochMillis, ScheduleType};

pub enum Trigger {
    Cron { schedule: Schedule, timezone: chrono_tz::Tz },
    Interval { seconds: u64 },
    OneTime { at: EpochMillis },
}

impl Trigger {
    /// Validates and constructs a trigger from a `ScheduledTask`'s raw
    /// fields (spec §4.7 "Trigger construction").
    pub fn parse(
        schedule_type: ScheduleType,
        expression: &str,
        timezone: &str,
        orchestrator_delegated: bool,
    ) -> Result<Self, GatewayError> {
        match schedule_type {
            ScheduleType::Cron => {
                let schedule = Schedule::from_str(expression)
                    .map_err(|e| GatewayError::BadRequest(format!("invalid cron expression: {e}")))?;
                let tz: chrono_tz::Tz = timezone
                    .parse()
                    .map_err(|_| GatewayError::BadRequest(format!("unknown timezone: {timezone}")))?;
                Ok(Trigger::Cron { schedule, timezone: tz })
            }
            ScheduleType::Interval => {
                let seconds = parse_interval_seconds(expression)?;
                if orchestrator_delegated && seconds < 60 {
                    return Err(GatewayError::BadRequest(
                        "sub-minute intervals are not supported in orchestrator-delegated mode".to_string(),
                    ));
                }
                Ok(Trigger::Interval { seconds })
            }
            ScheduleType::OneTime => {
                let at = chrono::DateTime::parse_from_rfc3339(expression)
                    .map_err(|e| GatewayError::BadRequest(format!("invalid one-time datetime: {e}")))?;
                Ok(Trigger::OneTime {
                    at: EpochMillis(at.timestamp_millis()),
                })
            }
        }
    }

    /// The next fire time strictly after `now`, or `None` for a `one_time`
    /// trigger whose instant has already passed.
    pub fn next_fire_after(&self, now: EpochMillis) -> Option<EpochMillis> {
        match self {
            Trigger::Cron { schedule, timezone } => {
                let now_tz = timezone.timestamp_millis_opt(now.0).single()?;
                schedule.after(&now_tz).next().map(|dt| EpochMillis(dt.timestamp_millis()))
            }
            Trigger::Interval { seconds } => Some(EpochMillis(now.0 + (*seconds as i64) * 1000)),
            Trigger::OneTime { at } => {
                if at.0 > now.0 {
                    Some(*at)
                } else {
                    None
                }
            }
        }
    }
}

/// Parses `Ns|Nm|Nh|Nd` into seconds (spec §4.7).
fn parse_interval_seconds(expression: &str) -> Result<u64, GatewayError> {
    let expression = expression.trim();
    let (digits, unit) = expression.split_at(expression.len().saturating_sub(1));
    let amount: u64 = digits
        .parse()
        .map_err(|_| GatewayError::BadRequest(format!("invalid interval expression: {expression}")))?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => {
            return Err(GatewayError::BadRequest(format!(
                "unknown interval unit in {expression}, expected one of s/m/h/d"
            )))
        }
    };
    Ok(amount * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_parses_units() {
        assert_eq!(parse_interval_seconds("30s").unwrap(), 30);
        assert_eq!(parse_interval_seconds("5m").unwrap(), 300);
        assert_eq!(parse_interval_seconds("2h").unwrap(), 7200);
        assert_eq!(parse_interval_seconds("1d").unwrap(), 86400);
    }

    #[test]
    fn sub_minute_interval_rejected_under_orchestrator_delegation() {
        let err = Trigger::parse(ScheduleType::Interval, "30s", "UTC", true).unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
        assert!(Trigger::parse(ScheduleType::Interval, "30s", "UTC", false).is_ok());
    }

    #[test]
    fn one_time_trigger_in_the_past_has_no_next_fire() {
        let trigger = Trigger::parse(ScheduleType::OneTime, "2000-01-01T00:00:00Z", "UTC", false).unwrap();
        assert!(trigger.next_fire_after(EpochMillis::now()).is_none());
    }

    #[test]
    fn cron_trigger_computes_next_fire() {
        let trigger = Trigger::parse(ScheduleType::Cron, "0 0 9 * * * *", "UTC", false).unwrap();
        let now = EpochMillis(0);
        assert!(trigger.next_fire_after(now).is_some());
    }
}
