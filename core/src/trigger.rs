// Trigger evaluation: computing the next fire instant for a trigger
// definition relative to a reference time.
//
// All stored instants are UTC; daily-interval triggers are evaluated against
// the wall clock of their configured timezone, which is authoritative across
// daylight-saving transitions.

use crate::errors::ScheduleError;
use chrono::{DateTime, Duration, LocalResult, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

// Helper functions for Tz serialization
fn serialize_tz<S>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&tz.to_string())
}

fn deserialize_tz<'de, D>(deserializer: D) -> Result<Tz, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Tz::from_str(&s).map_err(serde::de::Error::custom)
}

/// When a job should fire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSpec {
    /// Fire once at a fixed instant, then never again
    OneShot { fire_at: DateTime<Utc> },
    /// Fire every `interval_hours` starting at `time_of_day` each local day.
    /// The sequence restarts every day, so an interval of 24 or more means
    /// one firing per day at `time_of_day`.
    DailyInterval {
        interval_hours: u32,
        time_of_day: NaiveTime,
        #[serde(serialize_with = "serialize_tz", deserialize_with = "deserialize_tz")]
        timezone: Tz,
    },
}

impl TriggerSpec {
    /// Daily-interval trigger from hour/minute components
    pub fn daily(
        interval_hours: u32,
        hour: u32,
        minute: u32,
        timezone: Tz,
    ) -> Result<Self, ScheduleError> {
        let time_of_day = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| ScheduleError::InvalidTimeOfDay(format!("{hour:02}:{minute:02}")))?;
        let spec = Self::DailyInterval {
            interval_hours,
            time_of_day,
            timezone,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Validate the trigger definition. Called once at registration; an
    /// already-registered trigger never fails evaluation.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        match self {
            TriggerSpec::OneShot { .. } => Ok(()),
            TriggerSpec::DailyInterval {
                interval_hours,
                time_of_day,
                ..
            } => {
                if *interval_hours == 0 {
                    return Err(ScheduleError::InvalidInterval(*interval_hours));
                }
                if time_of_day.second() != 0 || time_of_day.nanosecond() != 0 {
                    return Err(ScheduleError::InvalidTimeOfDay(time_of_day.to_string()));
                }
                Ok(())
            }
        }
    }

    /// Next fire instant strictly after `after`, or `None` when the trigger
    /// has no further occurrence. Pure: identical inputs give identical
    /// output.
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TriggerSpec::OneShot { fire_at } => {
                if *fire_at > after {
                    Some(*fire_at)
                } else {
                    None
                }
            }
            TriggerSpec::DailyInterval {
                interval_hours,
                time_of_day,
                timezone,
            } => next_daily_fire(*interval_hours, *time_of_day, *timezone, after),
        }
    }
}

/// Earliest wall-clock candidate strictly after `after`. Candidates on a
/// local day D are `time_of_day + k * interval_hours` for every k that stays
/// within D; the scan starts on the local day of `after` and is bounded,
/// since every day contains at least the `time_of_day` candidate.
fn next_daily_fire(
    interval_hours: u32,
    time_of_day: NaiveTime,
    timezone: Tz,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let local_after = after.with_timezone(&timezone);
    let start_of_day = time_of_day.num_seconds_from_midnight() as i64;
    let step = i64::from(interval_hours) * 3600;

    for day_offset in 0..4i64 {
        let date = local_after.date_naive() + Duration::days(day_offset);
        let mut offset_secs = start_of_day;
        while offset_secs < 86_400 {
            let naive = date.and_time(NaiveTime::MIN) + Duration::seconds(offset_secs);
            if let Some(candidate) = resolve_local(naive, timezone) {
                let candidate_utc = candidate.with_timezone(&Utc);
                if candidate_utc > after {
                    return Some(candidate_utc);
                }
            }
            offset_secs += step;
        }
    }

    None
}

/// Map a wall-clock datetime to an instant in `tz`. An ambiguous time
/// (fall-back) maps to its first occurrence; a nonexistent time
/// (spring-forward gap) maps to the nearest following valid instant.
fn resolve_local(naive: chrono::NaiveDateTime, tz: Tz) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(first, _second) => Some(first),
        LocalResult::None => {
            // Inside a DST gap; gaps are at most a few hours, scan forward
            // minute by minute to the first representable wall time.
            let mut probe = naive;
            for _ in 0..240 {
                probe += Duration::minutes(1);
                match tz.from_local_datetime(&probe) {
                    LocalResult::Single(dt) => return Some(dt),
                    LocalResult::Ambiguous(first, _) => return Some(first),
                    LocalResult::None => continue,
                }
            }
            None
        }
    }
}
