//! Date based retention of archived snapshots.
//!
//! A policy has four independent tiers (day, week, month, year). A snapshot
//! survives when any tier keeps it. Week, month and year tiers only consider
//! snapshots taken on a Monday, on the first of a month and on January 1st
//! respectively.

use crate::backup::result_error::error::ConfigError;
use bon::Builder;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use getset::CopyGetters;
use serde_yml::Value;
use std::fmt::{Display, Formatter};
use std::num::NonZeroU32;

/// How many units of one granularity a tier keeps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Tier {
    #[default]
    None,
    All,
    Last(NonZeroU32),
}

impl Tier {
    pub fn last(count: u32) -> Self {
        NonZeroU32::new(count).map_or(Tier::None, Tier::Last)
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::None => write!(f, "no"),
            Tier::All => write!(f, "all"),
            Tier::Last(n) => write!(f, "{n}"),
        }
    }
}

impl TryFrom<&Value> for Tier {
    type Error = ConfigError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null | Value::Bool(false) => Ok(Tier::None),
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Tier::last)
                .ok_or_else(|| ConfigError::invalid(format!("Invalid memory frequency {n}"))),
            Value::String(s) => {
                let s = s.trim().to_lowercase();
                match s.as_str() {
                    "all" => Ok(Tier::All),
                    "no" => Ok(Tier::None),
                    digits if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
                        digits
                            .parse::<u32>()
                            .map(Tier::last)
                            .map_err(|_| ConfigError::invalid(format!("Invalid memory frequency {s}")))
                    }
                    _ => Err(ConfigError::invalid(format!("Invalid memory frequency {s}"))),
                }
            }
            other => Err(ConfigError::invalid(format!(
                "Invalid memory frequency {other:?}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Builder, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct RetentionPolicy {
    #[builder(default)]
    day: Tier,
    #[builder(default)]
    week: Tier,
    #[builder(default)]
    month: Tier,
    #[builder(default)]
    year: Tier,
}

impl RetentionPolicy {
    /// Whether a snapshot taken on `snapshot` must survive a cleanup run on `reference`.
    pub fn should_keep(&self, reference: NaiveDate, snapshot: NaiveDate) -> bool {
        match self.day {
            Tier::All => return true,
            Tier::Last(n) => {
                if (reference - snapshot).num_days() + 1 <= i64::from(n.get()) {
                    return true;
                }
            }
            Tier::None => {}
        }

        if snapshot.weekday() == Weekday::Mon {
            match self.week {
                Tier::All => return true,
                Tier::Last(n) => {
                    let offset = i64::from(reference.weekday().number_from_monday())
                        + 7 * i64::from(n.get())
                        - 8;
                    if snapshot >= reference - Duration::days(offset) {
                        return true;
                    }
                }
                Tier::None => {}
            }
        }

        if snapshot.day() == 1 {
            match self.month {
                Tier::All => return true,
                Tier::Last(n) => {
                    if first_kept_month(reference, n.get()).is_some_and(|limit| snapshot >= limit) {
                        return true;
                    }
                }
                Tier::None => {}
            }

            if snapshot.month() == 1 {
                match self.year {
                    Tier::All => return true,
                    Tier::Last(n) => {
                        if i64::from(snapshot.year())
                            >= i64::from(reference.year()) - i64::from(n.get()) + 1
                        {
                            return true;
                        }
                    }
                    Tier::None => {}
                }
            }
        }

        false
    }

    pub fn set_tier(&mut self, name: &str, tier: Tier) -> Result<(), ConfigError> {
        match name {
            "day" => self.day = tier,
            "week" => self.week = tier,
            "month" => self.month = tier,
            "year" => self.year = tier,
            other => {
                return Err(ConfigError::invalid(format!(
                    "Unknown memory frequency {other}"
                )))
            }
        }
        Ok(())
    }
}

/// First day of the month `count - 1` months before the reference month.
fn first_kept_month(reference: NaiveDate, count: u32) -> Option<NaiveDate> {
    let shifted = i64::from(reference.month()) - i64::from(count);
    let year = i64::from(reference.year()) + shifted.div_euclid(12);
    let month = shifted.rem_euclid(12) + 1;
    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, u32::try_from(month).ok()?, 1)
}

impl TryFrom<&Value> for RetentionPolicy {
    type Error = ConfigError;

    /// Accepts either a bare tier name (`day`, meaning "keep every day") or a
    /// mapping of tier name to `all`, `no` or a count.
    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let mut policy = RetentionPolicy::default();
        match value {
            Value::String(name) => policy.set_tier(name.trim().to_lowercase().as_str(), Tier::All)?,
            Value::Mapping(tiers) => {
                for (name, tier) in tiers {
                    let name = name.as_str().ok_or_else(|| {
                        ConfigError::invalid(format!("Invalid memory frequency {name:?}"))
                    })?;
                    policy.set_tier(name.trim().to_lowercase().as_str(), Tier::try_from(tier)?)?;
                }
            }
            other => {
                return Err(ConfigError::invalid(format!(
                    "Invalid memory configuration {other:?}"
                )))
            }
        }
        Ok(policy)
    }
}

impl Display for RetentionPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let details = format!(
            "day: {}\nweek: {}\nmonth: {}\nyear: {}",
            self.day, self.week, self.month, self.year
        );
        write!(f, "frequency:\n{}", indent::indent_all_with("  ", details).trim_end())
    }
}
