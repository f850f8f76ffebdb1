//! Textual time-axis specifications.
//!
//! Grammar:
//!
//! ```text
//! spec  := list [";relativeUnit=" step] [";unit=" timeunit]
//! list  := item ("," item)*
//! item  := datetime | number | "..." | "x"
//! ```
//!
//! Without `relativeUnit` the items are absolute datetimes; with it they are
//! offsets in `step` units from the start bound truncated to that step. `x`
//! is the start bound when it is the first item and the end bound otherwise.
//! `...` repeats the previous increment up to the next item, or up to the end
//! bound when it is the last item.

use chrono::{Duration, NaiveDateTime};

use crate::error::{CdmError, Result};
use crate::units::{parse_datetime, TimeUnit};

/// Default unit of generated time axes.
pub const DEFAULT_TIME_UNIT: &str = "seconds since 1970-01-01 00:00:00";

/// A generated sequence of time steps together with its output unit.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSpec {
    steps: Vec<NaiveDateTime>,
    unit: TimeUnit,
}

enum Item {
    Time(NaiveDateTime),
    Repeat,
}

fn spec_error(spec: &str, msg: impl std::fmt::Display) -> CdmError {
    CdmError::InvalidTimeSpec(format!("'{}': {}", spec, msg))
}

fn step_seconds(name: &str) -> Option<i64> {
    match name.trim() {
        "s" | "second" | "seconds" => Some(1),
        "min" | "minute" | "minutes" => Some(60),
        "h" | "hour" | "hours" => Some(3600),
        "d" | "day" | "days" => Some(86400),
        _ => None,
    }
}

/// Truncate to a multiple of `seconds` since 1970-01-01.
fn truncate(time: NaiveDateTime, seconds: i64) -> NaiveDateTime {
    let epoch = NaiveDateTime::default();
    let elapsed = (time - epoch).num_seconds();
    epoch + Duration::seconds(elapsed.div_euclid(seconds) * seconds)
}

impl TimeSpec {
    /// Generate the time steps of `spec` for an axis spanning `start..=end`.
    pub fn parse(spec: &str, start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        let mut parts = spec.split(';');
        let list = parts.next().unwrap_or_default();

        let mut relative_step = None;
        let mut unit = TimeUnit::parse(DEFAULT_TIME_UNIT)?;
        for option in parts {
            let (key, value) = option
                .split_once('=')
                .ok_or_else(|| spec_error(spec, format!("option '{}' is not key=value", option)))?;
            match key.trim() {
                "relativeUnit" => {
                    relative_step = Some(step_seconds(value).ok_or_else(|| {
                        spec_error(spec, format!("unknown relativeUnit '{}'", value))
                    })?);
                }
                "unit" => unit = TimeUnit::parse(value.trim())?,
                other => return Err(spec_error(spec, format!("unknown option '{}'", other))),
            }
        }

        let base = relative_step.map(|step| truncate(start, step));
        let tokens: Vec<&str> = list.split(',').map(str::trim).collect();
        let mut items = Vec::with_capacity(tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            let item = match *token {
                "" => return Err(spec_error(spec, "empty list item")),
                "..." => Item::Repeat,
                "x" if i == 0 => Item::Time(start),
                "x" => Item::Time(end),
                value => match (relative_step, base) {
                    (Some(step), Some(base)) => {
                        let offset: f64 = value
                            .parse()
                            .map_err(|_| spec_error(spec, format!("'{}' is not a number", value)))?;
                        base + Duration::milliseconds((offset * step as f64 * 1000.0).round() as i64)
                    }
                    _ => parse_datetime(value).map_err(|e| spec_error(spec, e))?,
                }
                .into(),
            };
            items.push(item);
        }

        let steps = expand(spec, &items, end)?;
        Ok(Self { steps, unit })
    }

    pub fn time_steps(&self) -> &[NaiveDateTime] {
        &self.steps
    }

    pub fn unit(&self) -> &TimeUnit {
        &self.unit
    }

    pub fn unit_string(&self) -> String {
        self.unit.unit_string()
    }
}

impl From<NaiveDateTime> for Item {
    fn from(time: NaiveDateTime) -> Self {
        Item::Time(time)
    }
}

fn expand(spec: &str, items: &[Item], end: NaiveDateTime) -> Result<Vec<NaiveDateTime>> {
    let mut steps: Vec<NaiveDateTime> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        match item {
            Item::Time(t) => {
                if let Some(last) = steps.last() {
                    if *t <= *last {
                        return Err(spec_error(spec, "time steps must be strictly increasing"));
                    }
                }
                steps.push(*t);
            }
            Item::Repeat => {
                let n = steps.len();
                if n < 2 {
                    return Err(spec_error(spec, "'...' needs two preceding values"));
                }
                let increment = steps[n - 1] - steps[n - 2];
                let limit = match items.get(i + 1) {
                    Some(Item::Time(next)) => *next,
                    Some(Item::Repeat) => return Err(spec_error(spec, "repeated '...'")),
                    None => end + Duration::milliseconds(1),
                };
                let mut t = steps[n - 1] + increment;
                while t < limit {
                    steps.push(t);
                    t += increment;
                }
            }
        }
    }
    if steps.is_empty() {
        return Err(spec_error(spec, "no time steps"));
    }
    Ok(steps)
}
