//! Linear unit conversion.
//!
//! Only the linear `to = from * slope + offset` relation is modelled. The
//! [`Units`] table covers the units the transformation stages meet on
//! coordinate axes: lengths, pressures, temperatures, angles, durations and
//! CF reference-time units (`<unit> since <datetime>`).

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::{CdmError, Result};

/// Conversion capability between unit strings.
pub trait UnitConverter {
    /// Check if values in `from` can be expressed in `to`.
    fn are_convertible(&self, from: &str, to: &str) -> bool;

    /// `(slope, offset)` such that `value_to = value_from * slope + offset`.
    fn convert(&self, from: &str, to: &str) -> Result<(f64, f64)>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Quantity {
    Dimensionless,
    Length,
    Pressure,
    Temperature,
    Angle,
    Duration,
}

/// (names, quantity, scale, offset) with `base = value * scale + offset`.
const UNIT_TABLE: &[(&[&str], Quantity, f64, f64)] = &[
    (&["", "1"], Quantity::Dimensionless, 1.0, 0.0),
    (&["m", "meter", "meters", "metre", "metres"], Quantity::Length, 1.0, 0.0),
    (&["km", "kilometer", "kilometers"], Quantity::Length, 1000.0, 0.0),
    (&["cm"], Quantity::Length, 0.01, 0.0),
    (&["mm"], Quantity::Length, 0.001, 0.0),
    (&["Pa", "pascal"], Quantity::Pressure, 1.0, 0.0),
    (&["hPa", "mbar", "millibar"], Quantity::Pressure, 100.0, 0.0),
    (&["kPa"], Quantity::Pressure, 1000.0, 0.0),
    (&["bar"], Quantity::Pressure, 100_000.0, 0.0),
    (&["K", "kelvin"], Quantity::Temperature, 1.0, 0.0),
    (&["degC", "celsius", "degree_Celsius"], Quantity::Temperature, 1.0, 273.15),
    (
        &[
            "degree", "degrees", "degree_north", "degrees_north", "degree_N", "degrees_N",
            "degree_east", "degrees_east", "degree_E", "degrees_E",
        ],
        Quantity::Angle,
        1.0,
        0.0,
    ),
    (&["rad", "radian", "radians"], Quantity::Angle, 180.0 / std::f64::consts::PI, 0.0),
    (&["s", "sec", "second", "seconds"], Quantity::Duration, 1.0, 0.0),
    (&["min", "minute", "minutes"], Quantity::Duration, 60.0, 0.0),
    (&["h", "hr", "hour", "hours"], Quantity::Duration, 3600.0, 0.0),
    (&["d", "day", "days"], Quantity::Duration, 86400.0, 0.0),
];

fn lookup(unit: &str) -> Option<(Quantity, f64, f64)> {
    let unit = unit.trim();
    UNIT_TABLE
        .iter()
        .find(|(names, ..)| names.contains(&unit))
        .map(|(_, q, scale, offset)| (*q, *scale, *offset))
}

/// Table-driven [`UnitConverter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Units;

impl Units {
    pub fn new() -> Self {
        Self
    }
}

impl UnitConverter for Units {
    fn are_convertible(&self, from: &str, to: &str) -> bool {
        if TimeUnit::is_time_unit(from) || TimeUnit::is_time_unit(to) {
            return TimeUnit::parse(from).is_ok() && TimeUnit::parse(to).is_ok();
        }
        match (lookup(from), lookup(to)) {
            (Some((qf, ..)), Some((qt, ..))) => qf == qt,
            _ => from.trim() == to.trim(),
        }
    }

    fn convert(&self, from: &str, to: &str) -> Result<(f64, f64)> {
        if TimeUnit::is_time_unit(from) || TimeUnit::is_time_unit(to) {
            return TimeUnit::parse(from)?.convert_to(&TimeUnit::parse(to)?);
        }
        if from.trim() == to.trim() {
            return Ok((1.0, 0.0));
        }
        match (lookup(from), lookup(to)) {
            (Some((qf, sf, of)), Some((qt, st, ot))) if qf == qt => {
                Ok((sf / st, (of - ot) / st))
            }
            _ => Err(CdmError::InvalidUnit(format!(
                "cannot convert '{}' to '{}'",
                from, to
            ))),
        }
    }
}

/// A CF reference-time unit: `<duration unit> since <datetime>`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeUnit {
    /// Seconds per unit step.
    scale: f64,
    epoch: NaiveDateTime,
    unit_name: String,
}

/// Accepted datetime layouts, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse a datetime in one of the CF/ISO layouts; a trailing `Z` or `UTC`
/// is ignored, a date without time means midnight.
pub fn parse_datetime(text: &str) -> Result<NaiveDateTime> {
    let trimmed = text
        .trim()
        .trim_end_matches("UTC")
        .trim_end()
        .trim_end_matches('Z');
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| CdmError::InvalidUnit(format!("cannot parse datetime '{}'", text)))
}

impl TimeUnit {
    /// Check if a unit string has the `... since ...` form.
    pub fn is_time_unit(unit: &str) -> bool {
        unit.contains(" since ")
    }

    pub fn parse(unit: &str) -> Result<Self> {
        let (step, epoch) = unit
            .split_once(" since ")
            .ok_or_else(|| CdmError::InvalidUnit(format!("not a time unit: '{}'", unit)))?;
        let step = step.trim();
        let scale = match lookup(step) {
            Some((Quantity::Duration, scale, _)) => scale,
            _ => {
                return Err(CdmError::InvalidUnit(format!(
                    "unknown time step '{}' in '{}'",
                    step, unit
                )))
            }
        };
        Ok(Self {
            scale,
            epoch: parse_datetime(epoch)?,
            unit_name: step.to_string(),
        })
    }

    /// Seconds per unit step.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn epoch(&self) -> NaiveDateTime {
        self.epoch
    }

    /// Canonical unit string.
    pub fn unit_string(&self) -> String {
        format!("{} since {}", self.unit_name, self.epoch.format("%Y-%m-%d %H:%M:%S"))
    }

    /// Convert a value in this unit to a calendar time (millisecond precision).
    pub fn to_datetime(&self, value: f64) -> NaiveDateTime {
        self.epoch + Duration::milliseconds((value * self.scale * 1000.0).round() as i64)
    }

    /// Convert a calendar time to a value in this unit.
    pub fn from_datetime(&self, time: NaiveDateTime) -> f64 {
        (time - self.epoch).num_milliseconds() as f64 / 1000.0 / self.scale
    }

    /// `(slope, offset)` for converting values in `self` into `other`.
    pub fn convert_to(&self, other: &TimeUnit) -> Result<(f64, f64)> {
        let epoch_diff = (self.epoch - other.epoch).num_milliseconds() as f64 / 1000.0;
        Ok((self.scale / other.scale, epoch_diff / other.scale))
    }
}
