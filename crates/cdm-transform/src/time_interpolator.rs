//! Time-axis resampling.
//!
//! [`TimeInterpolator::change_time_axis`] replaces each time axis by the steps
//! of a [`TimeSpec`]; reads of time-dependent variables then interpolate
//! linearly between the two original records bracketing each new step, and
//! extrapolate with the same two-point formula outside the original range.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::Arc;

use chrono::NaiveDateTime;

use cdm::coordsys::find_time_axis;
use cdm::reader::data_slice_from_memory;
use cdm::{
    Attribute, CdmError, CdmReader, CoordinateSystem, CoordinateSystemProvider, Data, DataType,
    ReaderRef, Result, Schema, TimeSpec, TimeUnit,
};

/// Resampling state of one time axis.
#[derive(Debug, Clone)]
struct TimeAxisChange {
    dimension: String,
    /// Original record pair bracketing each new time step.
    brackets: Vec<(usize, usize)>,
    /// Original axis values, expressed in the new unit.
    original_times: Vec<f64>,
}

pub struct TimeInterpolator {
    reader: ReaderRef,
    schema: Schema,
    coord_systems: Vec<Arc<CoordinateSystem>>,
    changes: BTreeMap<String, TimeAxisChange>,
}

impl TimeInterpolator {
    /// Wrap a reader. Cached data of time-dependent variables is dropped so
    /// that it is read through this stage.
    pub fn new(reader: ReaderRef, provider: &dyn CoordinateSystemProvider) -> Result<Self> {
        let coord_systems = provider.list_coordinate_systems(reader.schema())?;
        let mut schema = reader.schema().clone();
        let time_dependent: Vec<String> = schema
            .variables()
            .iter()
            .filter(|v| v.has_data() && find_time_axis(&coord_systems, &v.name).is_some())
            .map(|v| v.name.clone())
            .collect();
        for name in time_dependent {
            schema.set_data(&name, None)?;
        }
        Ok(Self {
            reader,
            schema,
            coord_systems,
            changes: BTreeMap::new(),
        })
    }

    /// Replace every time axis by the steps generated from `spec`, bounded by
    /// the first and last original time.
    pub fn change_time_axis(&mut self, spec: &str) -> Result<()> {
        let upstream = Rc::clone(&self.reader);
        let org_schema = upstream.schema();

        let mut changed = BTreeSet::new();
        for var in org_schema.variables() {
            let Some(axis) = find_time_axis(&self.coord_systems, &var.name) else {
                continue;
            };
            if !changed.insert(axis.name.clone()) || self.changes.contains_key(&axis.name) {
                continue;
            }
            if axis.shape.len() != 1 {
                return Err(CdmError::unsupported(format!(
                    "time interpolation of {}-dimensional time axis '{}'",
                    axis.shape.len(),
                    axis.name
                )));
            }
            let dim_name = axis.shape[0].clone();

            let times = upstream.scaled_data(&axis.name)?.as_f64();
            let (Some(first), Some(last)) = (times.first(), times.last()) else {
                tracing::warn!(axis = %axis.name, "empty time axis, not changed");
                continue;
            };
            let unit = TimeUnit::parse(&org_schema.units(&axis.name))?;
            let old_times: Vec<NaiveDateTime> = times.iter().map(|t| unit.to_datetime(*t)).collect();
            let time_spec = TimeSpec::parse(spec, unit.to_datetime(*first), unit.to_datetime(*last))?;
            let new_unit = time_spec.unit();

            let brackets = bracket_steps(&old_times, time_spec.time_steps());
            let new_values: Vec<f64> = time_spec
                .time_steps()
                .iter()
                .map(|t| new_unit.from_datetime(*t))
                .collect();
            let (slope, offset) = unit.convert_to(new_unit)?;
            let original_times = times
                .iter()
                .map(|t| if t.is_nan() { f64::NAN } else { t * slope + offset })
                .collect();
            tracing::debug!(
                axis = %axis.name,
                old_steps = times.len(),
                new_steps = new_values.len(),
                unit = %time_spec.unit_string(),
                "changing time axis"
            );

            self.schema
                .add_or_replace_attribute(&axis.name, Attribute::text("units", time_spec.unit_string()))?;
            self.schema.remove_attribute(&axis.name, "scale_factor");
            self.schema.remove_attribute(&axis.name, "add_offset");
            self.schema.dimension_mut(&dim_name)?.length = new_values.len();
            for name in self.schema.variable_names() {
                let uses_dim = self.schema.variable(&name)?.has_dimension(&dim_name);
                if uses_dim && self.schema.variable(&name)?.has_data() {
                    self.schema.set_data(&name, None)?;
                }
            }
            self.schema.variable_mut(&axis.name)?.data_type = DataType::Double;
            self.schema.set_data(&axis.name, Some(Data::from(new_values)))?;

            // interpolated variables are delivered as floats
            for name in self.schema.variable_names() {
                let interpolated = name != axis.name
                    && self.schema.variable(&name)?.has_dimension(&dim_name)
                    && find_time_axis(&self.coord_systems, &name).is_some_and(|a| a.name == axis.name);
                if interpolated {
                    self.schema.variable_mut(&name)?.data_type = DataType::Float;
                }
            }

            self.changes.insert(
                axis.name.clone(),
                TimeAxisChange {
                    dimension: dim_name,
                    brackets,
                    original_times,
                },
            );
        }
        Ok(())
    }
}

/// Original record pair for each new step: the pair around the insertion
/// point, the last two records past the end, the first two before the start.
fn bracket_steps(old: &[NaiveDateTime], new: &[NaiveDateTime]) -> Vec<(usize, usize)> {
    let n = old.len();
    let mut last = 0;
    new.iter()
        .map(|t| {
            let mut pos = last + old[last..].partition_point(|o| o < t);
            if pos == n {
                pos -= 1;
            }
            last = pos;
            if pos != 0 {
                (pos - 1, pos)
            } else if n > 1 {
                (0, 1)
            } else {
                (0, 0)
            }
        })
        .collect()
}

/// Linear interpolation (or extrapolation) between two records at `x`.
///
/// An element undefined in a record that contributes to the result becomes
/// `out_fill`.
fn interpolate(d1: &[f32], d2: &[f32], (x1, x2, x): (f64, f64, f64), in_fill: f32, out_fill: f32) -> Vec<f32> {
    let w = if x1 == x2 { 0.0 } else { ((x - x1) / (x2 - x1)) as f32 };
    let undefined = |v: f32| v.is_nan() || v == in_fill;
    d1.iter()
        .zip(d2)
        .map(|(&a, &b)| {
            if w == 0.0 {
                if undefined(a) { out_fill } else { a }
            } else if w == 1.0 {
                if undefined(b) { out_fill } else { b }
            } else if undefined(a) || undefined(b) {
                out_fill
            } else {
                a * (1.0 - w) + b * w
            }
        })
        .collect()
}

impl CdmReader for TimeInterpolator {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn data_slice(&self, var_name: &str, unlim_pos: usize) -> Result<Data> {
        let axis = find_time_axis(&self.coord_systems, var_name);
        let change = axis.as_ref().and_then(|a| self.changes.get(&a.name).map(|c| (a, c)));
        let Some((axis, change)) = change else {
            return self.reader.data_slice(var_name, unlim_pos);
        };

        let variable = self.schema.variable(var_name)?;
        if variable.has_data() {
            return data_slice_from_memory(&self.schema, variable, unlim_pos);
        }
        if !variable.has_dimension(&change.dimension) {
            return self.reader.data_slice(var_name, unlim_pos);
        }
        if !self.schema.dimension(&change.dimension)?.unlimited {
            return Err(CdmError::unsupported(format!(
                "time interpolation of '{}' along non-unlimited dimension '{}'",
                var_name, change.dimension
            )));
        }

        let (t1, t2) = *change.brackets.get(unlim_pos).ok_or_else(|| {
            CdmError::out_of_bounds(format!(
                "time step {} of '{}' with {} steps",
                unlim_pos,
                axis.name,
                change.brackets.len()
            ))
        })?;
        let current = self
            .schema
            .variable(&axis.name)?
            .data()
            .and_then(|d| d.get(unlim_pos))
            .ok_or_else(|| CdmError::out_of_bounds(format!("time step {} of '{}'", unlim_pos, axis.name)))?;
        let (x1, x2) = (change.original_times[t1], change.original_times[t2]);

        let d1 = self.reader.data_slice(var_name, t1)?;
        let d2 = self.reader.data_slice(var_name, t2)?;
        tracing::debug!(
            variable = var_name,
            t1,
            t2,
            x1,
            x2,
            current,
            "time interpolation"
        );

        let in_fill = self.reader.schema().fill_value(var_name) as f32;
        let out_fill = self.schema.fill_value(var_name) as f32;
        let values = match (d1.is_empty(), d2.is_empty()) {
            (true, true) => return Ok(Data::empty(DataType::Float)),
            (true, false) => {
                let v = d2.as_f32();
                interpolate(&v, &v, (x2, x2, current), in_fill, out_fill)
            }
            (false, true) => {
                let v = d1.as_f32();
                interpolate(&v, &v, (x1, x1, current), in_fill, out_fill)
            }
            (false, false) if d1.len() != d2.len() => {
                return Err(CdmError::shape_mismatch(format!(
                    "data slice of '{}' got records with different size: {} and {}",
                    var_name,
                    d1.len(),
                    d2.len()
                )))
            }
            (false, false) => interpolate(&d1.as_f32(), &d2.as_f32(), (x1, x2, current), in_fill, out_fill),
        };
        Ok(Data::from(values))
    }
}
