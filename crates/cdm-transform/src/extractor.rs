//! Dimension, variable and coordinate-range extraction.
//!
//! The [`Extractor`] presents a subset of its upstream reader: fewer
//! variables, and dimensions restricted to arbitrary sets of indices. For
//! every reduced dimension it keeps the list of retained upstream indices
//! and translates reads back into as few contiguous upstream requests as
//! possible.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::Arc;

use chrono::NaiveDateTime;
use once_cell::unsync::OnceCell;

use cdm::coordsys::add_auxiliary;
use cdm::reader::{data_slice_from_memory, data_slice_sb_from_memory};
use cdm::time::DEFAULT_TIME_UNIT;
use cdm::{
    AxisType, CdmError, CdmReader, CoordinateSystem, CoordinateSystemProvider, Data, ReaderRef,
    Result, Schema, SliceBuilder, StaticCoordinateSystems, TimeUnit, UnitConverter, Units,
};

/// Rounding tolerance for axis bounds when the sample spacing is unknown.
const DEFAULT_ROUNDING_DELTA: f64 = 1e-5;

/// Reduces dimensions and variables of an upstream reader.
///
/// The coordinate systems of the upstream reader are listed lazily on first
/// use and memoized in a non-synchronised cell; an `Extractor` must not be
/// shared between threads.
pub struct Extractor {
    reader: ReaderRef,
    schema: Schema,
    coord_provider: Rc<dyn CoordinateSystemProvider>,
    coord_systems: OnceCell<Vec<Arc<CoordinateSystem>>>,
    units: Units,
    /// Retained upstream indices per reduced dimension.
    dim_slices: BTreeMap<String, Vec<usize>>,
}

impl Extractor {
    /// Wrap a reader; the schema starts as a copy of the upstream schema.
    pub fn new(reader: ReaderRef) -> Self {
        let schema = reader.schema().clone();
        Self {
            reader,
            schema,
            coord_provider: Rc::new(StaticCoordinateSystems::default()),
            coord_systems: OnceCell::new(),
            units: Units::new(),
            dim_slices: BTreeMap::new(),
        }
    }

    /// Use `provider` to find the coordinate systems of the upstream reader.
    pub fn with_coordinate_systems(mut self, provider: Rc<dyn CoordinateSystemProvider>) -> Self {
        self.coord_provider = provider;
        self.coord_systems = OnceCell::new();
        self
    }

    fn coordinate_systems(&self) -> Result<&[Arc<CoordinateSystem>]> {
        self.coord_systems
            .get_or_try_init(|| self.coord_provider.list_coordinate_systems(self.reader.schema()))
            .map(Vec::as_slice)
    }

    /// Retained upstream indices of a reduced dimension.
    pub fn retained_indices(&self, dim_name: &str) -> Option<&[usize]> {
        self.dim_slices.get(dim_name).map(Vec::as_slice)
    }

    /// Remove a variable and its attributes.
    pub fn remove_variable(&mut self, name: &str) -> Result<()> {
        tracing::debug!(variable = name, "removing variable");
        self.schema.remove_variable(name)
    }

    /// Keep only the variables in `variables`, optionally extended with their
    /// coordinate axes and auxiliary variables.
    pub fn select_variables(
        &mut self,
        variables: BTreeSet<String>,
        add_auxiliary_variables: bool,
    ) -> Result<()> {
        let mut keep = variables;
        if add_auxiliary_variables {
            let systems = self.coordinate_systems()?;
            add_auxiliary(&mut keep, &self.schema, systems);
        }

        let existing: BTreeSet<String> = self.schema.variable_names().into_iter().collect();
        for name in existing.difference(&keep) {
            self.remove_variable(name)?;
        }
        for missing in keep.difference(&existing) {
            tracing::warn!(variable = %missing, "selected variable does not exist, ignoring");
        }
        Ok(())
    }

    /// Restrict a dimension to a set of indices of its current view.
    ///
    /// Fails, leaving the dimension untouched, if any index is not below the
    /// current length. An empty set yields a zero-length dimension.
    pub fn reduce_dimension<I>(&mut self, dim_name: &str, indices: I) -> Result<()>
    where
        I: IntoIterator<Item = usize>,
    {
        let indices: BTreeSet<usize> = indices.into_iter().collect();
        let length = self.schema.dimension(dim_name)?.length;
        if let Some(bad) = indices.iter().find(|&&i| i >= length) {
            return Err(CdmError::out_of_bounds(format!(
                "can't select slice {} of dimension '{}' with length {}",
                bad, dim_name, length
            )));
        }

        let originals: Vec<usize> = match self.dim_slices.get(dim_name) {
            Some(current) => indices.iter().map(|&i| current[i]).collect(),
            None => indices.into_iter().collect(),
        };
        self.set_retained(dim_name, originals)
    }

    /// Restrict a dimension to `length` indices starting at `start`.
    pub fn reduce_dimension_range(&mut self, dim_name: &str, start: usize, length: usize) -> Result<()> {
        self.reduce_dimension(dim_name, start..start + length)
    }

    /// Restrict a dimension to `start..=end`; an `end <= 0` counts from the
    /// end of the dimension (0 is the last index).
    pub fn reduce_dimension_start_end(&mut self, dim_name: &str, start: usize, end: i64) -> Result<()> {
        let length = if end > 0 {
            end - start as i64 + 1
        } else {
            self.schema.dimension(dim_name)?.length as i64 - start as i64 + end
        };
        if length < 0 {
            return Err(CdmError::invalid_argument(format!(
                "dimension '{}': end {} lies before start {}",
                dim_name, end, start
            )));
        }
        self.reduce_dimension_range(dim_name, start, length as usize)
    }

    /// Restrict every 1-D coordinate axis of the given types to the values
    /// within `[start, end]`, given in `unit`.
    pub fn reduce_axes(&mut self, types: &[AxisType], unit: &str, start: f64, end: f64) -> Result<()> {
        tracing::debug!(?types, unit, start, end, "reducing axes");
        let systems = self.coordinate_systems()?.to_vec();
        let upstream = Rc::clone(&self.reader);
        let org_schema = upstream.schema();

        let mut axes = Vec::new();
        for cs in &systems {
            for axis_type in types {
                if let Some(axis) = cs.find_axis_of_type(*axis_type) {
                    if self.units.are_convertible(&org_schema.units(&axis.name), unit) {
                        axes.push(axis.clone());
                    }
                }
            }
        }

        let mut used_dimensions = BTreeSet::new();
        for axis in axes {
            if axis.shape.len() != 1 {
                tracing::warn!(axis = %axis.name, "cannot reduce axis: axis is not 1-dim");
                continue;
            }
            let dim_name = axis.shape[0].clone();
            if !used_dimensions.insert(dim_name.clone()) {
                continue;
            }

            let values = upstream.scaled_data(&axis.name)?.as_f64();
            if values.is_empty() {
                continue;
            }
            let axis_unit = org_schema.units(&axis.name);
            let (slope, offset) = self.units.convert(unit, &axis_unit)?;
            let rounding_delta = if values.len() > 1 && values[0] != values[1] {
                0.01 * (values[0] - values[1]).abs()
            } else {
                DEFAULT_ROUNDING_DELTA
            };
            let low = start * slope + offset - rounding_delta;
            let high = end * slope + offset + rounding_delta;

            let (first, size) = axis_index_range(&values, low, high);
            tracing::debug!(
                axis = %axis.name,
                dimension = %dim_name,
                low,
                high,
                first,
                size,
                "reducing axis dimension"
            );
            self.restrict_original(&dim_name, (first..first + size).collect())?;
        }
        Ok(())
    }

    /// Restrict time axes to `[start, end]`.
    pub fn reduce_time(&mut self, start: NaiveDateTime, end: NaiveDateTime) -> Result<()> {
        let unit = TimeUnit::parse(DEFAULT_TIME_UNIT)?;
        self.reduce_axes(
            &[AxisType::Time],
            DEFAULT_TIME_UNIT,
            unit.from_datetime(start),
            unit.from_datetime(end),
        )
    }

    /// Restrict vertical axes to `[start, end]`, given in `unit`.
    pub fn reduce_vertical_axis(&mut self, unit: &str, start: f64, end: f64) -> Result<()> {
        self.reduce_axes(&AxisType::VERTICAL, unit, start, end)
    }

    /// Restrict the horizontal grid dimensions to the points inside a
    /// longitude/latitude box. `west > east` selects across the antimeridian.
    ///
    /// x and y indices are kept independently, so the retained grid is the
    /// enclosing index rectangle of all points inside the box.
    pub fn reduce_lat_lon_bounding_box(&mut self, south: f64, north: f64, west: f64, east: f64) -> Result<()> {
        if south > north {
            return Err(CdmError::invalid_argument(format!(
                "reduceLatLonBoundingBox south > north: {} > {}",
                south, north
            )));
        }
        for (name, value, limit) in [
            ("south", south, 90.0),
            ("north", north, 90.0),
            ("west", west, 180.0),
            ("east", east, 180.0),
        ] {
            if !(-limit..=limit).contains(&value) {
                return Err(CdmError::invalid_argument(format!(
                    "reduceLatLonBoundingBox {} outside domain: {}",
                    name, value
                )));
            }
        }

        let systems = self.coordinate_systems()?.to_vec();
        let upstream = Rc::clone(&self.reader);
        let mut converted_axes: BTreeSet<String> = BTreeSet::new();
        for cs in &systems {
            let (Some(projection), Some(x_axis), Some(y_axis)) =
                (cs.projection(), cs.geo_x_axis(), cs.geo_y_axis())
            else {
                continue;
            };
            if !cs.is_simple_spatial_gridded() {
                if x_axis.shape.len() != 1 || y_axis.shape.len() != 1 {
                    tracing::warn!(x = %x_axis.name, y = %y_axis.name, "cannot reduce x/y axis: axis is not 1-dim");
                }
                continue;
            }
            if converted_axes.contains(&x_axis.name) || converted_axes.contains(&y_axis.name) {
                continue;
            }

            let xs = upstream.scaled_data(&x_axis.name)?.as_f64();
            let ys = upstream.scaled_data(&y_axis.name)?.as_f64();
            let (nx, ny) = (xs.len(), ys.len());
            if nx == 0 || ny == 0 {
                continue;
            }

            let mut lons = Vec::with_capacity(nx * ny);
            let mut lats = Vec::with_capacity(nx * ny);
            for x in &xs {
                for y in &ys {
                    lons.push(*x);
                    lats.push(*y);
                }
            }
            projection.convert_to_lon_lat(&mut lons, &mut lats)?;

            let mut x_keep = BTreeSet::new();
            let mut y_keep = BTreeSet::new();
            for ix in 0..nx {
                for iy in 0..ny {
                    let i = ix * ny + iy;
                    if (south..=north).contains(&lats[i]) && longitude_inside(lons[i], west, east) {
                        x_keep.insert(ix);
                        y_keep.insert(iy);
                    }
                }
            }

            tracing::debug!(
                x = %x_axis.name,
                y = %y_axis.name,
                x_kept = x_keep.len(),
                y_kept = y_keep.len(),
                "bounding box reduction"
            );
            self.restrict_original(&x_axis.shape[0], x_keep)?;
            self.restrict_original(&y_axis.shape[0], y_keep)?;
            converted_axes.insert(x_axis.name.clone());
            converted_axes.insert(y_axis.name.clone());
        }
        Ok(())
    }

    /// Restrict a dimension to a set of upstream indices, intersecting with an
    /// earlier reduction of the same dimension.
    fn restrict_original(&mut self, dim_name: &str, indices: BTreeSet<usize>) -> Result<()> {
        let org_length = self.reader.schema().dimension(dim_name)?.length;
        if let Some(bad) = indices.iter().find(|&&i| i >= org_length) {
            return Err(CdmError::out_of_bounds(format!(
                "index {} of dimension '{}' with length {}",
                bad, dim_name, org_length
            )));
        }
        let retained = match self.dim_slices.get(dim_name) {
            Some(current) => current.iter().copied().filter(|i| indices.contains(i)).collect(),
            None => indices.into_iter().collect(),
        };
        self.set_retained(dim_name, retained)
    }

    fn set_retained(&mut self, dim_name: &str, retained: Vec<usize>) -> Result<()> {
        self.schema.dimension_mut(dim_name)?.length = retained.len();
        tracing::debug!(dimension = dim_name, retained = ?retained, "reducing dimension");
        self.dim_slices.insert(dim_name.to_string(), retained);

        // cached data of affected variables must be read through this stage
        let affected: Vec<String> = self
            .schema
            .variables()
            .iter()
            .filter(|v| v.has_dimension(dim_name) && v.has_data())
            .map(|v| v.name.clone())
            .collect();
        for name in affected {
            self.schema.set_data(&name, None)?;
        }
        Ok(())
    }

    /// Translate a request against the reduced view into upstream requests,
    /// read them and join the results.
    fn read_reduced(&self, var_name: &str, sb: &SliceBuilder) -> Result<Data> {
        let mut slices = vec![SliceBuilder::new(self.reader.schema(), var_name)?];

        // fastest varying dimension first, so every split keeps row-major order
        for dim_name in sb.dimension_names().iter().rev() {
            let (start, size) = sb.start_and_size(dim_name)?;
            match self.dim_slices.get(dim_name) {
                None if slices.len() > 1 && size > 1 => {
                    slices = split_slices(&slices, dim_name, (start..start + size).map(|p| (p, 1)))?;
                }
                None => {
                    for slice in &mut slices {
                        slice.set_start_and_size(dim_name, start, size)?;
                    }
                }
                Some(positions) => {
                    let window = positions.get(start..start + size).ok_or_else(|| {
                        CdmError::out_of_bounds(format!(
                            "window {}+{} of reduced dimension '{}' with length {}",
                            start,
                            size,
                            dim_name,
                            positions.len()
                        ))
                    })?;
                    if window.is_empty() {
                        for slice in &mut slices {
                            slice.set_start_and_size(dim_name, 0, 0)?;
                        }
                    } else if slices.len() <= 1 {
                        slices = split_slices(&slices, dim_name, merge_runs(window))?;
                    } else {
                        // already split up; one request per retained index
                        slices = split_slices(&slices, dim_name, window.iter().map(|&p| (p, 1)))?;
                    }
                }
            }
        }
        self.join_slices(var_name, &slices)
    }

    /// Read the upstream slices and concatenate them in order.
    fn join_slices(&self, var_name: &str, slices: &[SliceBuilder]) -> Result<Data> {
        let org_schema = self.reader.schema();
        let var = org_schema.variable(var_name)?;
        match slices {
            [] => return Ok(Data::empty(var.data_type)),
            [single] => return self.reader.data_slice_sb(var_name, single),
            _ => {}
        }

        let total: usize = slices.iter().map(SliceBuilder::element_count).sum();
        tracing::debug!(variable = var_name, slices = slices.len(), total, "joining slices");
        let mut result = Data::new(var.data_type, total, org_schema.fill_value(var_name));
        let mut pos = 0;
        for slice in slices {
            let count = slice.element_count();
            if count > 0 {
                let data = self.reader.data_slice_sb(var_name, slice)?;
                if !data.is_empty() {
                    if data.len() != count {
                        return Err(CdmError::shape_mismatch(format!(
                            "upstream returned {} values for a slice of {} of '{}'",
                            data.len(),
                            count,
                            var_name
                        )));
                    }
                    result.set_values(pos, &data)?;
                }
            }
            pos += count;
        }
        Ok(result)
    }
}

/// Copy every slice once per chunk; chunks vary slowest.
fn split_slices<I>(slices: &[SliceBuilder], dim_name: &str, chunks: I) -> Result<Vec<SliceBuilder>>
where
    I: IntoIterator<Item = (usize, usize)>,
{
    let mut out = Vec::new();
    for (start, size) in chunks {
        for slice in slices {
            let mut chunk = slice.clone();
            chunk.set_start_and_size(dim_name, start, size)?;
            out.push(chunk);
        }
    }
    Ok(out)
}

/// Merge ascending indices into maximal (start, size) runs.
fn merge_runs(positions: &[usize]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let Some((&first, rest)) = positions.split_first() else {
        return runs;
    };
    let (mut start, mut last) = (first, first);
    for &p in rest {
        if p == last + 1 {
            last = p;
        } else {
            runs.push((start, last - start + 1));
            start = p;
            last = p;
        }
    }
    runs.push((start, last - start + 1));
    runs
}

/// Index range `[lower_bound(low), upper_bound(high))` of a monotonic axis,
/// as (first index, count) in the axis' own order.
fn axis_index_range(values: &[f64], low: f64, high: f64) -> (usize, usize) {
    let n = values.len();
    let reversed = n > 1 && values[0] > values[1];
    let ascending: Vec<f64> = if reversed {
        values.iter().rev().copied().collect()
    } else {
        values.to_vec()
    };
    let lower = ascending.partition_point(|v| *v < low);
    let upper = ascending.partition_point(|v| *v <= high);
    let size = upper.saturating_sub(lower);
    if reversed {
        (n - size - lower, size)
    } else {
        (lower, size)
    }
}

/// Map a longitude into [-180, 180).
fn normalize_longitude(lon: f64) -> f64 {
    if (-180.0..180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

/// Whether `lon` lies within `[west, east]`; `west > east` wraps across the
/// antimeridian. -180 and 180 denote the same meridian.
fn longitude_inside(lon: f64, west: f64, east: f64) -> bool {
    let normalized = normalize_longitude(lon);
    let antimeridian = if normalized == -180.0 { 180.0 } else { normalized };
    [lon, normalized, antimeridian].into_iter().any(|l| {
        if west > east {
            l >= west || l <= east
        } else {
            (west..=east).contains(&l)
        }
    })
}

impl CdmReader for Extractor {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn data_slice(&self, var_name: &str, unlim_pos: usize) -> Result<Data> {
        let variable = self.schema.variable(var_name)?;
        if variable.has_data() {
            // reduced variables never keep data, so memory is up to date
            return data_slice_from_memory(&self.schema, variable, unlim_pos);
        }
        if self.dim_slices.is_empty() {
            return self.reader.data_slice(var_name, unlim_pos);
        }

        let mut sb = SliceBuilder::new(&self.schema, var_name)?;
        if let Some(unlimited) = sb.unlimited_dimension().map(str::to_string) {
            sb.set_start_and_size(&unlimited, unlim_pos, 1)?;
        }
        self.read_reduced(var_name, &sb)
    }

    fn data_slice_sb(&self, var_name: &str, sb: &SliceBuilder) -> Result<Data> {
        let variable = self.schema.variable(var_name)?;
        if variable.has_data() {
            tracing::debug!(variable = var_name, "fetching data from memory");
            return data_slice_sb_from_memory(&self.schema, variable, sb);
        }
        if self.dim_slices.is_empty() {
            return self.reader.data_slice_sb(var_name, sb);
        }
        self.read_reduced(var_name, sb)
    }
}
