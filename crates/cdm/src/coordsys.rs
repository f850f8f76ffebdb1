//! Coordinate systems and projections.
//!
//! Detecting coordinate systems from metadata conventions is not done here;
//! systems are supplied by a [`CoordinateSystemProvider`], typically
//! [`StaticCoordinateSystems`] built by the format backend.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::Schema;

/// Physical meaning of a coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisType {
    GeoX,
    GeoY,
    Lon,
    Lat,
    GeoZ,
    Height,
    Depth,
    Pressure,
    Time,
    ReferenceTime,
    Undefined,
}

impl AxisType {
    /// Vertical axis types, in lookup order.
    pub const VERTICAL: [AxisType; 4] = [
        AxisType::GeoZ,
        AxisType::Height,
        AxisType::Depth,
        AxisType::Pressure,
    ];
}

/// A variable acting as coordinate of a coordinate system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinateAxis {
    pub name: String,
    pub shape: Vec<String>,
    pub axis_type: AxisType,
}

impl CoordinateAxis {
    pub fn new(name: impl Into<String>, shape: &[&str], axis_type: AxisType) -> Self {
        Self {
            name: name.into(),
            shape: shape.iter().map(|s| s.to_string()).collect(),
            axis_type,
        }
    }

    /// One-dimensional coordinate axis.
    pub fn one_dim(name: &str, axis_type: AxisType) -> Self {
        Self::new(name, &[name], axis_type)
    }
}

/// Map projected grid coordinates to longitude/latitude.
pub trait Projection: Debug {
    /// Transform `xs`/`ys` in place into longitudes/latitudes in degrees.
    fn convert_to_lon_lat(&self, xs: &mut [f64], ys: &mut [f64]) -> Result<()>;
}

/// Plain longitude/latitude grid: the identity projection.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatLonProjection;

impl Projection for LatLonProjection {
    fn convert_to_lon_lat(&self, _xs: &mut [f64], _ys: &mut [f64]) -> Result<()> {
        Ok(())
    }
}

/// A set of coordinate axes, an optional horizontal projection, and the
/// variables the system is complete for.
#[derive(Debug, Clone, Default)]
pub struct CoordinateSystem {
    axes: Vec<CoordinateAxis>,
    projection: Option<Arc<dyn Projection>>,
    variables: BTreeSet<String>,
}

impl CoordinateSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_axis(mut self, axis: CoordinateAxis) -> Self {
        self.axes.push(axis);
        self
    }

    pub fn with_projection(mut self, projection: Arc<dyn Projection>) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Declare the data variables this system describes completely.
    pub fn with_variables<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables.extend(vars.into_iter().map(Into::into));
        self
    }

    pub fn axes(&self) -> &[CoordinateAxis] {
        &self.axes
    }

    pub fn find_axis_of_type(&self, axis_type: AxisType) -> Option<&CoordinateAxis> {
        self.axes.iter().find(|a| a.axis_type == axis_type)
    }

    fn find_first(&self, types: &[AxisType]) -> Option<&CoordinateAxis> {
        types.iter().find_map(|t| self.find_axis_of_type(*t))
    }

    /// Projected x axis, or longitude on lat/lon grids.
    pub fn geo_x_axis(&self) -> Option<&CoordinateAxis> {
        self.find_first(&[AxisType::GeoX, AxisType::Lon])
    }

    /// Projected y axis, or latitude on lat/lon grids.
    pub fn geo_y_axis(&self) -> Option<&CoordinateAxis> {
        self.find_first(&[AxisType::GeoY, AxisType::Lat])
    }

    pub fn time_axis(&self) -> Option<&CoordinateAxis> {
        self.find_axis_of_type(AxisType::Time)
    }

    pub fn vertical_axis(&self) -> Option<&CoordinateAxis> {
        self.find_first(&AxisType::VERTICAL)
    }

    pub fn projection(&self) -> Option<&Arc<dyn Projection>> {
        self.projection.as_ref()
    }

    pub fn has_projection(&self) -> bool {
        self.projection.is_some()
    }

    /// Both horizontal axes exist, are 1-D and span distinct dimensions.
    pub fn is_simple_spatial_gridded(&self) -> bool {
        match (self.geo_x_axis(), self.geo_y_axis()) {
            (Some(x), Some(y)) => {
                x.shape.len() == 1 && y.shape.len() == 1 && x.shape[0] != y.shape[0]
            }
            _ => false,
        }
    }

    pub fn is_complete_for(&self, var: &str) -> bool {
        self.variables.contains(var)
    }

    pub fn is_axis(&self, var: &str) -> bool {
        self.axes.iter().any(|a| a.name == var)
    }
}

/// Source of the coordinate systems of a schema.
pub trait CoordinateSystemProvider {
    fn list_coordinate_systems(&self, schema: &Schema) -> Result<Vec<Arc<CoordinateSystem>>>;
}

/// Fixed list of coordinate systems; systems whose axes are missing from the
/// queried schema are left out.
#[derive(Debug, Clone, Default)]
pub struct StaticCoordinateSystems {
    systems: Vec<Arc<CoordinateSystem>>,
}

impl StaticCoordinateSystems {
    pub fn new(systems: Vec<CoordinateSystem>) -> Self {
        Self {
            systems: systems.into_iter().map(Arc::new).collect(),
        }
    }
}

impl CoordinateSystemProvider for StaticCoordinateSystems {
    fn list_coordinate_systems(&self, schema: &Schema) -> Result<Vec<Arc<CoordinateSystem>>> {
        Ok(self
            .systems
            .iter()
            .filter(|cs| cs.axes().iter().all(|a| schema.has_variable(&a.name)))
            .cloned()
            .collect())
    }
}

/// Name of the time axis describing `var`: the variable itself if it is a
/// time axis, else the time axis of the first system complete for it.
pub fn find_time_axis(systems: &[Arc<CoordinateSystem>], var: &str) -> Option<CoordinateAxis> {
    if let Some(axis) = systems
        .iter()
        .filter_map(|cs| cs.time_axis())
        .find(|axis| axis.name == var)
    {
        return Some(axis.clone());
    }
    systems
        .iter()
        .find(|cs| cs.is_complete_for(var))
        .and_then(|cs| cs.time_axis())
        .cloned()
}

/// Attributes naming companion variables of a data variable.
const AUXILIARY_ATTRIBUTES: &[&str] = &["coordinates", "grid_mapping", "bounds", "ancillary_variables"];

/// Extend `vars` with the coordinate axes of every system complete for one
/// of them, and with variables referenced by their auxiliary attributes.
pub fn add_auxiliary(vars: &mut BTreeSet<String>, schema: &Schema, systems: &[Arc<CoordinateSystem>]) {
    let requested: Vec<String> = vars.iter().cloned().collect();
    for var in &requested {
        for cs in systems.iter().filter(|cs| cs.is_complete_for(var)) {
            vars.extend(cs.axes().iter().map(|a| a.name.clone()));
        }
    }
    let with_axes: Vec<String> = vars.iter().cloned().collect();
    for var in &with_axes {
        for attr_name in AUXILIARY_ATTRIBUTES {
            if let Some(attr) = schema.attribute(var, attr_name) {
                vars.extend(
                    attr.as_text()
                        .split_whitespace()
                        .filter(|name| schema.has_variable(name))
                        .map(str::to_string),
                );
            }
        }
    }
}
