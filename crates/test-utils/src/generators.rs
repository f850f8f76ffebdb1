//! Synthetic datasets for exercising readers and stages.
//!
//! Values follow predictable patterns so tests can compute the expected
//! result of any read directly from indices.

use std::rc::Rc;
use std::sync::Arc;

use cdm::{
    Attribute, AxisType, CoordinateAxis, CoordinateSystem, Data, DataType, Dimension,
    LatLonProjection, MemoryReader, ReaderRef, Schema, StaticCoordinateSystems, Variable,
};

/// Unit of every generated time axis.
pub const TIME_UNIT: &str = "seconds since 1970-01-01 00:00:00";

/// Value of the grid variable `temp` at `(t, y, x)`.
///
/// ```
/// use test_utils::grid_value;
///
/// assert_eq!(grid_value(1, 2, 3), 10203.0);
/// ```
pub fn grid_value(t: usize, y: usize, x: usize) -> f32 {
    (t * 10_000 + y * 100 + x) as f32
}

/// Time series: unlimited `time` with values `times` (seconds since the
/// epoch) and a float variable `v` of the same length with values `values`.
pub fn time_series_schema(times: &[f64], values: &[f32]) -> Schema {
    assert_eq!(times.len(), values.len(), "one value per time step");
    let mut schema = Schema::new();
    schema
        .add_dimension(Dimension::unlimited("time", times.len()))
        .unwrap();
    schema
        .add_variable(Variable::new("time", DataType::Double, &["time"]))
        .unwrap();
    schema.add_attribute("time", Attribute::text("units", TIME_UNIT)).unwrap();
    schema
        .add_attribute("time", Attribute::text("standard_name", "time"))
        .unwrap();
    schema.set_data("time", Some(Data::from(times.to_vec()))).unwrap();

    schema
        .add_variable(Variable::new("v", DataType::Float, &["time"]))
        .unwrap();
    schema.set_data("v", Some(Data::from(values.to_vec()))).unwrap();
    schema
}

/// The time series `[0, 10, 20, 30, 40]` s with `v = [1, 2, 3, 4, 5]`.
pub fn time_series_reader() -> ReaderRef {
    Rc::new(MemoryReader::new(time_series_schema(
        &[0.0, 10.0, 20.0, 30.0, 40.0],
        &[1.0, 2.0, 3.0, 4.0, 5.0],
    )))
}

/// Coordinate systems of [`time_series_schema`].
pub fn time_series_coordinate_systems() -> StaticCoordinateSystems {
    StaticCoordinateSystems::new(vec![CoordinateSystem::new()
        .with_axis(CoordinateAxis::one_dim("time", AxisType::Time))
        .with_variables(["v"])])
}

/// Lat/lon grid dataset.
///
/// Dimensions `time` (unlimited), `y`, `x`; coordinates `time(time)`,
/// `lat(y)`, `lon(x)`; data variable `temp(time, y, x)` holding
/// [`grid_value`].
pub fn grid_schema(times: &[f64], lats: &[f64], lons: &[f64]) -> Schema {
    let (nt, ny, nx) = (times.len(), lats.len(), lons.len());
    let mut schema = Schema::new();
    schema.add_dimension(Dimension::unlimited("time", nt)).unwrap();
    schema.add_dimension(Dimension::new("y", ny)).unwrap();
    schema.add_dimension(Dimension::new("x", nx)).unwrap();

    let coords: [(&str, &str, &str, &[f64]); 3] = [
        ("time", "time", TIME_UNIT, times),
        ("lat", "y", "degrees_north", lats),
        ("lon", "x", "degrees_east", lons),
    ];
    for (name, dim, units, values) in coords {
        schema
            .add_variable(Variable::new(name, DataType::Double, &[dim]))
            .unwrap();
        schema.add_attribute(name, Attribute::text("units", units)).unwrap();
        schema.set_data(name, Some(Data::from(values.to_vec()))).unwrap();
    }

    schema
        .add_variable(Variable::new("temp", DataType::Float, &["time", "y", "x"]))
        .unwrap();
    schema.add_attribute("temp", Attribute::text("units", "K")).unwrap();
    schema
        .add_attribute("temp", Attribute::text("coordinates", "lat lon"))
        .unwrap();
    let mut values = Vec::with_capacity(nt * ny * nx);
    for t in 0..nt {
        for y in 0..ny {
            for x in 0..nx {
                values.push(grid_value(t, y, x));
            }
        }
    }
    schema.set_data("temp", Some(Data::from(values))).unwrap();
    schema
}

/// A 3 x 4 x 5 grid: hourly times, latitudes 50..=65 by 5, longitudes
/// 0..=20 by 5.
pub fn grid_reader() -> ReaderRef {
    Rc::new(MemoryReader::new(grid_schema(
        &[0.0, 3600.0, 7200.0],
        &[50.0, 55.0, 60.0, 65.0],
        &[0.0, 5.0, 10.0, 15.0, 20.0],
    )))
}

/// Coordinate systems of [`grid_schema`] with a lat/lon projection.
pub fn grid_coordinate_systems() -> StaticCoordinateSystems {
    StaticCoordinateSystems::new(vec![CoordinateSystem::new()
        .with_axis(CoordinateAxis::new("lon", &["x"], AxisType::Lon))
        .with_axis(CoordinateAxis::new("lat", &["y"], AxisType::Lat))
        .with_axis(CoordinateAxis::one_dim("time", AxisType::Time))
        .with_projection(Arc::new(LatLonProjection))
        .with_variables(["temp"])])
}

/// Observations with CF status flags.
///
/// `air_temperature(time, station)` (standard name `air_temperature`,
/// fill `-999`) and `air_temperature_qc(time, station)` (short flags with
/// `flag_values = [0, 1, 2, 3, 9]` and standard name
/// `air_temperature status_flag`).
pub fn quality_schema(temps: &[f32], flags: &[i16], stations: usize) -> Schema {
    assert_eq!(temps.len(), flags.len(), "one flag per value");
    let records = temps.len() / stations.max(1);
    let mut schema = Schema::new();
    schema.add_dimension(Dimension::unlimited("time", records)).unwrap();
    schema.add_dimension(Dimension::new("station", stations)).unwrap();

    schema
        .add_variable(Variable::new("air_temperature", DataType::Float, &["time", "station"]))
        .unwrap();
    schema
        .add_attribute("air_temperature", Attribute::text("standard_name", "air_temperature"))
        .unwrap();
    schema
        .add_attribute("air_temperature", Attribute::number("_FillValue", -999.0))
        .unwrap();
    schema
        .set_data("air_temperature", Some(Data::from(temps.to_vec())))
        .unwrap();

    schema
        .add_variable(Variable::new("air_temperature_qc", DataType::Short, &["time", "station"]))
        .unwrap();
    schema
        .add_attribute(
            "air_temperature_qc",
            Attribute::text("standard_name", "air_temperature status_flag"),
        )
        .unwrap();
    schema
        .add_attribute(
            "air_temperature_qc",
            Attribute::values("flag_values", vec![0i16, 1, 2, 3, 9]),
        )
        .unwrap();
    schema
        .set_data("air_temperature_qc", Some(Data::from(flags.to_vec())))
        .unwrap();
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdm::CdmReader;

    #[test]
    fn test_time_series_reader() {
        let reader = time_series_reader();
        assert_eq!(reader.schema().dimension("time").unwrap().length, 5);
        assert_eq!(reader.data_slice("v", 2).unwrap(), Data::from(vec![3.0f32]));
    }

    #[test]
    fn test_grid_reader_layout() {
        let reader = grid_reader();
        let record = reader.data_slice("temp", 1).unwrap();
        assert_eq!(record.len(), 20);
        assert_eq!(record.get(0), Some(10000.0));
        // y = 1, x = 2
        assert_eq!(record.get(7), Some(10102.0));
    }
}
