//! Integration tests for dimension and variable extraction.

use std::collections::BTreeSet;
use std::rc::Rc;

use chrono::{Duration, NaiveDateTime};
use cdm::{
    Attribute, AxisType, CdmError, CdmReader, CoordinateAxis, CoordinateSystem, Data, DataType,
    Dimension, MemoryReader, ReaderRef, Schema, SliceBuilder, StaticCoordinateSystems, Variable,
};
use cdm_transform::Extractor;
use test_utils::{
    bbox, grid_coordinate_systems, grid_reader, grid_schema, grid_value, init_tracing,
    time_series_reader, CountingReader,
};

fn grid_extractor() -> Extractor {
    Extractor::new(grid_reader()).with_coordinate_systems(Rc::new(grid_coordinate_systems()))
}

fn epoch_plus(seconds: i64) -> NaiveDateTime {
    NaiveDateTime::default() + Duration::seconds(seconds)
}

/// Expected `temp` values of the full reduced view.
fn gather(times: &[usize], ys: &[usize], xs: &[usize]) -> Data {
    let mut values = Vec::new();
    for &t in times {
        for &y in ys {
            for &x in xs {
                values.push(grid_value(t, y, x));
            }
        }
    }
    Data::from(values)
}

// ============================================================================
// reduce_dimension tests
// ============================================================================

#[test]
fn test_reduce_time_series_scenario() {
    init_tracing();
    let mut extractor = Extractor::new(time_series_reader());
    extractor.reduce_dimension("time", [1, 3]).unwrap();

    assert_eq!(extractor.schema().dimension("time").unwrap().length, 2);
    assert_eq!(extractor.data_slice("v", 0).unwrap(), Data::from(vec![2.0f32]));
    assert_eq!(extractor.data_slice("v", 1).unwrap(), Data::from(vec![4.0f32]));
    assert_eq!(extractor.data_slice("time", 1).unwrap(), Data::from(vec![30.0f64]));
}

#[test]
fn test_reduce_out_of_bounds_leaves_dimension() {
    let mut extractor = Extractor::new(time_series_reader());
    let result = extractor.reduce_dimension("time", [1, 5]);

    assert!(matches!(result, Err(CdmError::OutOfBounds(_))));
    assert_eq!(extractor.schema().dimension("time").unwrap().length, 5);
    assert!(extractor.retained_indices("time").is_none());
    assert_eq!(extractor.data_slice("v", 4).unwrap(), Data::from(vec![5.0f32]));
}

#[test]
fn test_reduce_unknown_dimension() {
    let mut extractor = Extractor::new(time_series_reader());
    assert!(matches!(
        extractor.reduce_dimension("depth", [0]),
        Err(CdmError::NotFound { .. })
    ));
}

#[test]
fn test_reduce_deduplicates_and_sorts() {
    let mut extractor = Extractor::new(time_series_reader());
    extractor.reduce_dimension("time", [4, 0, 4, 2]).unwrap();
    assert_eq!(extractor.retained_indices("time"), Some(&[0, 2, 4][..]));
    assert_eq!(extractor.data("v").unwrap(), Data::from(vec![1.0f32, 3.0, 5.0]));
}

#[test]
fn test_repeated_reduction_composes() {
    let mut extractor = Extractor::new(time_series_reader());
    extractor.reduce_dimension("time", [1, 2, 3, 4]).unwrap();
    extractor.reduce_dimension("time", [0, 2]).unwrap();

    assert_eq!(extractor.retained_indices("time"), Some(&[1, 3][..]));
    assert_eq!(extractor.data("v").unwrap(), Data::from(vec![2.0f32, 4.0]));
    // indices refer to the current view
    assert!(extractor.reduce_dimension("time", [2]).is_err());
}

#[test]
fn test_reduce_range_and_start_end() {
    let mut extractor = grid_extractor();
    extractor.reduce_dimension_range("x", 1, 3).unwrap();
    assert_eq!(extractor.retained_indices("x"), Some(&[1, 2, 3][..]));

    let mut extractor = grid_extractor();
    extractor.reduce_dimension_start_end("x", 1, 0).unwrap();
    assert_eq!(extractor.retained_indices("x"), Some(&[1, 2, 3, 4][..]));

    let mut extractor = grid_extractor();
    extractor.reduce_dimension_start_end("x", 1, -1).unwrap();
    assert_eq!(extractor.retained_indices("x"), Some(&[1, 2, 3][..]));

    let mut extractor = grid_extractor();
    extractor.reduce_dimension_start_end("x", 2, 2).unwrap();
    assert_eq!(extractor.retained_indices("x"), Some(&[2][..]));

    let mut extractor = grid_extractor();
    assert!(extractor.reduce_dimension_start_end("x", 3, 1).is_err());
}

#[test]
fn test_empty_reduction_gives_zero_length() {
    let mut extractor = grid_extractor();
    extractor.reduce_dimension("x", []).unwrap();

    assert_eq!(extractor.schema().dimension("x").unwrap().length, 0);
    assert!(extractor.data_slice("temp", 0).unwrap().is_empty());
    assert!(extractor.data("lon").unwrap().is_empty());
}

// ============================================================================
// Reduced reads
// ============================================================================

#[test]
fn test_reduced_read_equals_gather() {
    let mut extractor = grid_extractor();
    extractor.reduce_dimension("x", [0, 2, 3]).unwrap();
    extractor.reduce_dimension("y", [1, 3]).unwrap();
    extractor.reduce_dimension("time", [0, 2]).unwrap();

    let data = extractor.data("temp").unwrap();
    assert_eq!(data, gather(&[0, 2], &[1, 3], &[0, 2, 3]));

    for (pos, t) in [(0, 0), (1, 2)] {
        let record = extractor.data_slice("temp", pos).unwrap();
        assert_eq!(record, gather(&[t], &[1, 3], &[0, 2, 3]));
    }
}

#[test]
fn test_reduced_window_equals_gather() {
    let mut extractor = grid_extractor();
    extractor.reduce_dimension("x", [0, 2, 3]).unwrap();
    extractor.reduce_dimension("y", [1, 3]).unwrap();

    let mut sb = SliceBuilder::new(extractor.schema(), "temp").unwrap();
    sb.set_start_and_size("time", 1, 2).unwrap();
    sb.set_start_and_size("y", 1, 1).unwrap();
    sb.set_start_and_size("x", 1, 2).unwrap();

    let data = extractor.data_slice_sb("temp", &sb).unwrap();
    assert_eq!(data, gather(&[1, 2], &[3], &[2, 3]));
}

#[test]
fn test_window_outside_reduced_dimension() {
    let mut extractor = grid_extractor();
    extractor.reduce_dimension("x", [0, 2]).unwrap();
    let mut sb = SliceBuilder::new(extractor.schema(), "temp").unwrap();
    assert_eq!(sb.max_dimension_sizes(), &[3, 4, 2]);
    assert!(sb.set_start_and_size("x", 1, 2).is_err());
}

#[test]
fn test_contiguous_indices_merge_into_one_read() {
    let counting = Rc::new(CountingReader::new(grid_reader()));
    let upstream: ReaderRef = counting.clone();
    let mut extractor = Extractor::new(upstream);
    extractor.reduce_dimension("x", [1, 2, 3]).unwrap();

    counting.reset();
    let record = extractor.data_slice("temp", 1).unwrap();
    assert_eq!(record, gather(&[1], &[0, 1, 2, 3], &[1, 2, 3]));
    assert_eq!(
        counting.region_calls("temp"),
        vec![(vec![1, 0, 1], vec![1, 4, 3])]
    );
}

#[test]
fn test_split_runs_keep_row_major_order() {
    let counting = Rc::new(CountingReader::new(grid_reader()));
    let upstream: ReaderRef = counting.clone();
    let mut extractor = Extractor::new(upstream);
    extractor.reduce_dimension("x", [0, 1, 4]).unwrap();

    counting.reset();
    let record = extractor.data_slice("temp", 0).unwrap();
    assert_eq!(record, gather(&[0], &[0, 1, 2, 3], &[0, 1, 4]));
    // two runs of x, split once per y row
    assert_eq!(counting.region_calls("temp").len(), 8);
}

#[test]
fn test_cached_data_answers_unaffected_variables() {
    let counting = Rc::new(CountingReader::new(grid_reader()));
    let upstream: ReaderRef = counting.clone();
    let mut extractor = Extractor::new(upstream);
    extractor.reduce_dimension("x", [1]).unwrap();

    counting.reset();
    let lat = extractor.data("lat").unwrap();
    assert_eq!(lat, Data::from(vec![50.0f64, 55.0, 60.0, 65.0]));
    assert!(counting.calls().is_empty());

    let lon = extractor.data("lon").unwrap();
    assert_eq!(lon, Data::from(vec![5.0f64]));
    assert!(!counting.calls().is_empty());
}

#[test]
fn test_single_cached_record_serves_every_record() {
    let mut schema = Schema::new();
    schema.add_dimension(Dimension::unlimited("time", 3)).unwrap();
    schema.add_dimension(Dimension::new("x", 2)).unwrap();
    schema.add_dimension(Dimension::new("y", 3)).unwrap();
    schema
        .add_variable(Variable::new("v", DataType::Short, &["time", "x"]))
        .unwrap();
    schema.set_data("v", Some(Data::from(vec![7i16, 9]))).unwrap();
    schema
        .add_variable(Variable::new("w", DataType::Float, &["y"]))
        .unwrap();
    schema
        .set_data("w", Some(Data::from(vec![1.0f32, 2.0, 3.0])))
        .unwrap();
    let upstream: ReaderRef = Rc::new(MemoryReader::new(schema));

    let mut extractor = Extractor::new(upstream.clone());
    extractor.reduce_dimension("y", [1, 2]).unwrap();

    let expected = Data::from(vec![7i16, 9, 7, 9, 7, 9]);
    assert_eq!(upstream.data("v").unwrap(), expected);
    assert_eq!(extractor.data("v").unwrap(), expected);
    assert_eq!(extractor.data_slice("v", 2).unwrap(), Data::from(vec![7i16, 9]));
    assert_eq!(extractor.data("w").unwrap(), Data::from(vec![2.0f32, 3.0]));
}

// ============================================================================
// Variable selection
// ============================================================================

#[test]
fn test_remove_variable() {
    let mut extractor = grid_extractor();
    extractor.remove_variable("temp").unwrap();
    assert!(!extractor.schema().has_variable("temp"));
    assert!(extractor.schema().attribute("temp", "units").is_none());
    assert!(matches!(
        extractor.remove_variable("temp"),
        Err(CdmError::NotFound { .. })
    ));
}

#[test]
fn test_select_variables_with_auxiliary() {
    let mut extractor = grid_extractor();
    let keep: BTreeSet<String> = ["temp".to_string(), "missing".to_string()].into();
    extractor.select_variables(keep, true).unwrap();

    let mut names = extractor.schema().variable_names();
    names.sort();
    assert_eq!(names, vec!["lat", "lon", "temp", "time"]);
}

#[test]
fn test_select_variables_without_auxiliary() {
    let mut extractor = grid_extractor();
    extractor
        .select_variables(["lat".to_string()].into(), false)
        .unwrap();
    assert_eq!(extractor.schema().variable_names(), vec!["lat"]);
    assert_eq!(extractor.data("lat").unwrap().len(), 4);
}

// ============================================================================
// Coordinate reductions
// ============================================================================

#[test]
fn test_reduce_time_by_calendar() {
    let mut extractor = grid_extractor();
    extractor.reduce_time(epoch_plus(3600), epoch_plus(7200)).unwrap();

    assert_eq!(extractor.retained_indices("time"), Some(&[1, 2][..]));
    assert_eq!(extractor.data("time").unwrap(), Data::from(vec![3600.0f64, 7200.0]));
}

#[test]
fn test_reduce_axes_includes_boundaries() {
    let mut extractor = grid_extractor();
    extractor
        .reduce_axes(&[AxisType::Lat], "degrees_north", 55.0, 60.0)
        .unwrap();
    assert_eq!(extractor.retained_indices("y"), Some(&[1, 2][..]));
}

#[test]
fn test_reduce_axes_outside_range() {
    let mut extractor = grid_extractor();
    extractor
        .reduce_axes(&[AxisType::Lon], "degrees_east", 30.0, 40.0)
        .unwrap();
    assert_eq!(extractor.schema().dimension("x").unwrap().length, 0);
}

#[test]
fn test_reduce_axes_descending() {
    let schema = grid_schema(&[0.0], &[65.0, 60.0, 55.0, 50.0], &[0.0, 5.0]);
    let upstream: ReaderRef = Rc::new(MemoryReader::new(schema));
    let mut extractor =
        Extractor::new(upstream).with_coordinate_systems(Rc::new(grid_coordinate_systems()));
    extractor
        .reduce_axes(&[AxisType::Lat], "degrees_north", 52.0, 61.0)
        .unwrap();

    assert_eq!(extractor.retained_indices("y"), Some(&[1, 2][..]));
    assert_eq!(extractor.data("lat").unwrap(), Data::from(vec![60.0f64, 55.0]));
}

fn pressure_reader() -> ReaderRef {
    let mut schema = Schema::new();
    schema.add_dimension(Dimension::new("pressure", 4)).unwrap();
    schema
        .add_variable(Variable::new("pressure", DataType::Double, &["pressure"]))
        .unwrap();
    schema
        .add_attribute("pressure", Attribute::text("units", "hPa"))
        .unwrap();
    schema
        .set_data("pressure", Some(Data::from(vec![1000.0f64, 850.0, 500.0, 250.0])))
        .unwrap();
    schema
        .add_variable(Variable::new("t", DataType::Float, &["pressure"]))
        .unwrap();
    schema
        .set_data("t", Some(Data::from(vec![288.0f32, 280.0, 250.0, 220.0])))
        .unwrap();
    Rc::new(MemoryReader::new(schema))
}

#[test]
fn test_reduce_vertical_axis_with_unit_conversion() {
    let systems = StaticCoordinateSystems::new(vec![CoordinateSystem::new()
        .with_axis(CoordinateAxis::one_dim("pressure", AxisType::Pressure))
        .with_variables(["t"])]);
    let mut extractor = Extractor::new(pressure_reader()).with_coordinate_systems(Rc::new(systems));
    extractor.reduce_vertical_axis("Pa", 40_000.0, 90_000.0).unwrap();

    assert_eq!(extractor.retained_indices("pressure"), Some(&[1, 2][..]));
    assert_eq!(extractor.data("t").unwrap(), Data::from(vec![280.0f32, 250.0]));
}

#[test]
fn test_bounding_box() {
    let mut extractor = grid_extractor();
    let (south, north, west, east) = bbox::GRID_INNER;
    extractor
        .reduce_lat_lon_bounding_box(south, north, west, east)
        .unwrap();

    assert_eq!(extractor.retained_indices("y"), Some(&[1, 2][..]));
    assert_eq!(extractor.retained_indices("x"), Some(&[1, 2, 3][..]));
    assert_eq!(
        extractor.data_slice("temp", 2).unwrap(),
        gather(&[2], &[1, 2], &[1, 2, 3])
    );
}

#[test]
fn test_bounding_box_intersects_earlier_reduction() {
    let mut extractor = grid_extractor();
    extractor.reduce_dimension("x", [0, 1, 2]).unwrap();
    let (south, north, west, east) = bbox::GRID_INNER;
    extractor
        .reduce_lat_lon_bounding_box(south, north, west, east)
        .unwrap();
    assert_eq!(extractor.retained_indices("x"), Some(&[1, 2][..]));
}

#[test]
fn test_bounding_box_across_antimeridian() {
    let schema = grid_schema(&[0.0], &[0.0, 10.0, 20.0], &[160.0, 170.0, -170.0, -160.0, 0.0]);
    let upstream: ReaderRef = Rc::new(MemoryReader::new(schema));
    let mut extractor =
        Extractor::new(upstream).with_coordinate_systems(Rc::new(grid_coordinate_systems()));
    extractor
        .reduce_lat_lon_bounding_box(-5.0, 5.0, 165.0, -165.0)
        .unwrap();

    assert_eq!(extractor.retained_indices("x"), Some(&[1, 2][..]));
    assert_eq!(extractor.retained_indices("y"), Some(&[0][..]));
}

#[test]
fn test_bounding_box_keeps_antimeridian_boundary() {
    let schema = grid_schema(&[0.0], &[-5.0, 0.0, 5.0], &[160.0, 170.0, 180.0]);
    let upstream: ReaderRef = Rc::new(MemoryReader::new(schema));
    let mut extractor =
        Extractor::new(upstream).with_coordinate_systems(Rc::new(grid_coordinate_systems()));
    extractor
        .reduce_lat_lon_bounding_box(-5.0, 5.0, 170.0, 180.0)
        .unwrap();

    assert_eq!(extractor.retained_indices("x"), Some(&[1, 2][..]));
    assert_eq!(extractor.retained_indices("y"), Some(&[0, 1, 2][..]));
    assert_eq!(extractor.data("lon").unwrap(), Data::from(vec![170.0f64, 180.0]));
}

#[test]
fn test_bounding_box_validation() {
    let mut extractor = grid_extractor();
    let (south, north, west, east) = bbox::INVALID;
    assert!(matches!(
        extractor.reduce_lat_lon_bounding_box(south, north, west, east),
        Err(CdmError::InvalidArgument(_))
    ));
    assert!(extractor
        .reduce_lat_lon_bounding_box(-95.0, 0.0, 0.0, 10.0)
        .is_err());
    assert!(extractor
        .reduce_lat_lon_bounding_box(0.0, 10.0, 0.0, 181.0)
        .is_err());
    assert!(extractor.retained_indices("x").is_none());
}

#[test]
fn test_global_bounding_box_keeps_everything() {
    let mut extractor = grid_extractor();
    let (south, north, west, east) = bbox::GLOBAL;
    extractor
        .reduce_lat_lon_bounding_box(south, north, west, east)
        .unwrap();
    assert_eq!(extractor.schema().dimension("x").unwrap().length, 5);
    assert_eq!(extractor.schema().dimension("y").unwrap().length, 4);
}
