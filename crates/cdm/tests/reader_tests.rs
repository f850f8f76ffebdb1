//! Integration tests for schemas, readers and the collaborator helpers.

use chrono::NaiveDate;
use cdm::{
    Attribute, CdmError, CdmReader, Data, DataType, Dimension, MemoryReader, Schema, SliceBuilder,
    TimeSpec, TimeUnit, Variable,
};
use test_utils::{grid_reader, grid_value, init_tracing, time_series_reader, CountingReader};

// ============================================================================
// Schema tests
// ============================================================================

#[test]
fn test_schema_snapshot_is_independent() {
    let reader = grid_reader();
    let mut copy = reader.schema().clone();
    copy.dimension_mut("x").unwrap().length = 2;
    copy.remove_variable("temp").unwrap();

    assert_eq!(reader.schema().dimension("x").unwrap().length, 5);
    assert!(reader.schema().has_variable("temp"));
    assert!(copy.attribute("temp", "units").is_none());
}

#[test]
fn test_second_unlimited_dimension_rejected() {
    let mut schema = Schema::new();
    schema.add_dimension(Dimension::unlimited("time", 1)).unwrap();
    assert!(schema.add_dimension(Dimension::unlimited("record", 1)).is_err());
}

#[test]
fn test_unlimited_dimension_must_come_first() {
    let mut schema = Schema::new();
    schema.add_dimension(Dimension::unlimited("time", 2)).unwrap();
    schema.add_dimension(Dimension::new("x", 3)).unwrap();
    let result = schema.add_variable(Variable::new("v", DataType::Float, &["x", "time"]));
    assert!(result.is_err());
}

#[test]
fn test_set_data_checks_size() {
    let reader = grid_reader();
    let mut schema = reader.schema().clone();
    let result = schema.set_data("lat", Some(Data::from(vec![1.0f64, 2.0])));
    assert!(matches!(result, Err(CdmError::ShapeMismatch(_))));
}

#[test]
fn test_find_variables_by_attribute() {
    let schema = grid_reader().schema().clone();
    assert_eq!(schema.find_variables("units", Some("degrees_north")), vec!["lat"]);
    assert_eq!(schema.find_variables("coordinates", None), vec!["temp"]);
}

#[test]
fn test_fill_value_defaults() {
    let mut schema = Schema::new();
    schema.add_dimension(Dimension::new("x", 1)).unwrap();
    schema.add_variable(Variable::new("f", DataType::Float, &["x"])).unwrap();
    schema.add_variable(Variable::new("s", DataType::Short, &["x"])).unwrap();
    schema.add_attribute("s", Attribute::number("_FillValue", -1.0)).unwrap();

    assert!(schema.fill_value("f").is_nan());
    assert_eq!(schema.fill_value("s"), -1.0);
}

// ============================================================================
// Reader tests
// ============================================================================

#[test]
fn test_record_reads() {
    init_tracing();
    let reader = grid_reader();
    let record = reader.data_slice("temp", 2).unwrap();
    assert_eq!(record.len(), 20);
    assert_eq!(record.get(19), Some(grid_value(2, 3, 4) as f64));

    // variables without record dimension return everything
    let lat = reader.data_slice("lat", 2).unwrap();
    assert_eq!(lat.len(), 4);
}

#[test]
fn test_sub_region_read() {
    let reader = grid_reader();
    let mut sb = SliceBuilder::new(reader.schema(), "temp").unwrap();
    sb.set_start_and_size("time", 1, 2).unwrap();
    sb.set_start_and_size("y", 2, 1).unwrap();
    sb.set_start_and_size("x", 3, 2).unwrap();

    let data = reader.data_slice_sb("temp", &sb).unwrap();
    let expected: Vec<f32> = vec![
        grid_value(1, 2, 3),
        grid_value(1, 2, 4),
        grid_value(2, 2, 3),
        grid_value(2, 2, 4),
    ];
    assert_eq!(data, Data::from(expected));
}

#[test]
fn test_slice_builder_bounds() {
    let reader = grid_reader();
    let mut sb = SliceBuilder::new(reader.schema(), "temp").unwrap();
    assert_eq!(sb.unlimited_dimension(), Some("time"));
    assert_eq!(sb.element_count(), 60);
    assert!(matches!(
        sb.set_start_and_size("x", 4, 2),
        Err(CdmError::OutOfBounds(_))
    ));
    assert!(matches!(
        sb.set_start_and_size("z", 0, 1),
        Err(CdmError::NotFound { .. })
    ));
}

#[test]
fn test_full_data_read_goes_through_records() {
    let reader = CountingReader::new(time_series_reader());
    let data = reader.data("v").unwrap();
    assert_eq!(data.as_f64(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
}

#[test]
fn test_scaled_data_applies_attributes() {
    let mut schema = Schema::new();
    schema.add_dimension(Dimension::new("x", 3)).unwrap();
    schema.add_variable(Variable::new("p", DataType::Short, &["x"])).unwrap();
    schema.add_attribute("p", Attribute::number("scale_factor", 0.1)).unwrap();
    schema.add_attribute("p", Attribute::number("add_offset", 1000.0)).unwrap();
    schema.add_attribute("p", Attribute::number("_FillValue", -32767.0)).unwrap();
    schema.add_attribute("p", Attribute::text("units", "hPa")).unwrap();
    schema
        .set_data("p", Some(Data::from(vec![0i16, 125, -32767])))
        .unwrap();
    let reader = MemoryReader::new(schema);

    let scaled = reader.scaled_data("p").unwrap().as_f64();
    assert!((scaled[1] - 1012.5).abs() < 1e-9);
    assert!(scaled[2].is_nan());

    let pa = reader.scaled_data_in_unit("p", "Pa").unwrap().as_f64();
    assert!((pa[0] - 100_000.0).abs() < 1e-6);
}

#[test]
fn test_missing_variable_is_not_found() {
    let reader = grid_reader();
    let err = reader.data_slice("nope", 0).unwrap_err();
    assert!(matches!(err, CdmError::NotFound { kind: "variable", .. }));
}

// ============================================================================
// Time helpers
// ============================================================================

#[test]
fn test_time_unit_roundtrip() {
    let unit = TimeUnit::parse("hours since 2024-01-01 00:00:00").unwrap();
    let t = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(6, 0, 0)
        .unwrap();
    assert_eq!(unit.from_datetime(t), 30.0);
    assert_eq!(unit.to_datetime(30.0), t);
}

#[test]
fn test_time_spec_bounded_by_axis() {
    let unit = TimeUnit::parse("seconds since 1970-01-01 00:00:00").unwrap();
    let spec = TimeSpec::parse(
        "0,15,...,x;relativeUnit=seconds",
        unit.to_datetime(0.0),
        unit.to_datetime(40.0),
    )
    .unwrap();
    let values: Vec<f64> = spec
        .time_steps()
        .iter()
        .map(|t| spec.unit().from_datetime(*t))
        .collect();
    assert_eq!(values, vec![0.0, 15.0, 30.0, 40.0]);
}

#[test]
fn test_time_spec_rejects_garbage() {
    let unit = TimeUnit::parse("seconds since 1970-01-01 00:00:00").unwrap();
    let (start, end) = (unit.to_datetime(0.0), unit.to_datetime(40.0));
    assert!(matches!(
        TimeSpec::parse("yesterday", start, end),
        Err(CdmError::InvalidTimeSpec(_))
    ));
    assert!(TimeSpec::parse("0,10;relativeUnit=fortnights", start, end).is_err());
}

// ============================================================================
// Serialization
// ============================================================================

#[test]
fn test_write_big_endian() {
    let data = Data::from(vec![1i16, -2]);
    let mut out = Vec::new();
    data.write_to(&mut out).unwrap();
    assert_eq!(out, vec![0x00, 0x01, 0xff, 0xfe]);
}
