//! The reader capability shared by format backends and transformation stages.

use std::rc::Rc;

use crate::data::Data;
use crate::error::{CdmError, Result};
use crate::schema::{Schema, Variable};
use crate::slice::SliceBuilder;
use crate::units::{UnitConverter, Units};

/// Shared handle to an upstream reader.
///
/// Readers are driven synchronously from one thread; stages hold their
/// upstream through this handle and call it one request at a time.
pub type ReaderRef = Rc<dyn CdmReader>;

/// Read access to a dataset described by a [`Schema`].
///
/// Record-wise reads (`data_slice`) address the unlimited dimension; a
/// variable without unlimited dimension returns all of its data for any
/// position. An empty buffer means "no data stored" for that record.
pub trait CdmReader {
    /// The schema of the view this reader presents.
    fn schema(&self) -> &Schema;

    /// Read one record of a variable.
    fn data_slice(&self, var_name: &str, unlim_pos: usize) -> Result<Data>;

    /// Read a rectangular sub-region of a variable.
    ///
    /// The default assembles the region record by record from
    /// [`CdmReader::data_slice`]; records without data stay at the fill value.
    fn data_slice_sb(&self, var_name: &str, sb: &SliceBuilder) -> Result<Data> {
        let schema = self.schema();
        let var = schema.variable(var_name)?;
        let max_sizes = sb.max_dimension_sizes();
        let starts = sb.dimension_starts();
        let sizes = sb.dimension_sizes();

        if sb.unlimited_dimension().is_none() {
            let data = self.data_slice(var_name, 0)?;
            if data.is_empty() {
                return Ok(Data::new(var.data_type, sb.element_count(), schema.fill_value(var_name)));
            }
            return data.slice(max_sizes, starts, sizes);
        }

        // the unlimited dimension is always the first shape entry
        let record_count: usize = sizes[1..].iter().product();
        let mut result = Data::new(var.data_type, sb.element_count(), schema.fill_value(var_name));
        let mut offset = 0;
        for pos in starts[0]..starts[0] + sizes[0] {
            let record = self.data_slice(var_name, pos)?;
            if !record.is_empty() {
                let part = record.slice(&max_sizes[1..], &starts[1..], &sizes[1..])?;
                result.set_values(offset, &part)?;
            }
            offset += record_count;
        }
        Ok(result)
    }

    /// Read the complete variable.
    fn data(&self, var_name: &str) -> Result<Data> {
        let sb = SliceBuilder::new(self.schema(), var_name)?;
        if sb.unlimited_dimension().is_none() {
            return self.data_slice(var_name, 0);
        }
        self.data_slice_sb(var_name, &sb)
    }

    /// Read the complete variable as doubles with fill values replaced by
    /// NaN and `scale_factor`/`add_offset` applied.
    fn scaled_data(&self, var_name: &str) -> Result<Data> {
        let raw = self.data(var_name)?;
        let schema = self.schema();
        let fill = schema.fill_value(var_name);
        let scale = schema.scale_factor(var_name);
        let offset = schema.add_offset(var_name);
        let values: Vec<f64> = raw
            .as_f64()
            .into_iter()
            .map(|v| if v == fill || v.is_nan() { f64::NAN } else { v * scale + offset })
            .collect();
        Ok(Data::from(values))
    }

    /// Like [`CdmReader::scaled_data`], converted into `unit`.
    fn scaled_data_in_unit(&self, var_name: &str, unit: &str) -> Result<Data> {
        let scaled = self.scaled_data(var_name)?;
        let var_unit = self.schema().units(var_name);
        let (slope, offset) = Units.convert(&var_unit, unit)?;
        Ok(Data::from(
            scaled
                .as_f64()
                .into_iter()
                .map(|v| v * slope + offset)
                .collect::<Vec<f64>>(),
        ))
    }
}

/// Answer a record read from a variable's materialised data.
pub fn data_slice_from_memory(schema: &Schema, var: &Variable, unlim_pos: usize) -> Result<Data> {
    let data = var
        .data()
        .ok_or_else(|| CdmError::invalid_argument(format!("variable '{}' has no data in memory", var.name)))?;
    if !schema.has_unlimited_dim(var) || data.is_empty() {
        return Ok(data.clone());
    }
    let lengths = schema.shape_lengths(&var.name)?;
    if unlim_pos >= lengths[0] {
        return Err(CdmError::out_of_bounds(format!(
            "record {} of '{}' with {} records",
            unlim_pos, var.name, lengths[0]
        )));
    }
    let record_count: usize = lengths[1..].iter().product();
    if data.len() == record_count && lengths[0] != 1 {
        // a single stored record stands for every position
        return Ok(data.clone());
    }
    data.slice(
        &[lengths[0], record_count],
        &[unlim_pos, 0],
        &[1, record_count],
    )
}

/// Answer a sub-region read from a variable's materialised data. A single
/// stored record of a variable with the unlimited dimension is repeated for
/// every requested record.
pub fn data_slice_sb_from_memory(schema: &Schema, var: &Variable, sb: &SliceBuilder) -> Result<Data> {
    let data = var
        .data()
        .ok_or_else(|| CdmError::invalid_argument(format!("variable '{}' has no data in memory", var.name)))?;
    let max_sizes = sb.max_dimension_sizes();
    let starts = sb.dimension_starts();
    let sizes = sb.dimension_sizes();
    let full: usize = max_sizes.iter().product();
    if data.is_empty() {
        return Ok(data.clone());
    }
    if data.len() == full || !schema.has_unlimited_dim(var) {
        return data.slice(max_sizes, starts, sizes);
    }

    let record = data.slice(&max_sizes[1..], &starts[1..], &sizes[1..])?;
    let mut result = Data::new(var.data_type, sb.element_count(), schema.fill_value(&var.name));
    let mut offset = 0;
    for _ in 0..sizes[0] {
        result.set_values(offset, &record)?;
        offset += record.len();
    }
    Ok(result)
}

/// Reader over a fully materialised schema.
#[derive(Debug, Clone)]
pub struct MemoryReader {
    schema: Schema,
}

impl MemoryReader {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn into_ref(self) -> ReaderRef {
        Rc::new(self)
    }
}

impl CdmReader for MemoryReader {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn data_slice(&self, var_name: &str, unlim_pos: usize) -> Result<Data> {
        let var = self.schema.variable(var_name)?;
        if !var.has_data() {
            tracing::debug!(variable = var_name, "no data in memory reader");
            return Ok(Data::empty(var.data_type));
        }
        data_slice_from_memory(&self.schema, var, unlim_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataType;
    use crate::schema::{Attribute, Dimension};

    fn reader() -> MemoryReader {
        let mut schema = Schema::new();
        schema.add_dimension(Dimension::unlimited("time", 3)).unwrap();
        schema.add_dimension(Dimension::new("x", 2)).unwrap();
        schema
            .add_variable(Variable::new("v", DataType::Short, &["time", "x"]))
            .unwrap();
        schema.add_attribute("v", Attribute::number("scale_factor", 0.5)).unwrap();
        schema.add_attribute("v", Attribute::number("_FillValue", -1.0)).unwrap();
        schema.add_attribute("v", Attribute::text("units", "km")).unwrap();
        schema
            .set_data("v", Some(Data::from(vec![0i16, 2, 4, -1, 8, 10])))
            .unwrap();
        MemoryReader::new(schema)
    }

    #[test]
    fn test_record_read() {
        let r = reader();
        assert_eq!(r.data_slice("v", 1).unwrap(), Data::from(vec![4i16, -1]));
        assert!(r.data_slice("v", 3).is_err());
    }

    #[test]
    fn test_single_stored_record() {
        let mut schema = reader().schema().clone();
        schema.set_data("v", Some(Data::from(vec![7i16, 9]))).unwrap();
        let r = MemoryReader::new(schema);
        assert_eq!(r.data_slice("v", 2).unwrap(), Data::from(vec![7i16, 9]));
    }

    #[test]
    fn test_sub_region_from_single_stored_record() {
        let mut schema = reader().schema().clone();
        schema.set_data("v", Some(Data::from(vec![7i16, 9]))).unwrap();
        let var = schema.variable("v").unwrap();

        let mut sb = SliceBuilder::new(&schema, "v").unwrap();
        sb.set_start_and_size("time", 1, 2).unwrap();
        sb.set_start_and_size("x", 1, 1).unwrap();
        let data = data_slice_sb_from_memory(&schema, var, &sb).unwrap();
        assert_eq!(data, Data::from(vec![9i16, 9]));

        let full = SliceBuilder::new(&schema, "v").unwrap();
        let data = data_slice_sb_from_memory(&schema, var, &full).unwrap();
        assert_eq!(data, Data::from(vec![7i16, 9, 7, 9, 7, 9]));
    }

    #[test]
    fn test_default_sub_region() {
        let r = reader();
        let mut sb = SliceBuilder::new(r.schema(), "v").unwrap();
        sb.set_start_and_size("time", 1, 2).unwrap();
        sb.set_start_and_size("x", 1, 1).unwrap();
        assert_eq!(r.data_slice_sb("v", &sb).unwrap(), Data::from(vec![-1i16, 10]));
    }

    #[test]
    fn test_scaled_data_in_unit() {
        let r = reader();
        let scaled = r.scaled_data_in_unit("v", "m").unwrap().as_f64();
        assert_eq!(scaled[1], 1000.0);
        assert!(scaled[3].is_nan());
    }
}
