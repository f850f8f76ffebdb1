//! Rectangular sub-read requests.

use crate::error::{CdmError, Result};
use crate::schema::Schema;

/// A (start, size) window for every shape dimension of one variable.
///
/// Built against a particular [`Schema`]; the dimension lengths at build time
/// are the maximum sizes used for bounds checks. A fresh builder selects the
/// whole variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceBuilder {
    variable: String,
    dim_names: Vec<String>,
    max_sizes: Vec<usize>,
    starts: Vec<usize>,
    sizes: Vec<usize>,
    unlimited: Option<usize>,
}

impl SliceBuilder {
    pub fn new(schema: &Schema, var_name: &str) -> Result<Self> {
        let var = schema.variable(var_name)?;
        let mut max_sizes = Vec::with_capacity(var.shape.len());
        let mut unlimited = None;
        for (i, dim_name) in var.shape.iter().enumerate() {
            let dim = schema.dimension(dim_name)?;
            if dim.unlimited {
                unlimited = Some(i);
            }
            max_sizes.push(dim.length);
        }
        Ok(Self {
            variable: var_name.to_string(),
            dim_names: var.shape.clone(),
            starts: vec![0; max_sizes.len()],
            sizes: max_sizes.clone(),
            max_sizes,
            unlimited,
        })
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn dimension_names(&self) -> &[String] {
        &self.dim_names
    }

    pub fn max_dimension_sizes(&self) -> &[usize] {
        &self.max_sizes
    }

    pub fn dimension_starts(&self) -> &[usize] {
        &self.starts
    }

    pub fn dimension_sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Name of the unlimited dimension of this variable, if any.
    pub fn unlimited_dimension(&self) -> Option<&str> {
        self.unlimited.map(|i| self.dim_names[i].as_str())
    }

    /// Total number of elements selected.
    pub fn element_count(&self) -> usize {
        self.sizes.iter().product()
    }

    fn position(&self, dim_name: &str) -> Result<usize> {
        self.dim_names
            .iter()
            .position(|d| d == dim_name)
            .ok_or_else(|| {
                CdmError::dimension_not_found(format!("{} (in slice of {})", dim_name, self.variable))
            })
    }

    pub fn start_and_size(&self, dim_name: &str) -> Result<(usize, usize)> {
        let i = self.position(dim_name)?;
        Ok((self.starts[i], self.sizes[i]))
    }

    pub fn set_start_and_size(&mut self, dim_name: &str, start: usize, size: usize) -> Result<()> {
        let i = self.position(dim_name)?;
        if start + size > self.max_sizes[i] {
            return Err(CdmError::out_of_bounds(format!(
                "slice of '{}' on dimension '{}': start {} + size {} > {}",
                self.variable, dim_name, start, size, self.max_sizes[i]
            )));
        }
        self.starts[i] = start;
        self.sizes[i] = size;
        Ok(())
    }

    /// Select the full extent of a dimension.
    pub fn set_all(&mut self, dim_name: &str) -> Result<()> {
        let i = self.position(dim_name)?;
        self.starts[i] = 0;
        self.sizes[i] = self.max_sizes[i];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataType;
    use crate::schema::{Dimension, Variable};

    #[test]
    fn test_bounds_checked() {
        let mut schema = Schema::new();
        schema.add_dimension(Dimension::unlimited("time", 5)).unwrap();
        schema.add_dimension(Dimension::new("x", 3)).unwrap();
        schema
            .add_variable(Variable::new("v", DataType::Float, &["time", "x"]))
            .unwrap();

        let mut sb = SliceBuilder::new(&schema, "v").unwrap();
        assert_eq!(sb.element_count(), 15);
        assert_eq!(sb.unlimited_dimension(), Some("time"));
        sb.set_start_and_size("time", 4, 1).unwrap();
        assert!(sb.set_start_and_size("x", 2, 2).is_err());
        assert_eq!(sb.start_and_size("x").unwrap(), (0, 3));
        assert_eq!(sb.element_count(), 3);
    }
}
