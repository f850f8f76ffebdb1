//! The Common Data Model schema: dimensions, variables and attributes.
//!
//! A [`Schema`] is a plain value. Every transformation stage owns its own
//! copy, cloned from the upstream schema at construction, and mutates only
//! that copy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::{Data, DataType};
use crate::error::{CdmError, Result};

/// Owner name of global attributes.
pub const GLOBAL_ATTRIBUTES: &str = "_GLOBAL";

/// A named axis with a length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub length: usize,
    pub unlimited: bool,
}

impl Dimension {
    pub fn new(name: impl Into<String>, length: usize) -> Self {
        Self {
            name: name.into(),
            length,
            unlimited: false,
        }
    }

    /// Create the record (unlimited) dimension.
    pub fn unlimited(name: impl Into<String>, length: usize) -> Self {
        Self {
            name: name.into(),
            length,
            unlimited: true,
        }
    }
}

/// Value of an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Values(Data),
}

/// A named attribute of a variable or of the global namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: AttributeValue::Text(value.into()),
        }
    }

    pub fn values(name: impl Into<String>, values: impl Into<Data>) -> Self {
        Self {
            name: name.into(),
            value: AttributeValue::Values(values.into()),
        }
    }

    /// Scalar double attribute.
    pub fn number(name: impl Into<String>, value: f64) -> Self {
        Self::values(name, vec![value])
    }

    /// Numeric values; text attributes are parsed as whitespace/comma
    /// separated numbers, unparseable tokens are skipped.
    pub fn as_f64s(&self) -> Vec<f64> {
        match &self.value {
            AttributeValue::Values(data) => data.as_f64(),
            AttributeValue::Text(text) => text
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter_map(|t| t.trim().parse().ok())
                .collect(),
        }
    }

    /// First numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        self.as_f64s().first().copied()
    }

    /// Textual representation.
    pub fn as_text(&self) -> String {
        match &self.value {
            AttributeValue::Text(text) => text.clone(),
            AttributeValue::Values(data) => data
                .as_f64()
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// A named, typed array shaped by an ordered list of dimensions.
///
/// Shapes are row-major: the first dimension varies slowest. A record
/// dimension, if the variable has one, is the first shape entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub data_type: DataType,
    pub shape: Vec<String>,
    data: Option<Data>,
}

impl Variable {
    pub fn new(name: impl Into<String>, data_type: DataType, shape: &[&str]) -> Self {
        Self {
            name: name.into(),
            data_type,
            shape: shape.iter().map(|s| s.to_string()).collect(),
            data: None,
        }
    }

    /// Materialised data, if any. `None` means "read through the chain".
    pub fn data(&self) -> Option<&Data> {
        self.data.as_ref()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Check if the variable's shape uses a dimension.
    pub fn has_dimension(&self, dim_name: &str) -> bool {
        self.shape.iter().any(|d| d == dim_name)
    }
}

/// Dimensions, variables and attributes of one dataset view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    dimensions: Vec<Dimension>,
    variables: Vec<Variable>,
    attributes: BTreeMap<String, Vec<Attribute>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    // === Dimensions ===

    pub fn add_dimension(&mut self, dim: Dimension) -> Result<()> {
        if self.has_dimension(&dim.name) {
            return Err(CdmError::invalid_argument(format!(
                "dimension '{}' already exists",
                dim.name
            )));
        }
        if dim.unlimited {
            if let Some(existing) = self.unlimited_dimension() {
                return Err(CdmError::invalid_argument(format!(
                    "cannot add unlimited dimension '{}': '{}' is already unlimited",
                    dim.name, existing.name
                )));
            }
        }
        self.dimensions.push(dim);
        Ok(())
    }

    pub fn has_dimension(&self, name: &str) -> bool {
        self.dimensions.iter().any(|d| d.name == name)
    }

    pub fn dimension(&self, name: &str) -> Result<&Dimension> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| CdmError::dimension_not_found(name))
    }

    pub fn dimension_mut(&mut self, name: &str) -> Result<&mut Dimension> {
        self.dimensions
            .iter_mut()
            .find(|d| d.name == name)
            .ok_or_else(|| CdmError::dimension_not_found(name))
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn unlimited_dimension(&self) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.unlimited)
    }

    // === Variables ===

    /// Add a variable. All shape dimensions must exist, and an unlimited
    /// dimension may only appear as the first shape entry.
    pub fn add_variable(&mut self, var: Variable) -> Result<()> {
        if self.has_variable(&var.name) {
            return Err(CdmError::invalid_argument(format!(
                "variable '{}' already exists",
                var.name
            )));
        }
        for (i, dim_name) in var.shape.iter().enumerate() {
            let dim = self.dimension(dim_name)?;
            if dim.unlimited && i != 0 {
                return Err(CdmError::invalid_argument(format!(
                    "variable '{}': unlimited dimension '{}' must be the slowest varying",
                    var.name, dim_name
                )));
            }
        }
        self.variables.push(var);
        Ok(())
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v.name == name)
    }

    pub fn variable(&self, name: &str) -> Result<&Variable> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| CdmError::variable_not_found(name))
    }

    pub fn variable_mut(&mut self, name: &str) -> Result<&mut Variable> {
        self.variables
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| CdmError::variable_not_found(name))
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }

    /// Remove a variable together with its attributes.
    pub fn remove_variable(&mut self, name: &str) -> Result<()> {
        let pos = self
            .variables
            .iter()
            .position(|v| v.name == name)
            .ok_or_else(|| CdmError::variable_not_found(name))?;
        self.variables.remove(pos);
        self.attributes.remove(name);
        Ok(())
    }

    /// Set or clear the materialised data of a variable.
    ///
    /// The buffer must hold exactly the number of elements implied by the
    /// current dimension lengths, or one record of a variable with the
    /// unlimited dimension.
    pub fn set_data(&mut self, name: &str, data: Option<Data>) -> Result<()> {
        if let Some(data) = &data {
            let expected: usize = self.shape_lengths(name)?.iter().product();
            let one_record = self.has_unlimited_dim(self.variable(name)?) && data.len() == self.slice_size(name)?;
            if data.len() != expected && !one_record {
                return Err(CdmError::shape_mismatch(format!(
                    "variable '{}' expects {} values, got {}",
                    name,
                    expected,
                    data.len()
                )));
            }
        }
        self.variable_mut(name)?.data = data;
        Ok(())
    }

    /// Current lengths of the variable's shape dimensions.
    pub fn shape_lengths(&self, name: &str) -> Result<Vec<usize>> {
        let var = self.variable(name)?;
        var.shape
            .iter()
            .map(|d| self.dimension(d).map(|dim| dim.length))
            .collect()
    }

    /// Check if the variable's shape contains the unlimited dimension.
    pub fn has_unlimited_dim(&self, var: &Variable) -> bool {
        var.shape
            .iter()
            .any(|d| self.dimension(d).map(|dim| dim.unlimited).unwrap_or(false))
    }

    /// Number of elements in one record of the variable (the whole variable
    /// if it has no unlimited dimension).
    pub fn slice_size(&self, name: &str) -> Result<usize> {
        let var = self.variable(name)?;
        let mut size = 1;
        for dim_name in &var.shape {
            let dim = self.dimension(dim_name)?;
            if !dim.unlimited {
                size *= dim.length;
            }
        }
        Ok(size)
    }

    /// Variables carrying attribute `attr`, optionally with the exact
    /// textual value `value`.
    pub fn find_variables(&self, attr: &str, value: Option<&str>) -> Vec<String> {
        self.variables
            .iter()
            .filter(|v| match self.attribute(&v.name, attr) {
                Some(a) => value.map_or(true, |val| a.as_text() == val),
                None => false,
            })
            .map(|v| v.name.clone())
            .collect()
    }

    // === Attributes ===

    pub fn add_attribute(&mut self, owner: &str, attr: Attribute) -> Result<()> {
        if owner != GLOBAL_ATTRIBUTES && !self.has_variable(owner) {
            return Err(CdmError::variable_not_found(owner));
        }
        let attrs = self.attributes.entry(owner.to_string()).or_default();
        if attrs.iter().any(|a| a.name == attr.name) {
            return Err(CdmError::invalid_argument(format!(
                "attribute '{}:{}' already exists",
                owner, attr.name
            )));
        }
        attrs.push(attr);
        Ok(())
    }

    pub fn add_or_replace_attribute(&mut self, owner: &str, attr: Attribute) -> Result<()> {
        if owner != GLOBAL_ATTRIBUTES && !self.has_variable(owner) {
            return Err(CdmError::variable_not_found(owner));
        }
        let attrs = self.attributes.entry(owner.to_string()).or_default();
        match attrs.iter_mut().find(|a| a.name == attr.name) {
            Some(existing) => *existing = attr,
            None => attrs.push(attr),
        }
        Ok(())
    }

    pub fn remove_attribute(&mut self, owner: &str, name: &str) {
        if let Some(attrs) = self.attributes.get_mut(owner) {
            attrs.retain(|a| a.name != name);
        }
    }

    pub fn attribute(&self, owner: &str, name: &str) -> Option<&Attribute> {
        self.attributes
            .get(owner)
            .and_then(|attrs| attrs.iter().find(|a| a.name == name))
    }

    pub fn attributes(&self, owner: &str) -> &[Attribute] {
        self.attributes.get(owner).map(Vec::as_slice).unwrap_or(&[])
    }

    fn attribute_f64(&self, owner: &str, name: &str) -> Option<f64> {
        self.attribute(owner, name).and_then(Attribute::as_f64)
    }

    /// `_FillValue`, or the datatype default. NaN for unknown variables.
    pub fn fill_value(&self, var: &str) -> f64 {
        if let Some(fill) = self.attribute_f64(var, "_FillValue") {
            return fill;
        }
        match self.variable(var) {
            Ok(v) if v.data_type.is_float() => f64::NAN,
            Ok(v) => v.data_type.default_fill_value(),
            Err(_) => f64::NAN,
        }
    }

    /// `units` attribute, empty if missing.
    pub fn units(&self, var: &str) -> String {
        self.attribute(var, "units")
            .map(Attribute::as_text)
            .unwrap_or_default()
    }

    pub fn scale_factor(&self, var: &str) -> f64 {
        self.attribute_f64(var, "scale_factor").unwrap_or(1.0)
    }

    pub fn add_offset(&self, var: &str) -> f64 {
        self.attribute_f64(var, "add_offset").unwrap_or(0.0)
    }

    /// Lower valid bound from `valid_min` or `valid_range`.
    pub fn valid_min(&self, var: &str) -> Option<f64> {
        if let Some((min, _)) = self.valid_range(var) {
            return Some(min);
        }
        self.attribute_f64(var, "valid_min")
    }

    /// Upper valid bound from `valid_max` or `valid_range`.
    pub fn valid_max(&self, var: &str) -> Option<f64> {
        if let Some((_, max)) = self.valid_range(var) {
            return Some(max);
        }
        self.attribute_f64(var, "valid_max")
    }

    pub fn valid_range(&self, var: &str) -> Option<(f64, f64)> {
        let values = self.attribute(var, "valid_range")?.as_f64s();
        match values.as_slice() {
            [min, max, ..] => Some((*min, *max)),
            _ => None,
        }
    }
}
