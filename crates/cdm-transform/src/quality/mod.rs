//! Quality-flag masking.
//!
//! A [`QualityExtractor`] reads data through its upstream reader and replaces
//! every value whose companion status value is not accepted by the
//! configured rule with a fill value. The status slice broadcasts over the
//! data slice: data of `n * m` values is masked by a status slice of `m`
//! values, repeated `n` times.

mod config;

pub use config::{AllowedValues, QualityConfig, QualityVariable, StatusFlagVariable};

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use cdm::{CdmError, CdmReader, Data, FileType, ReaderFactory, ReaderRef, Result, Schema};

/// Named masking rule for status values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaskRule {
    /// Keep every defined status value.
    All,
    /// Keep only the highest defined status value of the slice.
    Highest,
    /// Keep only the lowest defined status value of the slice.
    Lowest,
    /// Keep status values not below the threshold.
    Min(f64),
    /// Keep status values not above the threshold.
    Max(f64),
}

impl FromStr for MaskRule {
    type Err = CdmError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let threshold = |value: &str| {
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| CdmError::config(format!("invalid threshold in quality-flag: {}", s)))
        };
        match s {
            "all" => Ok(MaskRule::All),
            "highest" => Ok(MaskRule::Highest),
            "lowest" => Ok(MaskRule::Lowest),
            _ => {
                if let Some(value) = s.strip_prefix("min:") {
                    Ok(MaskRule::Min(threshold(value)?))
                } else if let Some(value) = s.strip_prefix("max:") {
                    Ok(MaskRule::Max(threshold(value)?))
                } else {
                    Err(CdmError::config(format!("undefined quality-flag: {}", s)))
                }
            }
        }
    }
}

/// How status values are accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusSelection {
    /// Accept exactly these values; an empty set accepts every defined value.
    Values(Vec<f64>),
    Rule(MaskRule),
}

/// Quality control of one data variable.
#[derive(Clone)]
pub struct QualityRule {
    pub status_variable: String,
    /// Reader holding the status variable when it lives in another dataset.
    pub status_reader: Option<ReaderRef>,
    pub fill_value: f64,
    pub selection: StatusSelection,
}

/// Masks data values by companion status variables.
///
/// The schema is the upstream schema, unmodified.
pub struct QualityExtractor {
    reader: ReaderRef,
    schema: Schema,
    rules: BTreeMap<String, QualityRule>,
}

impl QualityExtractor {
    pub fn new(reader: ReaderRef) -> Self {
        let schema = reader.schema().clone();
        Self {
            reader,
            schema,
            rules: BTreeMap::new(),
        }
    }

    /// Variables under quality control.
    pub fn controlled_variables(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn rule(&self, var_name: &str) -> Option<&QualityRule> {
        self.rules.get(var_name)
    }

    /// Configure from CF status metadata.
    ///
    /// Every variable carrying `flag_values` and a `standard_name` of the
    /// form `"<name> status_flag"` controls the variables with standard name
    /// `<name>`. `auto` chooses the accepted flag values: `all`, `highest`,
    /// `lowest`, or `values=a,b,...`.
    pub fn auto_configure(&mut self, auto: &str) -> Result<()> {
        let auto = auto.trim();
        let explicit = match auto.strip_prefix("values=") {
            Some(list) => Some(parse_value_list(list)?),
            None if matches!(auto, "all" | "highest" | "lowest") => None,
            None => {
                return Err(CdmError::config(format!(
                    "auto-configure-string '{}' unknown",
                    auto
                )))
            }
        };

        for status_var in self.schema.find_variables("flag_values", None) {
            let Some(standard_name) = self.schema.attribute(&status_var, "standard_name") else {
                tracing::info!(status = %status_var, "no standard_name on status variable, autoconfig not possible");
                continue;
            };
            let standard_name = standard_name.as_text();
            let parts: Vec<&str> = standard_name.split_whitespace().collect();
            if parts.len() < 2 {
                tracing::warn!(
                    status = %status_var,
                    standard_name = %standard_name,
                    "standard_name not suitable for a status_flag"
                );
                continue;
            }

            let flags = self
                .schema
                .attribute(&status_var, "flag_values")
                .map(|a| a.as_f64s())
                .unwrap_or_default();
            let values = match (&explicit, auto) {
                (Some(values), _) => values.clone(),
                (None, "all") => flags,
                (None, "highest") => flags.last().copied().into_iter().collect(),
                (None, _) => flags.first().copied().into_iter().collect(),
            };
            if values.is_empty() {
                tracing::warn!(status = %status_var, "no flag_values in status variable");
            }

            for var in self.schema.find_variables("standard_name", Some(parts[0])) {
                let rule = QualityRule {
                    status_variable: status_var.clone(),
                    status_reader: None,
                    fill_value: self.schema.fill_value(&var),
                    selection: StatusSelection::Values(values.clone()),
                };
                self.add_rule(&var, rule)?;
            }
        }
        if !self.schema.find_variables("flag_masks", None).is_empty() {
            tracing::info!("flag_masks not supported, ignoring");
        }
        Ok(())
    }

    /// Configure from a declarative configuration; `factory` opens datasets
    /// holding external status variables.
    pub fn configure(&mut self, config: &QualityConfig, factory: &dyn ReaderFactory) -> Result<()> {
        config.validate()?;
        for var in &config.variables {
            let status = &var.status_flag_variable;
            let status_reader = match &status.file {
                Some(file) => {
                    let file_type = FileType::from_name(status.file_type.as_deref().unwrap_or(""));
                    Some(factory.create(file_type, file, status.config.as_deref())?)
                }
                None => None,
            };
            let selection = match &status.allowed_values.use_rule {
                Some(rule) => StatusSelection::Rule(rule.parse()?),
                None => StatusSelection::Values(status.allowed_values.values.clone()),
            };
            let rule = QualityRule {
                status_variable: status.name.clone(),
                status_reader,
                fill_value: var.fill_value.unwrap_or_else(|| self.schema.fill_value(&var.name)),
                selection,
            };
            self.add_rule(&var.name, rule)?;
        }
        Ok(())
    }

    /// Put `var_name` under quality control.
    ///
    /// The status variable must exist and its shape must match the trailing
    /// dimensions of the data variable. Cycles among status variables are
    /// rejected.
    pub fn add_rule(&mut self, var_name: &str, rule: QualityRule) -> Result<()> {
        if rule.status_variable.is_empty() {
            return Err(CdmError::config(format!(
                "could not find status_flag_variable for var: {}",
                var_name
            )));
        }
        if !self.schema.has_variable(var_name) {
            tracing::warn!(variable = var_name, "quality-controlled variable does not exist, ignoring");
            return Ok(());
        }

        let status_schema = match &rule.status_reader {
            Some(reader) => reader.schema(),
            None => &self.schema,
        };
        let status_var = status_schema.variable(&rule.status_variable)?;
        let var = self.schema.variable(var_name)?;
        if var.shape != status_var.shape {
            if status_var.shape.len() > var.shape.len() {
                return Err(CdmError::config(format!(
                    "status variable '{}' has more dimensions than variable '{}'",
                    rule.status_variable, var_name
                )));
            }
            let trailing = &var.shape[var.shape.len() - status_var.shape.len()..];
            for (dim, status_dim) in trailing.iter().zip(&status_var.shape) {
                if self.schema.dimension(dim)?.length != status_schema.dimension(status_dim)?.length {
                    return Err(CdmError::config(format!(
                        "status variable '{}' and variable '{}' have different shapes",
                        rule.status_variable, var_name
                    )));
                }
            }
            tracing::info!(
                variable = var_name,
                status = %rule.status_variable,
                "shapes of variable and status variable differ but are compatible"
            );
        }

        tracing::debug!(
            variable = var_name,
            status = %rule.status_variable,
            selection = ?rule.selection,
            "adding quality rule"
        );
        let previous = self.rules.insert(var_name.to_string(), rule);
        if self.has_status_cycle(var_name) {
            match previous {
                Some(previous) => self.rules.insert(var_name.to_string(), previous),
                None => self.rules.remove(var_name),
            };
            return Err(CdmError::config(format!(
                "status variables of '{}' form a cycle",
                var_name
            )));
        }
        Ok(())
    }

    /// Follow status variables read through this stage, starting at `start`.
    fn has_status_cycle(&self, start: &str) -> bool {
        let mut current = start;
        for _ in 0..=self.rules.len() {
            let Some(rule) = self.rules.get(current) else {
                return false;
            };
            if rule.status_reader.is_some() || rule.status_variable == current {
                return false;
            }
            current = &rule.status_variable;
            if current == start {
                return true;
            }
        }
        // a cycle not through `start` was rejected when it was added
        false
    }

    /// Status slice for a record, falling back to the first record when the
    /// requested one is empty or out of bounds. The out-of-bounds case lets a
    /// status dataset holding a single record serve every record of the data.
    fn status_slice(&self, var_name: &str, rule: &QualityRule, data: &Data, unlim_pos: usize) -> Result<Data> {
        let status = rule.status_variable.as_str();
        let read = |pos: usize| match &rule.status_reader {
            Some(reader) => reader.data_slice(status, pos),
            None => self.data_slice(status, pos),
        };

        if rule.status_reader.is_none() && status == var_name {
            return Ok(data.clone());
        }
        match read(unlim_pos) {
            Ok(slice) if !slice.is_empty() => Ok(slice),
            Ok(_) | Err(CdmError::OutOfBounds(_)) if unlim_pos != 0 => read(0),
            other => other,
        }
    }
}

fn parse_value_list(list: &str) -> Result<Vec<f64>> {
    list.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<f64>()
                .map_err(|_| CdmError::config(format!("invalid status value '{}'", v)))
        })
        .collect()
}

/// Defined extreme of the status values, `ordering` selecting which.
fn defined_extreme(values: &[f64], ordering: Ordering) -> Option<f64> {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .reduce(|a, b| if b.partial_cmp(&a) == Some(ordering) { b } else { a })
}

/// Accepted status values of one slice; undefined status is never accepted.
fn keep_mask(status_schema: &Schema, status_var: &str, selection: &StatusSelection, status: &Data) -> Vec<bool> {
    let mut values = status.as_f64();
    let accepted = match selection {
        StatusSelection::Values(allowed) => {
            let mut allowed = allowed.clone();
            allowed.sort_by(f64::total_cmp);
            allowed
        }
        StatusSelection::Rule(rule) => {
            let min = status_schema.valid_min(status_var);
            let max = status_schema.valid_max(status_var);
            let fill = status_schema.fill_value(status_var);
            for v in values.iter_mut() {
                let invalid = min.is_some_and(|m| *v < m) || max.is_some_and(|m| *v > m) || *v == fill;
                if invalid {
                    *v = f64::NAN;
                }
            }
            match rule {
                MaskRule::All => Vec::new(),
                MaskRule::Min(threshold) => {
                    values.iter_mut().filter(|v| **v < *threshold).for_each(|v| *v = f64::NAN);
                    Vec::new()
                }
                MaskRule::Max(threshold) => {
                    values.iter_mut().filter(|v| **v > *threshold).for_each(|v| *v = f64::NAN);
                    Vec::new()
                }
                MaskRule::Highest => defined_extreme(&values, Ordering::Greater).into_iter().collect(),
                MaskRule::Lowest => defined_extreme(&values, Ordering::Less).into_iter().collect(),
            }
        }
    };

    values
        .iter()
        .map(|v| {
            !v.is_nan()
                && (accepted.is_empty()
                    || accepted
                        .binary_search_by(|a| a.partial_cmp(v).unwrap_or(Ordering::Less))
                        .is_ok())
        })
        .collect()
}

impl CdmReader for QualityExtractor {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn data_slice(&self, var_name: &str, unlim_pos: usize) -> Result<Data> {
        let mut data = self.reader.data_slice(var_name, unlim_pos)?;
        let Some(rule) = self.rules.get(var_name) else {
            return Ok(data);
        };

        let status = self.status_slice(var_name, rule, &data, unlim_pos)?;
        let (size_d, size_s) = (data.len(), status.len());
        if size_d == 0 && size_s == 0 {
            let var = self.schema.variable(var_name)?;
            return Ok(Data::new(var.data_type, self.schema.slice_size(var_name)?, rule.fill_value));
        }
        if size_s == 0 || size_d == 0 || size_d % size_s != 0 {
            tracing::warn!(
                variable = var_name,
                status = %rule.status_variable,
                slice = unlim_pos,
                data_size = size_d,
                status_size = size_s,
                "incompatible size in data of variable and status variable, returning unmasked data"
            );
            return Ok(data);
        }

        let status_schema = match &rule.status_reader {
            Some(reader) => reader.schema(),
            None => &self.schema,
        };
        let keep = keep_mask(status_schema, &rule.status_variable, &rule.selection, &status);
        let mut masked = 0usize;
        for i in 0..size_d {
            if !keep[i % size_s] {
                data.set(i, rule.fill_value)?;
                masked += 1;
            }
        }
        tracing::debug!(variable = var_name, slice = unlim_pos, masked, "applied quality mask");
        Ok(data)
    }
}
