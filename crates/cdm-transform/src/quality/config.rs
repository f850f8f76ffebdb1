//! Declarative quality-masking configuration.
//!
//! Loads and validates JSON or YAML documents of the form:
//!
//! ```yaml
//! variables:
//!   - name: air_temperature
//!     fill_value: -999.0
//!     status_flag_variable:
//!       name: air_temperature_status
//!       allowed_values:
//!         use: "min:5"
//!   - name: pressure
//!     status_flag_variable:
//!       name: pressure_qc
//!       file: /data/qc.nc
//!       type: netcdf
//!       allowed_values:
//!         values: [0, 1]
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use cdm::{CdmError, FileType, Result};

use super::MaskRule;

// ============================================================================
// Configuration model
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default)]
    pub variables: Vec<QualityVariable>,
}

/// Quality control of one data variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVariable {
    pub name: String,
    /// Overrides the fill value of the data variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_value: Option<f64>,
    pub status_flag_variable: StatusFlagVariable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusFlagVariable {
    pub name: String,
    /// Location of a separate dataset holding the status variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    #[serde(default)]
    pub allowed_values: AllowedValues,
}

/// Either an explicit set of status values or a rule string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllowedValues {
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_rule: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<f64>,
}

// ============================================================================
// Loading
// ============================================================================

impl QualityConfig {
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: QualityConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: QualityConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file; `.json` files are read as JSON, anything
    /// else as YAML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        tracing::debug!(path = %path.display(), json = is_json, "loading quality config");
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    // ========================================================================
    // Validation
    // ========================================================================

    pub fn validate(&self) -> Result<()> {
        for var in &self.variables {
            let status = &var.status_flag_variable;
            if var.name.is_empty() {
                return Err(CdmError::config("quality variable without name"));
            }
            if status.name.is_empty() {
                return Err(CdmError::config(format!(
                    "could not find status_flag_variable for var: {}",
                    var.name
                )));
            }
            if status.file.is_none() && (status.file_type.is_some() || status.config.is_some()) {
                return Err(CdmError::config(format!(
                    "status_flag_variable of '{}' has type/config but no file",
                    var.name
                )));
            }
            if let Some(file_type) = &status.file_type {
                if FileType::from_name(file_type) == FileType::Unknown {
                    return Err(CdmError::config(format!(
                        "unknown file type '{}' for status variable of '{}'",
                        file_type, var.name
                    )));
                }
            }

            let allowed = &status.allowed_values;
            match (&allowed.use_rule, allowed.values.is_empty()) {
                (Some(_), false) => {
                    return Err(CdmError::config(format!(
                        "allowed_values of '{}' has both use and values",
                        var.name
                    )))
                }
                (None, true) => {
                    return Err(CdmError::config(format!(
                        "unable to quality-assure variable {}: no use or values given",
                        var.name
                    )))
                }
                (Some(rule), true) => {
                    rule.parse::<MaskRule>()?;
                }
                (None, false) => {}
            }
        }
        Ok(())
    }
}
