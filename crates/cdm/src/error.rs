//! Error types for CDM operations.

use thiserror::Error;

/// Errors raised by the data model, the readers and the transformation stages.
#[derive(Error, Debug)]
pub enum CdmError {
    /// A variable, dimension or attribute does not exist.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// An index or slice lies outside a dimension.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// The operation is recognised but not implemented for this input.
    #[error("not implemented: {0}")]
    Unsupported(String),

    /// Two buffers or shapes cannot be combined.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// An argument is outside its domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A unit string cannot be parsed or converted.
    #[error("invalid unit: {0}")]
    InvalidUnit(String),

    /// A time specification cannot be parsed.
    #[error("invalid time specification: {0}")]
    InvalidTimeSpec(String),

    /// Stage configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage/IO error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CdmError {
    /// Create a NotFound error for a variable.
    pub fn variable_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "variable",
            name: name.into(),
        }
    }

    /// Create a NotFound error for a dimension.
    pub fn dimension_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "dimension",
            name: name.into(),
        }
    }

    /// Create a NotFound error for an attribute.
    pub fn attribute_not_found(owner: &str, name: &str) -> Self {
        Self::NotFound {
            kind: "attribute",
            name: format!("{}:{}", owner, name),
        }
    }

    /// Create an OutOfBounds error.
    pub fn out_of_bounds(msg: impl Into<String>) -> Self {
        Self::OutOfBounds(msg.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a ShapeMismatch error.
    pub fn shape_mismatch(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors reported as "not implemented".
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

impl From<serde_json::Error> for CdmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for CdmError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for CDM operations.
pub type Result<T> = std::result::Result<T, CdmError>;
