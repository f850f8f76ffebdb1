//! Virtual-dataset transformation stages.
//!
//! Each stage wraps an upstream [`cdm::CdmReader`], owns a private copy of
//! its schema, and is itself a `CdmReader`, so stages chain:
//!
//! - [`Extractor`]: variable selection and dimension reduction by index sets,
//!   coordinate ranges or a longitude/latitude box
//! - [`QualityExtractor`]: masking by companion status variables
//! - [`TimeInterpolator`]: resampling onto a new time axis
//!
//! Stages are single-threaded; wrap independent instances for parallel use.

pub mod extractor;
pub mod quality;
pub mod time_interpolator;

pub use extractor::Extractor;
pub use quality::{
    AllowedValues, MaskRule, QualityConfig, QualityExtractor, QualityRule, QualityVariable,
    StatusFlagVariable, StatusSelection,
};
pub use time_interpolator::TimeInterpolator;
