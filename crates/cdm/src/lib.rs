//! Common Data Model for gridded scientific data.
//!
//! This crate provides the schema and data types shared by format backends
//! and the transformation stages in `cdm-transform`:
//!
//! - **Schema**: dimensions, typed variables and attributes of one dataset view
//! - **Data**: typed buffers with hyper-rectangle slicing
//! - **SliceBuilder**: per-variable (start, size) read requests
//! - **CdmReader**: the read capability every backend and stage implements
//! - Collaborators used by the stages: unit conversion, time specifications,
//!   coordinate systems and projections, the file-type table
//!
//! # Example
//!
//! ```
//! use cdm::{CdmReader, Data, DataType, Dimension, MemoryReader, Schema, Variable};
//!
//! let mut schema = Schema::new();
//! schema.add_dimension(Dimension::unlimited("time", 2)).unwrap();
//! schema.add_variable(Variable::new("v", DataType::Float, &["time"])).unwrap();
//! schema.set_data("v", Some(Data::from(vec![1.0f32, 2.0]))).unwrap();
//!
//! let reader = MemoryReader::new(schema);
//! assert_eq!(reader.data_slice("v", 1).unwrap(), Data::from(vec![2.0f32]));
//! ```

pub mod coordsys;
pub mod data;
pub mod error;
pub mod filetype;
pub mod reader;
pub mod schema;
pub mod slice;
pub mod time;
pub mod units;

// Re-export commonly used types at crate root
pub use coordsys::{
    AxisType, CoordinateAxis, CoordinateSystem, CoordinateSystemProvider, LatLonProjection,
    Projection, StaticCoordinateSystems,
};
pub use data::{Data, DataType};
pub use error::{CdmError, Result};
pub use filetype::{FileType, NoReaderFactory, ReaderFactory, FILE_TYPES};
pub use reader::{
    data_slice_from_memory, data_slice_sb_from_memory, CdmReader, MemoryReader, ReaderRef,
};
pub use schema::{Attribute, AttributeValue, Dimension, Schema, Variable, GLOBAL_ATTRIBUTES};
pub use slice::SliceBuilder;
pub use time::TimeSpec;
pub use units::{TimeUnit, UnitConverter, Units};
