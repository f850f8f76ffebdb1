//! Common test fixtures: tracing setup, reader wrappers and factories.

use std::cell::RefCell;
use std::collections::HashMap;

use cdm::{CdmError, CdmReader, Data, FileType, ReaderFactory, ReaderRef, Result, Schema, SliceBuilder};
use tracing_subscriber::EnvFilter;

/// Common bounding boxes as (south, north, west, east).
pub mod bbox {
    /// Whole globe
    pub const GLOBAL: (f64, f64, f64, f64) = (-90.0, 90.0, -180.0, 180.0);

    /// Inner part of the generated grid, boundaries on grid points
    pub const GRID_INNER: (f64, f64, f64, f64) = (55.0, 60.0, 5.0, 15.0);

    /// Crosses the antimeridian
    pub const PACIFIC: (f64, f64, f64, f64) = (-50.0, 50.0, 160.0, -140.0);

    /// South above north
    pub const INVALID: (f64, f64, f64, f64) = (10.0, 5.0, 0.0, 10.0);
}

/// Install a fmt subscriber writing to the test harness, honouring
/// `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One request seen by a [`CountingReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadCall {
    Record { variable: String, position: usize },
    Region { variable: String, starts: Vec<usize>, sizes: Vec<usize> },
}

/// Reader wrapper recording every read it forwards.
pub struct CountingReader {
    inner: ReaderRef,
    calls: RefCell<Vec<ReadCall>>,
}

impl CountingReader {
    pub fn new(inner: ReaderRef) -> Self {
        Self {
            inner,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ReadCall> {
        self.calls.borrow().clone()
    }

    /// Region reads of `variable`, as (starts, sizes).
    pub fn region_calls(&self, variable: &str) -> Vec<(Vec<usize>, Vec<usize>)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                ReadCall::Region { variable: v, starts, sizes } if v == variable => {
                    Some((starts.clone(), sizes.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn reset(&self) {
        self.calls.borrow_mut().clear();
    }
}

impl CdmReader for CountingReader {
    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    fn data_slice(&self, var_name: &str, unlim_pos: usize) -> Result<Data> {
        self.calls.borrow_mut().push(ReadCall::Record {
            variable: var_name.to_string(),
            position: unlim_pos,
        });
        self.inner.data_slice(var_name, unlim_pos)
    }

    fn data_slice_sb(&self, var_name: &str, sb: &SliceBuilder) -> Result<Data> {
        self.calls.borrow_mut().push(ReadCall::Region {
            variable: var_name.to_string(),
            starts: sb.dimension_starts().to_vec(),
            sizes: sb.dimension_sizes().to_vec(),
        });
        self.inner.data_slice_sb(var_name, sb)
    }
}

/// [`ReaderFactory`] serving pre-built readers by location.
#[derive(Default)]
pub struct MapReaderFactory {
    readers: HashMap<String, ReaderRef>,
}

impl MapReaderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reader(mut self, location: &str, reader: ReaderRef) -> Self {
        self.readers.insert(location.to_string(), reader);
        self
    }
}

impl ReaderFactory for MapReaderFactory {
    fn create(&self, file_type: FileType, location: &str, _config: Option<&str>) -> Result<ReaderRef> {
        tracing::debug!(%file_type, location, "opening test reader");
        self.readers
            .get(location)
            .cloned()
            .ok_or_else(|| CdmError::config(format!("no test reader for '{}'", location)))
    }
}
