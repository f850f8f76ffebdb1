//! Known physical file types and the factory seam for opening them.

use serde::{Deserialize, Serialize};

use crate::error::{CdmError, Result};
use crate::reader::ReaderRef;

/// Physical format of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Felt,
    NetCdf,
    NcMl,
    Grib,
    Wdb,
    Unknown,
}

/// Name table of the known file types.
pub const FILE_TYPES: &[(FileType, &str)] = &[
    (FileType::Felt, "felt"),
    (FileType::NetCdf, "netcdf"),
    (FileType::NcMl, "ncml"),
    (FileType::Grib, "grib"),
    (FileType::Wdb, "wdb"),
];

impl FileType {
    /// Look up a file type by name (case-insensitive); unknown names map to
    /// [`FileType::Unknown`].
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        FILE_TYPES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(t, _)| *t)
            .unwrap_or(FileType::Unknown)
    }

    /// Table name of the file type, empty for [`FileType::Unknown`].
    pub fn name(&self) -> &'static str {
        FILE_TYPES
            .iter()
            .find(|(t, _)| t == self)
            .map(|(_, n)| *n)
            .unwrap_or("")
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Opens readers for datasets referenced from configuration.
pub trait ReaderFactory {
    fn create(&self, file_type: FileType, location: &str, config: Option<&str>) -> Result<ReaderRef>;
}

/// Factory for setups without external datasets; every request fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReaderFactory;

impl ReaderFactory for NoReaderFactory {
    fn create(&self, file_type: FileType, location: &str, _config: Option<&str>) -> Result<ReaderRef> {
        Err(CdmError::config(format!(
            "no reader available for {} file '{}'",
            file_type, location
        )))
    }
}
