//! # File-number → path resolution
//!
//! Loaders never build file names themselves: they ask a [`DataPath`] for the path of a
//! measurement file. Site-specific naming conventions (proposal directories, zero-padded
//! numbers, file endings) live behind this trait.
//!
//! Two implementations are provided:
//!
//! * [`CustomDataPath`] – always resolves to one fixed file (tests, single-file workflows),
//! * any closure `Fn(FileNumber) -> Utf8PathBuf`.
//!
//! ```rust
//! use camino::Utf8PathBuf;
//! use nredux::data_path::DataPath;
//!
//! let resolve = |fnum: u64| Utf8PathBuf::from(format!("/data/p13114/cascade/{fnum:08}.tof"));
//! assert_eq!(resolve.resolve(147720).as_str(), "/data/p13114/cascade/00147720.tof");
//! ```
use camino::{Utf8Path, Utf8PathBuf};

use crate::constants::FileNumber;

pub trait DataPath {
    /// Path of the file holding measurement `file_number`.
    fn resolve(&self, file_number: FileNumber) -> Utf8PathBuf;
}

impl<F> DataPath for F
where
    F: Fn(FileNumber) -> Utf8PathBuf,
{
    fn resolve(&self, file_number: FileNumber) -> Utf8PathBuf {
        self(file_number)
    }
}

/// Resolves every file number to the same path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomDataPath {
    path: Utf8PathBuf,
}

impl CustomDataPath {
    pub fn new(path: impl AsRef<Utf8Path>) -> Self {
        CustomDataPath {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl DataPath for CustomDataPath {
    fn resolve(&self, _file_number: FileNumber) -> Utf8PathBuf {
        self.path.clone()
    }
}
