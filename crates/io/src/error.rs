use std::fmt;
use std::path::{Path, PathBuf};

use casebook_recon::ReconError;

#[derive(Debug)]
pub enum StoreError {
    /// File could not be read.
    Read { path: PathBuf, message: String },
    /// File or directory could not be written.
    Write { path: PathBuf, message: String },
    /// File exists but is not the expected JSON.
    Parse { path: PathBuf, message: String },
}

impl StoreError {
    pub(crate) fn read(path: &Path, err: impl fmt::Display) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    pub(crate) fn write(path: &Path, err: impl fmt::Display) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    pub(crate) fn parse(path: &Path, err: impl fmt::Display) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, message } => write!(f, "cannot read {}: {message}", path.display()),
            Self::Write { path, message } => {
                write!(f, "cannot write {}: {message}", path.display())
            }
            Self::Parse { path, message } => {
                write!(f, "invalid JSON in {}: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for ReconError {
    fn from(err: StoreError) -> Self {
        ReconError::Io(err.to_string())
    }
}
