use std::fmt;
use std::path::{Path, PathBuf};

use datalyzer_recon::ReconError;

/// Why a source could not be turned into a dataset.
#[derive(Debug)]
pub enum LoadError {
    /// File missing or unreadable.
    Io { path: PathBuf, message: String },
    /// No candidate encoding decoded the file cleanly.
    Decode { path: PathBuf, tried: Vec<String> },
    /// Extension with no loader.
    UnsupportedFormat { path: PathBuf },
    /// Database driver that parses in config but has no connector.
    UnsupportedDriver(String),
    /// Database server unreachable or refused the login.
    Connect { origin: String, message: String },
    /// Structurally invalid CSV, JSON or spreadsheet content.
    Malformed { path: PathBuf, message: String },
    /// Query preparation or execution failure.
    Sql(String),
    /// WHERE clause rejected before connecting.
    UnsafeWhere(String),
    /// Loaded rows do not form a valid dataset (header collision, ragged row).
    Schema(ReconError),
}

impl LoadError {
    pub(crate) fn io(path: &Path, err: impl fmt::Display) -> Self {
        Self::Io { path: path.to_path_buf(), message: err.to_string() }
    }

    pub(crate) fn malformed(path: &Path, err: impl fmt::Display) -> Self {
        Self::Malformed { path: path.to_path_buf(), message: err.to_string() }
    }

    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_))
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, message } => write!(f, "cannot read {}: {message}", path.display()),
            Self::Decode { path, tried } => write!(
                f,
                "cannot decode {} with any of: {}",
                path.display(),
                tried.join(", ")
            ),
            Self::UnsupportedFormat { path } => {
                write!(f, "unsupported file format: {}", path.display())
            }
            Self::UnsupportedDriver(driver) => {
                write!(f, "database driver '{driver}' is not supported (use sqlite, postgresql or mysql)")
            }
            Self::Connect { origin, message } => write!(f, "cannot connect to {origin}: {message}"),
            Self::Malformed { path, message } => write!(f, "{}: {message}", path.display()),
            Self::Sql(msg) => write!(f, "SQL error: {msg}"),
            Self::UnsafeWhere(clause) => {
                write!(f, "WHERE clause rejected as unsafe: {clause:?}")
            }
            Self::Schema(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<ReconError> for LoadError {
    fn from(err: ReconError) -> Self {
        Self::Schema(err)
    }
}

impl From<rusqlite::Error> for LoadError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sql(err.to_string())
    }
}

impl From<sqlx::Error> for LoadError {
    fn from(err: sqlx::Error) -> Self {
        Self::Sql(err.to_string())
    }
}

#[derive(Debug)]
pub enum ExportError {
    Io { path: PathBuf, message: String },
    Serialize(String),
}

impl ExportError {
    pub(crate) fn io(path: &Path, err: impl fmt::Display) -> Self {
        Self::Io { path: path.to_path_buf(), message: err.to_string() }
    }
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, message } => write!(f, "cannot write {}: {message}", path.display()),
            Self::Serialize(msg) => write!(f, "cannot serialize output: {msg}"),
        }
    }
}

impl std::error::Error for ExportError {}
