use std::fmt;

/// Error taxonomy for every core operation.
///
/// A core call either returns a complete result or exactly one of these.
/// Nothing in this crate logs; callers map the variant (or its [`ErrorKind`])
/// to messages and exit codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconError {
    /// Empty or otherwise unusable key specification.
    Configuration(String),
    /// Configured key columns absent from a dataset. Lists every missing
    /// name, not just the first.
    MissingKeyColumns { source: String, columns: Vec<String> },
    /// Two raw header names normalize to the same identifier.
    ColumnCollision { source: String, column: String, originals: Vec<String> },
    /// A positional row carries more fields than the header.
    RaggedRow { source: String, position: usize, expected: usize, found: usize },
    /// Internal invariant violation (asymmetric index state, worker failure).
    Reconciliation(String),
    /// Cooperative cancellation observed between phases.
    Cancelled,
}

/// Coarse classification of a [`ReconError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Schema,
    Reconciliation,
    Cancelled,
}

impl ReconError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::MissingKeyColumns { .. } | Self::ColumnCollision { .. } | Self::RaggedRow { .. } => {
                ErrorKind::Schema
            }
            Self::Reconciliation(_) => ErrorKind::Reconciliation,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration error"),
            Self::Schema => write!(f, "schema error"),
            Self::Reconciliation => write!(f, "reconciliation error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::MissingKeyColumns { source, columns } => {
                let quoted: Vec<String> = columns.iter().map(|c| format!("'{c}'")).collect();
                write!(
                    f,
                    "schema error: source '{source}': missing key column(s) {}",
                    quoted.join(", ")
                )
            }
            Self::ColumnCollision { source, column, originals } => {
                let quoted: Vec<String> = originals.iter().map(|c| format!("'{c}'")).collect();
                write!(
                    f,
                    "schema error: source '{source}': columns {} all normalize to '{column}'",
                    quoted.join(", ")
                )
            }
            Self::RaggedRow { source, position, expected, found } => write!(
                f,
                "schema error: source '{source}', row {position}: {found} fields, header has {expected}"
            ),
            Self::Reconciliation(msg) => write!(f, "reconciliation error: {msg}"),
            Self::Cancelled => write!(f, "run cancelled"),
        }
    }
}

impl std::error::Error for ReconError {}
