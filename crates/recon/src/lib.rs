//! `datalyzer-recon`: key-based reconciliation and duplicate detection.
//!
//! Pure engine crate: receives two loaded datasets, returns classified results.
//! No CLI, IO or logging dependencies.

pub mod duplicates;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod key;
pub mod model;
pub mod normalize;
pub mod pipeline;

pub use duplicates::{detect_duplicates, DuplicateGroup};
pub use engine::{reconcile, DifferingPair, FieldDiff, ReconciliationResult};
pub use error::{ErrorKind, ReconError};
pub use evidence::ReconSummary;
pub use key::{Key, KeySpec, ReconWarning};
pub use model::{CellValue, Dataset, Header, Record};
pub use normalize::{normalize, ColumnIdentifier};
pub use pipeline::{run, CancelToken, RunEvent, RunObserver, RunOptions, RunOutput};
