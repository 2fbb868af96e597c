// Dataset loading and result export

pub mod csv;
pub mod error;
pub mod export;
pub mod json;
pub mod server;
pub mod source;
pub mod sqlite;
pub mod xlsx;

pub use error::{ExportError, LoadError};
pub use export::{ExportPlan, RunSummary};
pub use source::{load_source, load_source_with_info, Loaded, SourceInfo};
