// Run configuration loading
// Default location: ~/.config/datalyzer/config.toml

pub mod error;
pub mod run;

use std::path::PathBuf;

pub use error::ConfigError;
pub use run::{
    DatabaseSource, Driver, FileSource, LoggingConfig, OutputConfig, OutputFormat, RunConfig,
    SourceConfig, SourceKind, SourcesConfig,
};

/// Platform config path used when no config file is given on the command line.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("datalyzer")
        .join("config.toml")
}
