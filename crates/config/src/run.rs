use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub name: String,
    /// Composite reconciliation key, raw column names.
    pub key_columns: Vec<String>,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub a: SourceConfig,
    pub b: SourceConfig,
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Used in output file names and messages.
    pub label: String,
    /// Duplicate-scan key for this source. Defaults to the run key.
    #[serde(default)]
    pub key_columns: Option<Vec<String>>,
    #[serde(flatten)]
    pub kind: SourceKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceKind {
    File(FileSource),
    Database(DatabaseSource),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileSource {
    pub path: PathBuf,
    /// First encoding tried when decoding text files.
    #[serde(default)]
    pub encoding: Option<String>,
    /// Field separator for CSV/TXT. Sniffed when absent.
    #[serde(default)]
    pub separator: Option<char>,
    /// Worksheet name for spreadsheet files. First sheet when absent.
    #[serde(default)]
    pub sheet: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSource {
    pub driver: Driver,
    /// Database file (sqlite).
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    /// Environment variable holding the password. Passwords never live in
    /// the config file.
    #[serde(default)]
    pub password_env: Option<String>,
    /// Oracle service name, used in place of `database`.
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Sqlite,
    Postgresql,
    Mysql,
    Sqlserver,
    Oracle,
}

/// Password variable read when a server source sets no `password_env`.
pub const DEFAULT_PASSWORD_ENV: &str = "DATALYZER_DB_PASSWORD";

impl Driver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgresql => "postgresql",
            Self::Mysql => "mysql",
            Self::Sqlserver => "sqlserver",
            Self::Oracle => "oracle",
        }
    }

    /// Server drivers are addressed by host and database name, not a file.
    pub fn is_server(&self) -> bool {
        !matches!(self, Self::Sqlite)
    }

    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Sqlite => None,
            Self::Postgresql => Some(5432),
            Self::Mysql => Some(3306),
            Self::Sqlserver => Some(1433),
            Self::Oracle => Some(1521),
        }
    }
}

impl DatabaseSource {
    pub fn password_env(&self) -> &str {
        self.password_env.as_deref().unwrap_or(DEFAULT_PASSWORD_ENV)
    }

    /// Password from the configured environment variable, if set.
    pub fn password(&self) -> Option<String> {
        std::env::var(self.password_env()).ok()
    }
}

impl std::fmt::Display for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SourceConfig {
    /// Shorthand for a file source with everything else defaulted.
    pub fn file(label: &str, path: impl Into<PathBuf>) -> Self {
        SourceConfig {
            label: label.to_string(),
            key_columns: None,
            kind: SourceKind::File(FileSource { path: path.into(), ..FileSource::default() }),
        }
    }

    fn validate(&self, side: &str) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::Validation(format!("sources.{side}: {msg}")));

        if let Err(msg) = check_label(&self.label) {
            return fail(msg);
        }
        if let Some(keys) = &self.key_columns {
            if keys.is_empty() {
                return fail("key_columns override is empty".into());
            }
        }

        match &self.kind {
            SourceKind::File(file) => {
                if file.path.as_os_str().is_empty() {
                    return fail("file source needs a path".into());
                }
                if let Some(sep) = file.separator {
                    if !sep.is_ascii() || sep == '"' || sep == '\n' || sep == '\r' {
                        return fail(format!("separator {sep:?} must be a single ASCII character"));
                    }
                }
            }
            SourceKind::Database(db) => {
                if db.driver.is_server() {
                    if db.host.as_deref().map_or(true, |h| h.trim().is_empty()) {
                        return fail(format!("{} source needs a host", db.driver));
                    }
                    if db.driver == Driver::Oracle {
                        if let Err(msg) = check_service_name(db.service_name.as_deref()) {
                            return fail(msg);
                        }
                    } else if db.database.as_deref().map_or(true, str::is_empty) {
                        return fail(format!("{} source needs a database", db.driver));
                    }
                    if db.password_env.as_deref().is_some_and(str::is_empty) {
                        return fail("password_env must name a variable".into());
                    }
                } else if db.path.as_ref().map_or(true, |p| p.as_os_str().is_empty()) {
                    return fail("sqlite source needs a path".into());
                }

                match (&db.table, &db.query) {
                    (Some(_), Some(_)) => return fail("set either table or query, not both".into()),
                    (None, None) => return fail("database source needs a table or a query".into()),
                    (Some(table), None) => {
                        if !is_plain_identifier(table) {
                            return fail(format!("table '{table}' is not a plain identifier"));
                        }
                    }
                    (None, Some(_)) => {
                        if db.where_clause.is_some() {
                            return fail("where is only allowed together with table".into());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        match &mut self.kind {
            SourceKind::File(file) => file.path = absolutize(base, &file.path),
            SourceKind::Database(db) => {
                if let Some(path) = &db.path {
                    db.path = Some(absolutize(base, path));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Output + Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_formats")]
    pub formats: Vec<OutputFormat>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_delimiter() -> char {
    ';'
}

fn default_formats() -> Vec<OutputFormat> {
    vec![OutputFormat::Csv, OutputFormat::Json]
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            delimiter: default_delimiter(),
            formats: default_formats(),
        }
    }
}

impl OutputConfig {
    pub fn wants(&self, format: OutputFormat) -> bool {
        self.formats.contains(&format)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Mirror log output to this file.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_level(), file: None }
    }
}

const LOG_LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl RunConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: RunConfig =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate `path`, then resolve relative paths against
    /// the directory holding it.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let input = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut config = Self::from_toml(&input)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Validation("name must not be empty".into()));
        }
        if self.key_columns.is_empty() {
            return Err(ConfigError::Validation("key_columns must list at least one column".into()));
        }

        self.sources.a.validate("a")?;
        self.sources.b.validate("b")?;
        if self.sources.a.label.eq_ignore_ascii_case(&self.sources.b.label) {
            return Err(ConfigError::Validation(format!(
                "sources a and b share the label '{}'",
                self.sources.a.label
            )));
        }

        let delim = self.output.delimiter;
        if !delim.is_ascii() || delim == '"' || delim == '\n' || delim == '\r' {
            return Err(ConfigError::Validation(format!(
                "output.delimiter {delim:?} must be a single ASCII character"
            )));
        }
        if self.output.formats.is_empty() {
            return Err(ConfigError::Validation("output.formats must not be empty".into()));
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level '{}' is not one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }

    /// Make every relative path absolute against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        self.sources.a.resolve_paths(base);
        self.sources.b.resolve_paths(base);
        self.output.dir = absolutize(base, &self.output.dir);
        if let Some(file) = &self.logging.file {
            self.logging.file = Some(absolutize(base, file));
        }
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Labels end up in file names.
pub fn check_label(label: &str) -> Result<(), String> {
    if label.is_empty() {
        return Err("label must not be empty".into());
    }
    if label.starts_with('.') {
        return Err(format!("label '{label}' must not start with '.'"));
    }
    if let Some(c) = label.chars().find(|c| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))) {
        return Err(format!("label '{label}' contains {c:?}; use letters, digits, '_', '-' or '.'"));
    }
    Ok(())
}

/// Oracle service names end up in a connect descriptor.
pub fn check_service_name(name: Option<&str>) -> Result<(), String> {
    let name = name.ok_or("oracle source needs a service_name")?;
    let ok = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !ok {
        return Err(format!("service_name {name:?} may only contain letters, digits, '_', '.' or '-'"));
    }
    Ok(())
}

/// `name` or `schema.name`, each part letters, digits and `_`, not starting
/// with a digit.
pub fn is_plain_identifier(name: &str) -> bool {
    let part_ok = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2 && parts.iter().copied().all(part_ok)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
name = "Clientes"
key_columns = ["ID Cliente"]

[sources.a]
label = "origemA"
type = "file"
path = "data/clientes_a.csv"
encoding = "latin1"
separator = ";"
key_columns = ["ID Cliente", "Filial"]

[sources.b]
label = "origemB"
type = "database"
driver = "sqlite"
path = "data/erp.db"
table = "clientes"
where = "ATIVO = 1"

[output]
dir = "out"
delimiter = "|"
formats = ["csv"]

[logging]
level = "debug"
file = "logs/datalyzer.log"
"#;

    fn with(replace: &str, by: &str) -> String {
        assert!(VALID.contains(replace), "fixture lacks {replace:?}");
        VALID.replace(replace, by)
    }

    fn validation_error(input: &str) -> String {
        match RunConfig::from_toml(input) {
            Err(ConfigError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn parse_valid() {
        let config = RunConfig::from_toml(VALID).unwrap();
        assert_eq!(config.name, "Clientes");
        assert_eq!(config.key_columns, vec!["ID Cliente"]);

        let a = &config.sources.a;
        assert_eq!(a.key_columns.as_deref().map(<[String]>::len), Some(2));
        match &a.kind {
            SourceKind::File(f) => {
                assert_eq!(f.path, PathBuf::from("data/clientes_a.csv"));
                assert_eq!(f.encoding.as_deref(), Some("latin1"));
                assert_eq!(f.separator, Some(';'));
            }
            other => panic!("expected file source, got {other:?}"),
        }

        match &config.sources.b.kind {
            SourceKind::Database(db) => {
                assert_eq!(db.driver, Driver::Sqlite);
                assert_eq!(db.table.as_deref(), Some("clientes"));
                assert_eq!(db.where_clause.as_deref(), Some("ATIVO = 1"));
            }
            other => panic!("expected database source, got {other:?}"),
        }

        assert_eq!(config.output.delimiter, '|');
        assert!(config.output.wants(OutputFormat::Csv));
        assert!(!config.output.wants(OutputFormat::Json));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn defaults_apply() {
        let input = r#"
name = "x"
key_columns = ["id"]
[sources.a]
label = "a"
type = "file"
path = "a.csv"
[sources.b]
label = "b"
type = "file"
path = "b.json"
"#;
        let config = RunConfig::from_toml(input).unwrap();
        assert_eq!(config.output.dir, PathBuf::from("output"));
        assert_eq!(config.output.delimiter, ';');
        assert_eq!(config.output.formats, vec![OutputFormat::Csv, OutputFormat::Json]);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn server_drivers_parse() {
        let input = with(
            "driver = \"sqlite\"\npath = \"data/erp.db\"",
            "driver = \"postgresql\"\nhost = \"db.local\"\nport = 5432\ndatabase = \"erp\"\nuser = \"ro\"",
        );
        let config = RunConfig::from_toml(&input).unwrap();
        match &config.sources.b.kind {
            SourceKind::Database(db) => {
                assert_eq!(db.driver, Driver::Postgresql);
                assert_eq!(db.port, Some(5432));
            }
            other => panic!("expected database source, got {other:?}"),
        }
    }

    #[test]
    fn oracle_needs_valid_service_name() {
        let oracle = |extra: &str| {
            with(
                "driver = \"sqlite\"\npath = \"data/erp.db\"",
                &format!("driver = \"oracle\"\nhost = \"ora.local\"\nuser = \"ro\"{extra}"),
            )
        };

        let msg = validation_error(&oracle(""));
        assert!(msg.contains("service_name"), "{msg}");
        let msg = validation_error(&oracle("\nservice_name = \"ORCL)(HOST=evil\""));
        assert!(msg.contains("service_name"), "{msg}");

        let config = RunConfig::from_toml(&oracle("\nservice_name = \"orcl.prod-1\"")).unwrap();
        match &config.sources.b.kind {
            SourceKind::Database(db) => {
                assert_eq!(db.service_name.as_deref(), Some("orcl.prod-1"));
                assert_eq!(db.driver.default_port(), Some(1521));
            }
            other => panic!("expected database source, got {other:?}"),
        }
    }

    #[test]
    fn password_env_defaults_and_rejects_blank() {
        let server = |extra: &str| {
            with(
                "driver = \"sqlite\"\npath = \"data/erp.db\"",
                &format!("driver = \"mysql\"\nhost = \"db.local\"\ndatabase = \"erp\"{extra}"),
            )
        };
        let config = RunConfig::from_toml(&server("")).unwrap();
        match &config.sources.b.kind {
            SourceKind::Database(db) => assert_eq!(db.password_env(), DEFAULT_PASSWORD_ENV),
            other => panic!("expected database source, got {other:?}"),
        }

        let msg = validation_error(&server("\npassword_env = \"\""));
        assert!(msg.contains("password_env"), "{msg}");
    }

    #[test]
    fn reject_empty_key_columns() {
        let msg = validation_error(&with("key_columns = [\"ID Cliente\"]\n", "key_columns = []\n"));
        assert!(msg.contains("key_columns"), "{msg}");
    }

    #[test]
    fn reject_shared_label() {
        let msg = validation_error(&with("label = \"origemB\"", "label = \"ORIGEMA\""));
        assert!(msg.contains("share the label"), "{msg}");
    }

    #[test]
    fn reject_unsafe_label() {
        let msg = validation_error(&with("label = \"origemA\"", "label = \"../etc\""));
        assert!(msg.starts_with("sources.a:"), "{msg}");
    }

    #[test]
    fn reject_table_and_query() {
        let msg = validation_error(&with("table = \"clientes\"", "table = \"clientes\"\nquery = \"SELECT 1\""));
        assert!(msg.contains("either table or query"), "{msg}");
    }

    #[test]
    fn reject_where_with_query() {
        let msg = validation_error(&with("table = \"clientes\"", "query = \"SELECT * FROM clientes\""));
        assert!(msg.contains("where"), "{msg}");
    }

    #[test]
    fn reject_non_identifier_table() {
        let msg = validation_error(&with("table = \"clientes\"", "table = \"clientes; drop\""));
        assert!(msg.contains("plain identifier"), "{msg}");
    }

    #[test]
    fn reject_server_without_host() {
        let msg = validation_error(&with("driver = \"sqlite\"", "driver = \"mysql\""));
        assert!(msg.contains("needs a host"), "{msg}");
    }

    #[test]
    fn reject_bad_log_level() {
        let msg = validation_error(&with("level = \"debug\"", "level = \"loud\""));
        assert!(msg.contains("logging.level"), "{msg}");
    }

    #[test]
    fn reject_non_ascii_delimiter() {
        let msg = validation_error(&with("delimiter = \"|\"", "delimiter = \"§\""));
        assert!(msg.contains("delimiter"), "{msg}");
    }

    #[test]
    fn unknown_source_type_is_parse_error() {
        let err = RunConfig::from_toml(&with("type = \"file\"", "type = \"ftp\"")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn multi_char_separator_is_parse_error() {
        let err = RunConfig::from_toml(&with("separator = \";\"", "separator = \";;\"")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn from_path_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, VALID).unwrap();

        let config = RunConfig::from_path(&path).unwrap();
        match &config.sources.a.kind {
            SourceKind::File(f) => assert_eq!(f.path, dir.path().join("data/clientes_a.csv")),
            other => panic!("expected file source, got {other:?}"),
        }
        match &config.sources.b.kind {
            SourceKind::Database(db) => assert_eq!(db.path, Some(dir.path().join("data/erp.db"))),
            other => panic!("expected database source, got {other:?}"),
        }
        assert_eq!(config.output.dir, dir.path().join("out"));
        assert_eq!(config.logging.file, Some(dir.path().join("logs/datalyzer.log")));
    }

    #[test]
    fn from_path_missing_file() {
        let err = RunConfig::from_path(Path::new("/nonexistent/datalyzer.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn plain_identifiers() {
        assert!(is_plain_identifier("clientes"));
        assert!(is_plain_identifier("dbo.clientes_2024"));
        assert!(!is_plain_identifier("1clientes"));
        assert!(!is_plain_identifier("a.b.c"));
        assert!(!is_plain_identifier("clientes where 1=1"));
        assert!(!is_plain_identifier(""));
    }
}
