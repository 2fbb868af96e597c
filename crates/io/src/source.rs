// Source dispatch: config entry -> dataset

use std::path::Path;

use datalyzer_config::run::{DatabaseSource, Driver, FileSource, SourceConfig, SourceKind};
use datalyzer_recon::model::Dataset;
use serde::Serialize;

use crate::error::LoadError;
use crate::sqlite::Selection;

/// Where a dataset came from, recorded in the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub label: String,
    pub format: &'static str,
    pub origin: String,
    /// BLAKE3 of the input file bytes (file sources only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blake3: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    pub records: usize,
    pub columns: usize,
}

#[derive(Debug)]
pub struct Loaded {
    pub dataset: Dataset,
    pub info: SourceInfo,
}

pub fn load_source(label: &str, source: &SourceConfig) -> Result<Dataset, LoadError> {
    load_source_with_info(label, source).map(|loaded| loaded.dataset)
}

pub fn load_source_with_info(label: &str, source: &SourceConfig) -> Result<Loaded, LoadError> {
    let loaded = match &source.kind {
        SourceKind::File(file) => load_file(label, file)?,
        SourceKind::Database(db) => load_database(label, db)?,
    };
    log::info!(
        "loaded '{label}' from {}: {} records, {} columns",
        loaded.info.origin,
        loaded.info.records,
        loaded.info.columns
    );
    Ok(loaded)
}

fn load_file(label: &str, file: &FileSource) -> Result<Loaded, LoadError> {
    let path = file.path.as_path();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    // Reject before reading so a wrong path reports the real problem.
    let format = match ext.as_str() {
        "csv" | "txt" | "tsv" => "csv",
        "json" => "json",
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => "excel",
        _ => return Err(LoadError::UnsupportedFormat { path: path.to_path_buf() }),
    };

    let bytes = std::fs::read(path).map_err(|e| LoadError::io(path, e))?;
    let fingerprint = blake3::hash(&bytes).to_hex().to_string();

    let (dataset, encoding, delimiter) = match format {
        "csv" => {
            let separator = file.separator.map(|c| c as u8);
            let d = crate::csv::load_bytes(label, path, &bytes, file.encoding.as_deref(), separator)?;
            (d.dataset, Some(d.encoding), Some((d.delimiter as char).to_string()))
        }
        "json" => (crate::json::load_bytes(label, path, &bytes)?, None, None),
        _ => (crate::xlsx::load(label, path, file.sheet.as_deref())?, None, None),
    };

    Ok(Loaded {
        info: SourceInfo {
            label: label.to_string(),
            format,
            origin: path.display().to_string(),
            blake3: Some(fingerprint),
            encoding,
            delimiter,
            records: dataset.len(),
            columns: dataset.columns().len(),
        },
        dataset,
    })
}

fn load_database(label: &str, db: &DatabaseSource) -> Result<Loaded, LoadError> {
    let selection = match (db.table.as_deref(), db.query.as_deref()) {
        (Some(name), _) => Selection::Table { name, where_clause: db.where_clause.as_deref() },
        (None, Some(query)) => Selection::Query(query),
        (None, None) => {
            return Err(LoadError::Sql("database source needs a table or a query".into()))
        }
    };
    // Validate the statement before looking at the driver or the file.
    let sql = crate::sqlite::build_query(selection)?;
    let suffix = match selection {
        Selection::Table { name, .. } => format!("#{name}"),
        Selection::Query(_) => " (query)".to_string(),
    };

    let (dataset, origin) = match db.driver {
        Driver::Sqlite => {
            let path = db
                .path
                .as_deref()
                .ok_or_else(|| LoadError::io(Path::new(""), "sqlite source needs a path"))?;
            let dataset = crate::sqlite::load(label, path, selection)?;
            (dataset, format!("{}{suffix}", path.display()))
        }
        Driver::Postgresql | Driver::Mysql => {
            let dataset = crate::server::load(label, db, &sql)?;
            (dataset, format!("{}{suffix}", crate::server::origin(db)))
        }
        Driver::Sqlserver | Driver::Oracle => {
            return Err(LoadError::UnsupportedDriver(db.driver.to_string()))
        }
    };

    Ok(Loaded {
        info: SourceInfo {
            label: label.to_string(),
            format: db.driver.as_str(),
            origin,
            blake3: None,
            encoding: None,
            delimiter: None,
            records: dataset.len(),
            columns: dataset.columns().len(),
        },
        dataset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn database(path: &Path, driver: Driver, where_clause: Option<&str>) -> SourceConfig {
        SourceConfig {
            label: "b".into(),
            key_columns: None,
            kind: SourceKind::Database(DatabaseSource {
                driver,
                path: Some(path.to_path_buf()),
                host: None,
                port: None,
                database: None,
                user: None,
                password_env: None,
                service_name: None,
                table: Some("t".into()),
                query: None,
                where_clause: where_clause.map(str::to_string),
            }),
        }
    }

    #[test]
    fn test_dispatch_by_extension() {
        let dir = tempdir().unwrap();
        let csv = dir.path().join("a.CSV");
        let json = dir.path().join("b.json");
        fs::write(&csv, "ID;Nome\n1;Ana\n").unwrap();
        fs::write(&json, r#"[{"ID": 1, "Nome": "Ana"}]"#).unwrap();

        let a = load_source_with_info("a", &SourceConfig::file("ignored", &csv)).unwrap();
        assert_eq!(a.info.format, "csv");
        assert_eq!(a.info.delimiter.as_deref(), Some(";"));
        assert_eq!(a.info.blake3.as_deref().map(str::len), Some(64));
        assert_eq!(a.dataset.label(), "a");

        let b = load_source("b", &SourceConfig::file("b", &json)).unwrap();
        assert_eq!(b.records()[0], a.dataset.records()[0]);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load_source("a", &SourceConfig::file("a", "/tmp/data.parquet")).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_source("a", &SourceConfig::file("a", "/nonexistent/a.csv")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_server_driver_unsupported() {
        let err = load_source("b", &database(Path::new("x"), Driver::Sqlserver, None)).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedDriver(ref d) if d == "sqlserver"));
    }

    #[test]
    fn test_postgres_source_connects_to_configured_host() {
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let mut src = database(Path::new("x"), Driver::Postgresql, Some("ativo = 1"));
        if let SourceKind::Database(db) = &mut src.kind {
            db.path = None;
            db.host = Some("127.0.0.1".into());
            db.port = Some(port);
            db.database = Some("erp".into());
        }
        match load_source("b", &src).unwrap_err() {
            LoadError::Connect { origin, .. } => {
                assert_eq!(origin, format!("postgresql://127.0.0.1:{port}/erp"))
            }
            other => panic!("expected connect error, got {other:?}"),
        }
    }

    #[test]
    fn test_unsafe_where_rejected_before_connecting() {
        let src = database(Path::new("x"), Driver::Mysql, Some("1=1 -- all"));
        assert!(matches!(load_source("b", &src).unwrap_err(), LoadError::UnsafeWhere(_)));
    }

    #[test]
    fn test_unsafe_where_checked_before_driver() {
        let src = database(Path::new("x"), Driver::Oracle, Some("1=1; drop table t"));
        assert!(matches!(load_source("b", &src).unwrap_err(), LoadError::UnsafeWhere(_)));
    }

    #[test]
    fn test_sqlite_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("erp.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER, v TEXT); INSERT INTO t VALUES (1, 'x'), (2, 'y');")
            .unwrap();
        drop(conn);

        let loaded = load_source_with_info("b", &database(&path, Driver::Sqlite, Some("id > 1"))).unwrap();
        assert_eq!(loaded.dataset.len(), 1);
        assert_eq!(loaded.info.format, "sqlite");
        assert!(loaded.info.origin.ends_with("erp.db#t"));
    }
}
