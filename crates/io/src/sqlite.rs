// SQLite loading

use std::path::Path;
use std::sync::OnceLock;

use datalyzer_config::run::is_plain_identifier;
use datalyzer_recon::model::{CellValue, Dataset};
use regex::Regex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use crate::error::LoadError;

/// What to select: a whole table (optionally filtered) or a literal query.
#[derive(Debug, Clone, Copy)]
pub enum Selection<'a> {
    Table { name: &'a str, where_clause: Option<&'a str> },
    Query(&'a str),
}

fn unsafe_where() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i);|--|\b(drop|delete|insert|update)\b").expect("valid regex"))
}

/// Reject WHERE clauses that could chain or comment out statements.
pub fn check_where_clause(clause: &str) -> Result<(), LoadError> {
    if unsafe_where().is_match(clause) {
        return Err(LoadError::UnsafeWhere(clause.to_string()));
    }
    Ok(())
}

/// Build the SELECT for `selection`, validating it before anything is opened.
pub fn build_query(selection: Selection<'_>) -> Result<String, LoadError> {
    match selection {
        Selection::Query(q) => Ok(q.to_string()),
        Selection::Table { name, where_clause } => {
            if !is_plain_identifier(name) {
                return Err(LoadError::Sql(format!("table '{name}' is not a plain identifier")));
            }
            match where_clause.map(str::trim).filter(|w| !w.is_empty()) {
                Some(clause) => {
                    check_where_clause(clause)?;
                    Ok(format!("SELECT * FROM {name} WHERE {clause}"))
                }
                None => Ok(format!("SELECT * FROM {name}")),
            }
        }
    }
}

pub fn load(label: &str, path: &Path, selection: Selection<'_>) -> Result<Dataset, LoadError> {
    let sql = build_query(selection)?;
    if !path.exists() {
        return Err(LoadError::io(path, "database file not found"));
    }

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    log::debug!("{}: {sql}", path.display());

    let mut stmt = conn.prepare(&sql)?;
    let headers: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = headers.len();

    let rows = stmt.query_map([], |row| {
        (0..width)
            .map(|i| row.get_ref(i).map(cell_of))
            .collect::<Result<Vec<CellValue>, _>>()
    })?;

    let mut data = Vec::new();
    for row in rows {
        data.push(row?);
    }

    Ok(Dataset::from_rows(label, &headers, data)?)
}

fn cell_of(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(i) => CellValue::Int(i),
        ValueRef::Real(f) => CellValue::Float(f),
        ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => CellValue::Text(b.iter().map(|byte| format!("{byte:02x}")).collect()),
    }
}
