use std::collections::HashMap;
use std::sync::Arc;

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::error::ReconError;
use crate::normalize::{normalize, ColumnIdentifier};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A raw cell as handed over by a loader.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl CellValue {
    /// Canonical comparison form: null and NaN become the empty string,
    /// everything else its exact textual rendering. No trimming, no
    /// numeric coercion: `Text("1")` and `Float(1.0)` stay different.
    pub fn canonical(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(s) => s.clone(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) if f.is_nan() => String::new(),
            Self::Float(f) if f.is_infinite() => {
                if f.is_sign_negative() { "-inf".into() } else { "inf".into() }
            }
            // Debug keeps the fractional part ("1.0") and round-trips.
            Self::Float(f) => format!("{f:?}"),
            Self::Bool(b) => b.to_string(),
        }
    }

    fn into_canonical(self) -> String {
        match self {
            Self::Text(s) => s,
            other => other.canonical(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Option<String>> for CellValue {
    fn from(s: Option<String>) -> Self {
        s.map_or(Self::Null, Self::Text)
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Ordered, interned column list of one dataset. Shared by every record of
/// that dataset, so identifiers are allocated once per dataset rather than
/// once per cell.
#[derive(Debug)]
pub struct Header {
    columns: Vec<ColumnIdentifier>,
    originals: Vec<String>,
    index: HashMap<ColumnIdentifier, usize>,
}

impl Header {
    /// Normalize raw header names. Fails when two distinct raw names land on
    /// the same identifier.
    pub fn from_raw<S: AsRef<str>>(source: &str, raw: &[S]) -> Result<Self, ReconError> {
        let mut header = Header {
            columns: Vec::with_capacity(raw.len()),
            originals: Vec::with_capacity(raw.len()),
            index: HashMap::with_capacity(raw.len()),
        };
        for name in raw {
            header.push(source, name.as_ref())?;
        }
        Ok(header)
    }

    fn push(&mut self, source: &str, raw: &str) -> Result<usize, ReconError> {
        let id = normalize(raw);
        if let Some(&existing) = self.index.get(&id) {
            return Err(ReconError::ColumnCollision {
                source: source.to_string(),
                column: id.to_string(),
                originals: vec![self.originals[existing].clone(), raw.to_string()],
            });
        }
        let pos = self.columns.len();
        self.index.insert(id.clone(), pos);
        self.columns.push(id);
        self.originals.push(raw.to_string());
        Ok(pos)
    }

    pub fn columns(&self) -> &[ColumnIdentifier] {
        &self.columns
    }

    /// Raw names as they appeared in the source, aligned with [`columns`](Self::columns).
    pub fn originals(&self) -> &[String] {
        &self.originals
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.index.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One canonicalized row: identifier → canonical value.
#[derive(Debug, Clone)]
pub struct Record {
    header: Arc<Header>,
    values: Box<[String]>,
}

impl Record {
    /// Value of `column`, or `None` if the dataset has no such column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.header.position(column).map(|i| self.values[i].as_str())
    }

    /// Value of `column`; absent columns read as the empty string.
    pub fn get_or_empty(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    pub fn value_at(&self, index: usize) -> &str {
        self.values.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn columns(&self) -> &[ColumnIdentifier] {
        self.header.columns()
    }

    pub fn header(&self) -> &Arc<Header> {
        &self.header
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// (identifier, value) pairs in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&ColumnIdentifier, &str)> {
        self.header.columns().iter().zip(self.values.iter().map(String::as_str))
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.columns() == other.columns() && self.values == other.values
    }
}

impl Eq for Record {}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column.as_str(), value)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// An immutable, ordered set of records from one source.
#[derive(Debug, Clone)]
pub struct Dataset {
    label: String,
    header: Arc<Header>,
    records: Vec<Record>,
}

impl Dataset {
    /// Build from positional rows aligned to `headers`. Short rows are
    /// padded with empty values; long rows are rejected.
    pub fn from_rows<H, R, I>(label: &str, headers: &[H], rows: R) -> Result<Self, ReconError>
    where
        H: AsRef<str>,
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = CellValue>,
    {
        let header = Arc::new(Header::from_raw(label, headers)?);
        let width = header.len();
        let mut records = Vec::new();

        for (position, row) in rows.into_iter().enumerate() {
            let mut values: Vec<String> = row.into_iter().map(CellValue::into_canonical).collect();
            if values.len() > width {
                return Err(ReconError::RaggedRow {
                    source: label.to_string(),
                    position,
                    expected: width,
                    found: values.len(),
                });
            }
            values.resize(width, String::new());
            records.push(Record {
                header: Arc::clone(&header),
                values: values.into_boxed_slice(),
            });
        }

        Ok(Dataset { label: label.to_string(), header, records })
    }

    /// Build from rows of (raw name, value) pairs. The header is the union
    /// of names in first-seen order; names a row lacks read as empty.
    pub fn from_maps<R, I, K>(label: &str, rows: R) -> Result<Self, ReconError>
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = (K, CellValue)>,
        K: AsRef<str>,
    {
        let mut header = Header::from_raw::<&str>(label, &[])?;
        let mut raw_index: HashMap<String, usize> = HashMap::new();
        let mut staged: Vec<Vec<(usize, String)>> = Vec::new();

        for row in rows {
            let mut cells = Vec::new();
            for (raw, value) in row {
                let raw = raw.as_ref();
                let pos = match raw_index.get(raw) {
                    Some(&pos) => pos,
                    None => {
                        let pos = header.push(label, raw)?;
                        raw_index.insert(raw.to_string(), pos);
                        pos
                    }
                };
                cells.push((pos, value.into_canonical()));
            }
            staged.push(cells);
        }

        let header = Arc::new(header);
        let width = header.len();
        let records = staged
            .into_iter()
            .map(|cells| {
                let mut values = vec![String::new(); width];
                for (pos, value) in cells {
                    values[pos] = value;
                }
                Record {
                    header: Arc::clone(&header),
                    values: values.into_boxed_slice(),
                }
            })
            .collect();

        Ok(Dataset { label: label.to_string(), header, records })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn header(&self) -> &Arc<Header> {
        &self.header
    }

    pub fn columns(&self) -> &[ColumnIdentifier] {
        self.header.columns()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, position: usize) -> Option<&Record> {
        self.records.get(position)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Dataset", 3)?;
        s.serialize_field("label", &self.label)?;
        s.serialize_field("columns", self.header.columns())?;
        s.serialize_field("records", &self.records)?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(values: &[&str]) -> Vec<CellValue> {
        values.iter().map(|v| CellValue::from(*v)).collect()
    }

    #[test]
    fn canonical_forms() {
        assert_eq!(CellValue::Null.canonical(), "");
        assert_eq!(CellValue::Float(f64::NAN).canonical(), "");
        assert_eq!(CellValue::Float(1.0).canonical(), "1.0");
        assert_eq!(CellValue::Float(0.1).canonical(), "0.1");
        assert_eq!(CellValue::Int(-42).canonical(), "-42");
        assert_eq!(CellValue::Bool(true).canonical(), "true");
        assert_eq!(CellValue::Text("  padded ".into()).canonical(), "  padded ");
    }

    #[test]
    fn from_rows_normalizes_header_once() {
        let ds = Dataset::from_rows("a", &["Id", "Nome Cliente"], vec![texts(&["1", "Ana"])]).unwrap();
        let names: Vec<&str> = ds.columns().iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["ID", "NOME_CLIENTE"]);
        assert_eq!(ds.records()[0].get("NOME_CLIENTE"), Some("Ana"));
        assert_eq!(ds.header().originals()[1], "Nome Cliente");
    }

    #[test]
    fn from_rows_pads_short_rows() {
        let ds = Dataset::from_rows("a", &["ID", "NAME"], vec![texts(&["1"])]).unwrap();
        assert_eq!(ds.records()[0].get("NAME"), Some(""));
    }

    #[test]
    fn from_rows_rejects_long_rows() {
        let err = Dataset::from_rows("a", &["ID"], vec![texts(&["1"]), texts(&["2", "extra"])]).unwrap_err();
        assert_eq!(
            err,
            ReconError::RaggedRow { source: "a".into(), position: 1, expected: 1, found: 2 }
        );
    }

    #[test]
    fn header_collision_names_originals() {
        let err = Dataset::from_rows("b", &["Nome", "NOME "], Vec::<Vec<CellValue>>::new()).unwrap_err();
        match err {
            ReconError::ColumnCollision { source, column, originals } => {
                assert_eq!(source, "b");
                assert_eq!(column, "NOME");
                assert_eq!(originals, vec!["Nome".to_string(), "NOME ".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn from_maps_unions_headers() {
        let rows = vec![
            vec![("id", CellValue::Int(1)), ("name", CellValue::from("Ana"))],
            vec![("id", CellValue::Int(2)), ("email", CellValue::from("b@x")), ("name", CellValue::Null)],
        ];
        let ds = Dataset::from_maps("j", rows).unwrap();
        let names: Vec<&str> = ds.columns().iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["ID", "NAME", "EMAIL"]);
        assert_eq!(ds.records()[0].get("EMAIL"), Some(""));
        assert_eq!(ds.records()[1].get("NAME"), Some(""));
        assert_eq!(ds.records()[1].get("ID"), Some("2"));
    }

    #[test]
    fn from_maps_detects_collision() {
        let rows = vec![vec![("Código", CellValue::Int(1)), ("codigo", CellValue::Int(2))]];
        let err = Dataset::from_maps("j", rows).unwrap_err();
        assert!(matches!(err, ReconError::ColumnCollision { .. }));
    }

    #[test]
    fn record_serializes_in_header_order() {
        let ds = Dataset::from_rows("a", &["z", "a"], vec![texts(&["1", "2"])]).unwrap();
        let json = serde_json::to_string(&ds.records()[0]).unwrap();
        assert_eq!(json, r#"{"Z":"1","A":"2"}"#);
    }
}
