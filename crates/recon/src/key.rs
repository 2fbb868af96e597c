use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::ReconError;
use crate::model::{Dataset, Record};
use crate::normalize::{normalize, ColumnIdentifier};

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Non-fatal findings raised while building a key specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconWarning {
    /// A configured key entry normalized to the empty identifier and was dropped.
    BlankKeyColumn { raw: String },
    /// Two configured entries normalized to the same identifier; the repeat was dropped.
    RepeatedKeyColumn { column: String },
    /// No usable key column remains: every record shares one key.
    NoKeyColumns,
}

impl std::fmt::Display for ReconWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankKeyColumn { raw } => {
                write!(f, "key column {raw:?} is blank after normalization; ignored")
            }
            Self::RepeatedKeyColumn { column } => {
                write!(f, "key column '{column}' listed more than once; repeat ignored")
            }
            Self::NoKeyColumns => write!(
                f,
                "no usable key columns: all records fall under a single key (likely misconfigured)"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Key specification
// ---------------------------------------------------------------------------

/// Normalized composite key column list, validated for shape but not yet
/// checked against any dataset.
#[derive(Debug, Clone)]
pub struct KeySpec {
    columns: Arc<[ColumnIdentifier]>,
    warnings: Vec<ReconWarning>,
}

impl KeySpec {
    pub fn new<S: AsRef<str>>(raw: &[S]) -> Result<Self, ReconError> {
        if raw.is_empty() {
            return Err(ReconError::Configuration("key column list is empty".into()));
        }

        let mut columns: Vec<ColumnIdentifier> = Vec::with_capacity(raw.len());
        let mut warnings = Vec::new();
        for name in raw {
            let id = normalize(name.as_ref());
            if id.is_empty() {
                warnings.push(ReconWarning::BlankKeyColumn { raw: name.as_ref().to_string() });
            } else if columns.contains(&id) {
                warnings.push(ReconWarning::RepeatedKeyColumn { column: id.to_string() });
            } else {
                columns.push(id);
            }
        }
        if columns.is_empty() {
            warnings.push(ReconWarning::NoKeyColumns);
        }

        Ok(KeySpec { columns: columns.into(), warnings })
    }

    pub fn columns(&self) -> &[ColumnIdentifier] {
        &self.columns
    }

    pub fn warnings(&self) -> &[ReconWarning] {
        &self.warnings
    }

    /// Bind the key columns to one dataset's header. Every missing column is
    /// reported at once.
    pub fn resolve(&self, dataset: &Dataset) -> Result<ResolvedKey, ReconError> {
        let header = dataset.header();
        let mut positions = Vec::with_capacity(self.columns.len());
        let mut missing = Vec::new();

        for column in self.columns.iter() {
            match header.position(column.as_str()) {
                Some(pos) => positions.push(pos),
                None => missing.push(column.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(ReconError::MissingKeyColumns {
                source: dataset.label().to_string(),
                columns: missing,
            });
        }

        Ok(ResolvedKey { columns: Arc::clone(&self.columns), positions })
    }
}

/// A [`KeySpec`] bound to the column positions of one dataset.
#[derive(Debug, Clone)]
pub struct ResolvedKey {
    columns: Arc<[ColumnIdentifier]>,
    positions: Vec<usize>,
}

impl ResolvedKey {
    pub fn columns(&self) -> &[ColumnIdentifier] {
        &self.columns
    }

    pub fn key_of(&self, record: &Record) -> Key {
        Key {
            columns: Arc::clone(&self.columns),
            values: self.positions.iter().map(|&p| record.value_at(p).to_string()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// Ordered (identifier, value) tuple identifying a logical record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    columns: Arc<[ColumnIdentifier]>,
    values: Box<[String]>,
}

impl Key {
    pub fn columns(&self) -> &[ColumnIdentifier] {
        &self.columns
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c.as_str() == column)
            .map(|i| self.values[i].as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnIdentifier, &str)> {
        self.columns.iter().zip(self.values.iter().map(String::as_str))
    }
}

// Keys compared against each other always come from the same KeySpec, so
// the values alone carry the hash.
impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.values.hash(state);
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.iter().map(|(c, v)| format!("{c}={v:?}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column.as_str(), value)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// Key → record position for one dataset. When a key repeats, the last
/// occurrence wins.
#[derive(Debug)]
pub struct KeyIndex {
    columns: Arc<[ColumnIdentifier]>,
    keys: Vec<Key>,
    winners: HashMap<Key, usize>,
}

impl KeyIndex {
    pub fn build(dataset: &Dataset, key: &ResolvedKey) -> Self {
        let keys: Vec<Key> = dataset.records().iter().map(|r| key.key_of(r)).collect();
        let mut winners = HashMap::with_capacity(keys.len());
        for (pos, k) in keys.iter().enumerate() {
            winners.insert(k.clone(), pos);
        }
        KeyIndex { columns: Arc::clone(&key.columns), keys, winners }
    }

    pub fn columns(&self) -> &[ColumnIdentifier] {
        &self.columns
    }

    pub fn lookup(&self, key: &Key) -> Option<usize> {
        self.winners.get(key).copied()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.winners.contains_key(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.winners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.winners.is_empty()
    }

    /// Every (position, key) in dataset order, repeats included.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &Key)> {
        self.keys.iter().enumerate()
    }

    /// Distinct keys in first-seen order, each paired with its winning position.
    pub fn first_seen(&self) -> impl Iterator<Item = (usize, &Key)> {
        let mut seen: HashSet<&Key> = HashSet::with_capacity(self.winners.len());
        self.keys.iter().filter_map(move |k| {
            if seen.insert(k) {
                self.winners.get(k).map(|&pos| (pos, k))
            } else {
                None
            }
        })
    }
}
