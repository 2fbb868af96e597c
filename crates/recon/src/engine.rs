use serde::Serialize;

use crate::error::ReconError;
use crate::evidence::{compute_summary, ReconSummary, SideCounts};
use crate::key::{Key, KeyIndex, KeySpec, ReconWarning};
use crate::model::{Dataset, Record};
use crate::normalize::ColumnIdentifier;

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// One non-key column whose canonical values differ between a matched pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiff {
    pub column: ColumnIdentifier,
    pub a: String,
    pub b: String,
}

/// A key present on both sides whose records disagree somewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DifferingPair {
    pub key: Key,
    pub a: Record,
    pub b: Record,
    /// Never empty.
    pub diffs: Vec<FieldDiff>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    pub only_a: Vec<Record>,
    pub only_b: Vec<Record>,
    pub differing: Vec<DifferingPair>,
    pub warnings: Vec<ReconWarning>,
    pub summary: ReconSummary,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Align `a` and `b` by the composite key and classify every key as only in
/// A, only in B, differing, or reconciled (omitted).
pub fn reconcile<S: AsRef<str>>(
    a: &Dataset,
    b: &Dataset,
    key_columns: &[S],
) -> Result<ReconciliationResult, ReconError> {
    let spec = KeySpec::new(key_columns)?;
    reconcile_with_spec(a, b, &spec)
}

pub fn reconcile_with_spec(
    a: &Dataset,
    b: &Dataset,
    spec: &KeySpec,
) -> Result<ReconciliationResult, ReconError> {
    let key_a = spec.resolve(a)?;
    let key_b = spec.resolve(b)?;
    let index_a = KeyIndex::build(a, &key_a);
    let index_b = KeyIndex::build(b, &key_b);
    diff_indices(a, &index_a, b, &index_b, spec.warnings())
}

/// Join phase: classify keys given both finished indices.
pub fn diff_indices(
    a: &Dataset,
    index_a: &KeyIndex,
    b: &Dataset,
    index_b: &KeyIndex,
    warnings: &[ReconWarning],
) -> Result<ReconciliationResult, ReconError> {
    if index_a.columns() != index_b.columns() {
        return Err(ReconError::Reconciliation(format!(
            "indices for '{}' and '{}' were built from different key columns",
            a.label(),
            b.label()
        )));
    }
    let key_columns = index_a.columns();

    let mut only_a = Vec::new();
    let mut only_b = Vec::new();
    let mut differing = Vec::new();
    let mut reconciled = 0;

    // Every record without a counterpart key is reported, repeats included.
    for (pos_a, key) in index_a.entries() {
        if !index_b.contains(key) {
            only_a.push(record_at(a, pos_a)?.clone());
        }
    }
    for (pos_b, key) in index_b.entries() {
        if !index_a.contains(key) {
            only_b.push(record_at(b, pos_b)?.clone());
        }
    }

    // Shared keys compare winning records, in first-seen order of A.
    for (pos_a, key) in index_a.first_seen() {
        let Some(pos_b) = index_b.lookup(key) else { continue };
        let record_a = record_at(a, pos_a)?;
        let record_b = record_at(b, pos_b)?;
        let diffs = compare_records(record_a, record_b, key_columns);
        if diffs.is_empty() {
            reconciled += 1;
        } else {
            differing.push(DifferingPair {
                key: key.clone(),
                a: record_a.clone(),
                b: record_b.clone(),
                diffs,
            });
        }
    }

    let summary = compute_summary(
        SideCounts::of(a, index_a),
        SideCounts::of(b, index_b),
        only_a.len(),
        only_b.len(),
        &differing,
        reconciled,
    );

    Ok(ReconciliationResult {
        only_a,
        only_b,
        differing,
        warnings: warnings.to_vec(),
        summary,
    })
}

fn record_at(dataset: &Dataset, pos: usize) -> Result<&Record, ReconError> {
    dataset.get(pos).ok_or_else(|| {
        ReconError::Reconciliation(format!(
            "index for '{}' points at record {pos}, dataset has {}",
            dataset.label(),
            dataset.len()
        ))
    })
}

/// Compare over the union of non-key columns, A's header order first, then
/// columns only B has. A column missing on one side reads as empty.
pub fn compare_records(a: &Record, b: &Record, key_columns: &[ColumnIdentifier]) -> Vec<FieldDiff> {
    let is_key = |c: &ColumnIdentifier| key_columns.contains(c);
    let b_extra = b.columns().iter().filter(|c| a.get(c.as_str()).is_none());

    a.columns()
        .iter()
        .chain(b_extra)
        .filter(|c| !is_key(*c))
        .filter_map(|column| {
            let va = a.get_or_empty(column.as_str());
            let vb = b.get_or_empty(column.as_str());
            (va != vb).then(|| FieldDiff {
                column: column.clone(),
                a: va.to_string(),
                b: vb.to_string(),
            })
        })
        .collect()
}
