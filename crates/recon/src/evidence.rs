use std::collections::BTreeMap;

use serde::Serialize;

use crate::engine::DifferingPair;
use crate::key::KeyIndex;
use crate::model::Dataset;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SideCounts {
    pub label: String,
    pub records: usize,
    /// Distinct keys; lower than `records` when keys repeat.
    pub keys: usize,
}

impl SideCounts {
    pub fn of(dataset: &Dataset, index: &KeyIndex) -> Self {
        Self {
            label: dataset.label().to_string(),
            records: dataset.len(),
            keys: index.len(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconSummary {
    pub a: SideCounts,
    pub b: SideCounts,
    pub only_a: usize,
    pub only_b: usize,
    pub differing: usize,
    pub reconciled: usize,
    pub field_diffs: usize,
    /// Field diff count per column, sorted by column name.
    pub diffs_by_column: BTreeMap<String, usize>,
}

impl ReconSummary {
    /// Keys present on both sides, differing or not.
    pub fn matched(&self) -> usize {
        self.differing + self.reconciled
    }

    pub fn has_differences(&self) -> bool {
        self.only_a > 0 || self.only_b > 0 || self.differing > 0
    }
}

/// Compute summary statistics from the classified partitions.
pub fn compute_summary(
    a: SideCounts,
    b: SideCounts,
    only_a: usize,
    only_b: usize,
    differing: &[DifferingPair],
    reconciled: usize,
) -> ReconSummary {
    let mut diffs_by_column: BTreeMap<String, usize> = BTreeMap::new();
    let mut field_diffs = 0;

    for pair in differing {
        for diff in &pair.diffs {
            *diffs_by_column.entry(diff.column.to_string()).or_insert(0) += 1;
            field_diffs += 1;
        }
    }

    ReconSummary {
        a,
        b,
        only_a,
        only_b,
        differing: differing.len(),
        reconciled,
        field_diffs,
        diffs_by_column,
    }
}
