use std::collections::HashMap;

use serde::Serialize;

use crate::error::ReconError;
use crate::key::{Key, KeySpec, ResolvedKey};
use crate::model::Dataset;

/// Records of one dataset sharing a composite key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub key: Key,
    /// Original record positions, in dataset order.
    pub positions: Vec<usize>,
}

impl DuplicateGroup {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Find every key repeated within `dataset`, groups in first-seen order.
pub fn detect_duplicates<S: AsRef<str>>(
    dataset: &Dataset,
    key_columns: &[S],
) -> Result<Vec<DuplicateGroup>, ReconError> {
    let spec = KeySpec::new(key_columns)?;
    detect_with_spec(dataset, &spec)
}

pub fn detect_with_spec(dataset: &Dataset, spec: &KeySpec) -> Result<Vec<DuplicateGroup>, ReconError> {
    let resolved = spec.resolve(dataset)?;
    Ok(scan(dataset, &resolved))
}

/// Single pass over the records; O(n) time and space.
pub fn scan(dataset: &Dataset, key: &ResolvedKey) -> Vec<DuplicateGroup> {
    let mut slots: HashMap<Key, usize> = HashMap::new();
    let mut groups: Vec<DuplicateGroup> = Vec::new();

    for (pos, record) in dataset.records().iter().enumerate() {
        let k = key.key_of(record);
        match slots.get(&k) {
            Some(&slot) => groups[slot].positions.push(pos),
            None => {
                slots.insert(k.clone(), groups.len());
                groups.push(DuplicateGroup { key: k, positions: vec![pos] });
            }
        }
    }

    groups.retain(|g| g.positions.len() > 1);
    groups
}

/// Total number of records that belong to some duplicate group.
pub fn duplicated_records(groups: &[DuplicateGroup]) -> usize {
    groups.iter().map(|g| g.positions.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CellValue;

    fn ids(values: &[&str]) -> Dataset {
        Dataset::from_rows("a", &["ID"], values.iter().map(|v| vec![CellValue::from(*v)])).unwrap()
    }

    #[test]
    fn single_repeated_key() {
        let groups = detect_duplicates(&ids(&["1", "1", "2"]), &["ID"]).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key.get("ID"), Some("1"));
        assert_eq!(groups[0].positions, vec![0, 1]);
    }

    #[test]
    fn no_duplicates() {
        let groups = detect_duplicates(&ids(&["1", "2", "3"]), &["ID"]).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn groups_in_first_seen_order() {
        let groups = detect_duplicates(&ids(&["b", "a", "a", "b", "c", "a"]), &["id"]).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key.get("ID"), Some("b"));
        assert_eq!(groups[0].positions, vec![0, 3]);
        assert_eq!(groups[1].key.get("ID"), Some("a"));
        assert_eq!(groups[1].positions, vec![1, 2, 5]);
        assert_eq!(duplicated_records(&groups), 5);
    }

    #[test]
    fn composite_key_needs_all_parts_equal() {
        let ds = Dataset::from_rows(
            "a",
            &["ID", "FILIAL"],
            vec![
                vec![CellValue::from("1"), CellValue::from("SP")],
                vec![CellValue::from("1"), CellValue::from("RJ")],
                vec![CellValue::from("1"), CellValue::from("SP")],
            ],
        )
        .unwrap();
        let groups = detect_duplicates(&ds, &["ID", "Filial"]).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].positions, vec![0, 2]);
    }

    #[test]
    fn empty_key_list_fails() {
        let err = detect_duplicates::<&str>(&ids(&["1"]), &[]).unwrap_err();
        assert!(matches!(err, ReconError::Configuration(_)));
    }

    #[test]
    fn missing_column_fails_fast() {
        let err = detect_duplicates(&ids(&["1", "1"]), &["ID", "NOPE"]).unwrap_err();
        assert_eq!(
            err,
            ReconError::MissingKeyColumns { source: "a".into(), columns: vec!["NOPE".into()] }
        );
    }

    #[test]
    fn null_and_empty_share_a_key() {
        let ds = Dataset::from_rows("a", &["ID"], vec![vec![CellValue::Null], vec![CellValue::from("")]]).unwrap();
        let groups = detect_duplicates(&ds, &["ID"]).unwrap();
        assert_eq!(groups[0].positions, vec![0, 1]);
    }
}
