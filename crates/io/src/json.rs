// JSON loading

use std::path::Path;

use datalyzer_recon::model::{CellValue, Dataset};
use serde_json::{Map, Value};

use crate::error::LoadError;

/// Parse a JSON array of flat objects, or an object wrapping that array
/// under `"records"`. Header order is first-seen key order.
pub fn load_bytes(label: &str, path: &Path, bytes: &[u8]) -> Result<Dataset, LoadError> {
    let text = std::str::from_utf8(bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes))
        .map_err(|e| LoadError::malformed(path, format!("JSON must be UTF-8: {e}")))?;
    let root: Value = serde_json::from_str(text).map_err(|e| LoadError::malformed(path, e))?;

    let items = match root {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("records") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(LoadError::malformed(
                    path,
                    "expected an array of objects or {\"records\": [...]}",
                ))
            }
        },
        _ => {
            return Err(LoadError::malformed(
                path,
                "expected an array of objects or {\"records\": [...]}",
            ))
        }
    };

    let mut rows: Vec<Map<String, Value>> = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(obj) => rows.push(obj),
            other => {
                return Err(LoadError::malformed(
                    path,
                    format!("record {i} is {}, expected an object", kind_of(&other)),
                ))
            }
        }
    }

    let dataset = Dataset::from_maps(
        label,
        rows.into_iter()
            .map(|obj| obj.into_iter().map(|(k, v)| (k, cell_of(v)))),
    )?;
    Ok(dataset)
}

fn cell_of(value: Value) -> CellValue {
    match value {
        Value::Null => CellValue::Null,
        Value::Bool(b) => CellValue::Bool(b),
        Value::String(s) => CellValue::Text(s),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => CellValue::Int(i),
            // u64 beyond i64 keeps its exact digits
            (None, _) if n.is_u64() => CellValue::Text(n.to_string()),
            (None, Some(f)) => CellValue::Float(f),
            (None, None) => CellValue::Text(n.to_string()),
        },
        nested @ (Value::Array(_) | Value::Object(_)) => CellValue::Text(nested.to_string()),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(text: &str) -> Result<Dataset, LoadError> {
        load_bytes("origemB", Path::new("b.json"), text.as_bytes())
    }

    #[test]
    fn test_array_of_objects() {
        let ds = load(r#"[{"ID": 1, "Nome": "Ana", "Saldo": 1.5, "Ativo": true},
                          {"ID": 2, "Nome": null, "Cidade": "Natal"}]"#)
        .unwrap();
        let cols: Vec<&str> = ds.columns().iter().map(|c| c.as_str()).collect();
        assert_eq!(cols, vec!["ID", "NOME", "SALDO", "ATIVO", "CIDADE"]);

        let r0 = &ds.records()[0];
        assert_eq!(r0.get("ID"), Some("1"));
        assert_eq!(r0.get("SALDO"), Some("1.5"));
        assert_eq!(r0.get("ATIVO"), Some("true"));
        assert_eq!(r0.get("CIDADE"), Some(""));
        assert_eq!(ds.records()[1].get("NOME"), Some(""));
    }

    #[test]
    fn test_records_wrapper() {
        let ds = load(r#"{"records": [{"ID": "7"}]}"#).unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.records()[0].get("ID"), Some("7"));
    }

    #[test]
    fn test_nested_values_render_compact() {
        let ds = load(r#"[{"ID": 1, "Tags": ["a", "b"], "Meta": {"k": 1}}]"#).unwrap();
        assert_eq!(ds.records()[0].get("TAGS"), Some(r#"["a","b"]"#));
        assert_eq!(ds.records()[0].get("META"), Some(r#"{"k":1}"#));
    }

    #[test]
    fn test_float_keeps_fraction() {
        let ds = load(r#"[{"V": 2.0}]"#).unwrap();
        assert_eq!(ds.records()[0].get("V"), Some("2.0"));
    }

    #[test]
    fn test_non_object_record_rejected() {
        let err = load(r#"[{"ID": 1}, 5]"#).unwrap_err();
        assert!(err.to_string().contains("record 1 is a number"), "{err}");
    }

    #[test]
    fn test_scalar_root_rejected() {
        assert!(matches!(load("42").unwrap_err(), LoadError::Malformed { .. }));
        assert!(matches!(load(r#"{"rows": []}"#).unwrap_err(), LoadError::Malformed { .. }));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(load("[{").unwrap_err(), LoadError::Malformed { .. }));
    }

    #[test]
    fn test_collision_is_schema_error() {
        let err = load(r#"[{"Nome": "a", "NOME": "b"}]"#).unwrap_err();
        assert!(err.is_schema());
    }
}
