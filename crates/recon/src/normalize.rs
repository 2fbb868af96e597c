//! Column identifier normalization.
//!
//! Datasets coming from different systems rarely agree on how a column is
//! spelled (`"Cliênte Nome"`, `"CLIENTE NOME"`, `" cliente  nome"`). Every
//! header and every configured key column goes through [`normalize`] before
//! any comparison, so all of those meet at `CLIENTE_NOME`.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical column name. Only obtainable through [`normalize`], so holding
/// one means the text is already in normal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnIdentifier(Arc<str>);

impl ColumnIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ColumnIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ColumnIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ColumnIdentifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for ColumnIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Upper bound on normalization passes. Real input converges after one
/// pass, compatibility characters after two.
const MAX_PASSES: usize = 4;

/// Normalize a raw column name: strip accents (NFKD, drop combining marks),
/// trim, uppercase, and collapse each internal whitespace run into `_`.
///
/// Idempotent: `normalize(normalize(x).as_str()) == normalize(x)`.
pub fn normalize(name: &str) -> ColumnIdentifier {
    ColumnIdentifier(Arc::from(normalize_str(name)))
}

/// Normalize a list of raw names, preserving order.
pub fn normalize_all<S: AsRef<str>>(names: &[S]) -> Vec<ColumnIdentifier> {
    names.iter().map(|n| normalize(n.as_ref())).collect()
}

/// String form of [`normalize`].
pub fn normalize_str(name: &str) -> String {
    let mut current = single_pass(name);
    // Uppercasing can surface characters that decompose further (e.g. the
    // compatibility forms of some ligatures), so run to a fixpoint.
    for _ in 1..MAX_PASSES {
        let next = single_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn single_pass(name: &str) -> String {
    let stripped: String = name.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let upper = stripped.to_uppercase();

    let mut out = String::with_capacity(upper.len());
    let mut pending_gap = false;
    for c in upper.trim().chars() {
        if c.is_whitespace() {
            pending_gap = true;
            continue;
        }
        if pending_gap {
            out.push('_');
            pending_gap = false;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_accents_and_joins_words() {
        assert_eq!(normalize(" Cliênte Nome ").as_str(), "CLIENTE_NOME");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(normalize("data   de\tnascimento").as_str(), "DATA_DE_NASCIMENTO");
        assert_eq!(normalize("codigo\u{00A0}ibge").as_str(), "CODIGO_IBGE");
    }

    #[test]
    fn keeps_existing_underscores() {
        assert_eq!(normalize("id_cliente").as_str(), "ID_CLIENTE");
        assert_eq!(normalize("a _ b").as_str(), "A___B");
    }

    #[test]
    fn empty_and_blank_input() {
        assert_eq!(normalize("").as_str(), "");
        assert_eq!(normalize("   ").as_str(), "");
        assert!(normalize("\t\n").is_empty());
    }

    #[test]
    fn idempotent_on_samples() {
        for raw in ["Ação", "  São  Paulo ", "ﬁle name", "Straße", "㎏ total", "ÅNGSTRÖM"] {
            let once = normalize(raw);
            let twice = normalize(once.as_str());
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn normalize_all_preserves_order() {
        let ids = normalize_all(&["b", "a", "Código"]);
        let names: Vec<&str> = ids.iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["B", "A", "CODIGO"]);
    }
}
