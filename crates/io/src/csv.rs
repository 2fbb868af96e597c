// CSV/TXT/TSV loading

use std::path::Path;

use datalyzer_recon::model::{CellValue, Dataset};
use encoding_rs::Encoding;

use crate::error::LoadError;

/// Encodings tried after the configured one, in order.
pub const ENCODING_CHAIN: &[&str] = &["utf-8-sig", "utf-8", "latin1", "iso-8859-1", "cp1252"];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A delimited file turned into a dataset, plus what was detected on the way.
#[derive(Debug)]
pub struct DelimitedLoad {
    pub dataset: Dataset,
    pub encoding: String,
    pub delimiter: u8,
}

/// Decode `bytes` and parse them as delimited text.
///
/// `separator` wins over sniffing; `.tsv` files default to tab.
pub fn load_bytes(
    label: &str,
    path: &Path,
    bytes: &[u8],
    encoding: Option<&str>,
    separator: Option<u8>,
) -> Result<DelimitedLoad, LoadError> {
    let (text, used) = decode(bytes, encoding).map_err(|tried| LoadError::Decode {
        path: path.to_path_buf(),
        tried,
    })?;

    let is_tsv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tsv"));
    let delimiter = match separator {
        Some(sep) => sep,
        None if is_tsv => b'\t',
        None => sniff_delimiter(&text),
    };
    log::debug!(
        "{}: decoded as {used}, delimiter {:?}",
        path.display(),
        delimiter as char
    );

    let dataset = parse_delimited(label, path, &text, delimiter)?;
    Ok(DelimitedLoad { dataset, encoding: used, delimiter })
}

/// Decode with the first candidate that accepts the bytes without
/// replacement. On failure returns the labels that were tried.
pub fn decode(bytes: &[u8], preferred: Option<&str>) -> Result<(String, String), Vec<String>> {
    let has_bom = bytes.starts_with(UTF8_BOM);
    let body = if has_bom { &bytes[UTF8_BOM.len()..] } else { bytes };

    let mut candidates: Vec<&str> = Vec::with_capacity(ENCODING_CHAIN.len() + 1);
    if let Some(p) = preferred.map(str::trim).filter(|p| !p.is_empty()) {
        candidates.push(p);
    }
    for label in ENCODING_CHAIN {
        if !candidates.iter().any(|c| c.eq_ignore_ascii_case(label)) {
            candidates.push(label);
        }
    }

    let mut tried = Vec::new();
    for label in candidates {
        let encoding = if is_utf8_sig(label) {
            Some(encoding_rs::UTF_8)
        } else {
            Encoding::for_label(label.as_bytes())
        };
        let Some(encoding) = encoding else {
            log::warn!("unknown encoding '{label}', skipping");
            tried.push(label.to_string());
            continue;
        };

        match encoding.decode_without_bom_handling_and_without_replacement(body) {
            Some(text) => {
                if !tried.is_empty() {
                    log::warn!("decoding as {} failed, fell back to {label}", tried.join(", "));
                }
                return Ok((text.into_owned(), label.to_string()));
            }
            None => {
                log::debug!("content is not valid {label}");
                tried.push(label.to_string());
            }
        }
    }
    Err(tried)
}

fn is_utf8_sig(label: &str) -> bool {
    label.eq_ignore_ascii_case("utf-8-sig") || label.eq_ignore_ascii_case("utf_8_sig")
}

/// Candidates in preference order; `;` first since it is the usual
/// separator of the exports this tool reads.
const DELIMITERS: [u8; 4] = [b';', b'\t', b',', b'|'];
const SNIFF_RECORDS: usize = 20;

/// Pick the delimiter under which the most leading records have the same
/// width as the header. Wider headers break ties, then [`DELIMITERS`] order.
/// Records are parsed, not split on lines, so quoted separators and quoted
/// line breaks do not count. Falls back to `,`.
pub fn sniff_delimiter(content: &str) -> u8 {
    let mut best: Option<(usize, usize, u8)> = None;

    for delim in DELIMITERS {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delim)
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());
        let widths: Vec<usize> = reader
            .records()
            .take(SNIFF_RECORDS)
            .map_while(Result::ok)
            .map(|r| r.len())
            .collect();

        let Some(&width) = widths.first() else { return b',' };
        if width < 2 {
            continue;
        }
        let agreeing = widths.iter().filter(|&&w| w == width).count();
        if best.map_or(true, |(a, w, _)| (agreeing, width) > (a, w)) {
            best = Some((agreeing, width, delim));
        }
    }

    best.map_or(b',', |(_, _, delim)| delim)
}

/// First record is the header; every field is loaded as text.
pub fn parse_delimited(
    label: &str,
    path: &Path,
    content: &str,
    delimiter: u8,
) -> Result<Dataset, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let headers: Vec<String> = match records.next() {
        Some(row) => row
            .map_err(|e| LoadError::malformed(path, e))?
            .iter()
            .map(str::to_string)
            .collect(),
        None => {
            log::warn!("{}: file is empty", path.display());
            Vec::new()
        }
    };

    let mut rows: Vec<Vec<CellValue>> = Vec::new();
    for row in records {
        let row = row.map_err(|e| LoadError::malformed(path, e))?;
        rows.push(row.iter().map(CellValue::from).collect());
    }

    Ok(Dataset::from_rows(label, &headers, rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalyzer_recon::ReconError;

    fn load(bytes: &[u8], name: &str, encoding: Option<&str>, sep: Option<u8>) -> DelimitedLoad {
        load_bytes("origemA", Path::new(name), bytes, encoding, sep).unwrap()
    }

    #[test]
    fn test_sniff_semicolon_delimiter() {
        let content = "Name;Age;City\nAlice;30;Paris\nBob;25;London\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_comma_delimiter() {
        let content = "Name,Age,City\nAlice,30,Paris\nBob,25,London\n";
        assert_eq!(sniff_delimiter(content), b',');
    }

    #[test]
    fn test_sniff_tab_and_pipe() {
        assert_eq!(sniff_delimiter("Name\tAge\nAlice\t30\n"), b'\t');
        assert_eq!(sniff_delimiter("Name|Age\nAlice|30\n"), b'|');
    }

    #[test]
    fn test_sniff_semicolon_with_commas_in_values() {
        let content = "Nome;Endereco;Cidade\n\"Silva, Ana\";\"Rua A, 12\";Recife\nBia;\"Rua B\";Natal\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_empty_defaults_to_comma() {
        assert_eq!(sniff_delimiter(""), b',');
        assert_eq!(sniff_delimiter("single column\nvalue\n"), b',');
    }

    #[test]
    fn test_sniff_prefers_agreeing_rows_over_wider_header() {
        // Comma gives a 4-wide header that the last row breaks; semicolon
        // gives 2 columns on every row.
        let content = "a,b,c,d;e\n1,2,3,4;5\n6;7\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_ignores_separators_inside_quoted_line_breaks() {
        let content = "Nome|Obs\nAna|\"linha 1\nlinha 2, com; separadores\"\nBia|ok\n";
        assert_eq!(sniff_delimiter(content), b'|');
    }

    #[test]
    fn test_sniff_tie_prefers_semicolon() {
        // Semicolon and comma both split it in two.
        assert_eq!(sniff_delimiter("a;b,c\n"), b';');
    }

    #[test]
    fn test_load_semicolon_csv() {
        let loaded = load(b"ID Cliente;Nome\n1;Ana\n2;Bia\n", "a.csv", None, None);
        assert_eq!(loaded.delimiter, b';');
        assert_eq!(loaded.encoding, "utf-8-sig");
        let ds = &loaded.dataset;
        assert_eq!(ds.label(), "origemA");
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.records()[1].get("ID_CLIENTE"), Some("2"));
        assert_eq!(ds.records()[1].get("NOME"), Some("Bia"));
    }

    #[test]
    fn test_bom_is_stripped() {
        let loaded = load(b"\xEF\xBB\xBFID,Nome\n1,Ana\n", "a.csv", Some("utf-8"), None);
        assert_eq!(loaded.encoding, "utf-8");
        assert!(loaded.dataset.header().contains("ID"));
    }

    #[test]
    fn test_latin1_fallback() {
        // "Cidade;São Paulo" in Latin-1
        let bytes = b"ID;Cidade\n1;S\xE3o Paulo\n";
        let loaded = load(bytes, "a.txt", Some("utf-8"), None);
        assert_eq!(loaded.encoding, "latin1");
        assert_eq!(loaded.dataset.records()[0].get("CIDADE"), Some("São Paulo"));
    }

    #[test]
    fn test_configured_encoding_tried_first() {
        let bytes = b"ID;Nome\n1;Jos\xE9\n";
        let loaded = load(bytes, "a.csv", Some("cp1252"), None);
        assert_eq!(loaded.encoding, "cp1252");
        assert_eq!(loaded.dataset.records()[0].get("NOME"), Some("José"));
    }

    #[test]
    fn test_unknown_encoding_label_is_skipped() {
        let loaded = load(b"ID\n1\n", "a.csv", Some("klingon"), None);
        assert_eq!(loaded.encoding, "utf-8-sig");
    }

    #[test]
    fn test_tsv_defaults_to_tab() {
        let loaded = load(b"ID;X\tNome\n1;2\tAna\n", "a.tsv", None, None);
        assert_eq!(loaded.delimiter, b'\t');
        assert_eq!(loaded.dataset.columns().len(), 2);
    }

    #[test]
    fn test_explicit_separator_wins() {
        let loaded = load(b"ID,Nome;X\n1,Ana;y\n", "a.csv", None, Some(b';'));
        assert_eq!(loaded.dataset.records()[0].get("ID,NOME"), Some("1,Ana"));
    }

    #[test]
    fn test_short_rows_padded_long_rows_rejected() {
        let loaded = load(b"ID;Nome;Cidade\n1;Ana\n", "a.csv", None, Some(b';'));
        assert_eq!(loaded.dataset.records()[0].get("CIDADE"), Some(""));

        let err = load_bytes("a", Path::new("a.csv"), b"ID;Nome\n1;Ana;extra\n", None, Some(b';'))
            .unwrap_err();
        assert!(matches!(err, LoadError::Schema(ReconError::RaggedRow { position: 0, .. })));
    }

    #[test]
    fn test_header_collision_is_schema_error() {
        let err = load_bytes("a", Path::new("a.csv"), b"Nome;NOME\nx;y\n", None, Some(b';'))
            .unwrap_err();
        assert!(err.is_schema());
    }

    #[test]
    fn test_empty_file_gives_empty_dataset() {
        let loaded = load(b"", "a.csv", None, None);
        assert!(loaded.dataset.is_empty());
        assert!(loaded.dataset.columns().is_empty());
    }
}
