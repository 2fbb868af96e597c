//! `datalyzer run|validate|diff|duplicates`: load, reconcile, export.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use datalyzer_config::run::{check_label, FileSource, SourceConfig, SourceKind};
use datalyzer_config::{default_config_path, RunConfig};
use datalyzer_io::export::DuplicateCounts;
use datalyzer_io::{load_source_with_info, ExportPlan, Loaded, RunSummary};
use datalyzer_recon::duplicates::{detect_with_spec, DuplicateGroup};
use datalyzer_recon::pipeline::{cancel_token, run, CancelToken, RunOptions};
use datalyzer_recon::{KeySpec, ReconError};
use serde::Serialize;

use crate::logging::{self, LogObserver};
use crate::CliError;

// ============================================================================
// run
// ============================================================================

pub fn cmd_run(
    config: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    json: bool,
    fail_on_diff: bool,
    sequential: bool,
    quiet: bool,
) -> Result<(), CliError> {
    let path = config_path(config)?;
    let mut config = RunConfig::from_path(&path).map_err(CliError::from_config)?;
    if let Some(dir) = output_dir {
        config.output.dir = dir;
    }
    logging::init(&config.logging.level, config.logging.file.as_deref(), quiet)?;
    log::info!("run '{}' from {}", config.name, path.display());

    let cancel = install_cancel_handler();
    let a = load(&config.sources.a.label, &config.sources.a, &cancel)?;
    let b = load(&config.sources.b.label, &config.sources.b, &cancel)?;

    let options = RunOptions {
        duplicate_keys_a: config.sources.a.key_columns.clone(),
        duplicate_keys_b: config.sources.b.key_columns.clone(),
        parallel: !sequential,
        ..RunOptions::new(&config.key_columns)
    };
    let plan = ExportPlan::from_config(&config.output);
    reconcile_and_report(&config.name, a, b, &options, &cancel, Some(&plan), json, fail_on_diff, quiet)
}

// ============================================================================
// validate
// ============================================================================

pub fn cmd_validate(config: Option<PathBuf>) -> Result<(), CliError> {
    let path = config_path(config)?;
    let config = RunConfig::from_path(&path).map_err(CliError::from_config)?;

    let spec = KeySpec::new(&config.key_columns).map_err(|e| CliError::from_recon(e, &[]))?;
    for warning in spec.warnings() {
        eprintln!("warning: {warning}");
    }
    for source in [&config.sources.a, &config.sources.b] {
        if let Some(keys) = &source.key_columns {
            let side = KeySpec::new(keys).map_err(|e| {
                CliError::from_recon(e, &[]).with_hint(format!("check sources.{}.key_columns", source.label))
            })?;
            for warning in side.warnings() {
                eprintln!("warning: {}: {warning}", source.label);
            }
        }
        if let SourceKind::Database(db) = &source.kind {
            let selection = match (db.table.as_deref(), db.query.as_deref()) {
                (Some(name), _) => Some(datalyzer_io::sqlite::Selection::Table {
                    name,
                    where_clause: db.where_clause.as_deref(),
                }),
                (None, Some(query)) => Some(datalyzer_io::sqlite::Selection::Query(query)),
                (None, None) => None,
            };
            if let Some(selection) = selection {
                datalyzer_io::sqlite::build_query(selection).map_err(CliError::from_load)?;
            }
        }
    }

    let key: Vec<&str> = spec.columns().iter().map(|c| c.as_str()).collect();
    eprintln!("config OK: {} ({})", config.name, path.display());
    eprintln!("  key:     {}", key.join(", "));
    eprintln!("  a:       {} ({})", config.sources.a.label, describe(&config.sources.a));
    eprintln!("  b:       {} ({})", config.sources.b.label, describe(&config.sources.b));
    eprintln!("  output:  {}", config.output.dir.display());
    Ok(())
}

fn describe(source: &SourceConfig) -> String {
    match &source.kind {
        SourceKind::File(file) => file.path.display().to_string(),
        SourceKind::Database(db) => match (&db.table, &db.path) {
            (Some(table), Some(path)) => format!("{} {}#{table}", db.driver, path.display()),
            (Some(table), None) => format!("{} table {table}", db.driver),
            (None, Some(path)) => format!("{} {} (query)", db.driver, path.display()),
            (None, None) => format!("{} (query)", db.driver),
        },
    }
}

// ============================================================================
// diff
// ============================================================================

pub struct DiffArgs {
    pub left: PathBuf,
    pub right: PathBuf,
    pub key: Vec<String>,
    pub separator: Option<char>,
    pub encoding: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub json: bool,
    pub fail_on_diff: bool,
    pub quiet: bool,
}

pub fn cmd_diff(args: DiffArgs) -> Result<(), CliError> {
    let separator = check_separator(args.separator)?;
    logging::init("info", None, args.quiet)?;

    let (label_a, label_b) = side_labels(&args.left, &args.right);
    let source_a = file_source(&label_a, &args.left, separator, args.encoding.clone(), None);
    let source_b = file_source(&label_b, &args.right, separator, args.encoding, None);

    let cancel = install_cancel_handler();
    let a = load(&label_a, &source_a, &cancel)?;
    let b = load(&label_b, &source_b, &cancel)?;

    let plan = args.output_dir.map(ExportPlan::new);
    let name = format!("{label_a} vs {label_b}");
    reconcile_and_report(
        &name,
        a,
        b,
        &RunOptions::new(&args.key),
        &cancel,
        plan.as_ref(),
        args.json,
        args.fail_on_diff,
        args.quiet,
    )
}

/// File stems made safe for output names. Equal stems get `_left`/`_right`.
fn side_labels(left: &Path, right: &Path) -> (String, String) {
    let a = label_from_path(left, "a");
    let b = label_from_path(right, "b");
    if a.eq_ignore_ascii_case(&b) {
        (format!("{a}_left"), format!("{b}_right"))
    } else {
        (a, b)
    }
}

fn label_from_path(path: &Path, fallback: &str) -> String {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned.to_string()
    }
}

// ============================================================================
// duplicates
// ============================================================================

pub struct DuplicatesArgs {
    pub file: PathBuf,
    pub key: Vec<String>,
    pub label: Option<String>,
    pub separator: Option<char>,
    pub encoding: Option<String>,
    pub sheet: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub json: bool,
    pub fail_on_duplicates: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct DuplicatesReport<'a> {
    #[serde(flatten)]
    counts: DuplicateCounts,
    key_columns: Vec<&'a str>,
    duplicates: &'a [DuplicateGroup],
}

pub fn cmd_duplicates(args: DuplicatesArgs) -> Result<(), CliError> {
    let separator = check_separator(args.separator)?;
    logging::init("info", None, args.quiet)?;

    let label = match args.label {
        Some(label) => {
            check_label(&label).map_err(|msg| CliError::usage(format!("--label: {msg}")))?;
            label
        }
        None => label_from_path(&args.file, "dataset"),
    };
    let source = file_source(&label, &args.file, separator, args.encoding, args.sheet);
    let cancel = install_cancel_handler();
    let dataset = load(&label, &source, &cancel)?.dataset;

    let spec = KeySpec::new(&args.key).map_err(|e| CliError::from_recon(e, &[]))?;
    for warning in spec.warnings() {
        log::warn!("{warning}");
    }
    let groups = detect_with_spec(&dataset, &spec).map_err(|e| CliError::from_recon(e, &[&dataset]))?;
    let counts = DuplicateCounts::of(dataset.label(), &groups);

    if let Some(dir) = args.output_dir {
        let plan = ExportPlan::new(dir);
        let written = plan.write_duplicates(&dataset, &groups).map_err(CliError::from_export)?;
        log::info!("wrote {} file(s) to {}", written.len(), plan.dir.display());
    }

    if args.json {
        let report = DuplicatesReport {
            key_columns: spec.columns().iter().map(|c| c.as_str()).collect(),
            counts: counts.clone(),
            duplicates: &groups,
        };
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::from_export(datalyzer_io::ExportError::Serialize(e.to_string())))?;
        println!("{out}");
    } else if !args.quiet {
        eprintln!(
            "{}: {} records, {} duplicated key(s) across {} records",
            counts.label,
            dataset.len(),
            counts.groups,
            counts.records
        );
        for group in &groups {
            let key: Vec<String> = group.key.iter().map(|(c, v)| format!("{c}={v}")).collect();
            let rows: Vec<String> = group.positions.iter().map(|p| p.to_string()).collect();
            eprintln!("  {}  x{}  (records {})", key.join(", "), group.len(), rows.join(", "));
        }
    }

    if args.fail_on_duplicates && !groups.is_empty() {
        return Err(CliError::diffs(format!("{} duplicated key(s) in '{}'", counts.groups, counts.label)));
    }
    Ok(())
}

// ============================================================================
// Shared
// ============================================================================

fn config_path(explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let path = default_config_path();
    if !path.exists() {
        return Err(CliError::config(format!("no config given and {} does not exist", path.display()))
            .with_hint("datalyzer run <config.toml>"));
    }
    Ok(path)
}

fn check_separator(separator: Option<char>) -> Result<Option<char>, CliError> {
    match separator {
        Some(c) if !c.is_ascii() || matches!(c, '"' | '\n' | '\r') => {
            Err(CliError::usage(format!("--separator {c:?} must be a single ASCII character")))
        }
        other => Ok(other),
    }
}

fn file_source(
    label: &str,
    path: &Path,
    separator: Option<char>,
    encoding: Option<String>,
    sheet: Option<String>,
) -> SourceConfig {
    SourceConfig {
        label: label.to_string(),
        key_columns: None,
        kind: SourceKind::File(FileSource { path: path.to_path_buf(), encoding, separator, sheet }),
    }
}

/// Ctrl-C sets the returned token. Only the first call in a process
/// installs the handler.
fn install_cancel_handler() -> CancelToken {
    let token = cancel_token();
    let flag = Arc::clone(&token);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
        log::warn!("cannot install Ctrl-C handler: {e}");
    }
    token
}

fn load(label: &str, source: &SourceConfig, cancel: &CancelToken) -> Result<Loaded, CliError> {
    if cancel.load(Ordering::Relaxed) {
        return Err(CliError::from_recon(ReconError::Cancelled, &[]));
    }
    load_source_with_info(label, source).map_err(CliError::from_load)
}

#[allow(clippy::too_many_arguments)]
fn reconcile_and_report(
    name: &str,
    a: Loaded,
    b: Loaded,
    options: &RunOptions,
    cancel: &CancelToken,
    plan: Option<&ExportPlan>,
    json: bool,
    fail_on_diff: bool,
    quiet: bool,
) -> Result<(), CliError> {
    let output = run(&a.dataset, &b.dataset, options, cancel, &LogObserver)
        .map_err(|e| CliError::from_recon(e, &[&a.dataset, &b.dataset]))?;

    let spec = KeySpec::new(&options.key_columns).map_err(|e| CliError::from_recon(e, &[]))?;
    let summary = RunSummary::new(
        name,
        spec.columns(),
        vec![a.info, b.info],
        &a.dataset,
        &b.dataset,
        &output,
    );

    if let Some(plan) = plan {
        let written = plan
            .write_run(&a.dataset, &b.dataset, &output, &summary)
            .map_err(CliError::from_export)?;
        log::info!("wrote {} file(s) to {}", written.len(), plan.dir.display());
    }

    if json {
        let out = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::from_export(datalyzer_io::ExportError::Serialize(e.to_string())))?;
        println!("{out}");
    } else if !quiet {
        print_summary(&summary);
    }

    let result = &summary.result;
    if fail_on_diff && result.has_differences() {
        return Err(CliError::diffs(format!(
            "{} only in '{}', {} only in '{}', {} differing",
            result.only_a, result.a.label, result.only_b, result.b.label, result.differing
        )));
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let r = &summary.result;
    eprintln!("{}: key {}", summary.name, summary.key_columns.join(", "));
    eprintln!("  {:<12} {} records, {} keys", r.a.label, r.a.records, r.a.keys);
    eprintln!("  {:<12} {} records, {} keys", r.b.label, r.b.records, r.b.keys);
    eprintln!(
        "  matched {}: {} reconciled, {} differing ({} field diffs)",
        r.matched(),
        r.reconciled,
        r.differing,
        r.field_diffs
    );
    eprintln!("  only in {}: {}", r.a.label, r.only_a);
    eprintln!("  only in {}: {}", r.b.label, r.only_b);
    for (column, count) in &r.diffs_by_column {
        eprintln!("    {column}: {count}");
    }
    for dup in summary.duplicates.iter().filter(|d| d.groups > 0) {
        eprintln!("  duplicates in {}: {} key(s), {} records", dup.label, dup.groups, dup.records);
    }
    for warning in &summary.warnings {
        eprintln!("  warning: {warning}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_from_stems() {
        let (a, b) = side_labels(Path::new("data/clientes a.csv"), Path::new("erp.json"));
        assert_eq!(a, "clientes_a");
        assert_eq!(b, "erp");
    }

    #[test]
    fn equal_stems_get_side_suffixes() {
        let (a, b) = side_labels(Path::new("jan/export.csv"), Path::new("feb/EXPORT.csv"));
        assert_eq!(a, "export_left");
        assert_eq!(b, "EXPORT_right");
    }

    #[test]
    fn hidden_or_empty_stem_falls_back() {
        assert_eq!(label_from_path(Path::new("..."), "a"), "a");
        assert_eq!(label_from_path(Path::new("/tmp/.data.csv"), "a"), "data");
    }

    #[test]
    fn separator_must_be_ascii() {
        assert!(check_separator(Some(';')).is_ok());
        assert!(check_separator(None).is_ok());
        assert!(check_separator(Some('§')).is_err());
        assert!(check_separator(Some('"')).is_err());
    }
}
