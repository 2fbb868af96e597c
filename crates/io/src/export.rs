// Result export: CSV + pretty JSON per partition, plus a run summary

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use datalyzer_config::run::{OutputConfig, OutputFormat};
use datalyzer_recon::duplicates::{duplicated_records, DuplicateGroup};
use datalyzer_recon::engine::DifferingPair;
use datalyzer_recon::model::{Dataset, Record};
use datalyzer_recon::normalize::ColumnIdentifier;
use datalyzer_recon::pipeline::RunOutput;
use datalyzer_recon::{ReconSummary, ReconWarning};
use serde::Serialize;

use crate::error::ExportError;
use crate::source::SourceInfo;

pub const SUMMARY_FILE: &str = "summary.json";
pub const DIFFERENCES_STEM: &str = "differences";

pub fn duplicates_stem(label: &str) -> String {
    format!("{label}_duplicates")
}

pub fn only_in_stem(label: &str) -> String {
    format!("only_in_{label}")
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateCounts {
    pub label: String,
    pub groups: usize,
    pub records: usize,
}

impl DuplicateCounts {
    pub fn of(label: &str, groups: &[DuplicateGroup]) -> Self {
        Self { label: label.to_string(), groups: groups.len(), records: duplicated_records(groups) }
    }
}

/// Machine-readable account of one run, written as `summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub generated_at: String,
    pub engine_version: &'static str,
    pub key_columns: Vec<String>,
    pub sources: Vec<SourceInfo>,
    pub duplicates: Vec<DuplicateCounts>,
    pub result: ReconSummary,
    pub warnings: Vec<ReconWarning>,
}

impl RunSummary {
    pub fn new(
        name: &str,
        key_columns: &[ColumnIdentifier],
        sources: Vec<SourceInfo>,
        a: &Dataset,
        b: &Dataset,
        output: &RunOutput,
    ) -> Self {
        RunSummary {
            name: name.to_string(),
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            engine_version: env!("CARGO_PKG_VERSION"),
            key_columns: key_columns.iter().map(|c| c.to_string()).collect(),
            sources,
            duplicates: vec![
                DuplicateCounts::of(a.label(), &output.duplicates_a),
                DuplicateCounts::of(b.label(), &output.duplicates_b),
            ],
            result: output.result.summary.clone(),
            warnings: output.result.warnings.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Where and how partitions are written. Empty partitions produce no files.
#[derive(Debug, Clone)]
pub struct ExportPlan {
    pub dir: PathBuf,
    pub delimiter: u8,
    pub csv: bool,
    pub json: bool,
}

impl ExportPlan {
    /// `;`-separated CSV and JSON into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), delimiter: b';', csv: true, json: true }
    }

    pub fn from_config(output: &OutputConfig) -> Self {
        Self {
            dir: output.dir.clone(),
            delimiter: output.delimiter as u8,
            csv: output.wants(OutputFormat::Csv),
            json: output.wants(OutputFormat::Json),
        }
    }

    /// Write every partition of a run plus `summary.json`. Returns the
    /// written paths in write order.
    pub fn write_run(
        &self,
        a: &Dataset,
        b: &Dataset,
        output: &RunOutput,
        summary: &RunSummary,
    ) -> Result<Vec<PathBuf>, ExportError> {
        let mut written = Vec::new();
        written.extend(self.write_duplicates(a, &output.duplicates_a)?);
        written.extend(self.write_duplicates(b, &output.duplicates_b)?);
        written.extend(self.write_only_in(a, &output.result.only_a)?);
        written.extend(self.write_only_in(b, &output.result.only_b)?);
        written.extend(self.write_differences(a.label(), b.label(), &output.result.differing)?);
        written.push(self.write_summary(summary)?);
        Ok(written)
    }

    /// Every record belonging to some group, in dataset order (CSV), and the
    /// groups with their records (JSON).
    pub fn write_duplicates(
        &self,
        dataset: &Dataset,
        groups: &[DuplicateGroup],
    ) -> Result<Vec<PathBuf>, ExportError> {
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        let stem = duplicates_stem(dataset.label());
        let mut written = Vec::new();

        if self.csv {
            let mut positions: Vec<usize> = groups.iter().flat_map(|g| g.positions.iter().copied()).collect();
            positions.sort_unstable();
            let records = positions.iter().filter_map(|&p| dataset.get(p));
            written.push(self.write_records_csv(&stem, dataset.columns(), records)?);
        }
        if self.json {
            let body: Vec<GroupJson<'_>> = groups
                .iter()
                .map(|g| GroupJson {
                    key: &g.key,
                    positions: &g.positions,
                    records: g.positions.iter().filter_map(|&p| dataset.get(p)).collect(),
                })
                .collect();
            written.push(self.write_json(&stem, &body)?);
        }
        Ok(written)
    }

    pub fn write_only_in(&self, dataset: &Dataset, records: &[Record]) -> Result<Vec<PathBuf>, ExportError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let stem = only_in_stem(dataset.label());
        let mut written = Vec::new();
        if self.csv {
            written.push(self.write_records_csv(&stem, dataset.columns(), records.iter())?);
        }
        if self.json {
            written.push(self.write_json(&stem, records)?);
        }
        Ok(written)
    }

    /// One CSV row per field diff: key values, `COLUMN`, A's value, B's value.
    pub fn write_differences(
        &self,
        label_a: &str,
        label_b: &str,
        pairs: &[DifferingPair],
    ) -> Result<Vec<PathBuf>, ExportError> {
        let Some(first) = pairs.first() else {
            return Ok(Vec::new());
        };
        let mut written = Vec::new();

        if self.csv {
            let path = self.path_for(DIFFERENCES_STEM, "csv");
            let mut writer = self.csv_writer(&path)?;
            let mut header: Vec<&str> = first.key.columns().iter().map(|c| c.as_str()).collect();
            header.extend(["COLUMN", label_a, label_b]);
            writer.write_record(&header).map_err(|e| ExportError::io(&path, e))?;

            for pair in pairs {
                for diff in &pair.diffs {
                    let mut row: Vec<&str> = pair.key.values().iter().map(String::as_str).collect();
                    row.extend([diff.column.as_str(), diff.a.as_str(), diff.b.as_str()]);
                    writer.write_record(&row).map_err(|e| ExportError::io(&path, e))?;
                }
            }
            writer.flush().map_err(|e| ExportError::io(&path, e))?;
            log::debug!("wrote {}", path.display());
            written.push(path);
        }
        if self.json {
            written.push(self.write_json(DIFFERENCES_STEM, pairs)?);
        }
        Ok(written)
    }

    pub fn write_summary(&self, summary: &RunSummary) -> Result<PathBuf, ExportError> {
        self.ensure_dir()?;
        let path = self.dir.join(SUMMARY_FILE);
        write_pretty(&path, summary)?;
        Ok(path)
    }

    // -----------------------------------------------------------------------

    fn path_for(&self, stem: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{stem}.{ext}"))
    }

    fn ensure_dir(&self) -> Result<(), ExportError> {
        fs::create_dir_all(&self.dir).map_err(|e| ExportError::io(&self.dir, e))
    }

    fn csv_writer(&self, path: &Path) -> Result<::csv::Writer<File>, ExportError> {
        self.ensure_dir()?;
        ::csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_path(path)
            .map_err(|e| ExportError::io(path, e))
    }

    fn write_records_csv<'r>(
        &self,
        stem: &str,
        columns: &[ColumnIdentifier],
        records: impl Iterator<Item = &'r Record>,
    ) -> Result<PathBuf, ExportError> {
        let path = self.path_for(stem, "csv");
        let mut writer = self.csv_writer(&path)?;
        writer
            .write_record(columns.iter().map(|c| c.as_str()))
            .map_err(|e| ExportError::io(&path, e))?;
        for record in records {
            writer.write_record(record.values()).map_err(|e| ExportError::io(&path, e))?;
        }
        writer.flush().map_err(|e| ExportError::io(&path, e))?;
        log::debug!("wrote {}", path.display());
        Ok(path)
    }

    fn write_json<T: Serialize + ?Sized>(&self, stem: &str, value: &T) -> Result<PathBuf, ExportError> {
        self.ensure_dir()?;
        let path = self.path_for(stem, "json");
        write_pretty(&path, value)?;
        Ok(path)
    }
}

#[derive(Serialize)]
struct GroupJson<'a> {
    key: &'a datalyzer_recon::Key,
    positions: &'a [usize],
    records: Vec<&'a Record>,
}

fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ExportError> {
    let file = File::create(path).map_err(|e| ExportError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| ExportError::Serialize(e.to_string()))?;
    writer.write_all(b"\n").map_err(|e| ExportError::io(path, e))?;
    writer.flush().map_err(|e| ExportError::io(path, e))?;
    log::debug!("wrote {}", path.display());
    Ok(())
}
