//! Run orchestration: index build, duplicate scan and diff for two datasets,
//! with cooperative cancellation between phases.
//!
//! The two sides of each phase are independent and run on scoped worker
//! threads. The diff is the join point and runs on the calling thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::duplicates::{duplicated_records, scan, DuplicateGroup};
use crate::engine::{diff_indices, ReconciliationResult};
use crate::error::ReconError;
use crate::key::{KeyIndex, KeySpec, ReconWarning};
use crate::model::Dataset;

/// Shared cancel flag. Set to true to stop the run at the next checkpoint.
pub type CancelToken = Arc<AtomicBool>;

pub fn cancel_token() -> CancelToken {
    Arc::new(AtomicBool::new(false))
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    IndexBuild,
    DuplicateScan,
    Diff,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::IndexBuild => "index build",
            Phase::DuplicateScan => "duplicate scan",
            Phase::Diff => "diff",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum RunEvent<'a> {
    PhaseStarted(Phase),
    PhaseFinished { phase: Phase, elapsed: Duration },
    Warning(&'a ReconWarning),
    Duplicates { source: &'a str, groups: usize, records: usize },
}

/// Receives progress from [`run`]. The core never logs on its own.
pub trait RunObserver {
    fn on_event(&self, event: &RunEvent<'_>);
}

pub struct NoopObserver;

impl RunObserver for NoopObserver {
    fn on_event(&self, _event: &RunEvent<'_>) {}
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Raw reconciliation key columns.
    pub key_columns: Vec<String>,
    /// Duplicate-scan key for A; falls back to `key_columns`.
    pub duplicate_keys_a: Option<Vec<String>>,
    pub duplicate_keys_b: Option<Vec<String>>,
    pub parallel: bool,
}

impl RunOptions {
    pub fn new<S: AsRef<str>>(key_columns: &[S]) -> Self {
        RunOptions {
            key_columns: key_columns.iter().map(|s| s.as_ref().to_string()).collect(),
            duplicate_keys_a: None,
            duplicate_keys_b: None,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub duplicates_a: Vec<DuplicateGroup>,
    pub duplicates_b: Vec<DuplicateGroup>,
    pub result: ReconciliationResult,
}

/// Run every phase over `a` and `b`.
///
/// All key specifications are resolved against both datasets before any
/// work starts, so a missing column fails the run without partial output.
pub fn run(
    a: &Dataset,
    b: &Dataset,
    options: &RunOptions,
    cancel: &CancelToken,
    observer: &dyn RunObserver,
) -> Result<RunOutput, ReconError> {
    let spec = KeySpec::new(&options.key_columns)?;
    let dup_spec_a = side_spec(&spec, options.duplicate_keys_a.as_deref())?;
    let dup_spec_b = side_spec(&spec, options.duplicate_keys_b.as_deref())?;

    let key_a = spec.resolve(a)?;
    let key_b = spec.resolve(b)?;
    let dup_key_a = dup_spec_a.resolve(a)?;
    let dup_key_b = dup_spec_b.resolve(b)?;

    let mut warnings: Vec<ReconWarning> = Vec::new();
    for w in spec.warnings().iter().chain(dup_spec_a.warnings()).chain(dup_spec_b.warnings()) {
        if !warnings.contains(w) {
            warnings.push(w.clone());
        }
    }
    for w in &warnings {
        observer.on_event(&RunEvent::Warning(w));
    }

    let (index_a, index_b) = phase(Phase::IndexBuild, cancel, observer, || {
        both(options.parallel, || KeyIndex::build(a, &key_a), || KeyIndex::build(b, &key_b))
    })?;

    let (duplicates_a, duplicates_b) = phase(Phase::DuplicateScan, cancel, observer, || {
        both(options.parallel, || scan(a, &dup_key_a), || scan(b, &dup_key_b))
    })?;
    for (source, groups) in [(a.label(), &duplicates_a), (b.label(), &duplicates_b)] {
        observer.on_event(&RunEvent::Duplicates {
            source,
            groups: groups.len(),
            records: duplicated_records(groups),
        });
    }

    let result = phase(Phase::Diff, cancel, observer, || {
        diff_indices(a, &index_a, b, &index_b, &warnings)
    })?;

    Ok(RunOutput { duplicates_a, duplicates_b, result })
}

fn side_spec(spec: &KeySpec, keys: Option<&[String]>) -> Result<KeySpec, ReconError> {
    match keys {
        Some(keys) => KeySpec::new(keys),
        None => Ok(spec.clone()),
    }
}

fn checkpoint(cancel: &CancelToken) -> Result<(), ReconError> {
    if cancel.load(Ordering::Relaxed) {
        Err(ReconError::Cancelled)
    } else {
        Ok(())
    }
}

fn phase<T>(
    phase: Phase,
    cancel: &CancelToken,
    observer: &dyn RunObserver,
    work: impl FnOnce() -> Result<T, ReconError>,
) -> Result<T, ReconError> {
    checkpoint(cancel)?;
    observer.on_event(&RunEvent::PhaseStarted(phase));
    let start = Instant::now();
    let out = work()?;
    observer.on_event(&RunEvent::PhaseFinished { phase, elapsed: start.elapsed() });
    checkpoint(cancel)?;
    Ok(out)
}

/// Run `left` on the current thread and `right` on a scoped worker.
fn both<L, R>(
    parallel: bool,
    left: impl FnOnce() -> L + Send,
    right: impl FnOnce() -> R + Send,
) -> Result<(L, R), ReconError>
where
    L: Send,
    R: Send,
{
    if !parallel {
        return Ok((left(), right()));
    }
    std::thread::scope(|s| {
        let worker = s.spawn(right);
        let l = left();
        let r = worker
            .join()
            .map_err(|_| ReconError::Reconciliation("worker thread panicked".into()))?;
        Ok((l, r))
    })
}
