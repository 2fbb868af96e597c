//! Process-wide logger setup and the pipeline observer that reports through it.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use datalyzer_recon::pipeline::{RunEvent, RunObserver};
use env_logger::{Builder, Env, Target};

use crate::CliError;

/// Log file size that triggers a rotation.
const LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
/// Rotated files kept next to the log: `<file>.1` (newest) to `<file>.5`.
const LOG_BACKUPS: u32 = 5;

/// Initialize `env_logger`. `RUST_LOG` overrides `level`; `quiet` lowers the
/// default to warnings. With `file`, every line also goes to that file,
/// rotated at 5 MB.
pub fn init(level: &str, file: Option<&Path>, quiet: bool) -> Result<(), CliError> {
    let default = if quiet { "warn" } else { level };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default));
    builder.format_target(false);

    if let Some(path) = file {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .map_err(|e| CliError::config(format!("cannot create log directory {}: {e}", dir.display())))?;
        }
        let file = RotatingFile::open(path, LOG_MAX_BYTES, LOG_BACKUPS)
            .map_err(|e| CliError::config(format!("cannot open log file {}: {e}", path.display())))?;
        builder.target(Target::Pipe(Box::new(Tee { file })));
    }

    // A second init in the same process keeps the first logger.
    let _ = builder.try_init();
    Ok(())
}

/// Writes every log line to stderr and to the log file.
struct Tee {
    file: RotatingFile,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Append-only file that shifts itself to `<path>.1` once a write would
/// take it past `max_bytes`, dropping the oldest backup.
struct RotatingFile {
    path: PathBuf,
    file: File,
    size: u64,
    max_bytes: u64,
    backups: u32,
}

impl RotatingFile {
    fn open(path: &Path, max_bytes: u64, backups: u32) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { path: path.to_path_buf(), file, size, max_bytes, backups })
    }

    fn backup(&self, n: u32) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups == 0 {
            self.file = File::create(&self.path)?;
        } else {
            for n in (1..self.backups).rev() {
                let from = self.backup(n);
                if from.exists() {
                    fs::rename(&from, self.backup(n + 1))?;
                }
            }
            fs::rename(&self.path, self.backup(1))?;
            self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        }
        self.size = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.size > 0 && self.size + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        self.file.write_all(buf)?;
        self.size += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Reports pipeline progress through `log`.
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn on_event(&self, event: &RunEvent<'_>) {
        match event {
            RunEvent::PhaseStarted(phase) => log::debug!("{phase}: started"),
            RunEvent::PhaseFinished { phase, elapsed } => {
                log::info!("{phase}: done in {:.1} ms", elapsed.as_secs_f64() * 1000.0)
            }
            RunEvent::Warning(warning) => log::warn!("{warning}"),
            RunEvent::Duplicates { source, groups: 0, .. } => {
                log::info!("'{source}': no duplicate keys")
            }
            RunEvent::Duplicates { source, groups, records } => {
                log::warn!("'{source}': {groups} duplicated key(s) across {records} records")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_file_rotates_and_keeps_bounded_backups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.log");
        let mut log = RotatingFile::open(&path, 10, 2).unwrap();

        for line in ["aaaaaaaa\n", "bbbbbbbb\n", "cccccccc\n", "dddddddd\n"] {
            log.write_all(line.as_bytes()).unwrap();
        }
        log.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "dddddddd\n");
        assert_eq!(fs::read_to_string(dir.path().join("run.log.1")).unwrap(), "cccccccc\n");
        assert_eq!(fs::read_to_string(dir.path().join("run.log.2")).unwrap(), "bbbbbbbb\n");
        assert!(!dir.path().join("run.log.3").exists());
    }

    #[test]
    fn existing_log_size_counts_toward_the_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.log");
        fs::write(&path, "previous run\n").unwrap();

        let mut log = RotatingFile::open(&path, 16, 5).unwrap();
        log.write_all(b"next run\n").unwrap();
        log.flush().unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("run.log.1")).unwrap(), "previous run\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "next run\n");
    }
}
