//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                                        |
//! |------|----------------------------------------------------------------|
//! | 0    | Success                                                        |
//! | 1    | Differences found (only with `--fail-on-diff`)                 |
//! | 2    | CLI usage error (bad args)                                     |
//! | 3    | Invalid configuration (unreadable, unparsable, failed checks)  |
//! | 4    | Schema error (missing key column, column collision, ragged row)|
//! | 5    | Load error (I/O, decoding, format, SQL, unsafe WHERE)          |
//! | 6    | Export error                                                   |
//! | 7    | Internal reconciliation error                                  |
//! | 130  | Cancelled (Ctrl-C)                                             |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant below
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `CliError` construction

use datalyzer_recon::ErrorKind;

/// Success - command completed; differences, if any, were reported.
pub const EXIT_SUCCESS: u8 = 0;

/// Differences or duplicates found and `--fail-on-diff` was given.
/// Like `diff(1)`, exit 1 means "inputs differ."
pub const EXIT_DIFFS: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Config file missing, unparsable, or failing validation. Also an empty
/// key column list.
pub const EXIT_CONFIG: u8 = 3;

/// A dataset does not fit the requested key or has an invalid header.
pub const EXIT_SCHEMA: u8 = 4;

/// A source could not be read or decoded.
pub const EXIT_LOAD: u8 = 5;

/// An output file could not be written.
pub const EXIT_EXPORT: u8 = 6;

/// Engine invariant violation. Always a bug.
pub const EXIT_INTERNAL: u8 = 7;

/// Run interrupted (128 + SIGINT).
pub const EXIT_CANCELLED: u8 = 130;

/// Map an engine error kind to its exit code.
pub fn recon_exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Configuration => EXIT_CONFIG,
        ErrorKind::Schema => EXIT_SCHEMA,
        ErrorKind::Reconciliation => EXIT_INTERNAL,
        ErrorKind::Cancelled => EXIT_CANCELLED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_DIFFS,
            EXIT_USAGE,
            EXIT_CONFIG,
            EXIT_SCHEMA,
            EXIT_LOAD,
            EXIT_EXPORT,
            EXIT_INTERNAL,
            EXIT_CANCELLED,
        ];
        let mut sorted = codes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }

    #[test]
    fn recon_kinds_map() {
        assert_eq!(recon_exit_code(ErrorKind::Schema), EXIT_SCHEMA);
        assert_eq!(recon_exit_code(ErrorKind::Cancelled), EXIT_CANCELLED);
    }
}
