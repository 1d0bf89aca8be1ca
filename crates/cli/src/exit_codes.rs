//! CLI Exit Code Registry
//!
//! Every exit code `pgrid` can return is defined here. Scripts rely on them,
//! so codes are never renumbered.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                                   |
//! |---------|-----------|-----------------------------------------------|
//! | 0       | Universal | Success                                       |
//! | 1       | Universal | General error (unspecified)                   |
//! | 2       | Universal | Usage error (bad args, unknown column)        |
//! | 3-9     | data      | File and REST read/write, parse failures      |
//! | 10-19   | ai        | Provider configuration                        |
//! | 20-29   | job       | Column job did not complete                   |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Update the table above
//! 3. Wire it into a `CliError` constructor in main.rs

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure (e.g. the async runtime could not start).
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unknown column or provider.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Data (3-9)
// =============================================================================

/// Input could not be read or output could not be written.
pub const EXIT_IO: u8 = 3;

/// Malformed input: filter expression, JSON layout, settings file.
pub const EXIT_PARSE: u8 = 4;

/// File extension is not a supported format.
pub const EXIT_FORMAT: u8 = 5;

/// REST endpoint unreachable or answered with an error status.
pub const EXIT_API: u8 = 6;

// =============================================================================
// AI (10-19)
// =============================================================================

/// Provider selected but no API key found in keychain or environment.
pub const EXIT_AI_MISSING_KEY: u8 = 11;

/// Provider client could not be constructed.
pub const EXIT_AI_PROVIDER: u8 = 12;

// =============================================================================
// Job (20-29)
// =============================================================================

/// Job stopped early on request (Ctrl-C). Partial results are still written.
pub const EXIT_JOB_CANCELLED: u8 = 20;

/// Job aborted on an unexpected failure. Partial results are still written.
pub const EXIT_JOB_FAILED: u8 = 21;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        let mut codes = vec![
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_IO,
            EXIT_PARSE,
            EXIT_FORMAT,
            EXIT_API,
            EXIT_AI_MISSING_KEY,
            EXIT_AI_PROVIDER,
            EXIT_JOB_CANCELLED,
            EXIT_JOB_FAILED,
        ];
        let total = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), total);
    }
}
