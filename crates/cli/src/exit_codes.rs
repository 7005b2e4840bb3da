//! CLI Exit Code Registry
//!
//! Single source of truth for the exit codes of `sisxml`. Scripts that run the
//! monthly close rely on them.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Success                                              |
//! | 1    | General error (unspecified)                          |
//! | 2    | Usage error (bad arguments, bad date)                |
//! | 3    | No data: nothing to reconcile for the request        |
//! | 4    | Invalid config (unreadable, unparsable, invalid)     |
//! | 5    | Report could not be written                          |

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, malformed `--from`/`--to`.
pub const EXIT_USAGE: u8 = 2;

/// No invoice location exists, nothing was issued in the period, or the
/// primary ledger is missing.
pub const EXIT_NO_DATA: u8 = 3;

/// Config file unreadable, unparsable or failing validation.
pub const EXIT_INVALID_CONFIG: u8 = 4;

/// Workbook could not be built or written.
pub const EXIT_REPORT_WRITE: u8 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_NO_DATA,
            EXIT_INVALID_CONFIG,
            EXIT_REPORT_WRITE,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
