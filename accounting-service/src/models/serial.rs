//! Human-readable serial numbers: `{PREFIX}-{YEAR}-{seq:04}`.
//!
//! Sequences are independent per prefix per year; the sequence value is
//! `count(existing records of that prefix in that year) + 1`, so sequential
//! creation is gapless. The store allocates the serial and persists the
//! record in one atomic step.

/// Prefix used for directly posted journal entries.
pub const JOURNAL_ENTRY_PREFIX: &str = "JRN";

/// Format a serial number.
pub fn format_serial(prefix: &str, year: i32, seq: u32) -> String {
    format!("{prefix}-{year}-{seq:04}")
}
