//! Terminal color constants for CLI output.

use std::io::{self, Write};

pub const RESET: &str = "\x1b[0m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const CYAN: &str = "\x1b[36m";

/// Flush stderr so a progress line without a newline shows up immediately.
#[inline]
pub fn flush_stderr() {
    io::stderr().flush().ok();
}
