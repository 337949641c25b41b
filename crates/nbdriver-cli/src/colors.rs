//! ANSI styling for progress and summary lines.

use std::fmt::Display;
use std::io::{self, Write};

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const RED: &str = "\x1b[31m";

/// Wrap `text` in `style`, resetting afterwards.
pub fn paint(style: &str, text: impl Display) -> String {
    format!("{}{}{}", style, text, RESET)
}

/// Flush stdout so markers printed without a newline show up.
#[inline]
pub fn flush_stdout() {
    io::stdout().flush().ok();
}
