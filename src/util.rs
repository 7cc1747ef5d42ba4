use std::fs;
use std::path::Path;

/// Last `nlines` lines of a subprocess log, for failure messages.
///
/// Returns an empty string if the log cannot be read; the caller is already
/// on an error path and the exit code alone is still useful.
pub fn log_tail(path: &Path, nlines: usize) -> String {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return String::new(),
    };
    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.len().saturating_sub(nlines);
    lines[start..].join("\n")
}
