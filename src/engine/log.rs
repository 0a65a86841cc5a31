use anyhow::{Context, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const LOG_FILE_NAME: &str = "hwconvert.log";

/// Default location of the conversion log: hwconvert.log in the current directory
pub fn default_log_path() -> Result<PathBuf> {
    Ok(std::env::current_dir()?.join(LOG_FILE_NAME))
}

/// Write debug log to hwconvert.log in current directory
pub fn write_debug_log(message: &str) -> Result<()> {
    append_log(&default_log_path()?, message)
}

/// Append a timestamped line, creating the file if needed
pub fn append_log(path: &Path, message: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    writeln!(file, "[{}] {}", timestamp, message)?;
    Ok(())
}
