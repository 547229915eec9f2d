// Subscriber setup for the binary; stderr by default, a file when asked
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "AB_SHEET_LOG";
pub const LOG_FILE_ENV: &str = "AB_SHEET_LOG_FILE";

const DEFAULT_FILTER: &str = "info";

pub fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber. A second call, or a subscriber installed by
/// the host, is left alone.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let file = std::env::var_os(LOG_FILE_ENV).and_then(|path| match open_log_file(Path::new(&path)) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("cannot open log file {}: {}", Path::new(&path).display(), e);
            None
        }
    });

    let _ = match file {
        Some(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).try_init(),
        None => builder.with_writer(std::io::stderr).try_init(),
    };
}
