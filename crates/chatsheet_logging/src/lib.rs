//! Tracing setup and the `~/.chatsheet` layout shared by ChatSheet binaries.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const QUIET_FILTER: &str = "chatsheet=info,chatsheet_db=info";
const VERBOSE_FILTER: &str =
    "chatsheet=debug,chatsheet_db=debug,chatsheet_schema=debug,chatsheet_sql=debug";

/// Log files kept per binary, the live one included.
const KEEP_FILES: usize = 5;
const FILE_LIMIT_BYTES: u64 = 10 * 1024 * 1024;

pub struct LogConfig<'a> {
    /// Log file stem, e.g. `chatsheet` writes `chatsheet.log`.
    pub app_name: &'a str,
    /// Send the full filter to stderr as well; otherwise stderr only gets warnings.
    pub verbose: bool,
    pub log_to_file: bool,
}

/// Install the global subscriber. `RUST_LOG` replaces the default filter.
///
/// If the log file cannot be opened, stderr logging is still installed and
/// the file error is returned so the caller can mention it.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if config.verbose {
                VERBOSE_FILTER
            } else {
                QUIET_FILTER
            })
        })
    };
    let stderr_filter = if config.verbose {
        filter()
    } else {
        EnvFilter::new("warn")
    };

    let (log_file, file_error) = if config.log_to_file {
        match open_log_file(config.app_name) {
            Ok(file) => (Some(file), None),
            Err(err) => (None, Some(err)),
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(log_file.map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(filter())
        }))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(stderr_filter),
        )
        .try_init()
        .context("tracing subscriber already installed")?;

    match file_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn open_log_file(app_name: &str) -> Result<CappedLogFile> {
    let dir = logs_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("cannot create log directory {}", dir.display()))?;
    CappedLogFile::open(&dir, app_name, KEEP_FILES, FILE_LIMIT_BYTES)
        .with_context(|| format!("cannot open log file in {}", dir.display()))
}

/// `$CHATSHEET_HOME`, else `~/.chatsheet` (under the temp dir when there is no home).
pub fn chatsheet_home() -> PathBuf {
    match std::env::var_os("CHATSHEET_HOME") {
        Some(home) => PathBuf::from(home),
        None => dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".chatsheet"),
    }
}

pub fn logs_dir() -> PathBuf {
    chatsheet_home().join("logs")
}

/// Default config file location.
pub fn config_path() -> PathBuf {
    chatsheet_home().join("config.toml")
}

/// Append-only log file that starts over once it passes a size limit.
///
/// `app.log` is live; on rollover it becomes `app.log.1`, older files shift
/// up by one and anything past `keep - 1` is removed.
struct CappedLogFile {
    live: PathBuf,
    keep: usize,
    limit: u64,
    file: File,
    written: u64,
}

impl CappedLogFile {
    fn open(dir: &Path, app_name: &str, keep: usize, limit: u64) -> io::Result<Self> {
        let stem: String = app_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let live = dir.join(format!("{stem}.log"));
        let file = append_to(&live)?;
        let written = file.metadata()?.len();
        let mut log = Self {
            live,
            keep: keep.max(1),
            limit,
            file,
            written,
        };
        if log.written > log.limit {
            log.roll()?;
        }
        Ok(log)
    }

    fn backup(&self, n: usize) -> PathBuf {
        let mut name = self.live.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn roll(&mut self) -> io::Result<()> {
        self.file.flush()?;
        for n in (1..self.keep).rev() {
            let from = if n == 1 { self.live.clone() } else { self.backup(n - 1) };
            match fs::rename(&from, self.backup(n)) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err),
                _ => {}
            }
        }
        if self.keep == 1 {
            fs::remove_file(&self.live).or_else(|err| match err.kind() {
                io::ErrorKind::NotFound => Ok(()),
                _ => Err(err),
            })?;
        }
        self.file = append_to(&self.live)?;
        self.written = 0;
        Ok(())
    }
}

fn append_to(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl Write for CappedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.limit {
            self.roll()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
