//! Single-writer lock for file-backed databases.
//!
//! DuckDB allows one writing process per file. Before a session opens
//! `sheets.duckdb` it takes an exclusive `fs2` lock on `sheets.duckdb.lock`;
//! a second `chatsheet` process sees [`LockError::Held`] right away.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("{} is in use by another chatsheet process", .0.display())]
    Held(PathBuf),

    #[error("cannot open lock file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot lock {}: {source}", path.display())]
    Acquire {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive hold on a database file. Dropping it closes the handle, which
/// releases the OS lock.
#[derive(Debug)]
pub struct WriterLock {
    file: File,
    path: PathBuf,
}

impl WriterLock {
    /// Take the lock for `db_path` without blocking.
    pub fn acquire(db_path: &Path) -> Result<Self, LockError> {
        let path = lock_file_for(db_path);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;

        // `FileExt::` so the fs2 call is used on toolchains where std also has one.
        if let Err(source) = FileExt::try_lock_exclusive(&file) {
            return Err(if source.kind() == io::ErrorKind::WouldBlock {
                debug!(lock = %path.display(), "writer lock already held");
                LockError::Held(db_path.to_path_buf())
            } else {
                LockError::Acquire { path, source }
            });
        }

        // Holder pid for whoever finds the file later; failure is not fatal.
        let stamp = format!("{}\n", std::process::id());
        if let Err(err) = file.set_len(0).and_then(|()| file.write_all(stamp.as_bytes())) {
            debug!(lock = %path.display(), %err, "could not record lock holder");
        }

        info!(lock = %path.display(), "writer lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        debug!(lock = %self.path.display(), "writer lock released");
        let _ = FileExt::unlock(&self.file);
    }
}

/// `sheets.duckdb` locks through `sheets.duckdb.lock`, `sheets` through `sheets.lock`.
pub fn lock_file_for(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}
