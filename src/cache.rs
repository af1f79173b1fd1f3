//! Helpers shared by the on-disk caches: an injectable clock, a freshness
//! check based on the file's modification time, and atomic replacement of the
//! cached contents.

use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always reports the same instant.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Whether the file at `path` was last modified more than `window` ago.
/// A missing file is always stale.
pub fn is_stale(path: &Path, clock: &dyn Clock, window: Duration) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    let modified: DateTime<Utc> = fs::metadata(path)?.modified()?.into();
    let age = clock.now() - modified;
    tracing::trace!("Cache {} is {}s old", path.display(), age.num_seconds());
    Ok(age > window)
}

/// Replaces the file contents through a sibling temporary file so readers
/// never observe a partial write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
