//! Atomic JSON snapshot files.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::graph::GraphSnapshot;

/// A graph snapshot on disk, with a rolling `.backup` copy.
///
/// Saves go to a temporary file in the same directory which is then renamed
/// over the target, so readers never see a half-written file.
#[derive(Debug)]
pub struct SnapshotFile {
    path: PathBuf,
    backup_every: u64,
    saves: AtomicU64,
}

impl SnapshotFile {
    /// Creates a handle for `path`; a backup is written every 10 saves.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_every: 10,
            saves: AtomicU64::new(0),
        }
    }

    /// Writes the backup every `saves` saves; zero disables backups.
    #[must_use]
    pub fn with_backup_every(mut self, saves: u64) -> Self {
        self.backup_every = saves;
        self
    }

    /// The snapshot path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The backup path: the snapshot path with `.backup` appended.
    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".backup");
        PathBuf::from(name)
    }

    /// Successful saves so far.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Writes `snapshot` atomically, plus the backup when due.
    pub fn save(&self, snapshot: &GraphSnapshot) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.path, &bytes)?;

        let count = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(path = %self.path.display(), communities = snapshot.len(), saves = count, "Snapshot saved");

        if self.backup_every > 0 && count % self.backup_every == 0 {
            let backup = self.backup_path();
            write_atomic(&backup, &bytes)?;
            debug!(path = %backup.display(), "Backup written");
        }
        Ok(())
    }

    /// Reads the snapshot; `Ok(None)` if the file does not exist.
    pub fn load(&self) -> Result<Option<GraphSnapshot>> {
        read_snapshot(&self.path)
    }

    /// Reads the snapshot, falling back to the backup if the primary file
    /// is missing or unreadable.
    pub fn load_or_backup(&self) -> Result<Option<GraphSnapshot>> {
        match self.load() {
            Ok(Some(snapshot)) => Ok(Some(snapshot)),
            Ok(None) => read_snapshot(&self.backup_path()),
            Err(error) => {
                warn!(path = %self.path.display(), error = %error, "Snapshot unreadable, trying backup");
                match read_snapshot(&self.backup_path())? {
                    Some(snapshot) => Ok(Some(snapshot)),
                    None => Err(error),
                }
            }
        }
    }
}

fn read_snapshot(path: &Path) -> Result<Option<GraphSnapshot>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
