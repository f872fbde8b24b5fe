//! Snapshot codec
//!
//! Reads and writes the snapshot file.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::config::SnapshotWriteMode;
use crate::error::{PersistStage, Result, TideError};

use super::{LoadOutcome, Snapshot, SnapshotView};

/// Serializes the full store state to a single backing file
#[derive(Debug)]
pub struct SnapshotCodec {
    path: PathBuf,
    write_mode: SnapshotWriteMode,
    sync: bool,
}

impl SnapshotCodec {
    pub fn new(path: impl Into<PathBuf>, write_mode: SnapshotWriteMode, sync: bool) -> Self {
        Self {
            path: path.into(),
            write_mode,
            sync,
        }
    }

    /// Overwrite the snapshot with `view`
    ///
    /// The last successful save is authoritative. I/O failures come back as
    /// `TideError::Persistence` since the caller's state is already mutated.
    pub fn save(&self, view: &SnapshotView<'_>) -> Result<()> {
        let bytes = serde_json::to_vec(view)?;

        let written = match self.write_mode {
            SnapshotWriteMode::InPlace => self.write_file(&self.path, &bytes),
            SnapshotWriteMode::AtomicRename => {
                let tmp_path = self.temp_path();
                self.write_file(&tmp_path, &bytes)
                    .and_then(|_| fs::rename(&tmp_path, &self.path))
            }
        };

        written.map_err(|e| TideError::persistence(PersistStage::Snapshot, e))
    }

    /// Read and parse the snapshot file
    pub fn load(&self) -> Result<LoadOutcome> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LoadOutcome::Missing),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) => Ok(LoadOutcome::Loaded(snapshot)),
            Err(e) => Ok(LoadOutcome::Corrupt(e.to_string())),
        }
    }

    /// Move an unreadable snapshot aside so the next save does not destroy it
    ///
    /// Returns the new location.
    pub fn quarantine(&self) -> Result<PathBuf> {
        let target = self.sibling_path(".corrupt");
        fs::rename(&self.path, &target)?;
        Ok(target)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;

        if self.sync {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling_path(".tmp")
    }

    /// "store.json" + ".tmp" → "store.json.tmp"
    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("snapshot"));
        name.push(suffix);
        self.path.with_file_name(name)
    }
}
