//! Operation log writer
//!
//! Appends entries to the log file. The file is opened once per engine and
//! never truncated.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{PersistStage, Result, TideError};

use super::OpLogEntry;

/// Writes entries to the operation log
pub struct OpLogWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    sync: bool,
    entries_written: u64,
}

impl OpLogWriter {
    /// Open or create the log in append mode
    pub fn open(path: &Path, sync: bool) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            sync,
            entries_written: 0,
        })
    }

    /// Append one entry and flush it to the OS
    pub fn append(&mut self, entry: &OpLogEntry) -> Result<()> {
        let mut line = entry.to_line()?;
        line.push('\n');

        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| TideError::persistence(PersistStage::OperationLog, e))?;

        if self.sync {
            self.writer
                .get_ref()
                .sync_data()
                .map_err(|e| TideError::persistence(PersistStage::OperationLog, e))?;
        }

        self.entries_written += 1;
        Ok(())
    }

    /// Force buffered data to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Entries appended through this writer since it was opened
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
