//! JSONL audit writer with daily file rotation.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;
use tracing::warn;

use super::{AuditEntry, AuditLogger};
use crate::{AppError, Result};

struct OpenFile {
    date: NaiveDate,
    writer: BufWriter<File>,
}

/// Appends one JSON object per line to `<log_dir>/audit-YYYY-MM-DD.jsonl`.
///
/// The file is chosen by the entry's own UTC date, so a run spanning
/// midnight splits across two files. Shared by every record task behind
/// an `Arc`.
pub struct JsonlAuditWriter {
    log_dir: PathBuf,
    current: Mutex<Option<OpenFile>>,
}

impl JsonlAuditWriter {
    /// Construct a writer that stores logs in `log_dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Audit`] if the directory cannot be created.
    pub fn new(log_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&log_dir).map_err(|err| {
            AppError::Audit(format!(
                "failed to create audit directory {}: {err}",
                log_dir.display()
            ))
        })?;
        Ok(Self {
            log_dir,
            current: Mutex::new(None),
        })
    }

    /// Path of the file holding entries for `date`.
    #[must_use]
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        Self::file_path(&self.log_dir, date)
    }

    fn file_path(log_dir: &Path, date: NaiveDate) -> PathBuf {
        log_dir.join(format!("audit-{date}.jsonl"))
    }

    fn open(log_dir: &Path, date: NaiveDate) -> Result<BufWriter<File>> {
        let path = Self::file_path(log_dir, date);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| {
                AppError::Audit(format!("failed to open {}: {err}", path.display()))
            })?;
        Ok(BufWriter::new(file))
    }
}

impl AuditLogger for JsonlAuditWriter {
    fn log_entry(&self, entry: AuditEntry) -> Result<()> {
        let date = entry.timestamp.date_naive();
        let line = serde_json::to_string(&entry)
            .map_err(|err| AppError::Audit(format!("failed to serialize entry: {err}")))?;

        let mut guard = self
            .current
            .lock()
            .map_err(|_| AppError::Audit("writer mutex poisoned".into()))?;

        if guard.as_ref().is_none_or(|open| open.date != date) {
            *guard = Some(OpenFile {
                date,
                writer: Self::open(&self.log_dir, date)?,
            });
        }

        let Some(open) = guard.as_mut() else {
            return Err(AppError::Audit("no audit file open".into()));
        };
        if let Err(err) = writeln!(open.writer, "{line}").and_then(|()| open.writer.flush()) {
            warn!(%err, "failed to write audit entry");
            return Err(AppError::Audit(format!("write failed: {err}")));
        }
        Ok(())
    }
}
