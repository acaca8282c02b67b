//! Periodic snapshot persistence.
//!
//! The engine asks the checkpointer whether a backup is owed right before
//! every blocking console read (the one natural quiescence point, so no
//! coordination with the dispatch loop is needed). Backups are gated on
//! wall-clock time: at most one per minute, with a timestamped archive copy
//! roughly every fifteen minutes.
//!
//! The canonical file is replaced atomically: the snapshot is written to a
//! fresh temporary file in the backup folder and renamed over `backup.dat`
//! once complete. A failed write leaves the previous `backup.dat` intact.
//! Every failure in this module is logged and swallowed; persistence
//! trouble never stops the guest.

use crate::machine::snapshot::Snapshot;
use crate::utils::log::{days_to_date, Logger};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Name of the canonical snapshot file within the backup folder.
pub const BACKUP_FILE: &str = "backup.dat";

/// Minimum wall-clock time between backups.
const BACKUP_INTERVAL: Duration = Duration::from_secs(60);

/// Minimum wall-clock time between archive copies.
const ARCHIVE_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// What kind of backup is owed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Backup {
    /// Replace `backup.dat` only.
    Canonical,
    /// Replace `backup.dat` and emit a timestamped archive copy.
    WithArchive,
}

pub(crate) struct Checkpointer {
    folder: Option<PathBuf>,
    /// Wall-clock time of the last backup attempt. Starts at the epoch so
    /// the first Input both checkpoints and archives.
    last_backup: SystemTime,
    logger: Logger,
}

impl Checkpointer {
    pub(crate) fn new(folder: Option<PathBuf>, logger: Logger) -> Self {
        Self {
            folder,
            last_backup: UNIX_EPOCH,
            logger,
        }
    }

    /// Returns the kind of backup owed right now, if any.
    ///
    /// Always `None` when no backup folder is configured.
    pub(crate) fn due(&self) -> Option<Backup> {
        self.folder.as_ref()?;
        let elapsed = SystemTime::now()
            .duration_since(self.last_backup)
            .unwrap_or_default();
        if elapsed < BACKUP_INTERVAL {
            return None;
        }
        Some(if elapsed >= ARCHIVE_INTERVAL {
            Backup::WithArchive
        } else {
            Backup::Canonical
        })
    }

    /// Writes the snapshot to stable storage.
    ///
    /// The last-backup stamp advances whether or not the write succeeds, so
    /// a persistently failing folder is retried once a minute rather than on
    /// every input byte.
    pub(crate) fn write(&mut self, snapshot: &Snapshot, kind: Backup) {
        self.last_backup = SystemTime::now();
        let Some(folder) = self.folder.clone() else {
            return;
        };

        let data = snapshot.to_bytes();

        // Archive copies are written first and never block the canonical
        // replacement.
        if kind == Backup::WithArchive {
            let name = format!("backup.{}.dat", archive_timestamp(self.last_backup));
            if let Err(err) = std::fs::write(folder.join(&name), &data) {
                self.logger
                    .warn(&format!("error writing archive {}: {}", name, err));
            }
        }

        if let Err(err) = write_canonical(&folder, &data) {
            self.logger.error(&format!("error writing backup: {}", err));
        }
    }
}

/// Writes `data` to a fresh temporary file in `folder` and atomically
/// renames it over the canonical backup file.
fn write_canonical(folder: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix("backup")
        .tempfile_in(folder)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(folder.join(BACKUP_FILE)).map_err(|err| err.error)?;
    Ok(())
}

/// Formats a wall-clock time as `YYYY-MM-DDTHH:MM:SS` for archive names.
fn archive_timestamp(time: SystemTime) -> String {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let (year, month, day) = days_to_date(secs / 86400);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
        year,
        month,
        day,
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60
    )
}
