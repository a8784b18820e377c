//! Session snapshot persistence with file locking.
//!
//! An in-progress session is saved to `workout_day_{id}.json` so it can be
//! restored when the driver is restarted. This is the only persisted copy of
//! session state.

use crate::{Error, ProgramDayId, Result, WorkoutSession};
use fs2::FileExt;
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Directory-backed store of session snapshots, one file per program day
#[derive(Clone, Debug)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Snapshot path for a program day
    pub fn path_for(&self, program_day_id: ProgramDayId) -> PathBuf {
        self.dir.join(format!("workout_day_{}.json", program_day_id))
    }

    pub fn save(&self, session: &WorkoutSession) -> Result<()> {
        let path = self.path_for(session.program_day_id);
        write_json_atomic(&path, session)?;
        tracing::debug!(
            "Saved session {} for day {} to {:?}",
            session.attempt_id,
            session.program_day_id,
            path
        );
        Ok(())
    }

    /// Load the snapshot for a day.
    ///
    /// Returns `None` when no snapshot exists or it cannot be parsed; a
    /// corrupt snapshot is logged and ignored.
    pub fn load(&self, program_day_id: ProgramDayId) -> Result<Option<WorkoutSession>> {
        let path = self.path_for(program_day_id);
        let Some(contents) = read_locked(&path)? else {
            return Ok(None);
        };

        match serde_json::from_str::<WorkoutSession>(&contents) {
            Ok(session) if session.program_day_id == program_day_id => Ok(Some(session)),
            Ok(session) => {
                tracing::warn!(
                    "Snapshot {:?} belongs to day {}, ignoring",
                    path,
                    session.program_day_id
                );
                Ok(None)
            }
            Err(e) => {
                tracing::warn!("Failed to parse session snapshot {:?}: {}. Ignoring.", path, e);
                Ok(None)
            }
        }
    }

    pub fn remove(&self, program_day_id: ProgramDayId) -> Result<()> {
        let path = self.path_for(program_day_id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Removed session snapshot {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Program days that currently have a snapshot on disk
    pub fn saved_days(&self) -> Result<Vec<ProgramDayId>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut days = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name
                .strip_prefix("workout_day_")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|id| id.parse().ok())
            {
                days.push(id);
            }
        }
        days.sort_unstable();
        Ok(days)
    }
}

/// Read a whole file under a shared lock; `None` if it does not exist
pub(crate) fn read_locked(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let mut contents = String::new();
    let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
    file.unlock()?;
    read?;

    Ok(Some(contents))
}

/// Serialize `value` as JSON and atomically replace `path` with it
///
/// Writes to a temp file in the same directory, syncs it, then renames it
/// over the target.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "snapshot path missing parent",
        ))
    })?;
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    temp.as_file().lock_exclusive()?;

    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }

    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;

    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
