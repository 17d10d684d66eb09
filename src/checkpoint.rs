//! Durable snapshots of the search state.
//!
//! Saving is best effort: the in-memory [`SearchState`] stays authoritative and a failed
//! save is simply attempted again at the next interval. Loading is strict, since resuming
//! from a damaged history would silently change the search.

use std::{
    fs,
    path::{Path, PathBuf},
};

use time::{format_description, OffsetDateTime};
use tracing::{error, info, instrument};

use crate::{builder::write_synced, error::TunerError, history::SearchState};

/// Writes checkpoints of one run to a fixed file.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    path: PathBuf,
    failed_saves: usize,
}

impl Checkpointer {
    /// `engine-tuner.state.<YYYYMMDD_HHMMSS>.json` in `dir`, named after the run's creation
    /// time so a resumed run keeps writing to the same file.
    pub fn new(dir: impl AsRef<Path>, created_at: OffsetDateTime) -> Self {
        Checkpointer::at(dir.as_ref().join(checkpoint_file_name(created_at)))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Checkpointer {
            path: path.into(),
            failed_saves: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of saves that failed since this checkpointer was created.
    pub fn failed_saves(&self) -> usize {
        self.failed_saves
    }

    /// Persists `state` through a temporary sibling file and a rename, so a crash never
    /// leaves a truncated checkpoint behind. Returns whether the save succeeded.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn save(&mut self, state: &SearchState) -> bool {
        match self.try_save(state) {
            Ok(()) => {
                info!(trials = state.iteration_count(), "checkpoint saved");
                true
            }
            Err(e) => {
                self.failed_saves += 1;
                error!("checkpoint save failed, will retry at the next interval: {e}");
                false
            }
        }
    }

    fn try_save(&self, state: &SearchState) -> Result<(), TunerError> {
        let bytes = state.serialize()?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        write_synced(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Reads a checkpoint back. Any failure, including a missing file, is a
    /// [`TunerError::CorruptState`].
    #[instrument]
    pub fn load(path: &Path) -> Result<SearchState, TunerError> {
        let bytes = fs::read(path).map_err(|e| {
            TunerError::CorruptState(format!("cannot read '{}': {e}", path.display()))
        })?;
        let state = SearchState::deserialize(&bytes)?;
        info!(trials = state.iteration_count(), "checkpoint loaded");
        Ok(state)
    }
}

fn checkpoint_file_name(created_at: OffsetDateTime) -> String {
    let created_at = time::UtcOffset::current_local_offset()
        .map(|offset| created_at.to_offset(offset))
        .unwrap_or(created_at);
    let stamp = format_description::parse("[year][month][day]_[hour][minute][second]")
        .ok()
        .and_then(|format| created_at.format(&format).ok())
        .unwrap_or_else(|| created_at.unix_timestamp().to_string());
    format!("engine-tuner.state.{stamp}.json")
}
