// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::state::TaskState;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file is not valid: {0}")]
    Format(#[from] serde_json::Error),
}

/// On-disk envelope.  Unknown versions fail to deserialize and are treated
/// the same as a missing file.
#[derive(Deserialize)]
#[serde(tag = "version")]
enum PersistedRecord {
    #[serde(rename = "1")]
    V1 { state: TaskState },
}

#[derive(Serialize)]
#[serde(tag = "version")]
enum PersistedRecordRef<'a> {
    #[serde(rename = "1")]
    V1 { state: &'a TaskState },
}

/// Single-file persistence for one [`TaskState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `state`, logging instead of failing.  A lost snapshot must
    /// never abort the run.
    pub async fn save(&self, state: &TaskState) {
        if let Err(e) = self.try_save(state).await {
            warn!(path = %self.path.display(), error = %e, "could not save task state");
        }
    }

    /// Write to a sibling temp file and rename over the target so a crash
    /// mid-write leaves the previous snapshot intact.
    pub async fn try_save(&self, state: &TaskState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&PersistedRecordRef::V1 { state })?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), iteration = state.iteration_count, "task state saved");
        Ok(())
    }

    /// Load the record for `task_id`.  `None` covers a missing file, a
    /// corrupt or unknown-version file, and a record for a different task.
    pub async fn load(&self, task_id: &str) -> Option<TaskState> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "no task state to load");
                return None;
            }
        };
        let state = match serde_json::from_str::<PersistedRecord>(&raw) {
            Ok(PersistedRecord::V1 { state }) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable task state");
                return None;
            }
        };
        if state.task_id != task_id {
            debug!(wanted = task_id, found = %state.task_id, "task state belongs to another task");
            return None;
        }
        Some(state)
    }

    /// Remove the state file.  A missing file is not an error.
    pub async fn cleanup(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "task state removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "could not remove task state"),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
