//! Append-only JSON-lines decision journal.
//!
//! Each mutation appends one entry; opening the store replays the journal
//! into memory. A torn or undecodable line is logged and skipped so one bad
//! write never makes the journal unreadable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::in_memory::check_forward;
use crate::application::ports::{DecisionStore, PersistenceError};
use crate::domain::decision::{Decision, DecisionStatus};
use crate::domain::shared::DecisionId;

/// One journal line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "SCREAMING_SNAKE_CASE")]
enum JournalEntry {
    Recorded {
        decision: Box<Decision>,
    },
    StatusAdvanced {
        id: DecisionId,
        status: DecisionStatus,
        at: DateTime<Utc>,
    },
}

#[derive(Debug)]
struct Journal {
    file: File,
    decisions: Vec<Decision>,
}

impl Journal {
    fn find_mut(&mut self, id: &DecisionId) -> Option<&mut Decision> {
        self.decisions.iter_mut().find(|d| &d.id == id)
    }

    fn apply(&mut self, entry: JournalEntry) -> Result<(), PersistenceError> {
        match entry {
            JournalEntry::Recorded { decision } => {
                let decision = *decision;
                match self.find_mut(&decision.id) {
                    Some(stored) => {
                        check_forward(stored, &decision)?;
                        *stored = decision;
                    }
                    None => self.decisions.push(decision),
                }
            }
            JournalEntry::StatusAdvanced { id, status, .. } => {
                let stored = self
                    .find_mut(&id)
                    .ok_or_else(|| PersistenceError::NotFound(id.clone()))?;
                stored.advance(status)?;
            }
        }
        Ok(())
    }

    async fn append(&mut self, entry: &JournalEntry) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        self.file.write_all(&line).await?;
        self.file.flush().await?;
        Ok(())
    }
}

/// File-backed [`DecisionStore`].
#[derive(Debug)]
pub struct JsonlDecisionStore {
    path: PathBuf,
    journal: Mutex<Journal>,
}

impl JsonlDecisionStore {
    /// Open or create the journal at `path` and replay it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let mut journal = Journal {
            file,
            decisions: Vec::new(),
        };

        let mut skipped = 0_usize;
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let applied = serde_json::from_str::<JournalEntry>(line)
                .map_err(PersistenceError::from)
                .and_then(|entry| journal.apply(entry));
            if let Err(err) = applied {
                skipped += 1;
                tracing::warn!(line = index + 1, error = %err, "Skipping journal entry");
            }
        }

        tracing::info!(
            path = %path.display(),
            decisions = journal.decisions.len(),
            skipped,
            "Decision journal opened"
        );

        Ok(Self {
            path,
            journal: Mutex::new(journal),
        })
    }

    /// Journal location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DecisionStore for JsonlDecisionStore {
    async fn record(&self, decision: Decision) -> Result<(), PersistenceError> {
        let mut journal = self.journal.lock().await;
        if let Some(stored) = journal.decisions.iter().find(|d| d.id == decision.id) {
            check_forward(stored, &decision)?;
        }
        let entry = JournalEntry::Recorded {
            decision: Box::new(decision),
        };
        journal.append(&entry).await?;
        journal.apply(entry)
    }

    async fn advance_status(
        &self,
        id: &DecisionId,
        status: DecisionStatus,
    ) -> Result<Decision, PersistenceError> {
        let mut journal = self.journal.lock().await;
        let stored = journal
            .find_mut(id)
            .ok_or_else(|| PersistenceError::NotFound(id.clone()))?;
        let mut updated = stored.clone();
        updated.advance(status)?;

        let entry = JournalEntry::StatusAdvanced {
            id: id.clone(),
            status,
            at: updated.updated_at,
        };
        journal.append(&entry).await?;
        if let Some(stored) = journal.find_mut(id) {
            *stored = updated.clone();
        }
        Ok(updated)
    }

    async fn get(&self, id: &DecisionId) -> Result<Option<Decision>, PersistenceError> {
        let journal = self.journal.lock().await;
        Ok(journal.decisions.iter().find(|d| &d.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Decision>, PersistenceError> {
        Ok(self.journal.lock().await.decisions.clone())
    }
}
