//! Bulk import session state machine
//!
//! EXTRACTING → ENRICHING → COMPLETED, with CANCELLED and FAILED as the other
//! terminal states. Word-list imports skip straight to ENRICHING.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatcher::{ChunkFailure, DispatchReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImportState {
    /// Asking the generation service for candidate terms
    Extracting,
    /// Synthesizing and persisting chunks
    Enriching,
    Completed,
    Cancelled,
    Failed,
}

impl ImportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ImportState::Completed | ImportState::Cancelled | ImportState::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: ImportState,
    pub new_state: ImportState,
    pub transitioned_at: DateTime<Utc>,
}

/// One bulk import invocation
#[derive(Debug, Clone)]
pub struct ImportSession {
    pub session_id: Uuid,
    pub library_id: i64,
    pub state: ImportState,
    /// Candidates handed to the dispatcher
    pub candidates: Vec<String>,
    /// Display terms persisted, each unique after trim + lowercase
    pub imported: Vec<String>,
    pub log: Vec<String>,
    pub failures: Vec<ChunkFailure>,
    pub skipped_duplicates: usize,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ImportSession {
    pub fn new(library_id: i64, initial_state: ImportState) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            library_id,
            state: initial_state,
            candidates: Vec::new(),
            imported: Vec::new(),
            log: Vec::new(),
            failures: Vec::new(),
            skipped_duplicates: 0,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn transition_to(&mut self, new_state: ImportState) -> StateTransition {
        let transition = StateTransition {
            session_id: self.session_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        transition
    }

    /// Still extracting or enriching
    pub fn is_running(&self) -> bool {
        !self.state.is_terminal()
    }

    pub fn duration_seconds(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0) as u64
    }

    /// Fold a dispatcher run into the session and close it
    pub fn apply_report(&mut self, report: DispatchReport) {
        self.imported = report.imported;
        self.log.extend(report.log);
        self.failures = report.failures;
        self.skipped_duplicates = report.skipped_duplicates;
        self.transition_to(if report.cancelled {
            ImportState::Cancelled
        } else {
            ImportState::Completed
        });
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.log.push(format!("Import failed: {}", error));
        self.error = Some(error);
        self.transition_to(ImportState::Failed);
    }
}
