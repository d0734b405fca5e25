//! Study service
//!
//! Glue between the pure scheduler and the storage collaborator: compute the
//! new state, write it, announce it.

use std::sync::Arc;

use mw_common::config::StudyConfig;
use mw_common::events::{EventBus, MwEvent};
use mw_common::{Entry, EntryStore};

use crate::due::{select_for_study, DueSet};
use crate::error::StudyError;
use crate::scheduler::{review, Grade};
use crate::stats::record_test_outcome;

pub struct StudyService {
    store: Arc<dyn EntryStore>,
    event_bus: Option<Arc<EventBus>>,
    study: StudyConfig,
}

impl StudyService {
    pub fn new(store: Arc<dyn EntryStore>, study: StudyConfig) -> Self {
        Self { store, event_bus: None, study }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Study queue for the given libraries (empty = current library)
    pub async fn queue(&self, library_ids: &[i64], now: i64) -> Result<DueSet, StudyError> {
        Ok(select_for_study(self.store.as_ref(), library_ids, now, &self.study).await?)
    }

    /// Grade a persisted entry, store the new schedule and return it
    pub async fn record_review(
        &self,
        entry: &Entry,
        quality: i32,
        now: i64,
    ) -> Result<Entry, StudyError> {
        let next = review(entry, quality, now)?;
        self.store.update_entry(&next).await?;

        tracing::debug!(
            entry_id = next.id,
            term = %next.term,
            quality,
            interval = next.interval,
            easiness_factor = next.easiness_factor,
            "Review recorded"
        );

        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(MwEvent::ReviewRecorded {
                entry_id: next.id,
                quality,
                interval_days: next.interval,
                next_review_time: next.next_review_time,
            });
        }

        Ok(next)
    }

    pub async fn record_grade(
        &self,
        entry: &Entry,
        grade: Grade,
        now: i64,
    ) -> Result<Entry, StudyError> {
        self.record_review(entry, grade.quality(), now).await
    }

    /// Count a test answer without touching the schedule
    pub async fn record_test_answer(
        &self,
        entry: &Entry,
        correct: bool,
        now: i64,
    ) -> Result<Entry, StudyError> {
        let next = record_test_outcome(entry, correct, now);
        self.store.update_entry(&next).await?;
        Ok(next)
    }
}
