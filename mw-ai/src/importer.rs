//! Bulk import orchestration
//!
//! Text import: extract candidates (retried), then dispatch chunks.
//! Word-list import: split the list locally, then dispatch chunks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use mw_common::config::ImportConfig;
use mw_common::events::{EventBus, MwEvent};
use mw_common::EntryStore;

use crate::dispatcher::{ChunkDispatcher, DispatcherConfig};
use crate::error::ImportError;
use crate::extractor::{candidates_from_word_list, CandidateExtractor};
use crate::generation::GenerationClient;
use crate::session::{ImportSession, ImportState};
use crate::synthesizer::EntrySynthesizer;

pub struct BulkImporter {
    extractor: CandidateExtractor,
    dispatcher: ChunkDispatcher,
    extraction_attempts: u32,
    extraction_retry_delay: Duration,
    event_bus: Option<Arc<EventBus>>,
}

impl BulkImporter {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        store: Arc<dyn EntryStore>,
        config: &ImportConfig,
        temperature: f32,
    ) -> Self {
        let synthesizer = Arc::new(EntrySynthesizer::new(Arc::clone(&client), temperature));
        Self {
            extractor: CandidateExtractor::new(client, temperature),
            dispatcher: ChunkDispatcher::new(synthesizer, store, DispatcherConfig::from(config)),
            extraction_attempts: config.extraction_attempts.max(1),
            extraction_retry_delay: Duration::from_millis(config.extraction_retry_delay_ms),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.dispatcher = self.dispatcher.with_event_bus(Arc::clone(&event_bus));
        self.event_bus = Some(event_bus);
        self
    }

    fn emit(&self, event: MwEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(event);
        }
    }

    /// Extract candidates, retrying transient failures with a fixed delay
    ///
    /// An empty result is final and not retried.
    pub async fn extract_with_retry(&self, text: &str) -> Result<Vec<String>, ImportError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.extractor.extract(text).await {
                Ok(candidates) => return Ok(candidates),
                Err(ImportError::ExtractionEmpty) => return Err(ImportError::ExtractionEmpty),
                Err(e) if e.is_retryable() && attempt < self.extraction_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.extraction_attempts,
                        error = %e,
                        "Extraction failed, retrying"
                    );
                    tokio::time::sleep(self.extraction_retry_delay).await;
                }
                Err(e) => {
                    return Err(ImportError::ExtractionFailed {
                        attempts: attempt,
                        last_error: e.to_string(),
                    })
                }
            }
        }
    }

    /// Import the vocabulary found in free text
    pub async fn import_text(
        &self,
        text: &str,
        library_id: i64,
        cancel: &CancellationToken,
    ) -> Result<ImportSession, ImportError> {
        let mut session = ImportSession::new(library_id, ImportState::Extracting);
        self.start(&session);

        let candidates = match self.extract_with_retry(text).await {
            Ok(candidates) => candidates,
            Err(e) => {
                session.fail(e.to_string());
                tracing::error!(session_id = %session.session_id, error = %e, "Import aborted");
                self.emit(MwEvent::ImportSessionFailed {
                    session_id: session.session_id,
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(e);
            }
        };

        session.log.push(format!("Extracted {} candidates", candidates.len()));
        session.transition_to(ImportState::Enriching);
        Ok(self.enrich(session, candidates, cancel).await)
    }

    /// Import a comma/newline separated word list without extraction
    pub async fn import_word_list(
        &self,
        text: &str,
        library_id: i64,
        cancel: &CancellationToken,
    ) -> Result<ImportSession, ImportError> {
        let session = ImportSession::new(library_id, ImportState::Enriching);
        let candidates = candidates_from_word_list(text);
        if candidates.is_empty() {
            return Err(ImportError::ExtractionEmpty);
        }

        self.start(&session);
        Ok(self.enrich(session, candidates, cancel).await)
    }

    fn start(&self, session: &ImportSession) {
        tracing::info!(
            session_id = %session.session_id,
            library_id = session.library_id,
            "Starting bulk import"
        );
        self.emit(MwEvent::ImportSessionStarted {
            session_id: session.session_id,
            library_id: session.library_id,
            timestamp: session.started_at,
        });
    }

    async fn enrich(
        &self,
        mut session: ImportSession,
        candidates: Vec<String>,
        cancel: &CancellationToken,
    ) -> ImportSession {
        let chunk_size = self.dispatcher.config().chunk_size;
        self.emit(MwEvent::ImportCandidatesExtracted {
            session_id: session.session_id,
            candidates: candidates.len(),
            chunks: candidates.len().div_ceil(chunk_size),
        });

        let report = self
            .dispatcher
            .run(&candidates, session.library_id, session.session_id, cancel)
            .await;
        session.candidates = candidates;
        session.apply_report(report);

        tracing::info!(
            session_id = %session.session_id,
            state = ?session.state,
            imported = session.imported.len(),
            failed_chunks = session.failures.len(),
            "Bulk import finished"
        );
        self.emit(MwEvent::ImportSessionCompleted {
            session_id: session.session_id,
            imported: session.imported.len(),
            failed_chunks: session.failures.len(),
            cancelled: session.state == ImportState::Cancelled,
            duration_seconds: session.duration_seconds(),
            timestamp: Utc::now(),
        });

        session
    }
}
