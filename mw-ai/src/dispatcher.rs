//! Chunk dispatcher and retry queue
//!
//! Candidates are split into fixed-size chunks and pushed onto a FIFO work
//! queue. Each wave pops up to `concurrency` chunks and runs them on a
//! `JoinSet`; the next wave starts only after every task of the current one
//! has finished, so no more than `concurrency` synthesis calls are ever in
//! flight. A failed chunk goes back on the queue with its retry count bumped
//! until `max_retries` is used up, then it is reported and dropped. Terms a
//! reply leaves out and chunks whose task panicked take the same path.
//!
//! Cross-task state lives in three guarded types: [`WorkQueue`],
//! [`DedupSet`] and [`ImportLog`].

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use mw_common::config::ImportConfig;
use mw_common::events::{EventBus, MwEvent};
use mw_common::{normalize_term, EntryStore};

use crate::error::ImportError;
use crate::extractor::decode_phrase;
use crate::synthesizer::{EntryDraft, EntrySynthesizer};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Poisoned locks are recovered
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Candidate terms processed by one synthesis call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportChunk {
    pub terms: Vec<String>,
    pub retry_count: u32,
}

/// Split candidates into chunks of `chunk_size` (last one may be shorter)
pub fn chunk_candidates(candidates: &[String], chunk_size: usize) -> Vec<ImportChunk> {
    candidates
        .chunks(chunk_size.max(1))
        .map(|terms| ImportChunk { terms: terms.to_vec(), retry_count: 0 })
        .collect()
}

/// FIFO queue of pending chunks
#[derive(Debug, Default)]
pub struct WorkQueue {
    chunks: Mutex<VecDeque<ImportChunk>>,
}

impl WorkQueue {
    pub fn new(chunks: Vec<ImportChunk>) -> Self {
        Self { chunks: Mutex::new(chunks.into()) }
    }

    pub fn push(&self, chunk: ImportChunk) {
        lock(&self.chunks).push_back(chunk);
    }

    /// Pop up to `max` chunks from the front
    pub fn pop_wave(&self, max: usize) -> Vec<ImportChunk> {
        let mut chunks = lock(&self.chunks);
        let count = max.min(chunks.len());
        chunks.drain(..count).collect()
    }

    /// Remove everything still queued
    pub fn drain(&self) -> Vec<ImportChunk> {
        lock(&self.chunks).drain(..).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.chunks).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.chunks).is_empty()
    }
}

#[derive(Debug, Default)]
struct DedupInner {
    keys: HashSet<String>,
    imported: Vec<String>,
}

/// Normalized terms imported during one session
///
/// A term is claimed before it is persisted; a failed write releases the
/// claim so the term is not reported as imported.
#[derive(Debug, Default)]
pub struct DedupSet {
    inner: Mutex<DedupInner>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `term`; false if it was already claimed
    pub fn claim(&self, term: &str) -> bool {
        lock(&self.inner).keys.insert(normalize_term(term))
    }

    pub fn release(&self, term: &str) {
        lock(&self.inner).keys.remove(&normalize_term(term));
    }

    /// Record a claimed term as persisted
    pub fn confirm(&self, term: &str) {
        lock(&self.inner).imported.push(term.to_string());
    }

    pub fn contains(&self, term: &str) -> bool {
        lock(&self.inner).keys.contains(&normalize_term(term))
    }

    /// Persisted terms in completion order
    pub fn imported(&self) -> Vec<String> {
        lock(&self.inner).imported.clone()
    }

    pub fn imported_count(&self) -> usize {
        lock(&self.inner).imported.len()
    }
}

/// Human-readable progress log, mirrored to tracing
#[derive(Debug, Default)]
pub struct ImportLog {
    lines: Mutex<Vec<String>>,
}

impl ImportLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!("{}", line);
        lock(&self.lines).push(line);
    }

    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.lines).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.lines).is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub chunk_size: usize,
    pub concurrency: usize,
    pub max_retries: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { chunk_size: 3, concurrency: 3, max_retries: 3 }
    }
}

impl From<&ImportConfig> for DispatcherConfig {
    fn from(config: &ImportConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            concurrency: config.concurrency.max(1),
            max_retries: config.max_retries,
        }
    }
}

/// A chunk dropped after exhausting its retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFailure {
    pub terms: Vec<String>,
    pub attempts: u32,
    pub last_error: String,
}

impl From<ChunkFailure> for ImportError {
    fn from(failure: ChunkFailure) -> Self {
        ImportError::ChunkPermanentlyFailed {
            terms: failure.terms,
            last_error: failure.last_error,
        }
    }
}

/// Outcome of one dispatcher run
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Display terms persisted, in completion order
    pub imported: Vec<String>,
    pub log: Vec<String>,
    pub failures: Vec<ChunkFailure>,
    pub skipped_duplicates: usize,
    /// Chunks never attempted because the run was cancelled
    pub unprocessed: Vec<ImportChunk>,
    pub cancelled: bool,
}

/// Per-run state shared with every chunk task
struct RunContext {
    synthesizer: Arc<EntrySynthesizer>,
    store: Arc<dyn EntryStore>,
    dedup: DedupSet,
    log: ImportLog,
    library_id: i64,
    session_id: Uuid,
}

struct ChunkSuccess {
    persisted: usize,
    duplicates: usize,
    /// Requested terms with no counterpart in the reply
    missing: Vec<String>,
}

const MISSING_FROM_REPLY: &str = "terms missing from synthesis reply";

/// Requested terms the reply did not cover
///
/// A reply with one item per requested term counts as complete even when an
/// item comes back under another form (a lemma for an inflection). A shorter
/// reply leaves every term without a matching item missing.
fn missing_terms(requested: &[String], drafts: &[EntryDraft]) -> Vec<String> {
    if drafts.len() >= requested.len() {
        return Vec::new();
    }
    let returned: HashSet<String> = drafts.iter().map(|d| normalize_term(&d.term)).collect();
    requested
        .iter()
        .filter(|term| !returned.contains(&normalize_term(&decode_phrase(term))))
        .cloned()
        .collect()
}

pub struct ChunkDispatcher {
    synthesizer: Arc<EntrySynthesizer>,
    store: Arc<dyn EntryStore>,
    config: DispatcherConfig,
    event_bus: Option<Arc<EventBus>>,
}

impl ChunkDispatcher {
    pub fn new(
        synthesizer: Arc<EntrySynthesizer>,
        store: Arc<dyn EntryStore>,
        config: DispatcherConfig,
    ) -> Self {
        Self { synthesizer, store, config, event_bus: None }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> DispatcherConfig {
        self.config
    }

    fn emit(&self, event: MwEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(event);
        }
    }

    fn emit_progress(&self, ctx: &RunContext, pending_chunks: usize) {
        self.emit(MwEvent::ImportProgress {
            session_id: ctx.session_id,
            imported: ctx.dedup.imported_count(),
            pending_chunks,
            message: ctx.log.lines().last().cloned().unwrap_or_default(),
        });
    }

    /// Requeue `chunk` while it has retry budget left, otherwise record it as failed
    fn retry_or_fail(
        &self,
        chunk: ImportChunk,
        error: &str,
        retryable: bool,
        queue: &WorkQueue,
        ctx: &RunContext,
        report: &mut DispatchReport,
    ) {
        if retryable && chunk.retry_count < self.config.max_retries {
            ctx.log.push(format!(
                "Chunk {:?} failed (attempt {}), requeued: {}",
                chunk.terms,
                chunk.retry_count + 1,
                error
            ));
            queue.push(ImportChunk {
                terms: chunk.terms,
                retry_count: chunk.retry_count + 1,
            });
            return;
        }

        let failure = ChunkFailure {
            terms: chunk.terms,
            attempts: chunk.retry_count + 1,
            last_error: error.to_string(),
        };
        ctx.log.push(format!(
            "Chunk {:?} dropped after {} attempts: {}",
            failure.terms, failure.attempts, failure.last_error
        ));
        tracing::warn!(
            session_id = %ctx.session_id,
            terms = ?failure.terms,
            error = %failure.last_error,
            "Chunk permanently failed"
        );
        self.emit(MwEvent::ImportChunkFailed {
            session_id: ctx.session_id,
            terms: failure.terms.clone(),
            error: failure.last_error.clone(),
        });
        report.failures.push(failure);
    }

    /// Synthesize and persist `candidates` into `library_id`
    ///
    /// Never fails as a whole: chunk failures beyond the retry budget are
    /// reported in [`DispatchReport::failures`] and the log.
    pub async fn run(
        &self,
        candidates: &[String],
        library_id: i64,
        session_id: Uuid,
        cancel: &CancellationToken,
    ) -> DispatchReport {
        let queue = WorkQueue::new(chunk_candidates(candidates, self.config.chunk_size));
        let ctx = Arc::new(RunContext {
            synthesizer: Arc::clone(&self.synthesizer),
            store: Arc::clone(&self.store),
            dedup: DedupSet::new(),
            log: ImportLog::new(),
            library_id,
            session_id,
        });

        ctx.log.push(format!(
            "Importing {} candidates in {} chunks",
            candidates.len(),
            queue.len()
        ));

        let mut report = DispatchReport::default();
        let mut wave_number = 0usize;

        while !queue.is_empty() {
            if cancel.is_cancelled() {
                report.unprocessed = queue.drain();
                report.cancelled = true;
                let terms: usize = report.unprocessed.iter().map(|c| c.terms.len()).sum();
                ctx.log.push(format!(
                    "Import stopped: {} chunks ({} terms) not processed",
                    report.unprocessed.len(),
                    terms
                ));
                break;
            }

            wave_number += 1;
            let wave = queue.pop_wave(self.config.concurrency);
            tracing::debug!(
                session_id = %session_id,
                wave = wave_number,
                chunks = wave.len(),
                "Starting wave"
            );

            // Chunks stay here until their task reports back; leftovers panicked
            let mut pending: BTreeMap<usize, ImportChunk> = BTreeMap::new();
            let mut tasks = JoinSet::new();
            for (slot, chunk) in wave.into_iter().enumerate() {
                let ctx = Arc::clone(&ctx);
                let terms = chunk.terms.clone();
                pending.insert(slot, chunk);
                tasks.spawn(async move { (slot, process_chunk(&ctx, &terms).await) });
            }

            let mut panics = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                let (slot, result) = match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(session_id = %session_id, error = %e, "Chunk task panicked");
                        panics.push(e.to_string());
                        continue;
                    }
                };
                let Some(chunk) = pending.remove(&slot) else {
                    continue;
                };

                match result {
                    Ok(success) => {
                        report.skipped_duplicates += success.duplicates;
                        ctx.log.push(format!(
                            "Chunk {:?}: {} saved, {} duplicates skipped",
                            chunk.terms, success.persisted, success.duplicates
                        ));
                        if !success.missing.is_empty() {
                            ctx.log.push(format!(
                                "Chunk {:?}: reply left out {:?}",
                                chunk.terms, success.missing
                            ));
                            let remainder = ImportChunk {
                                terms: success.missing,
                                retry_count: chunk.retry_count,
                            };
                            self.retry_or_fail(remainder, MISSING_FROM_REPLY, true, &queue, &ctx, &mut report);
                        }
                    }
                    Err(e) => {
                        self.retry_or_fail(chunk, &e.to_string(), e.is_retryable(), &queue, &ctx, &mut report);
                    }
                }

                self.emit_progress(&ctx, queue.len() + tasks.len());
            }

            for chunk in pending.into_values() {
                let error = format!("worker task panicked: {}", panics.join("; "));
                self.retry_or_fail(chunk, &error, true, &queue, &ctx, &mut report);
                self.emit_progress(&ctx, queue.len());
            }
        }

        report.imported = ctx.dedup.imported();
        ctx.log.push(format!(
            "Finished: {} imported, {} duplicates skipped, {} chunks failed",
            report.imported.len(),
            report.skipped_duplicates,
            report.failures.len()
        ));
        report.log = ctx.log.lines();
        report
    }
}

/// Synthesize one chunk and persist its drafts
///
/// Only a synthesis failure fails the chunk. Duplicates and storage errors
/// are logged per draft; terms the reply left out are handed back to the
/// caller.
async fn process_chunk(ctx: &RunContext, terms: &[String]) -> Result<ChunkSuccess, ImportError> {
    let drafts = ctx.synthesizer.synthesize(terms).await?;

    let mut success = ChunkSuccess {
        persisted: 0,
        duplicates: 0,
        missing: missing_terms(terms, &drafts),
    };
    for draft in drafts {
        let term = draft.term.clone();
        if !ctx.dedup.claim(&term) {
            success.duplicates += 1;
            ctx.log.push(format!("Skipped duplicate \"{}\"", term));
            continue;
        }

        match persist_draft(ctx, draft).await {
            Ok(id) => {
                ctx.dedup.confirm(&term);
                success.persisted += 1;
                tracing::debug!(session_id = %ctx.session_id, entry_id = id, term = %term, "Entry saved");
            }
            Err(e) => {
                ctx.dedup.release(&term);
                ctx.log.push(format!("Failed to save \"{}\": {}", term, e));
            }
        }
    }
    Ok(success)
}

/// Insert a new entry, or refresh the content of an existing one while
/// keeping its review progress
async fn persist_draft(ctx: &RunContext, draft: EntryDraft) -> mw_common::Result<i64> {
    let fresh = draft.into_entry(ctx.library_id);
    match ctx.store.get_entry(&fresh.term, ctx.library_id).await? {
        Some(mut existing) => {
            existing.merge_content(&fresh);
            ctx.store.update_entry(&existing).await?;
            Ok(existing.id)
        }
        None => ctx.store.insert_or_replace_entry(&fresh).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_chunking() {
        let chunks = chunk_candidates(&terms(&["a", "b", "c", "d", "e", "f", "g"]), 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].terms, terms(&["a", "b", "c"]));
        assert_eq!(chunks[2].terms, terms(&["g"]));
        assert!(chunks.iter().all(|c| c.retry_count == 0));
        assert!(chunk_candidates(&[], 3).is_empty());
    }

    #[test]
    fn test_queue_is_fifo() {
        let queue = WorkQueue::new(chunk_candidates(&terms(&["a", "b", "c", "d"]), 1));
        let wave = queue.pop_wave(3);
        assert_eq!(wave.len(), 3);
        assert_eq!(wave[0].terms, terms(&["a"]));

        queue.push(ImportChunk { terms: terms(&["a"]), retry_count: 1 });
        let rest = queue.pop_wave(3);
        assert_eq!(rest[0].terms, terms(&["d"]));
        assert_eq!(rest[1].retry_count, 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_dedup_claims_are_case_insensitive() {
        let dedup = DedupSet::new();
        assert!(dedup.claim("Give Up"));
        assert!(!dedup.claim(" give up "));
        dedup.release("GIVE UP");
        assert!(!dedup.contains("give up"));
        assert!(dedup.claim("give up"));
        dedup.confirm("give up");
        assert_eq!(dedup.imported(), terms(&["give up"]));
    }

    #[test]
    fn test_dedup_concurrent_claims_single_winner() {
        let dedup = Arc::new(DedupSet::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let dedup = Arc::clone(&dedup);
                std::thread::spawn(move || dedup.claim(if i % 2 == 0 { "Apple" } else { "apple" }))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_config_from_import_config() {
        let config = DispatcherConfig::from(&ImportConfig {
            chunk_size: 0,
            concurrency: 5,
            max_retries: 1,
            ..Default::default()
        });
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.max_retries, 1);
    }
}
