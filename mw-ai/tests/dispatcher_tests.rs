//! Chunk dispatcher behavior: concurrency bound, retries, dedup, cancellation

mod helpers;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use helpers::{echo_reply, memory_store, strings, ScriptedClient};
use mw_ai::dispatcher::{ChunkDispatcher, DispatcherConfig};
use mw_ai::{EntrySynthesizer, GenerationError};
use mw_common::{normalize_term, Entry, EntryStore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn dispatcher(client: Arc<ScriptedClient>, store: Arc<dyn EntryStore>) -> ChunkDispatcher {
    let synthesizer = Arc::new(EntrySynthesizer::new(client, 0.7));
    ChunkDispatcher::new(synthesizer, store, DispatcherConfig::default())
}

fn candidates(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("word{:02}", i)).collect()
}

#[tokio::test]
async fn test_never_more_than_three_chunks_in_flight() {
    let client = Arc::new(ScriptedClient::echo().with_delay(Duration::from_millis(30)));
    let (store, library_id) = memory_store().await;

    let report = dispatcher(client.clone(), store.clone())
        .run(&candidates(20), library_id, Uuid::new_v4(), &CancellationToken::new())
        .await;

    let max = client.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 3, "saw {} concurrent synthesis calls", max);
    assert!(max >= 2, "waves should run chunks concurrently");
    assert_eq!(report.imported.len(), 20);
    assert!(report.failures.is_empty());
    assert_eq!(store.entries_in_library(library_id).await.unwrap().len(), 20);
}

#[tokio::test]
async fn test_always_failing_chunk_tried_max_retries_plus_one() {
    let client = Arc::new(ScriptedClient::new(|terms| {
        if terms.iter().any(|t| t == "poison") {
            Err(GenerationError::Timeout("read timed out".to_string()))
        } else {
            Ok(echo_reply(terms))
        }
    }));
    let (store, library_id) = memory_store().await;

    let input = strings(&["alpha", "beta", "gamma", "poison", "delta"]);
    let report = dispatcher(client.clone(), store.clone())
        .run(&input, library_id, Uuid::new_v4(), &CancellationToken::new())
        .await;

    assert_eq!(client.synthesis_calls_for("poison"), 4);
    assert_eq!(client.synthesis_calls_for("alpha"), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].terms, strings(&["poison", "delta"]));
    assert_eq!(report.failures[0].attempts, 4);
    assert!(report.failures[0].last_error.contains("timed out"));
    assert_eq!(report.imported, strings(&["alpha", "beta", "gamma"]));
    assert!(report.log.iter().any(|line| line.contains("dropped after 4 attempts")));
}

#[tokio::test]
async fn test_transient_failure_recovers_through_requeue() {
    let failures_left = Arc::new(AtomicUsize::new(2));
    let counter = failures_left.clone();
    let client = Arc::new(ScriptedClient::new(move |terms| {
        let remaining = counter.load(Ordering::SeqCst);
        if remaining > 0 {
            counter.fetch_sub(1, Ordering::SeqCst);
            return Ok("I am not JSON".to_string());
        }
        Ok(echo_reply(terms))
    }));
    let (store, library_id) = memory_store().await;

    let report = dispatcher(client.clone(), store)
        .run(&strings(&["solo"]), library_id, Uuid::new_v4(), &CancellationToken::new())
        .await;

    assert_eq!(client.synthesis_calls_for("solo"), 3);
    assert_eq!(report.imported, strings(&["solo"]));
    assert!(report.failures.is_empty());
}

fn without(terms: &[String], left_out: &str) -> Vec<String> {
    terms.iter().filter(|t| *t != left_out).cloned().collect()
}

#[tokio::test]
async fn test_term_left_out_of_every_reply_is_reported() {
    let client = Arc::new(ScriptedClient::new(|terms| Ok(echo_reply(&without(terms, "beta")))));
    let (store, library_id) = memory_store().await;

    let report = dispatcher(client.clone(), store.clone())
        .run(&strings(&["alpha", "beta", "gamma"]), library_id, Uuid::new_v4(), &CancellationToken::new())
        .await;

    assert_eq!(report.imported, strings(&["alpha", "gamma"]));
    assert_eq!(client.synthesis_calls_for("beta"), 4);
    assert_eq!(client.synthesis_calls_for("alpha"), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].terms, strings(&["beta"]));
    assert_eq!(report.failures[0].attempts, 4);
    assert!(report.log.iter().any(|line| line.contains("reply left out [\"beta\"]")));
    assert!(store.get_entry("beta", library_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_term_left_out_once_is_retried_alone() {
    let left_out = Arc::new(AtomicBool::new(false));
    let flag = left_out.clone();
    let client = Arc::new(ScriptedClient::new(move |terms| {
        if terms.len() > 1 && !flag.swap(true, Ordering::SeqCst) {
            return Ok(echo_reply(&without(terms, "beta")));
        }
        Ok(echo_reply(terms))
    }));
    let (store, library_id) = memory_store().await;

    let report = dispatcher(client.clone(), store.clone())
        .run(&strings(&["alpha", "beta", "gamma"]), library_id, Uuid::new_v4(), &CancellationToken::new())
        .await;

    assert!(report.failures.is_empty());
    assert_eq!(report.imported.len(), 3);
    assert_eq!(client.synthesis_calls_for("beta"), 2);
    assert_eq!(client.synthesis_calls_for("gamma"), 1);
    assert!(store.get_entry("beta", library_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_panicking_chunk_is_retried_then_reported() {
    let client = Arc::new(ScriptedClient::new(|terms| {
        if terms.iter().any(|t| t == "boom") {
            panic!("synthesis handler blew up");
        }
        Ok(echo_reply(terms))
    }));
    let (store, library_id) = memory_store().await;

    let input = strings(&["alpha", "beta", "gamma", "boom", "delta"]);
    let report = dispatcher(client.clone(), store.clone())
        .run(&input, library_id, Uuid::new_v4(), &CancellationToken::new())
        .await;

    assert_eq!(client.synthesis_calls_for("boom"), 4);
    assert_eq!(report.imported, strings(&["alpha", "beta", "gamma"]));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].terms, strings(&["boom", "delta"]));
    assert_eq!(report.failures[0].attempts, 4);
    assert!(report.failures[0].last_error.contains("panicked"));
}

#[tokio::test]
async fn test_duplicates_across_chunks_are_imported_once() {
    // Every inflection comes back as the lemma "run"
    let client = Arc::new(ScriptedClient::new(|terms| {
        let lemmas: Vec<String> = terms.iter().map(|_| "Run".to_string()).collect();
        Ok(echo_reply(&lemmas))
    }));
    let (store, library_id) = memory_store().await;

    let input = strings(&["run", "runs", "ran", "running", "RUN_", "runner"]);
    let report = dispatcher(client, store.clone())
        .run(&input, library_id, Uuid::new_v4(), &CancellationToken::new())
        .await;

    assert_eq!(report.imported.len(), 1);
    assert_eq!(report.skipped_duplicates, 5);
    assert_eq!(store.entries_in_library(library_id).await.unwrap().len(), 1);

    let mut keys: Vec<String> = report.imported.iter().map(|t| normalize_term(t)).collect();
    keys.dedup();
    assert_eq!(keys.len(), report.imported.len());
}

#[tokio::test]
async fn test_cancel_before_start_processes_nothing() {
    let client = Arc::new(ScriptedClient::echo());
    let (store, library_id) = memory_store().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = dispatcher(client.clone(), store)
        .run(&candidates(7), library_id, Uuid::new_v4(), &cancel)
        .await;

    assert!(report.cancelled);
    assert!(report.imported.is_empty());
    assert_eq!(report.unprocessed.len(), 3);
    assert_eq!(client.total_synthesis_calls(), 0);
}

#[tokio::test]
async fn test_cancel_lets_current_wave_finish() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let client = Arc::new(
        ScriptedClient::new(move |terms| {
            trigger.cancel();
            Ok(echo_reply(terms))
        })
        .with_delay(Duration::from_millis(10)),
    );
    let (store, library_id) = memory_store().await;

    // 4 chunks of 3: the first wave takes 3, the last is never started
    let report = dispatcher(client, store)
        .run(&candidates(12), library_id, Uuid::new_v4(), &cancel)
        .await;

    assert!(report.cancelled);
    assert_eq!(report.imported.len(), 9);
    assert_eq!(report.unprocessed.len(), 1);
    assert!(report.log.iter().any(|line| line.starts_with("Import stopped")));
}

#[tokio::test]
async fn test_existing_entry_keeps_review_progress() {
    let client = Arc::new(ScriptedClient::echo());
    let (store, library_id) = memory_store().await;

    let mut studied = Entry::new("apple", library_id);
    studied.repetitions = 3;
    studied.interval = 16;
    studied.next_review_time = 99_000;
    studied.definition = "old".to_string();
    store.insert_or_replace_entry(&studied).await.unwrap();

    let report = dispatcher(client, store.clone())
        .run(&strings(&["apple"]), library_id, Uuid::new_v4(), &CancellationToken::new())
        .await;
    assert_eq!(report.imported, strings(&["apple"]));

    let stored = store.get_entry("apple", library_id).await.unwrap().unwrap();
    assert_eq!(stored.definition, "n. apple的意思");
    assert_eq!(stored.repetitions, 3);
    assert_eq!(stored.interval, 16);
    assert_eq!(stored.next_review_time, 99_000);
}
