//! Scripted generation client for pipeline tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mw_ai::GenerationClient;
use mw_ai::GenerationError;
use mw_common::config::ImportConfig;
use mw_common::db::init_memory_pool;
use mw_common::{EntryStore, SqliteEntryStore};

type Handler = dyn Fn(&[String]) -> Result<String, GenerationError> + Send + Sync;

/// Answers extraction prompts with a fixed reply and synthesis prompts via a handler
pub struct ScriptedClient {
    extraction: Mutex<Vec<Result<String, GenerationError>>>,
    synthesis: Box<Handler>,
    delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub extraction_calls: AtomicUsize,
    synthesis_calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedClient {
    pub fn new<F>(synthesis: F) -> Self
    where
        F: Fn(&[String]) -> Result<String, GenerationError> + Send + Sync + 'static,
    {
        Self {
            extraction: Mutex::new(Vec::new()),
            synthesis: Box::new(synthesis),
            delay: Duration::from_millis(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            extraction_calls: AtomicUsize::new(0),
            synthesis_calls: Mutex::new(HashMap::new()),
        }
    }

    /// Client whose synthesis echoes every term back as a one-sense entry
    pub fn echo() -> Self {
        Self::new(|terms| Ok(echo_reply(terms)))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replies for successive extraction calls; the last one repeats
    pub fn with_extraction(self, replies: Vec<Result<String, GenerationError>>) -> Self {
        *self.extraction.lock().unwrap() = replies;
        self
    }

    /// Synthesis calls whose chunk contained `term`
    pub fn synthesis_calls_for(&self, term: &str) -> usize {
        self.synthesis_calls.lock().unwrap().get(term).copied().unwrap_or(0)
    }

    pub fn total_synthesis_calls(&self) -> usize {
        self.synthesis_calls.lock().unwrap().values().sum()
    }

    fn next_extraction(&self) -> Result<String, GenerationError> {
        let mut replies = self.extraction.lock().unwrap();
        match replies.len() {
            0 => Ok("[]".to_string()),
            1 => clone_result(&replies[0]),
            _ => replies.remove(0),
        }
    }
}

fn clone_result(result: &Result<String, GenerationError>) -> Result<String, GenerationError> {
    match result {
        Ok(text) => Ok(text.clone()),
        Err(GenerationError::Network(m)) => Err(GenerationError::Network(m.clone())),
        Err(GenerationError::Timeout(m)) => Err(GenerationError::Timeout(m.clone())),
        Err(GenerationError::Api(status, m)) => Err(GenerationError::Api(*status, m.clone())),
        Err(GenerationError::Parse(m)) => Err(GenerationError::Parse(m.clone())),
        Err(GenerationError::EmptyResponse) => Err(GenerationError::EmptyResponse),
        Err(GenerationError::MissingApiKey) => Err(GenerationError::MissingApiKey),
    }
}

/// Terms listed in a synthesis prompt
pub fn terms_in_prompt(prompt: &str) -> Vec<String> {
    let start = prompt.find("these terms: ").expect("synthesis prompt") + "these terms: ".len();
    let end = start + prompt[start..].find(']').expect("closing bracket") + 1;
    serde_json::from_str(&prompt[start..end]).expect("term list")
}

/// A well-formed synthesis reply with one noun sense per term
pub fn echo_reply(terms: &[String]) -> String {
    let items: Vec<serde_json::Value> = terms
        .iter()
        .map(|t| {
            serde_json::json!({
                "word": t,
                "phonetic": "/test/",
                "senses": [{"pos": "n", "meaning": format!("{}的意思", t)}],
                "definition_en": format!("meaning of {}", t),
                "example": format!("An example with {}.", t),
                "memory_method": "",
                "forms": []
            })
        })
        .collect();
    format!("```json\n{}\n```", serde_json::Value::Array(items))
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn complete(&self, prompt: &str, _temperature: f32) -> Result<String, GenerationError> {
        if prompt.starts_with("Extract the English words") {
            self.extraction_calls.fetch_add(1, Ordering::SeqCst);
            return self.next_extraction();
        }

        let terms = terms_in_prompt(prompt);
        {
            let mut calls = self.synthesis_calls.lock().unwrap();
            for term in &terms {
                *calls.entry(term.clone()).or_insert(0) += 1;
            }
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = (self.synthesis)(&terms);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }
}

pub async fn memory_store() -> (Arc<SqliteEntryStore>, i64) {
    let pool = init_memory_pool().await.unwrap();
    let store = SqliteEntryStore::new(pool);
    let library_id = store.create_library("Imports", "").await.unwrap();
    (Arc::new(store), library_id)
}

/// Import settings with a near-zero extraction delay
pub fn fast_config() -> ImportConfig {
    ImportConfig {
        extraction_retry_delay_ms: 1,
        ..Default::default()
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
