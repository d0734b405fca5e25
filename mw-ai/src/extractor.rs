//! Candidate extraction
//!
//! Free text goes to the generation service with the extraction prompt; the
//! reply must contain a JSON array of strings. Multi-word phrases travel as
//! `give_up` until the synthesizer restores the spaces.

use std::collections::HashSet;
use std::sync::Arc;

use mw_common::normalize_term;

use crate::error::ImportError;
use crate::generation::GenerationClient;
use crate::prompts::extraction_prompt;

/// Encode a phrase for chunk handling (`give up` → `give_up`)
pub fn encode_phrase(term: &str) -> String {
    term.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Restore the spaced form of an encoded phrase (`give_up` → `give up`)
pub fn decode_phrase(term: &str) -> String {
    term.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Slice from the first `[` to the last `]`, if both exist in that order
pub(crate) fn json_array_slice(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    (start < end).then(|| &raw[start..=end])
}

/// Keep usable candidates: trimmed, encoded, unique (case-insensitive), in order
fn collect_candidates<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(|item| encode_phrase(&item))
        .filter(|item| !item.is_empty())
        .filter(|item| seen.insert(normalize_term(item)))
        .collect()
}

/// Parse an extraction reply into candidates
///
/// Non-string and blank elements are discarded. A reply without a JSON
/// array is [`ImportError::MalformedResponse`]; an array with nothing usable
/// is [`ImportError::ExtractionEmpty`].
pub fn parse_candidates(raw: &str) -> Result<Vec<String>, ImportError> {
    let slice = json_array_slice(raw).ok_or_else(|| {
        ImportError::MalformedResponse("no JSON array in extraction reply".to_string())
    })?;

    let values: Vec<serde_json::Value> = serde_json::from_str(slice)
        .map_err(|e| ImportError::MalformedResponse(e.to_string()))?;

    let candidates = collect_candidates(
        values
            .into_iter()
            .filter_map(|value| value.as_str().map(str::to_string)),
    );

    if candidates.is_empty() {
        return Err(ImportError::ExtractionEmpty);
    }
    Ok(candidates)
}

/// Candidates from a plain word list (comma or newline separated)
pub fn candidates_from_word_list(text: &str) -> Vec<String> {
    collect_candidates(
        text.split(|c: char| matches!(c, ',' | '，' | '\n' | '\r' | ';'))
            .map(str::to_string),
    )
}

pub struct CandidateExtractor {
    client: Arc<dyn GenerationClient>,
    temperature: f32,
}

impl CandidateExtractor {
    pub fn new(client: Arc<dyn GenerationClient>, temperature: f32) -> Self {
        Self { client, temperature }
    }

    /// One extraction attempt; the importer owns the retry policy
    pub async fn extract(&self, raw_text: &str) -> Result<Vec<String>, ImportError> {
        if raw_text.trim().is_empty() {
            return Err(ImportError::ExtractionEmpty);
        }

        let reply = self
            .client
            .complete(&extraction_prompt(raw_text), self.temperature)
            .await?;

        let candidates = parse_candidates(&reply)?;
        tracing::debug!(candidates = candidates.len(), "Extracted candidates");
        Ok(candidates)
    }
}
