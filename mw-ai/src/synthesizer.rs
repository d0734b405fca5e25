//! Entry synthesis
//!
//! One generation call per chunk. The reply is a JSON array with one object
//! per term:
//!
//! ```json
//! [{"word": "give up", "phonetic": "/ɡɪv ʌp/",
//!   "senses": [{"pos": "v", "meaning": "放弃"}],
//!   "definition_en": "to stop trying", "example": "...", "memory_method": "...",
//!   "forms": [{"form": "gave up", "label": "past"}]}]
//! ```
//!
//! Older replies frame `senses` as an object of numbered slots,
//! `"senses": {"sense_1": {...}, "sense_2": {...}}`; those are still read, in
//! numeric order, with empty slots skipped.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use mw_common::{Entry, WordForm};

use crate::error::ImportError;
use crate::extractor::{decode_phrase, json_array_slice};
use crate::generation::GenerationClient;
use crate::prompts::synthesis_prompt;

/// Definition shown when a reply carries no usable sense
pub const PLACEHOLDER_DEFINITION: &str = "暂无释义";

/// One (part of speech, meaning) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sense {
    pub pos: String,
    pub meaning: String,
}

impl Sense {
    /// `"v. 放弃"`; a missing part of speech leaves just the meaning
    pub fn display(&self) -> String {
        let pos = self.pos.trim().trim_end_matches('.');
        if pos.is_empty() {
            self.meaning.clone()
        } else {
            format!("{}. {}", pos, self.meaning)
        }
    }
}

/// A synthesized entry, not yet bound to a library
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDraft {
    /// Spaced display term
    pub term: String,
    pub phonetic: Option<String>,
    pub senses: Vec<Sense>,
    pub definition_en: Option<String>,
    pub example: Option<String>,
    pub mnemonic: Option<String>,
    pub forms: Vec<WordForm>,
}

impl EntryDraft {
    /// Senses condensed to `"pos. meaning; pos. meaning"`
    pub fn definition(&self) -> String {
        if self.senses.is_empty() {
            return PLACEHOLDER_DEFINITION.to_string();
        }
        self.senses
            .iter()
            .map(Sense::display)
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Unstudied entry: due immediately, default easiness, no reviews
    pub fn into_entry(self, library_id: i64) -> Entry {
        let definition = self.definition();
        Entry {
            library_id,
            term: self.term,
            phonetic: self.phonetic,
            definition,
            definition_en: self.definition_en,
            example: self.example,
            mnemonic: self.mnemonic,
            forms: self.forms,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    word: Option<String>,
    #[serde(default)]
    phonetic: Option<String>,
    #[serde(default)]
    senses: Option<Value>,
    #[serde(default)]
    definition_en: Option<String>,
    #[serde(default)]
    example: Option<String>,
    #[serde(default)]
    memory_method: Option<String>,
    #[serde(default)]
    forms: Option<Value>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn sense_from_value(value: &Value) -> Option<Sense> {
    let object = value.as_object()?;
    let meaning = object.get("meaning")?.as_str()?.trim();
    if meaning.is_empty() {
        return None;
    }
    let pos = object
        .get("pos")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim();
    Some(Sense { pos: pos.to_string(), meaning: meaning.to_string() })
}

fn parse_senses(senses: Option<&Value>) -> Vec<Sense> {
    match senses {
        Some(Value::Array(items)) => items.iter().filter_map(sense_from_value).collect(),
        Some(Value::Object(slots)) => parse_sense_slots(slots),
        _ => Vec::new(),
    }
}

/// `sense_N` slots in numeric order (`sense_10` after `sense_2`)
fn parse_sense_slots(slots: &Map<String, Value>) -> Vec<Sense> {
    let mut numbered: Vec<(u32, &Value)> = slots
        .iter()
        .filter_map(|(key, value)| {
            let index = key.strip_prefix("sense_")?.parse::<u32>().ok()?;
            Some((index, value))
        })
        .collect();
    numbered.sort_by_key(|(index, _)| *index);
    numbered
        .into_iter()
        .filter_map(|(_, value)| sense_from_value(value))
        .collect()
}

fn parse_forms(forms: Option<&Value>) -> Vec<WordForm> {
    let Some(Value::Array(items)) = forms else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(form) => Some(WordForm { form: form.trim().to_string(), label: String::new() }),
            Value::Object(_) => serde_json::from_value::<WordForm>(item.clone()).ok(),
            _ => None,
        })
        .filter(|form| !form.form.trim().is_empty())
        .collect()
}

fn draft_from_value(value: Value) -> Option<EntryDraft> {
    let raw: RawEntry = serde_json::from_value(value).ok()?;
    let term = decode_phrase(raw.word.as_deref().unwrap_or_default());
    if term.is_empty() {
        return None;
    }

    let senses = parse_senses(raw.senses.as_ref());
    let forms = parse_forms(raw.forms.as_ref());

    Some(EntryDraft {
        term,
        phonetic: non_blank(raw.phonetic),
        senses,
        definition_en: non_blank(raw.definition_en),
        example: non_blank(raw.example),
        mnemonic: non_blank(raw.memory_method),
        forms,
    })
}

/// Parse a synthesis reply
///
/// Missing brackets or invalid JSON is [`ImportError::MalformedResponse`].
/// Elements without a usable `word` are skipped.
pub fn parse_drafts(raw: &str) -> Result<Vec<EntryDraft>, ImportError> {
    let slice = json_array_slice(raw).ok_or_else(|| {
        ImportError::MalformedResponse("no JSON array in synthesis reply".to_string())
    })?;

    let values: Vec<Value> = serde_json::from_str(slice)
        .map_err(|e| ImportError::MalformedResponse(e.to_string()))?;

    let total = values.len();
    let drafts: Vec<EntryDraft> = values.into_iter().filter_map(draft_from_value).collect();
    if drafts.len() < total {
        tracing::debug!(skipped = total - drafts.len(), "Skipped unusable synthesis items");
    }
    Ok(drafts)
}

pub struct EntrySynthesizer {
    client: Arc<dyn GenerationClient>,
    temperature: f32,
}

impl EntrySynthesizer {
    pub fn new(client: Arc<dyn GenerationClient>, temperature: f32) -> Self {
        Self { client, temperature }
    }

    /// Generate entry drafts for one chunk of (possibly underscore-encoded) terms
    pub async fn synthesize(&self, terms: &[String]) -> Result<Vec<EntryDraft>, ImportError> {
        let spaced: Vec<String> = terms.iter().map(|t| decode_phrase(t)).collect();
        let reply = self
            .client
            .complete(&synthesis_prompt(&spaced), self.temperature)
            .await?;
        parse_drafts(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_item() {
        let raw = r#"Here:
[{"word": "give_up", "phonetic": "/ɡɪv ʌp/",
  "senses": [{"pos": "v", "meaning": "放弃"}, {"pos": "v.", "meaning": "投降"}],
  "definition_en": "to stop trying", "example": "Don't give up.",
  "memory_method": "", "forms": [{"form": "gave up", "label": "past"}, "given up"]}]"#;

        let drafts = parse_drafts(raw).unwrap();
        assert_eq!(drafts.len(), 1);
        let draft = &drafts[0];
        assert_eq!(draft.term, "give up");
        assert_eq!(draft.definition(), "v. 放弃; v. 投降");
        assert_eq!(draft.mnemonic, None);
        assert_eq!(draft.forms.len(), 2);
        assert_eq!(draft.forms[1].form, "given up");
        assert_eq!(draft.forms[1].label, "");
    }

    #[test]
    fn test_sense_slots_object_in_numeric_order() {
        let raw = r#"[{"word": "run", "phonetic": "/rʌn/",
            "senses": {
                "sense_10": {"pos": "n", "meaning": "跑步"},
                "sense_2": {"pos": "v", "meaning": "经营"},
                "sense_1": {"pos": "v", "meaning": "跑"},
                "sense_3": null,
                "sense_4": {"pos": "adj", "meaning": ""}
            },
            "definition_en": "to move fast", "example": null, "memory_method": null}]"#;

        let drafts = parse_drafts(raw).unwrap();
        assert_eq!(drafts[0].senses.len(), 3);
        assert_eq!(drafts[0].definition(), "v. 跑; v. 经营; n. 跑步");
    }

    #[test]
    fn test_two_slot_reply() {
        let raw = r#"[{"word":"run","senses":{"sense_1":{"pos":"v","meaning":"跑"},"sense_2":{"pos":"n","meaning":"跑步"}}}]"#;
        let drafts = parse_drafts(raw).unwrap();
        assert_eq!(drafts[0].definition(), "v. 跑; n. 跑步");
    }

    #[test]
    fn test_empty_slots_object_gets_placeholder() {
        let raw = r#"[{"word": "zyzzyva", "senses": {"sense_1": null, "note": "x"}}]"#;
        let drafts = parse_drafts(raw).unwrap();
        assert!(drafts[0].senses.is_empty());
        assert_eq!(drafts[0].definition(), PLACEHOLDER_DEFINITION);
    }

    #[test]
    fn test_zero_senses_gets_placeholder() {
        let drafts = parse_drafts(r#"[{"word": "zyzzyva", "senses": [{"pos": "n"}]}]"#).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].definition(), PLACEHOLDER_DEFINITION);
    }

    #[test]
    fn test_items_without_word_are_skipped() {
        let raw = r#"[{"phonetic": "/x/"}, "loose string", {"word": "  "}, {"word": "ok"}]"#;
        let drafts = parse_drafts(raw).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].term, "ok");
    }

    #[test]
    fn test_malformed_replies() {
        assert!(matches!(parse_drafts("sorry, I can't"), Err(ImportError::MalformedResponse(_))));
        assert!(matches!(
            parse_drafts(r#"[{"word": "a",]"#),
            Err(ImportError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_into_entry_is_unstudied() {
        let draft = EntryDraft {
            term: "give up".to_string(),
            phonetic: None,
            senses: vec![Sense { pos: "v".to_string(), meaning: "放弃".to_string() }],
            definition_en: None,
            example: None,
            mnemonic: None,
            forms: Vec::new(),
        };
        let entry = draft.into_entry(4);
        assert_eq!(entry.library_id, 4);
        assert_eq!(entry.definition, "v. 放弃");
        assert_eq!(entry.review_count, 0);
        assert_eq!(entry.next_review_time, 0);
        assert_eq!(entry.easiness_factor, 2.5);
    }
}
