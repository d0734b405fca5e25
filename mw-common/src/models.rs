//! Vocabulary data model
//!
//! An [`Entry`] is one learned item; its identity within a library is the
//! normalized term (see [`normalize_term`]). The SRS fields are owned by the
//! review scheduler in `mw-srs`; everything else is written by enrichment or
//! manual edits.

use serde::{Deserialize, Serialize};

/// Default SM-2 easiness factor for new entries
pub const DEFAULT_EASINESS_FACTOR: f64 = 2.5;

/// SM-2 easiness factor floor
pub const MIN_EASINESS_FACTOR: f64 = 1.3;

/// Normalize a term for identity and deduplication (trim + lowercase)
pub fn normalize_term(term: &str) -> String {
    term.trim().to_lowercase()
}

/// Structured word-form variant (e.g. `{"form": "gave up", "label": "past"}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordForm {
    pub form: String,
    #[serde(default)]
    pub label: String,
}

/// A learned vocabulary item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Entry {
    /// Storage row id (0 until persisted)
    pub id: i64,
    /// Owning library
    pub library_id: i64,
    /// Display term
    pub term: String,
    /// Phonetic transcription
    pub phonetic: Option<String>,
    /// Senses condensed into a display string ("v. 放弃; n. ...")
    pub definition: String,
    /// English gloss
    pub definition_en: Option<String>,
    /// Example sentence
    pub example: Option<String>,
    /// Memory aid
    pub mnemonic: Option<String>,
    /// Word-form variants
    pub forms: Vec<WordForm>,
    /// Manual ordering inside the library
    pub sort_order: i64,

    /// SM-2 easiness factor (never below 1.3)
    pub easiness_factor: f64,
    /// Current interval in days
    pub interval: i64,
    /// Consecutive successful reviews
    pub repetitions: i64,
    /// Epoch ms when the entry is next due (0 = due immediately)
    pub next_review_time: i64,
    /// Epoch ms of the last graded review or test
    pub last_review_time: i64,
    pub review_count: i64,
    pub correct_count: i64,
    pub incorrect_count: i64,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            id: 0,
            library_id: 0,
            term: String::new(),
            phonetic: None,
            definition: String::new(),
            definition_en: None,
            example: None,
            mnemonic: None,
            forms: Vec::new(),
            sort_order: 0,
            easiness_factor: DEFAULT_EASINESS_FACTOR,
            interval: 0,
            repetitions: 0,
            next_review_time: 0,
            last_review_time: 0,
            review_count: 0,
            correct_count: 0,
            incorrect_count: 0,
        }
    }
}

impl Entry {
    /// Create an unstudied entry (immediately due, default easiness)
    pub fn new(term: impl Into<String>, library_id: i64) -> Self {
        Self {
            term: term.into(),
            library_id,
            ..Default::default()
        }
    }

    /// Identity key inside the owning library
    pub fn key(&self) -> String {
        normalize_term(&self.term)
    }

    /// Whether the entry is due at `now_millis`
    pub fn is_due(&self, now_millis: i64) -> bool {
        self.next_review_time <= now_millis
    }

    /// Copy the enrichment content of `other` into `self`, keeping identity and SRS state
    pub fn merge_content(&mut self, other: &Entry) {
        self.term = other.term.clone();
        self.phonetic = other.phonetic.clone();
        self.definition = other.definition.clone();
        self.definition_en = other.definition_en.clone();
        self.example = other.example.clone();
        self.mnemonic = other.mnemonic.clone();
        self.forms = other.forms.clone();
    }
}

/// A named partition of entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Epoch ms
    pub created_at: i64,
    /// Last viewed position in the library's word list
    pub last_index: i64,
}

/// Test mode recorded in history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestType {
    /// Multiple choice
    Choice,
    /// Spelling
    Spell,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Choice => "CHOICE",
            TestType::Spell => "SPELL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CHOICE" => Some(TestType::Choice),
            "SPELL" => Some(TestType::Spell),
            _ => None,
        }
    }
}

/// Summary of one completed test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestHistory {
    pub id: i64,
    /// Epoch ms when the test finished
    pub timestamp: i64,
    pub total_questions: i64,
    pub correct_count: i64,
    pub test_type: TestType,
    pub duration_seconds: i64,
}

impl TestHistory {
    /// Fraction answered correctly (0.0 for an empty test)
    pub fn accuracy(&self) -> f64 {
        if self.total_questions > 0 {
            self.correct_count as f64 / self.total_questions as f64
        } else {
            0.0
        }
    }
}
