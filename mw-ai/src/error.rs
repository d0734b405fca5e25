//! Import pipeline errors

use thiserror::Error;

use crate::generation::GenerationError;

#[derive(Debug, Error)]
pub enum ImportError {
    /// Extraction kept failing; no chunk work was started
    #[error("Candidate extraction failed after {attempts} attempts: {last_error}")]
    ExtractionFailed { attempts: u32, last_error: String },

    /// The text yielded no usable candidates
    #[error("No candidate terms found in the input")]
    ExtractionEmpty,

    /// A chunk used up its retry budget
    #[error("Chunk {terms:?} failed permanently: {last_error}")]
    ChunkPermanentlyFailed { terms: Vec<String>, last_error: String },

    /// Generation output was not the expected JSON array
    #[error("Malformed generation response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Storage error: {0}")]
    Storage(#[from] mw_common::Error),
}

impl ImportError {
    /// Whether another attempt at the same unit of work may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ImportError::MalformedResponse(_) => true,
            ImportError::Generation(e) => e.is_transient(),
            _ => false,
        }
    }
}
