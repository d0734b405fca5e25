//! # MagicWord Enrichment Pipeline
//!
//! Turns free text or word lists into stored vocabulary entries:
//! extraction → chunking → synthesis → persistence, with a bounded retry
//! queue for chunks whose generation call fails.

pub mod dispatcher;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod importer;
pub mod prompts;
pub mod session;
pub mod synthesizer;

pub use dispatcher::{ChunkDispatcher, DispatchReport, DispatcherConfig};
pub use error::ImportError;
pub use generation::{ChatCompletionClient, GenerationClient, GenerationError};
pub use importer::BulkImporter;
pub use session::{ImportSession, ImportState};
pub use synthesizer::{EntryDraft, EntrySynthesizer};
