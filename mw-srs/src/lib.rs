//! # MagicWord Review Engine
//!
//! SM-2 scheduling and study-queue selection:
//! - `scheduler`: pure SM-2 state transition for one graded review
//! - `due`: which entries are due across the selected libraries
//! - `stats`: test-mode statistics (counts without rescheduling)
//! - `study`: applies reviews and test answers through the storage collaborator

pub mod due;
pub mod error;
pub mod scheduler;
pub mod stats;
pub mod study;

pub use due::{select_due, select_for_study, DueSet};
pub use error::{ScheduleError, StudyError};
pub use scheduler::{review, Grade};
pub use study::StudyService;
