//! Review engine errors

use thiserror::Error;

/// SM-2 contract violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Quality score outside 0..=5
    #[error("Invalid quality {0}: expected a score between 0 and 5")]
    InvalidQuality(i32),
}

/// Errors from applying a review or test answer
#[derive(Error, Debug)]
pub enum StudyError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("Storage error: {0}")]
    Storage(#[from] mw_common::Error),
}
