//! SM-2 review scheduler
//!
//! Quality scores (0-5):
//! - 0: Complete blackout
//! - 1: Incorrect, answer recognized once shown
//! - 2: Incorrect, answer seemed easy once shown
//! - 3: Correct with serious difficulty
//! - 4: Correct after hesitation
//! - 5: Perfect recall
//!
//! `review` is pure: it returns the updated entry and the caller persists it.

use serde::{Deserialize, Serialize};

use mw_common::models::MIN_EASINESS_FACTOR;
use mw_common::time::days_to_millis;
use mw_common::Entry;

use crate::error::ScheduleError;

/// Lowest quality that counts as a successful recall
pub const PASSING_QUALITY: i32 = 3;

/// Apply one graded review at `now` (epoch ms)
///
/// - failure (`quality < 3`): repetitions reset to 0, interval 1 day, EF unchanged
/// - success: repetitions + 1; interval 1, then 6, then `round(prev * EF)`
///   using the EF in force before this review; EF then moves by
///   `0.1 - q * (0.08 + q * 0.02)` with `q = 5 - quality`, floored at 1.3
pub fn review(entry: &Entry, quality: i32, now: i64) -> Result<Entry, ScheduleError> {
    if !(0..=5).contains(&quality) {
        return Err(ScheduleError::InvalidQuality(quality));
    }

    let mut next = entry.clone();

    if quality < PASSING_QUALITY {
        next.repetitions = 0;
        next.interval = 1;
        next.incorrect_count += 1;
    } else {
        next.repetitions += 1;
        next.interval = match next.repetitions {
            1 => 1,
            2 => 6,
            // A corrupt zero interval would pin the entry at "due now" forever
            _ => round_half_up(entry.interval as f64 * entry.easiness_factor).max(1),
        };

        let q = f64::from(5 - quality);
        next.easiness_factor =
            (entry.easiness_factor + (0.1 - q * (0.08 + q * 0.02))).max(MIN_EASINESS_FACTOR);
        next.correct_count += 1;
    }

    next.last_review_time = now;
    next.next_review_time = now.saturating_add(days_to_millis(next.interval));
    next.review_count += 1;

    Ok(next)
}

/// Standard round-half-up on a non-negative product
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// The three answer buttons of the study screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Forgot,
    Vague,
    Know,
}

impl Grade {
    pub const ALL: [Grade; 3] = [Grade::Forgot, Grade::Vague, Grade::Know];

    /// SM-2 quality for this grade
    pub fn quality(self) -> i32 {
        match self {
            Grade::Forgot => 1,
            Grade::Vague => 3,
            Grade::Know => 5,
        }
    }

    /// Parse CLI input: `1`/`2`/`3` or the grade name
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "1" | "forgot" | "f" => Some(Grade::Forgot),
            "2" | "vague" | "v" => Some(Grade::Vague),
            "3" | "know" | "k" => Some(Grade::Know),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Grade::Forgot => "forgot",
            Grade::Vague => "vague",
            Grade::Know => "know",
        }
    }
}

/// Interval (days) each grade would give, for showing next to the buttons
pub fn preview_intervals(entry: &Entry) -> [(Grade, i64); 3] {
    Grade::ALL.map(|grade| {
        // Grade qualities are always in range
        let interval = review(entry, grade.quality(), 0)
            .map(|next| next.interval)
            .unwrap_or(1);
        (grade, interval)
    })
}
