//! Test-mode statistics
//!
//! Tests (multiple choice, spelling) count answers but do not move the SM-2
//! schedule; only graded reviews do that.

use mw_common::models::{TestHistory, TestType};
use mw_common::Entry;

/// Count one test answer against `entry`
pub fn record_test_outcome(entry: &Entry, correct: bool, now: i64) -> Entry {
    let mut next = entry.clone();
    next.review_count += 1;
    if correct {
        next.correct_count += 1;
    } else {
        next.incorrect_count += 1;
    }
    next.last_review_time = now;
    next
}

/// Running tally of one test run
#[derive(Debug, Clone)]
pub struct TestTally {
    test_type: TestType,
    started_at: i64,
    total: i64,
    correct: i64,
}

impl TestTally {
    pub fn new(test_type: TestType, started_at: i64) -> Self {
        Self { test_type, started_at, total: 0, correct: 0 }
    }

    pub fn record(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    /// History row for the finished run (id 0 until persisted)
    pub fn finish(&self, finished_at: i64) -> TestHistory {
        TestHistory {
            id: 0,
            timestamp: finished_at,
            total_questions: self.total,
            correct_count: self.correct,
            test_type: self.test_type,
            duration_seconds: ((finished_at - self.started_at) / 1000).max(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_does_not_reschedule() {
        let mut entry = Entry::new("apple", 1);
        entry.interval = 6;
        entry.next_review_time = 42;

        let next = record_test_outcome(&entry, false, 1_000);
        assert_eq!(next.incorrect_count, 1);
        assert_eq!(next.review_count, 1);
        assert_eq!(next.last_review_time, 1_000);
        assert_eq!(next.interval, 6);
        assert_eq!(next.next_review_time, 42);
    }

    #[test]
    fn test_tally_finish() {
        let mut tally = TestTally::new(TestType::Choice, 10_000);
        tally.record(true);
        tally.record(false);
        tally.record(true);

        let history = tally.finish(75_500);
        assert_eq!(history.total_questions, 3);
        assert_eq!(history.correct_count, 2);
        assert_eq!(history.duration_seconds, 65);
        assert_eq!(history.test_type, TestType::Choice);
    }
}
