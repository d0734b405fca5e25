//! Due-set selection
//!
//! Read-only view over storage: which entries of the selected libraries are
//! due right now. Results are re-sorted locally so the ordering does not
//! depend on the storage backend.

use std::cmp::Ordering;

use mw_common::config::{EmptyDuePolicy, StudyConfig};
use mw_common::{EntryStore, Entry, Result};

/// Entries selected for a study session
#[derive(Debug, Clone, Default)]
pub struct DueSet {
    pub entries: Vec<Entry>,
    /// Nothing was due and the replay policy supplied every entry instead
    pub replayed: bool,
}

impl DueSet {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Libraries to read: the caller's selection, or the configured current library
fn effective_libraries(library_ids: &[i64], study: &StudyConfig) -> Vec<i64> {
    let mut ids: Vec<i64> = if library_ids.is_empty() {
        study.current_library_id.into_iter().collect()
    } else {
        library_ids.to_vec()
    };
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn due_order(a: &Entry, b: &Entry) -> Ordering {
    a.next_review_time
        .cmp(&b.next_review_time)
        .then_with(|| a.term.cmp(&b.term))
}

/// All entries in `library_ids` with `next_review_time <= now`
///
/// Ordered by next review time, then term. An empty selection falls back to
/// `study.current_library_id`; with neither, nothing is due.
pub async fn select_due<S>(
    store: &S,
    library_ids: &[i64],
    now: i64,
    study: &StudyConfig,
) -> Result<Vec<Entry>>
where
    S: EntryStore + ?Sized,
{
    let ids = effective_libraries(library_ids, study);
    if ids.is_empty() {
        tracing::debug!("No libraries selected and no current library configured");
        return Ok(Vec::new());
    }

    let mut entries: Vec<Entry> = store
        .entries_due_for_libraries(&ids, now)
        .await?
        .into_iter()
        .filter(|entry| entry.is_due(now))
        .collect();
    entries.sort_by(due_order);

    tracing::debug!(libraries = ?ids, due = entries.len(), "Selected due entries");
    Ok(entries)
}

/// Study queue: the due set, with `study.empty_due_policy` applied when it is empty
pub async fn select_for_study<S>(
    store: &S,
    library_ids: &[i64],
    now: i64,
    study: &StudyConfig,
) -> Result<DueSet>
where
    S: EntryStore + ?Sized,
{
    let entries = select_due(store, library_ids, now, study).await?;
    if !entries.is_empty() || study.empty_due_policy == EmptyDuePolicy::Strict {
        return Ok(DueSet { entries, replayed: false });
    }

    let mut all = Vec::new();
    for library_id in effective_libraries(library_ids, study) {
        all.extend(store.entries_in_library(library_id).await?);
    }
    all.sort_by(due_order);

    tracing::info!(entries = all.len(), "Nothing due, replaying all entries");
    Ok(DueSet { entries: all, replayed: true })
}
