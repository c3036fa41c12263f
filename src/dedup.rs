//! Duplicate detection against persisted state.
//!
//! The check itself is tri-state so the read failure mode is visible to the
//! caller; the policy (fail-open vs. fail-closed) is configuration, not a
//! hidden default. Must run before scrape/enrichment to avoid wasted
//! LLM and scrape cost on known duplicates.

use serde::{Deserialize, Serialize};

use crate::storage::NewsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateCheck {
    Duplicate,
    NotDuplicate,
    /// The storage read itself failed; policy decides how to proceed.
    CheckFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Treat an unanswerable check as "not a duplicate". A storage blip can
    /// cause a duplicate insert attempt, which the storage uniqueness
    /// constraint then rejects.
    #[default]
    FailOpen,
    /// Treat an unanswerable check as a duplicate and skip the item.
    FailClosed,
}

impl DuplicatePolicy {
    /// Collapse a tri-state check into the skip decision.
    pub fn is_duplicate(&self, check: DuplicateCheck) -> bool {
        match check {
            DuplicateCheck::Duplicate => true,
            DuplicateCheck::NotDuplicate => false,
            DuplicateCheck::CheckFailed => match self {
                DuplicatePolicy::FailOpen => {
                    tracing::warn!("duplicate check failed; continuing per fail-open policy");
                    false
                }
                DuplicatePolicy::FailClosed => true,
            },
        }
    }
}

/// Read-only wrapper over the store. Never raises: storage errors become
/// `CheckFailed`.
pub struct DuplicateChecker<'a> {
    store: &'a dyn NewsStore,
}

impl<'a> DuplicateChecker<'a> {
    pub fn new(store: &'a dyn NewsStore) -> Self {
        Self { store }
    }

    pub async fn by_unique_id(&self, unique_id: &str) -> DuplicateCheck {
        match self.store.find_by_unique_id(unique_id).await {
            Ok(Some(_)) => DuplicateCheck::Duplicate,
            Ok(None) => DuplicateCheck::NotDuplicate,
            Err(e) => {
                tracing::warn!(error = %e, unique_id, "duplicate check read failed");
                DuplicateCheck::CheckFailed
            }
        }
    }

    /// Legacy path for records predating unique-id adoption.
    pub async fn by_url_and_date(&self, url: &str, news_date: &str) -> DuplicateCheck {
        match self.store.find_by_url_and_date(url, news_date).await {
            Ok(Some(_)) => DuplicateCheck::Duplicate,
            Ok(None) => DuplicateCheck::NotDuplicate,
            Err(e) => {
                tracing::warn!(error = %e, url, "duplicate check read failed");
                DuplicateCheck::CheckFailed
            }
        }
    }
}

/// Merge several checks: any hit is a duplicate; otherwise a failed check
/// dominates a clean miss so the policy still gets a say.
pub fn merge_checks(checks: &[DuplicateCheck]) -> DuplicateCheck {
    if checks.iter().any(|c| *c == DuplicateCheck::Duplicate) {
        DuplicateCheck::Duplicate
    } else if checks.iter().any(|c| *c == DuplicateCheck::CheckFailed) {
        DuplicateCheck::CheckFailed
    } else {
        DuplicateCheck::NotDuplicate
    }
}
