//! Pure reconciliation planning between an external question source and the
//! persisted catalog of one suite.
//!
//! The planner only computes what should change; applying the result
//! atomically is the storage layer's job.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{Question, QuestionDraft, QuestionId};

/// The set of row changes that reconciles one suite's catalog with its
/// source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDiff {
    /// Questions present in the source but not in the catalog.
    pub created: Vec<Question>,
    /// Existing questions whose text/topic/difficulty changed, or that were
    /// retired and have reappeared in the source.
    pub updated: Vec<Question>,
    /// Active questions that vanished from the source. Retired, never
    /// deleted, so historical answers keep their reference.
    pub deactivated: Vec<Question>,
}

impl CatalogDiff {
    /// Plans the reconciliation of `existing` catalog rows against the
    /// `incoming` source records for one suite.
    ///
    /// Matching is by `code`. Planning is idempotent: running it over a
    /// catalog that already matches the source yields an empty diff.
    #[must_use]
    pub fn plan(
        suite: &str,
        existing: &[Question],
        incoming: &[QuestionDraft],
        now: DateTime<Utc>,
    ) -> Self {
        let mut remaining: HashMap<&str, &Question> =
            existing.iter().map(|q| (q.code(), q)).collect();

        let mut created = Vec::new();
        let mut updated = Vec::new();

        for draft in incoming {
            match remaining.remove(draft.code()) {
                Some(current) => {
                    let mut candidate = current.clone();
                    if candidate.apply_source(draft, now) {
                        updated.push(candidate);
                    }
                }
                None => {
                    created.push(Question::from_draft(QuestionId::new(), suite, draft, now));
                }
            }
        }

        // Whatever the source no longer mentions gets retired.
        let mut deactivated = Vec::new();
        for current in remaining.into_values() {
            let mut candidate = current.clone();
            if candidate.deactivate(now) {
                deactivated.push(candidate);
            }
        }

        Self {
            created,
            updated,
            deactivated,
        }
    }

    /// True when reconciliation would not touch the catalog.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deactivated.is_empty()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
