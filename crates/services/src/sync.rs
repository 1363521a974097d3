use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use storage::repository::QuestionRepository;
use trainer_core::CatalogDiff;
use trainer_core::model::QuestionDraft;

use crate::Clock;
use crate::error::SyncError;
use crate::source::{self, SourceError};

/// Outcome of reconciling one suite against its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub suite: String,
    pub created: usize,
    pub updated: usize,
    pub deactivated: usize,
    pub total_in_source: usize,
}

/// A suite whose reconciliation was aborted. Other suites proceed.
#[derive(Debug)]
pub struct SuiteFailure {
    pub suite: String,
    pub error: SyncError,
}

/// Observable outcome of a whole reconciliation run.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub reports: Vec<SyncReport>,
    /// Suites whose source file does not exist yet. Not failures.
    pub skipped: Vec<String>,
    pub failures: Vec<SuiteFailure>,
}

impl SyncSummary {
    /// True when every requested suite failed outright.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        !self.failures.is_empty() && self.reports.is_empty() && self.skipped.is_empty()
    }
}

/// Merges external question sources into the catalog.
///
/// Safe to run while sessions are live: it only touches question rows,
/// which the session flow treats as read-only, and each suite is applied as
/// one all-or-nothing unit of work.
#[derive(Clone)]
pub struct CatalogSyncService {
    clock: Clock,
    questions: Arc<dyn QuestionRepository>,
}

impl CatalogSyncService {
    #[must_use]
    pub fn new(clock: Clock, questions: Arc<dyn QuestionRepository>) -> Self {
        Self { clock, questions }
    }

    /// Reconcile one suite from already-loaded records.
    ///
    /// Running twice with identical input reports zero changes on the
    /// second run.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the catalog cannot be read or the
    /// diff cannot be applied; the suite is left untouched in that case.
    pub async fn sync_suite(
        &self,
        suite: &str,
        records: &[QuestionDraft],
    ) -> Result<SyncReport, SyncError> {
        let existing = self.questions.questions_for_suite(suite).await?;
        let diff = CatalogDiff::plan(suite, &existing, records, self.clock.now());

        let report = SyncReport {
            suite: suite.to_string(),
            created: diff.created.len(),
            updated: diff.updated.len(),
            deactivated: diff.deactivated.len(),
            total_in_source: records.len(),
        };

        self.questions.apply_catalog_diff(&diff).await?;

        info!(
            suite = %report.suite,
            source = report.total_in_source,
            created = report.created,
            updated = report.updated,
            deactivated = report.deactivated,
            "catalog sync applied"
        );
        Ok(report)
    }

    /// Reconcile every listed suite from `<dir>/<suite>.csv`.
    ///
    /// A missing file skips that suite; a malformed file or storage failure
    /// is recorded per suite and the run continues. The returned summary is
    /// the scheduler-facing report object.
    pub async fn sync_all(&self, dir: &Path, suites: &[String]) -> SyncSummary {
        let mut summary = SyncSummary::default();

        for suite in suites {
            match source::load_suite(dir, suite) {
                Ok(records) => match self.sync_suite(suite, &records).await {
                    Ok(report) => summary.reports.push(report),
                    Err(error) => {
                        error!(suite = %suite, error = %error, "catalog sync failed");
                        summary.failures.push(SuiteFailure {
                            suite: suite.clone(),
                            error,
                        });
                    }
                },
                Err(SourceError::NotFound { .. }) => {
                    info!(suite = %suite, "suite source not present yet, skipped");
                    summary.skipped.push(suite.clone());
                }
                Err(error) => {
                    error!(suite = %suite, error = %error, "suite source rejected");
                    summary.failures.push(SuiteFailure {
                        suite: suite.clone(),
                        error: error.into(),
                    });
                }
            }
        }

        summary
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
