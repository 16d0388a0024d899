//! Run summary.

use crate::applier::{ApplyFailure, ApplyStats};
use chrono::{DateTime, Utc};
use orgsync_core::{Change, FieldDiffs};
use serde::Serialize;
use std::fmt;

/// Sampled changes kept per change type.
pub const SAMPLE_LIMIT: usize = 5;

/// Sampled failures kept in the summary.
pub const FAILURE_SAMPLE_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Changes applied without errors.
    Success,
    NoChanges,
    /// Some changes applied, some failed.
    Partial,
    /// Aborted, or nothing succeeded.
    Error,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NoChanges => "no_changes",
            Self::Partial => "partial",
            Self::Error => "error",
        }
    }

    /// Process exit code for the CLI.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success | Self::NoChanges => 0,
            Self::Partial => 2,
            Self::Error => 1,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    /// Units in the desired hierarchy.
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub errors: usize,
}

impl SyncCounts {
    #[must_use]
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSample {
    pub external_id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "FieldDiffs::is_empty")]
    pub field_diffs: FieldDiffs,
}

/// First few entries of a list plus an overflow note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sampled<T> {
    pub items: Vec<T>,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overflow: Option<String>,
}

impl<T> Default for Sampled<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            overflow: None,
        }
    }
}

impl<T> Sampled<T> {
    fn push(&mut self, item: T, limit: usize) {
        self.total += 1;
        if self.items.len() < limit {
            self.items.push(item);
        } else {
            self.overflow = Some(format!("... and {} more", self.total - limit));
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncDetails {
    pub creations: Sampled<ChangeSample>,
    pub updates: Sampled<ChangeSample>,
    pub deletions: Sampled<ChangeSample>,
    pub failures: Sampled<ApplyFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub status: SyncStatus,
    pub message: String,
    pub dry_run: bool,
    pub counts: SyncCounts,
    pub warnings: Vec<String>,
    pub details: SyncDetails,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncSummary {
    /// Multi-line human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut out = format!(
            "Status: {}\n{}\nCreated: {}, updated: {}, deleted: {}, unchanged: {}, errors: {}\n",
            self.status,
            self.message,
            self.counts.created,
            self.counts.updated,
            self.counts.deleted,
            self.counts.unchanged,
            self.counts.errors,
        );
        for (title, sampled) in [
            ("Created", &self.details.creations),
            ("Updated", &self.details.updates),
            ("Deleted", &self.details.deletions),
        ] {
            if sampled.items.is_empty() {
                continue;
            }
            out.push_str(&format!("\n{title}:\n"));
            for sample in &sampled.items {
                out.push_str(&format!("  - {} (ID: {})\n", sample.label, sample.external_id));
                for (field, diff) in &sample.field_diffs {
                    out.push_str(&format!(
                        "      {field}: '{}' -> '{}'\n",
                        diff.old.as_deref().unwrap_or(""),
                        diff.new.as_deref().unwrap_or(""),
                    ));
                }
            }
            if let Some(overflow) = &sampled.overflow {
                out.push_str(&format!("  {overflow}\n"));
            }
        }
        if !self.details.failures.items.is_empty() {
            out.push_str("\nFailures:\n");
            for failure in &self.details.failures.items {
                out.push_str(&format!(
                    "  - {} {} (ID: {}): {}\n",
                    failure.operation, failure.label, failure.external_id, failure.message
                ));
            }
            if let Some(overflow) = &self.details.failures.overflow {
                out.push_str(&format!("  {overflow}\n"));
            }
        }
        if !self.warnings.is_empty() {
            out.push_str(&format!("\nWarnings: {}\n", self.warnings.len()));
        }
        out
    }
}

/// Accumulates a [`SyncSummary`] while the handler runs.
#[derive(Debug)]
pub(crate) struct SummaryBuilder {
    started_at: DateTime<Utc>,
    dry_run: bool,
    counts: SyncCounts,
    warnings: Vec<String>,
    details: SyncDetails,
    abort: Option<String>,
}

impl SummaryBuilder {
    pub(crate) fn new(dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            dry_run,
            counts: SyncCounts::default(),
            warnings: Vec::new(),
            details: SyncDetails::default(),
            abort: None,
        }
    }

    pub(crate) fn set_total(&mut self, total: usize) {
        self.counts.total = total;
    }

    pub(crate) fn warn(&mut self, warning: impl fmt::Display) {
        self.warnings.push(warning.to_string());
    }

    /// Count an error that did not come from the applier.
    pub(crate) fn error(&mut self, failure: ApplyFailure) {
        self.counts.errors += 1;
        self.details.failures.push(failure, FAILURE_SAMPLE_LIMIT);
    }

    pub(crate) fn abort(&mut self, message: impl Into<String>) {
        self.abort = Some(message.into());
    }

    /// Sample a planned or applied change.
    pub(crate) fn sample(&mut self, change: &Change) {
        let (bucket, sample) = match change {
            Change::Create(node) => (
                &mut self.details.creations,
                ChangeSample {
                    external_id: node.external_id.clone(),
                    label: node.label.clone(),
                    path: node.business_key_path.clone(),
                    field_diffs: FieldDiffs::new(),
                },
            ),
            Change::Update(update) => (
                &mut self.details.updates,
                ChangeSample {
                    external_id: update.external_id.clone(),
                    label: update.desired.label.clone(),
                    path: update.desired.business_key_path.clone(),
                    field_diffs: update.field_diffs.clone(),
                },
            ),
            Change::Delete(delete) => (
                &mut self.details.deletions,
                ChangeSample {
                    external_id: delete.external_id.clone(),
                    label: delete.label.clone(),
                    path: delete.last_known_path.clone(),
                    field_diffs: FieldDiffs::new(),
                },
            ),
        };
        bucket.push(sample, SAMPLE_LIMIT);
    }

    /// Count a planned change-set without applying it.
    pub(crate) fn plan(&mut self, changes: &[Change]) {
        for change in changes {
            match change {
                Change::Create(_) => self.counts.created += 1,
                Change::Update(_) => self.counts.updated += 1,
                Change::Delete(_) => self.counts.deleted += 1,
            }
            self.sample(change);
        }
    }

    pub(crate) fn record(&mut self, stats: ApplyStats) {
        self.counts.created += stats.created;
        self.counts.updated += stats.updated;
        self.counts.deleted += stats.deleted;
        self.counts.unchanged += stats.unchanged;
        self.counts.errors += stats.errors;
        for failure in stats.failures {
            self.details.failures.push(failure, FAILURE_SAMPLE_LIMIT);
        }
    }

    pub(crate) fn finish(self) -> SyncSummary {
        let counts = self.counts;
        let status = match &self.abort {
            Some(_) => SyncStatus::Error,
            None if counts.errors > 0 && counts.changes() > 0 => SyncStatus::Partial,
            None if counts.errors > 0 => SyncStatus::Error,
            None if counts.changes() == 0 => SyncStatus::NoChanges,
            None => SyncStatus::Success,
        };

        let message = match (&self.abort, status) {
            (Some(reason), _) => format!("Synchronization aborted: {reason}"),
            (None, SyncStatus::NoChanges) => "No changes required".to_string(),
            (None, _) if self.dry_run => format!(
                "Dry run: {} creations, {} updates, {} deletions planned",
                counts.created, counts.updated, counts.deleted
            ),
            (None, _) => format!(
                "Synchronized {} units: {} created, {} updated, {} deleted, {} errors",
                counts.total, counts.created, counts.updated, counts.deleted, counts.errors
            ),
        };

        SyncSummary {
            status,
            message,
            dry_run: self.dry_run,
            counts,
            warnings: self.warnings,
            details: self.details,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
