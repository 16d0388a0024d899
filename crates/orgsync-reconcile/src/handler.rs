//! Reconciliation run orchestration.
//!
//! One run walks these phases in order:
//! 1. `FetchObserved`: download the catalog scheme and index its org units.
//! 2. `RefreshMappingBeforeSync`: align the mapping table with the snapshot.
//! 3. `Transform`: fetch the source records and build the desired tree.
//! 4. `InitialBulkLoad` when the catalog holds no units, otherwise
//!    `Compare` followed by `Apply`.
//! 5. `RefreshMappingAfterSync`: record ids of units touched by this run.
//! 6. `Summarize`.
//!
//! Data and transport errors abort the run with an `error` summary; the
//! counts gathered until then are kept.

use crate::applier::{ApplyFailure, ApplyStats, ChangeApplier};
use crate::error::ReconcileError;
use crate::mapping_refresh::{refresh_mapping, RefreshScope};
use crate::snapshot::{build_snapshot, CatalogSnapshot};
use crate::summary::{SummaryBuilder, SyncSummary};
use orgsync_client::source::MAX_PAGE_SIZE;
use orgsync_client::{fetch_all_records, CatalogClient, SourceClient};
use orgsync_core::{
    Change, DesiredHierarchy, HierarchyTransformer, StructureComparer,
};
use orgsync_mapping::MappingStore;
use std::collections::HashSet;
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    FetchObserved,
    RefreshMappingBeforeSync,
    Transform,
    InitialBulkLoad,
    Compare,
    Apply,
    RefreshMappingAfterSync,
    Summarize,
}

impl SyncPhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchObserved => "fetch_observed",
            Self::RefreshMappingBeforeSync => "refresh_mapping_before_sync",
            Self::Transform => "transform",
            Self::InitialBulkLoad => "initial_bulk_load",
            Self::Compare => "compare",
            Self::Apply => "apply",
            Self::RefreshMappingAfterSync => "refresh_mapping_after_sync",
            Self::Summarize => "summarize",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run settings.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Catalog scheme holding the org units.
    pub scheme: String,
    /// Source page size.
    pub page_size: usize,
    /// Compute and report the change-set without writing anything.
    pub dry_run: bool,
}

impl SyncOptions {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            page_size: MAX_PAGE_SIZE,
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

struct PhaseFailure {
    phase: SyncPhase,
    error: ReconcileError,
}

fn at<E: Into<ReconcileError>>(phase: SyncPhase) -> impl FnOnce(E) -> PhaseFailure {
    move |e| PhaseFailure {
        phase,
        error: e.into(),
    }
}

fn enter(phase: SyncPhase) {
    info!(phase = %phase, "Entering sync phase");
}

/// Drives one reconciliation of the catalog against the source.
pub struct ReconciliationHandler<'a, S: SourceClient + ?Sized, C: CatalogClient + ?Sized> {
    source: &'a S,
    catalog: &'a C,
    mapping: &'a mut MappingStore,
    options: SyncOptions,
}

impl<'a, S: SourceClient + ?Sized, C: CatalogClient + ?Sized> ReconciliationHandler<'a, S, C> {
    pub fn new(
        source: &'a S,
        catalog: &'a C,
        mapping: &'a mut MappingStore,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            catalog,
            mapping,
            options,
        }
    }

    /// Run all phases. Always returns a summary, also for aborted runs.
    pub async fn run(&mut self) -> SyncSummary {
        info!(
            scheme = %self.options.scheme,
            dry_run = self.options.dry_run,
            "Starting organisation sync"
        );
        let mut summary = SummaryBuilder::new(self.options.dry_run);

        if let Err(failure) = self.execute(&mut summary).await {
            error!(
                phase = %failure.phase,
                error = %failure.error,
                "Synchronization aborted"
            );
            summary.abort(format!("{} failed: {}", failure.phase, failure.error));
        }

        enter(SyncPhase::Summarize);
        let summary = summary.finish();
        info!(
            status = %summary.status,
            created = summary.counts.created,
            updated = summary.counts.updated,
            deleted = summary.counts.deleted,
            errors = summary.counts.errors,
            "Organisation sync finished"
        );
        summary
    }

    async fn execute(&mut self, summary: &mut SummaryBuilder) -> Result<(), PhaseFailure> {
        enter(SyncPhase::FetchObserved);
        let snapshot = self
            .fetch_observed(summary)
            .await
            .map_err(at(SyncPhase::FetchObserved))?;

        enter(SyncPhase::RefreshMappingBeforeSync);
        let refreshed = refresh_mapping(self.mapping, &snapshot.observed, RefreshScope::All);
        if refreshed.failed > 0 {
            summary.warn(format!(
                "{} mapping entries could not be written before sync",
                refreshed.failed
            ));
        }

        enter(SyncPhase::Transform);
        let desired = self.transform().await.map_err(at(SyncPhase::Transform))?;
        summary.set_total(desired.len());
        for warning in desired.warnings() {
            summary.warn(warning);
        }

        let touched = if snapshot.is_empty() {
            enter(SyncPhase::InitialBulkLoad);
            self.initial_load(desired, summary)
                .await
                .map_err(at(SyncPhase::InitialBulkLoad))?
        } else {
            enter(SyncPhase::Compare);
            let mut changes = StructureComparer::compare(&desired, &snapshot.observed);
            skip_rejected_creates(&mut changes, &snapshot, summary);
            info!(changes = changes.len(), "Computed change-set");
            if self.options.dry_run {
                summary.plan(&changes);
                return Ok(());
            }
            for change in &changes {
                summary.sample(change);
            }

            enter(SyncPhase::Apply);
            let mut stats = ChangeApplier::new(self.catalog, self.mapping, &self.options.scheme)
                .apply(changes)
                .await;
            let touched = std::mem::take(&mut stats.touched);
            summary.record(stats);
            touched
        };

        if !touched.is_empty() {
            enter(SyncPhase::RefreshMappingAfterSync);
            self.refresh_touched(&touched, summary).await;
        }
        Ok(())
    }

    async fn fetch_observed(
        &self,
        summary: &mut SummaryBuilder,
    ) -> Result<CatalogSnapshot, ReconcileError> {
        let entities = self.catalog.download_all(&self.options.scheme).await?;
        let snapshot = build_snapshot(&entities)?;
        for rejection in &snapshot.rejected {
            summary.error(ApplyFailure {
                operation: "snapshot",
                external_id: rejection.external_id.clone(),
                label: rejection.label.clone().unwrap_or_default(),
                message: rejection.reason.clone(),
            });
        }
        info!(
            units = snapshot.observed.len(),
            rejected = snapshot.rejected.len(),
            "Fetched observed snapshot"
        );
        Ok(snapshot)
    }

    async fn transform(&self) -> Result<DesiredHierarchy, ReconcileError> {
        let records = fetch_all_records(self.source, self.options.page_size).await?;
        let transformer = HierarchyTransformer::new(&records)?;
        Ok(transformer.transform()?)
    }

    /// Upload the whole hierarchy into an empty catalog.
    async fn initial_load(
        &mut self,
        desired: DesiredHierarchy,
        summary: &mut SummaryBuilder,
    ) -> Result<HashSet<String>, ReconcileError> {
        info!(units = desired.len(), "Catalog is empty, loading full hierarchy");
        let creates: Vec<Change> = desired.iter().cloned().map(Change::Create).collect();
        if self.options.dry_run {
            summary.plan(&creates);
            return Ok(HashSet::new());
        }
        for change in &creates {
            summary.sample(change);
        }

        let layers = desired.into_layers();
        let mut stats = ApplyStats::default();
        let result = ChangeApplier::new(self.catalog, self.mapping, &self.options.scheme)
            .load_layers(&layers, &mut stats)
            .await;
        let touched = std::mem::take(&mut stats.touched);
        summary.record(stats);
        result.map(|()| touched)
    }

    /// Record internal ids of units created or updated in this run.
    async fn refresh_touched(&mut self, touched: &HashSet<String>, summary: &mut SummaryBuilder) {
        let snapshot = match self.catalog.download_all(&self.options.scheme).await {
            Ok(entities) => build_snapshot(&entities).map(|snapshot| snapshot.observed),
            Err(e) => {
                warn!(error = %e, "Could not re-download catalog for mapping refresh");
                summary.warn(format!("mapping refresh after sync skipped: {e}"));
                return;
            }
        };
        match snapshot {
            Ok(snapshot) => {
                let refreshed = refresh_mapping(self.mapping, &snapshot, RefreshScope::Only(touched));
                if refreshed.failed > 0 {
                    summary.warn(format!(
                        "{} mapping entries could not be written after sync",
                        refreshed.failed
                    ));
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not index catalog for mapping refresh");
                summary.warn(format!("mapping refresh after sync skipped: {e}"));
            }
        }
    }
}

/// Drop creates for units the catalog already holds under an unusable id.
/// They are counted as snapshot errors; creating them would duplicate them.
fn skip_rejected_creates(
    changes: &mut Vec<Change>,
    snapshot: &CatalogSnapshot,
    summary: &mut SummaryBuilder,
) {
    let rejected = snapshot.rejected_ids();
    if rejected.is_empty() {
        return;
    }
    let before = changes.len();
    changes.retain(|change| match change {
        Change::Create(node) => !rejected.contains(node.external_id.as_str()),
        _ => true,
    });
    let skipped = before - changes.len();
    if skipped > 0 {
        warn!(skipped, "Skipping creates for rejected catalog units");
        summary.warn(format!(
            "{skipped} units not created because the catalog already holds them with an unusable id"
        ));
    }
}
