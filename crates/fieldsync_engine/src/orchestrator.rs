//! Region sync orchestrator and its state machine.

use crate::applier::{AppliedRegion, RegionApplier};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::report::{RegionOutcome, RegionReport, SkipReason, SyncReport};
use crate::transport::RegionTransport;
use fieldsync_protocol::{CatalogResponse, SyncRegion};
use fieldsync_store::{LocalStore, TransactionMode};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// The current state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Not syncing.
    Idle,
    /// Requesting the region catalog.
    Listing,
    /// Fetching a region payload.
    Fetching,
    /// Writing a region payload to the local store.
    Applying,
    /// The last run committed every region.
    Synced,
    /// The last run failed or left regions behind.
    Error,
}

impl SyncState {
    /// Returns true while a run is in progress.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Listing | SyncState::Fetching | SyncState::Applying
        )
    }

    /// Returns true if a new run can start.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }
}

/// Cumulative statistics over all runs.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Runs that went through their whole region list.
    pub runs_completed: u64,
    /// Regions committed.
    pub regions_committed: u64,
    /// Regions failed.
    pub regions_failed: u64,
    /// Regions skipped.
    pub regions_skipped: u64,
    /// Payload changes applied.
    pub changes_applied: u64,
    /// Retried transport calls.
    pub retries: u64,
    /// Fingerprint of the last catalog listed.
    pub last_fingerprint: Option<String>,
    /// End of the last completed run.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Requests cancellation of a running sync from elsewhere.
///
/// Cancellation takes effect between regions: a region whose transaction
/// is already open finishes first, and every region not yet reached is
/// reported as [`SkipReason::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Pulls sync regions into a local store, one transaction per region.
///
/// Regions are processed strictly in catalog order: a region is not
/// fetched before the transaction of the previous one has completed.
/// Region failures are recorded and the run continues with the next
/// region whose dependencies all committed. Authorization, catalog and
/// store-open errors end the run immediately.
pub struct RegionSyncOrchestrator<T: RegionTransport> {
    config: SyncConfig,
    transport: T,
    applier: RegionApplier,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    cancel: CancelHandle,
}

impl<T: RegionTransport> RegionSyncOrchestrator<T> {
    /// Creates an orchestrator.
    pub fn new(config: SyncConfig, transport: T, store: LocalStore) -> Self {
        Self {
            config,
            transport,
            applier: RegionApplier::new(store),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            cancel: CancelHandle::default(),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the local store.
    pub fn store(&self) -> &LocalStore {
        self.applier.store()
    }

    /// Cancels the ongoing run after its current region.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Replaces the cancel handle, so it can be shared with code created
    /// before the orchestrator.
    #[must_use]
    pub fn with_cancel_handle(mut self, handle: CancelHandle) -> Self {
        self.cancel = handle;
        self
    }

    /// Returns a handle that cancels runs of this orchestrator.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Lists the catalog through the transport and synchronizes every
    /// region in it.
    ///
    /// # Errors
    ///
    /// Fails without touching the store if the catalog cannot be listed,
    /// and with [`SyncError::StoreUnavailable`] if the store cannot be
    /// opened.
    pub async fn synchronize_catalog(&self) -> SyncResult<SyncReport> {
        self.cancel.reset();
        let catalog = self.fetch_catalog().await?;
        let mut report = self.run(&catalog.regions).await?;
        report.fingerprint = Some(catalog.fingerprint);
        Ok(report)
    }

    /// Lists the catalog without synchronizing it.
    ///
    /// Retryable failures are retried like fetches, and the fingerprint is
    /// recorded in the stats. On success the state is left as it was.
    pub async fn list_catalog(&self) -> SyncResult<CatalogResponse> {
        let previous = self.state();
        let catalog = self.fetch_catalog().await?;
        self.set_state(previous);
        Ok(catalog)
    }

    async fn fetch_catalog(&self) -> SyncResult<CatalogResponse> {
        self.set_state(SyncState::Listing);
        let catalog = match self.with_retry(|| self.transport.list_regions()).await {
            Ok(catalog) => catalog,
            Err(err) => {
                self.handle_error(&err);
                return Err(err);
            }
        };
        tracing::debug!(
            regions = catalog.regions.len(),
            fingerprint = %catalog.fingerprint,
            "catalog listed"
        );
        self.stats.write().last_fingerprint = Some(catalog.fingerprint.clone());
        Ok(catalog)
    }

    /// Synchronizes the given regions, in order.
    pub async fn synchronize(&self, regions: &[SyncRegion]) -> SyncResult<SyncReport> {
        self.cancel.reset();
        self.run(regions).await
    }

    /// Retries the failed and skipped regions of an earlier report.
    ///
    /// Committed regions are not fetched again. Dependencies on them count
    /// as satisfied.
    pub async fn resume(&self, previous: &SyncReport) -> SyncResult<SyncReport> {
        self.cancel.reset();
        let regions = previous.retry_regions();
        tracing::info!(regions = regions.len(), "resuming sync");
        let mut report = self.run(&regions).await?;
        report.fingerprint = previous.fingerprint.clone();
        Ok(report)
    }

    async fn run(&self, regions: &[SyncRegion]) -> SyncResult<SyncReport> {
        let start = Instant::now();
        if let Err(err) = self.open_stores(regions).await {
            self.handle_error(&err);
            return Err(err);
        }

        let mut report = SyncReport::default();
        let mut unsatisfied: HashSet<String> = HashSet::new();

        for region in regions {
            if self.cancel.is_cancelled() {
                tracing::warn!(region = %region.identifier, "region skipped: sync cancelled");
                report.regions.push(RegionReport {
                    region: region.clone(),
                    outcome: RegionOutcome::Skipped(SkipReason::Cancelled),
                });
                continue;
            }

            let blocked_by = self
                .config
                .dependencies
                .dependencies_of(region, regions)
                .into_iter()
                .find(|dep| unsatisfied.contains(dep));
            if let Some(dependency) = blocked_by {
                tracing::warn!(
                    region = %region.identifier,
                    dependency = %dependency,
                    "region skipped: dependency did not commit"
                );
                unsatisfied.insert(region.identifier.clone());
                report.regions.push(RegionReport {
                    region: region.clone(),
                    outcome: RegionOutcome::Skipped(SkipReason::DependencyFailed { dependency }),
                });
                continue;
            }

            let outcome = match self.sync_region(region).await {
                Ok(applied) => {
                    tracing::info!(
                        region = %region.identifier,
                        changes = applied.changes(),
                        replaced = applied.replaced,
                        "region committed"
                    );
                    RegionOutcome::Committed {
                        changes: applied.changes(),
                    }
                }
                Err(err) if err.is_fatal() => {
                    tracing::warn!(region = %region.identifier, error = %err, "sync aborted");
                    self.handle_error(&err);
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(region = %region.identifier, error = %err, "region failed");
                    unsatisfied.insert(region.identifier.clone());
                    RegionOutcome::Failed(err)
                }
            };
            report.regions.push(RegionReport {
                region: region.clone(),
                outcome,
            });
        }

        report.duration = start.elapsed();
        self.finish(&report);
        Ok(report)
    }

    async fn sync_region(&self, region: &SyncRegion) -> SyncResult<AppliedRegion> {
        self.set_state(SyncState::Fetching);
        let payload = self
            .with_retry(|| self.transport.fetch_region(&region.identifier))
            .await?;

        self.set_state(SyncState::Applying);
        self.applier.apply(region, payload).await
    }

    /// Opens every store the regions write to, so an unusable store ends
    /// the run before anything is fetched.
    async fn open_stores(&self, regions: &[SyncRegion]) -> SyncResult<()> {
        let stores: BTreeSet<&'static str> = regions
            .iter()
            .filter_map(|r| r.kind().ok())
            .map(|kind| kind.store())
            .collect();
        for store in stores {
            self.store()
                .open(store, TransactionMode::ReadWrite)
                .await
                .map_err(SyncError::StoreUnavailable)?;
        }
        Ok(())
    }

    /// Runs `call`, retrying retryable errors with backoff.
    async fn with_retry<R>(&self, mut call: impl FnMut() -> SyncResult<R>) -> SyncResult<R> {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            match call() {
                Err(err) if err.is_retryable() && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    self.stats.write().retries += 1;
                    tracing::debug!(attempt, error = %err, "retrying transport call");
                    tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
                }
                result => return result,
            }
        }
    }

    fn finish(&self, report: &SyncReport) {
        self.set_state(if report.is_complete() {
            SyncState::Synced
        } else {
            SyncState::Error
        });

        let first_failure = report.regions.iter().find_map(|r| match &r.outcome {
            RegionOutcome::Failed(err) => Some(format!("{}: {err}", r.region.identifier)),
            _ => None,
        });

        let mut stats = self.stats.write();
        stats.runs_completed += 1;
        stats.regions_committed += report.committed() as u64;
        stats.regions_failed += report.failed() as u64;
        stats.regions_skipped += report.skipped() as u64;
        stats.changes_applied += report.changes() as u64;
        stats.last_sync_time = Some(Instant::now());
        stats.last_error = first_failure;
        drop(stats);

        tracing::info!(
            committed = report.committed(),
            failed = report.failed(),
            skipped = report.skipped(),
            duration_ms = report.duration.as_millis() as u64,
            "sync run finished"
        );
    }

    fn handle_error(&self, error: &SyncError) {
        self.set_state(SyncState::Error);
        self.stats.write().last_error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::dependency::{Dependencies, DependencyPolicy};
    use crate::transport::MockTransport;
    use fieldsync_protocol::{
        EntityChange, RegionPayload, ADMIN_LEVELS_STORE, LOCATIONS_STORE, SCHEMA_STORE,
        SITES_STORE, SITE_TABLES_STORE,
    };
    use fieldsync_store::{MemoryBackend, StoreConfig, StoreError};
    use serde_json::json;
    use std::time::Duration;

    fn catalog() -> Vec<SyncRegion> {
        vec![
            SyncRegion::full("schema"),
            SyncRegion::full("admin/1"),
            SyncRegion::new("locations"),
            SyncRegion::new("site-tables"),
            SyncRegion::new("site/5/9"),
        ]
    }

    fn transport() -> MockTransport {
        let transport = MockTransport::new();
        transport.set_catalog(catalog());
        transport.set_payload(RegionPayload::new("schema").with(EntityChange::upsert(
            SCHEMA_STORE,
            "database/5",
            json!({"id": 5}),
        )));
        transport.set_payload(RegionPayload::new("admin/1").with(EntityChange::upsert(
            ADMIN_LEVELS_STORE,
            "level/1",
            json!({"id": 1, "levelId": 1}),
        )));
        transport.set_payload(RegionPayload::new("locations").with(EntityChange::upsert(
            LOCATIONS_STORE,
            "300",
            json!({"id": 300}),
        )));
        transport.set_payload(RegionPayload::new("site-tables").with(EntityChange::upsert(
            SITE_TABLES_STORE,
            "50",
            json!({"activityId": 50}),
        )));
        transport.set_payload(RegionPayload::new("site/5/9").with(EntityChange::upsert(
            SITES_STORE,
            "101",
            json!({"id": 101, "databaseId": 5, "orgUnitId": 9}),
        )));
        transport
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::new(3)
            .with_initial_delay(Duration::ZERO)
            .with_jitter(false)
    }

    fn orchestrator(config: SyncConfig) -> (RegionSyncOrchestrator<MockTransport>, MemoryBackend) {
        let backend = MemoryBackend::new();
        let store = LocalStore::spawn(backend.clone(), StoreConfig::default());
        (
            RegionSyncOrchestrator::new(config.with_retry(fast_retry()), transport(), store),
            backend,
        )
    }

    #[test]
    fn sync_state_checks() {
        assert!(SyncState::Idle.can_start_sync());
        assert!(SyncState::Synced.can_start_sync());
        assert!(SyncState::Error.can_start_sync());
        assert!(!SyncState::Fetching.can_start_sync());
        assert!(SyncState::Applying.is_active());
        assert!(!SyncState::Idle.is_active());
    }

    #[tokio::test]
    async fn initial_state() {
        let (orchestrator, _) = orchestrator(SyncConfig::default());
        assert_eq!(orchestrator.state(), SyncState::Idle);
        assert_eq!(orchestrator.stats().runs_completed, 0);
    }

    #[tokio::test]
    async fn successful_catalog_sync() {
        let (orchestrator, backend) = orchestrator(SyncConfig::default());

        let report = orchestrator.synchronize_catalog().await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.regions.len(), 5);
        assert_eq!(report.changes(), 5);
        assert_eq!(report.fingerprint.as_deref(), Some("mock"));
        assert_eq!(orchestrator.state(), SyncState::Synced);
        assert_eq!(orchestrator.stats().regions_committed, 5);
        assert!(backend.entry(SITES_STORE, "101").is_some());
        assert_eq!(
            orchestrator.transport().fetch_log(),
            vec!["schema", "admin/1", "locations", "site-tables", "site/5/9"]
        );
    }

    #[tokio::test]
    async fn independent_failure_does_not_block_later_regions() {
        let (orchestrator, backend) = orchestrator(SyncConfig::default());
        orchestrator
            .transport()
            .fail_fetch("admin/1", SyncError::transport_fatal("gone"));

        let report = orchestrator.synchronize(&catalog()).await.unwrap();

        assert!(matches!(
            report.outcome("admin/1"),
            Some(RegionOutcome::Failed(SyncError::Transport { .. }))
        ));
        assert!(report.outcome("site/5/9").unwrap().is_committed());
        assert!(backend.entry(SITES_STORE, "101").is_some());
        assert_eq!(orchestrator.state(), SyncState::Error);
    }

    #[tokio::test]
    async fn declared_dependency_skips_transitively() {
        let policy = DependencyPolicy::Explicit(
            Dependencies::new()
                .with("locations", "admin/1")
                .with("site/5/9", "locations"),
        );
        let (orchestrator, backend) = orchestrator(SyncConfig::new().with_dependencies(policy));
        orchestrator
            .transport()
            .fail_fetch("admin/1", SyncError::transport_fatal("gone"));

        let report = orchestrator.synchronize(&catalog()).await.unwrap();

        assert_eq!(
            report.outcome("locations"),
            Some(&RegionOutcome::Skipped(SkipReason::DependencyFailed {
                dependency: "admin/1".into()
            }))
        );
        assert_eq!(
            report.outcome("site/5/9"),
            Some(&RegionOutcome::Skipped(SkipReason::DependencyFailed {
                dependency: "locations".into()
            }))
        );
        assert!(report.outcome("site-tables").unwrap().is_committed());
        assert!(backend.entry(SITES_STORE, "101").is_none());
        assert!(!orchestrator.transport().fetch_log().contains(&"site/5/9".to_string()));
    }

    #[tokio::test]
    async fn schema_failure_skips_everything_by_kind() {
        let (orchestrator, _) = orchestrator(SyncConfig::default());
        orchestrator
            .transport()
            .fail_fetch("schema", SyncError::Protocol("garbled".into()));

        let report = orchestrator.synchronize(&catalog()).await.unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 4);
        assert_eq!(orchestrator.transport().fetch_log(), vec!["schema"]);
    }

    #[tokio::test]
    async fn retryable_fetches_are_retried() {
        let (orchestrator, _) = orchestrator(SyncConfig::default());
        let transport = orchestrator.transport();
        transport.fail_fetch("locations", SyncError::transport_retryable("timeout"));
        transport.fail_fetch("locations", SyncError::transport_retryable("timeout"));

        let report = orchestrator.synchronize(&catalog()).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(orchestrator.stats().retries, 2);
    }

    #[tokio::test]
    async fn retries_give_up_after_max_attempts() {
        let (orchestrator, _) = orchestrator(SyncConfig::default());
        for _ in 0..3 {
            orchestrator
                .transport()
                .fail_fetch("locations", SyncError::transport_retryable("timeout"));
        }

        let report = orchestrator.synchronize(&catalog()).await.unwrap();
        assert!(matches!(
            report.outcome("locations"),
            Some(RegionOutcome::Failed(_))
        ));
    }

    #[tokio::test]
    async fn resume_refetches_only_unfinished_regions() {
        let (orchestrator, backend) = orchestrator(SyncConfig::default());
        orchestrator
            .transport()
            .fail_fetch("site-tables", SyncError::transport_fatal("gone"));

        let first = orchestrator.synchronize_catalog().await.unwrap();
        assert_eq!(
            first.retry_regions(),
            vec![SyncRegion::new("site-tables"), SyncRegion::new("site/5/9")]
        );

        orchestrator.transport().clear_fetch_log();
        let second = orchestrator.resume(&first).await.unwrap();

        assert!(second.is_complete());
        assert_eq!(second.fingerprint, first.fingerprint);
        assert_eq!(
            orchestrator.transport().fetch_log(),
            vec!["site-tables", "site/5/9"]
        );
        assert!(backend.entry(SITES_STORE, "101").is_some());
    }

    #[tokio::test]
    async fn catalog_failure_is_fatal() {
        let (orchestrator, backend) = orchestrator(SyncConfig::default());
        orchestrator
            .transport()
            .fail_catalog(SyncError::Authorization("no org unit".into()));

        let err = orchestrator.synchronize_catalog().await.unwrap_err();

        assert!(matches!(err, SyncError::Authorization(_)));
        assert_eq!(orchestrator.state(), SyncState::Error);
        assert!(orchestrator.stats().last_error.is_some());
        assert!(orchestrator.transport().fetch_log().is_empty());
        assert!(backend.snapshot().stores[SCHEMA_STORE].is_empty());
    }

    #[tokio::test]
    async fn listing_alone_retries_and_records_fingerprint() {
        let (orchestrator, backend) = orchestrator(SyncConfig::default());
        orchestrator
            .transport()
            .fail_catalog(SyncError::CatalogUnavailable("replica lagging".into()));

        let err = orchestrator.list_catalog().await.unwrap_err();
        assert!(matches!(err, SyncError::CatalogUnavailable(_)));
        assert_eq!(orchestrator.stats().retries, 2);
        assert_eq!(orchestrator.state(), SyncState::Error);

        orchestrator.transport().set_catalog(catalog());
        let listing = orchestrator.list_catalog().await.unwrap();
        assert_eq!(listing.regions, catalog());
        assert_eq!(orchestrator.stats().last_fingerprint.as_deref(), Some("mock"));
        assert_eq!(orchestrator.state(), SyncState::Error);
        assert!(orchestrator.transport().fetch_log().is_empty());
        assert!(backend.snapshot().stores[SCHEMA_STORE].is_empty());
    }

    #[tokio::test]
    async fn unavailable_store_is_fatal() {
        let store = LocalStore::spawn(MemoryBackend::denied("private mode"), StoreConfig::default());
        let orchestrator = RegionSyncOrchestrator::new(SyncConfig::default(), transport(), store);

        let err = orchestrator.synchronize(&catalog()).await.unwrap_err();

        assert!(matches!(
            err,
            SyncError::StoreUnavailable(StoreError::Unavailable { .. })
        ));
        assert!(orchestrator.transport().fetch_log().is_empty());
    }

    #[tokio::test]
    async fn failed_commit_is_a_region_failure() {
        let backend = MemoryBackend::new().with_commit_failure("disk full");
        let store = LocalStore::spawn(backend, StoreConfig::default());
        let orchestrator = RegionSyncOrchestrator::new(
            SyncConfig::new().with_dependencies(DependencyPolicy::None),
            transport(),
            store,
        );

        let report = orchestrator.synchronize(&catalog()).await.unwrap();

        assert_eq!(report.failed(), 5);
        assert!(matches!(
            report.outcome("schema"),
            Some(RegionOutcome::Failed(SyncError::Transaction(
                StoreError::CommitFailed(_)
            )))
        ));
    }

    #[tokio::test]
    async fn cancel_takes_effect_at_the_next_region() {
        let handle = CancelHandle::default();
        let transport = CancellingTransport {
            inner: transport(),
            after: "admin/1",
            handle: handle.clone(),
        };
        let backend = MemoryBackend::new();
        let store = LocalStore::spawn(backend.clone(), StoreConfig::default());
        let orchestrator = RegionSyncOrchestrator::new(SyncConfig::default(), transport, store)
            .with_cancel_handle(handle);

        let report = orchestrator.synchronize(&catalog()).await.unwrap();

        // The region being fetched when cancel arrived still commits.
        assert!(report.outcome("admin/1").unwrap().is_committed());
        for identifier in ["locations", "site-tables", "site/5/9"] {
            assert_eq!(
                report.outcome(identifier),
                Some(&RegionOutcome::Skipped(SkipReason::Cancelled))
            );
        }
        assert!(backend.entry(ADMIN_LEVELS_STORE, "level/1").is_some());
        assert!(backend.entry(LOCATIONS_STORE, "300").is_none());

        // The next run starts uncancelled.
        let report = orchestrator.synchronize(&catalog()[2..]).await.unwrap();
        assert!(report.is_complete());
    }

    struct CancellingTransport {
        inner: MockTransport,
        after: &'static str,
        handle: CancelHandle,
    }

    impl RegionTransport for CancellingTransport {
        fn list_regions(&self) -> SyncResult<CatalogResponse> {
            self.inner.list_regions()
        }

        fn fetch_region(&self, identifier: &str) -> SyncResult<RegionPayload> {
            if identifier == self.after {
                self.handle.cancel();
            }
            self.inner.fetch_region(identifier)
        }
    }
}
