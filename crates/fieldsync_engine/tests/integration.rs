//! Integration tests for the orchestrator against a catalog server.

use fieldsync_catalog::{CatalogServer, InMemoryDataset};
use fieldsync_engine::{
    Dependencies, DependencyPolicy, LoopbackClient, LoopbackServer, MessageTransport,
    RegionInventory, RegionOutcome, RegionSyncOrchestrator, RetryConfig, SkipReason, SyncConfig,
    SyncError, SyncState,
};
use fieldsync_protocol::{
    ErrorKind, ErrorResponse, SyncMessage, UserContext, ADMIN_LEVELS_STORE, LOCATIONS_STORE,
    SCHEMA_STORE, SITES_STORE, SITE_TABLES_STORE,
};
use fieldsync_testkit::{
    scenario_server, scenario_user, site, TempStorePath, TestStore, SCENARIO_REGIONS,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// A server that answers through the catalog server, except for regions
/// marked as failing.
#[derive(Clone)]
struct TestServer {
    server: CatalogServer,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl TestServer {
    fn new(server: CatalogServer) -> Self {
        Self {
            server,
            failing: Arc::default(),
        }
    }

    fn fail(&self, identifier: &str) {
        self.failing.lock().insert(identifier.to_string());
    }

    fn recover(&self) {
        self.failing.lock().clear();
    }
}

impl LoopbackServer for TestServer {
    fn handle_bytes(&self, body: &[u8]) -> Result<Vec<u8>, String> {
        let request: SyncMessage = fieldsync_protocol::decode(body).map_err(|e| e.to_string())?;
        if let SyncMessage::FetchRequest(fetch) = &request {
            if self.failing.lock().contains(&fetch.identifier) {
                let reply = SyncMessage::Error(ErrorResponse::new(
                    ErrorKind::Unavailable,
                    "region temporarily unavailable",
                ));
                return fieldsync_protocol::encode(&reply).map_err(|e| e.to_string());
            }
        }
        self.server.handle_bytes(body).map_err(|e| e.to_string())
    }
}

type Orchestrator = RegionSyncOrchestrator<MessageTransport<LoopbackClient<TestServer>>>;

struct Harness {
    dataset: Arc<InMemoryDataset>,
    server: TestServer,
    orchestrator: Orchestrator,
}

fn harness(store: &TestStore, policy: DependencyPolicy) -> Harness {
    harness_for(store, policy, scenario_user())
}

fn harness_for(store: &TestStore, policy: DependencyPolicy, user: UserContext) -> Harness {
    let (dataset, server) = scenario_server();
    let server = TestServer::new(server);
    let transport = MessageTransport::new(user, LoopbackClient::new(server.clone()));
    let config = SyncConfig::new()
        .with_dependencies(policy)
        .with_retry(RetryConfig::new(2).with_initial_delay(Duration::ZERO));
    Harness {
        dataset,
        server,
        orchestrator: RegionSyncOrchestrator::new(config, transport, store.store.clone()),
    }
}

#[tokio::test]
async fn full_sync_populates_every_store() {
    let store = TestStore::memory();
    let h = harness(&store, DependencyPolicy::ByKind);

    let report = h.orchestrator.synchronize_catalog().await.unwrap();

    let identifiers: Vec<&str> = report
        .regions
        .iter()
        .map(|r| r.region.identifier.as_str())
        .collect();
    assert_eq!(identifiers, SCENARIO_REGIONS);
    assert!(report.is_complete());
    assert_eq!(report.fingerprint.as_ref().map(String::len), Some(64));
    assert_eq!(h.orchestrator.state(), SyncState::Synced);

    assert_eq!(
        store.keys(SCHEMA_STORE),
        vec![
            "activity/50",
            "activity/60",
            "country/1",
            "database/5",
            "database/6",
            "partner/1",
            "partner/9",
        ]
    );
    assert_eq!(
        store.keys(ADMIN_LEVELS_STORE),
        vec!["entity/11", "entity/12", "level/1"]
    );
    assert_eq!(store.keys(LOCATIONS_STORE), vec!["300"]);
    assert_eq!(store.keys(SITE_TABLES_STORE), vec!["50", "60"]);
    assert_eq!(store.keys(SITES_STORE), vec!["101", "102"]);
    assert_eq!(store.entry(SITES_STORE, "101").unwrap()["values"]["beds"], 12);
}

#[tokio::test]
async fn failed_admin_region_does_not_block_independent_sites() {
    let store = TestStore::memory();
    let h = harness(&store, DependencyPolicy::ByKind);
    h.server.fail("admin/1");

    let report = h.orchestrator.synchronize_catalog().await.unwrap();

    assert!(matches!(
        report.outcome("admin/1"),
        Some(RegionOutcome::Failed(SyncError::Transport {
            retryable: true,
            ..
        }))
    ));
    assert!(report.outcome("site/5/9").unwrap().is_committed());
    assert!(store.keys(ADMIN_LEVELS_STORE).is_empty());
    assert_eq!(store.keys(SITES_STORE), vec!["101", "102"]);
}

#[tokio::test]
async fn failed_admin_region_skips_declared_dependents() {
    let store = TestStore::memory();
    let policy = DependencyPolicy::Explicit(Dependencies::new().with("site/5/9", "admin/1"));
    let h = harness(&store, policy);
    h.server.fail("admin/1");

    let report = h.orchestrator.synchronize_catalog().await.unwrap();

    assert_eq!(
        report.outcome("site/5/9"),
        Some(&RegionOutcome::Skipped(SkipReason::DependencyFailed {
            dependency: "admin/1".into()
        }))
    );
    assert!(report.outcome("locations").unwrap().is_committed());
    assert!(store.keys(SITES_STORE).is_empty());
}

#[tokio::test]
async fn resume_and_inventory_after_partial_run() {
    let store = TestStore::memory();
    let h = harness(&store, DependencyPolicy::ByKind);
    h.server.fail("admin/1");

    let first = h.orchestrator.synchronize_catalog().await.unwrap();
    let catalog: Vec<_> = first.regions.iter().map(|r| r.region.clone()).collect();

    let inventory = RegionInventory::load(&store).await.unwrap();
    let missing = inventory.missing_regions(&catalog);
    assert_eq!(missing, first.retry_regions());
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].identifier, "admin/1");

    h.server.recover();
    let sites_before = store.entries(SITES_STORE);
    let second = h.orchestrator.resume(&first).await.unwrap();

    assert!(second.is_complete());
    assert_eq!(second.regions.len(), 1);
    assert_eq!(store.entries(SITES_STORE), sites_before);
    let inventory = RegionInventory::load(&store).await.unwrap();
    assert!(inventory.missing_regions(&catalog).is_empty());
}

#[tokio::test]
async fn resync_applies_server_side_changes() {
    let store = TestStore::memory();
    let h = harness(&store, DependencyPolicy::ByKind);
    h.orchestrator.synchronize_catalog().await.unwrap();

    h.dataset.update(|d| {
        d.admin_entities.retain(|e| e.id != 12);
        if let Some(deleted) = d.sites.iter_mut().find(|s| s.id == 102) {
            deleted.deleted = true;
        }
        d.sites.push(site(103, 50, 9, 30));
    });

    let report = h.orchestrator.synchronize_catalog().await.unwrap();

    assert!(report.is_complete());
    assert_eq!(store.keys(ADMIN_LEVELS_STORE), vec!["entity/11", "level/1"]);
    assert_eq!(store.keys(SITES_STORE), vec!["101", "103"]);
}

#[tokio::test]
async fn replaying_an_unchanged_catalog_keeps_the_same_state() {
    let store = TestStore::memory();
    let h = harness(&store, DependencyPolicy::ByKind);

    let first = h.orchestrator.synchronize_catalog().await.unwrap();
    let snapshot = store.snapshot();
    let second = h.orchestrator.synchronize_catalog().await.unwrap();

    assert_eq!(store.snapshot(), snapshot);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(h.orchestrator.stats().runs_completed, 2);
}

#[tokio::test]
async fn narrower_scope_syncs_fewer_regions() {
    let store = TestStore::memory();
    let h = harness_for(&store, DependencyPolicy::ByKind, UserContext::new(2, 9));

    let report = h.orchestrator.synchronize_catalog().await.unwrap();

    let identifiers: Vec<&str> = report
        .regions
        .iter()
        .map(|r| r.region.identifier.as_str())
        .collect();
    assert_eq!(identifiers, vec!["schema", "locations", "site-tables"]);
    assert_eq!(store.keys(SCHEMA_STORE), vec!["partner/9"]);
    assert!(store.keys(SITES_STORE).is_empty());
}

#[tokio::test]
async fn unassigned_user_is_rejected_before_any_write() {
    let store = TestStore::memory();
    let h = harness_for(&store, DependencyPolicy::ByKind, UserContext::unassigned(3));

    let err = h.orchestrator.synchronize_catalog().await.unwrap_err();

    assert!(matches!(err, SyncError::Authorization(_)));
    assert_eq!(h.orchestrator.state(), SyncState::Error);
    assert!(store.keys(SCHEMA_STORE).is_empty());
}

#[tokio::test]
async fn catalog_outage_is_fatal_and_retryable() {
    let store = TestStore::memory();
    let h = harness(&store, DependencyPolicy::ByKind);
    h.dataset.fail_with("replica lagging");

    let err = h.orchestrator.synchronize_catalog().await.unwrap_err();
    assert!(matches!(err, SyncError::CatalogUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(h.orchestrator.stats().retries, 1);

    h.dataset.restore();
    assert!(h.orchestrator.synchronize_catalog().await.unwrap().is_complete());
}

#[tokio::test]
async fn file_store_survives_restart() {
    let location = TempStorePath::new();
    let (_, server) = scenario_server();

    {
        let store = location.open();
        let transport = MessageTransport::new(
            scenario_user(),
            LoopbackClient::new(TestServer::new(server.clone())),
        );
        let orchestrator =
            RegionSyncOrchestrator::new(SyncConfig::default(), transport, store.clone());
        assert!(orchestrator.synchronize_catalog().await.unwrap().is_complete());
        store.close().await.unwrap();
    }

    let reopened = location.open();
    let inventory = RegionInventory::load(&reopened).await.unwrap();
    let catalog = server.catalog().list_regions(&scenario_user()).unwrap();
    assert!(inventory.missing_regions(&catalog).is_empty());
    assert_eq!(inventory.len(SITES_STORE), 2);
}
