//! Sync command implementation.

use super::Target;
use fieldsync_engine::{
    DependencyPolicy, LoopbackClient, MessageTransport, RegionInventory, RegionOutcome,
    RegionSyncOrchestrator, RegionTransport, RetryConfig, SyncConfig, SyncReport, SyncResult,
};
use fieldsync_store::LocalStore;
use std::fmt::Write;

/// Runs the sync command.
///
/// The catalog server runs in-process; requests and replies still go
/// through the CBOR message encoding.
pub async fn run(
    target: &Target,
    missing_only: bool,
    attempts: u32,
    dependencies: DependencyPolicy,
) -> Result<SyncReport, Box<dyn std::error::Error>> {
    let server = super::load_server(target.dataset_path("sync")?)?;
    let store = super::open_store(target.store_path("sync")?)?;

    let client = LoopbackClient::new(move |body: &[u8]| {
        server.handle_bytes(body).map_err(|e| e.to_string())
    });
    let transport = MessageTransport::new(target.user, client);
    let config = SyncConfig::new()
        .with_retry(RetryConfig::new(attempts.max(1)))
        .with_dependencies(dependencies);
    let orchestrator = RegionSyncOrchestrator::new(config, transport, store.clone());

    let outcome = if missing_only {
        sync_missing(&orchestrator, &store).await
    } else {
        orchestrator.synchronize_catalog().await
    };
    store.close().await?;

    let report = outcome?;
    print!("{}", render_report(&report));
    Ok(report)
}

async fn sync_missing<T: RegionTransport>(
    orchestrator: &RegionSyncOrchestrator<T>,
    store: &LocalStore,
) -> SyncResult<SyncReport> {
    let listing = orchestrator.list_catalog().await?;
    let inventory = RegionInventory::load(store).await?;
    let missing = inventory.missing_regions(&listing.regions);
    tracing::info!(
        listed = listing.regions.len(),
        missing = missing.len(),
        "syncing missing regions only"
    );
    let mut report = orchestrator.synchronize(&missing).await?;
    report.fingerprint = Some(listing.fingerprint);
    Ok(report)
}

fn render_report(report: &SyncReport) -> String {
    let mut out = String::new();
    for entry in &report.regions {
        let status = match &entry.outcome {
            RegionOutcome::Committed { changes } => format!("committed ({changes} changes)"),
            RegionOutcome::Failed(err) => format!("failed: {err}"),
            RegionOutcome::Skipped(reason) => format!("skipped: {reason}"),
        };
        let _ = writeln!(out, "  {:<24} {}", entry.region.identifier, status);
    }
    let _ = writeln!(
        out,
        "Committed {} of {} regions, {} changes in {:.2?}",
        report.committed(),
        report.regions.len(),
        report.changes(),
        report.duration
    );
    out
}
