//! Missing command implementation.

use super::Target;
use fieldsync_engine::RegionInventory;
use fieldsync_protocol::CatalogRequest;

/// Runs the missing command.
///
/// Regions the server lists but that hold no local entry are printed one
/// per line, in catalog order.
pub async fn run(target: &Target) -> Result<(), Box<dyn std::error::Error>> {
    let server = super::load_server(target.dataset_path("missing")?)?;
    let response = server.handle_catalog(CatalogRequest::new(target.user))?;

    let store = super::open_store(target.store_path("missing")?)?;
    let inventory = RegionInventory::load(&store).await?;
    store.close().await?;

    let missing = inventory.missing_regions(&response.regions);
    tracing::info!(
        listed = response.regions.len(),
        missing = missing.len(),
        "compared catalog with local store"
    );
    for region in missing {
        println!("{}", region.identifier);
    }

    Ok(())
}
