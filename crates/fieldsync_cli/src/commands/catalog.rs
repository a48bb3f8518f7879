//! Catalog command implementation.

use super::Target;
use fieldsync_protocol::{CatalogRequest, CatalogResponse};
use std::fmt::Write;

/// Runs the catalog command.
pub fn run(target: &Target, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let server = super::load_server(target.dataset_path("catalog")?)?;
    let response = server.handle_catalog(CatalogRequest::new(target.user))?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        _ => {
            print!("{}", render_text(&response));
        }
    }

    Ok(())
}

fn render_text(response: &CatalogResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Regions: {}", response.regions.len());
    for region in &response.regions {
        let policy = if region.full_replace {
            "full replace"
        } else {
            "incremental"
        };
        let _ = writeln!(out, "  {:<24} {}", region.identifier, policy);
    }
    let _ = writeln!(out, "Fingerprint: {}", response.fingerprint);
    out
}
