//! Inspect command implementation.

use super::Target;
use fieldsync_protocol::{Value, LOCAL_STORES};
use fieldsync_store::{LocalStore, StoreResult, TransactionMode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Local store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store file path.
    pub path: String,
    /// Total number of entries.
    pub total_entries: usize,
    /// Per object store contents, in creation order.
    pub stores: Vec<StoreContents>,
}

/// Contents of one object store.
#[derive(Debug, Serialize)]
pub struct StoreContents {
    /// Object store name.
    pub name: String,
    /// Number of entries.
    pub entry_count: usize,
    /// Entries by key (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<BTreeMap<String, Value>>,
}

/// Runs the inspect command.
pub async fn run(
    target: &Target,
    show_entries: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = target.store_path("inspect")?;
    if !path.exists() {
        return Err(format!("No store found at {:?}", path).into());
    }

    let store = super::open_store(path)?;
    let stores = read_stores(&store, show_entries).await?;
    store.close().await?;

    let result = InspectResult {
        path: path.display().to_string(),
        total_entries: stores.iter().map(|s| s.entry_count).sum(),
        stores,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print!("{}", render_text(&result));
        }
    }

    Ok(())
}

async fn read_stores(store: &LocalStore, show_entries: bool) -> StoreResult<Vec<StoreContents>> {
    let mut reads = Vec::new();
    store
        .run_transaction(&LOCAL_STORES, TransactionMode::ReadOnly, |tx| {
            for name in LOCAL_STORES {
                reads.push((name, tx.get_all(name)));
            }
            Ok(())
        })
        .await?;

    let mut contents = Vec::with_capacity(reads.len());
    for (name, read) in reads {
        let entries: BTreeMap<String, Value> = read.await?.into_iter().collect();
        contents.push(StoreContents {
            name: name.to_string(),
            entry_count: entries.len(),
            entries: show_entries.then_some(entries),
        });
    }
    Ok(contents)
}

fn render_text(result: &InspectResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Store: {}", result.path);
    let _ = writeln!(out, "Entries: {}", result.total_entries);
    for store in &result.stores {
        let _ = writeln!(out, "  {:<12} {:>6}", store.name, store.entry_count);
        if let Some(entries) = &store.entries {
            for (key, value) in entries {
                let _ = writeln!(out, "    {key}: {value}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_testkit::TestStore;
    use serde_json::json;

    #[tokio::test]
    async fn reads_every_store_in_creation_order() {
        let test_store = TestStore::memory();
        test_store
            .run_transaction(&["sites"], TransactionMode::ReadWrite, |tx| {
                tx.put("sites", "101", json!({"id": 101}));
                Ok(())
            })
            .await
            .unwrap();

        let stores = read_stores(&test_store, true).await.unwrap();
        let names: Vec<&str> = stores.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, LOCAL_STORES);
        let sites = stores.last().unwrap();
        assert_eq!(sites.entry_count, 1);
        assert_eq!(sites.entries.as_ref().unwrap()["101"], json!({"id": 101}));

        let counts_only = read_stores(&test_store, false).await.unwrap();
        assert!(counts_only.iter().all(|s| s.entries.is_none()));
    }

    #[test]
    fn text_shows_entries_when_present() {
        let result = InspectResult {
            path: "local.store".into(),
            total_entries: 1,
            stores: vec![StoreContents {
                name: "sites".into(),
                entry_count: 1,
                entries: Some(BTreeMap::from([("101".to_string(), json!({"id": 101}))])),
            }],
        };
        let text = render_text(&result);
        assert!(text.contains("Entries: 1"));
        assert!(text.contains("    101: {\"id\":101}"));
    }
}
