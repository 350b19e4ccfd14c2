//! Status command implementation

use std::path::Path;

use blobsync_core::{KnowledgeStore, Side};
use colored::Colorize;
use serde::Serialize;

use super::load_config;
use crate::error::Result;

#[derive(Debug, Serialize)]
struct ReplicaStatus {
    side: Side,
    id: String,
    endpoint: String,
    tick: u64,
    items: usize,
}

/// Print replica identities, ticks and tracked item counts.
pub fn run_status(path: &Path, json: bool) -> Result<()> {
    let config = load_config(path)?;
    let state_dir = config.state_dir();

    let replicas = if state_dir.exists() {
        collect(&KnowledgeStore::open(&state_dir)?)?
    } else {
        Vec::new()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&replicas)?);
        return Ok(());
    }

    println!("{}", "Sync Status".bold());
    println!();
    println!("{}:  {}", "State".dimmed(), state_dir.display());
    println!();

    if replicas.is_empty() {
        println!("  {} (run {} first)", "No sync state".yellow(), "blobsync run".cyan());
        return Ok(());
    }

    for replica in &replicas {
        println!("{} {}", replica.side.to_string().cyan().bold(), replica.endpoint);
        println!("  {}:    {}", "id".dimmed(), replica.id);
        println!("  {}:  {}", "tick".dimmed(), replica.tick);
        println!("  {}: {}", "items".dimmed(), replica.items);
    }

    Ok(())
}

fn collect(store: &KnowledgeStore) -> Result<Vec<ReplicaStatus>> {
    let registry = store.replicas()?;
    let mut out = Vec::new();

    for side in [Side::Local, Side::Remote] {
        let Some(record) = registry.get(side) else {
            continue;
        };
        let vector = store.load(record.id)?;
        out.push(ReplicaStatus {
            side,
            id: record.id.to_string(),
            endpoint: record.endpoint.clone(),
            tick: vector.tick(),
            items: vector.len(),
        });
    }

    Ok(out)
}
