//! Configuration validation command.

use std::path::Path;

use crate::app::Config;
use crate::error::Result;

/// Load and validate a config file, printing a short summary.
pub fn execute_config<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let path = config_path.as_ref();
    println!("Checking configuration: {}", path.display());
    println!();

    let config = Config::load(path)?;

    println!("✓ Configuration file is valid");
    println!();
    println!("Summary:");
    println!(
        "  Node RPC: {}://<role>-node-<id> (runner :{}, storage :{})",
        config.rpc.scheme, config.rpc.runner_port, config.rpc.storage_port
    );
    println!(
        "  Readiness: {}s deadline on port {}",
        config.lifecycle.readiness_timeout_ms / 1000,
        config.lifecycle.game_port
    );
    if config.idle.enabled {
        println!("  Idle shutdown: after {}s", config.idle.grace_secs);
    } else {
        println!("  Idle shutdown: disabled");
    }
    if config.archive.sweep_enabled {
        println!(
            "  Archive sweep: {} servers every {}s",
            config.archive.batch_size, config.archive.interval_secs
        );
    } else {
        println!("  Archive sweep: disabled");
    }
    println!(
        "  Inventory: {} runner nodes, {} storage nodes, {} owners, {} servers",
        config.inventory.runners.len(),
        config.inventory.storage_nodes().len(),
        config.inventory.owners.len(),
        config.inventory.servers.len()
    );

    if config.inventory.runners.is_empty() {
        println!();
        println!("⚠ No runner nodes configured; no server can be started");
    }
    Ok(())
}
