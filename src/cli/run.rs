//! Handler for the `run` command.

use tokio::signal;
use tracing::{error, info};

use crate::app::{App, Config};
use crate::cli::RunArgs;
use crate::error::Result;

/// Apply CLI overrides on top of the loaded configuration.
pub fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(ref level) = args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.format = "json".to_string();
    }
}

/// Execute the run command.
pub async fn execute(args: &RunArgs) -> Result<()> {
    let mut config = Config::load(&args.config)?;
    apply_overrides(&mut config, args);
    config.init_logging();

    info!(
        config = %args.config.display(),
        runner_nodes = config.inventory.runners.len(),
        idle_shutdown = config.idle.enabled,
        archive_sweep = config.archive.sweep_enabled,
        "hostplane starting"
    );

    tokio::select! {
        result = App::run(config) => {
            if let Err(e) = result {
                error!(error = %e, "Fatal error");
                return Err(e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("hostplane stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn overrides_replace_logging_settings() {
        let mut config = Config::default();
        let args = RunArgs {
            config: PathBuf::from("config.toml"),
            log_level: Some("debug".into()),
            json_logs: true,
        };

        apply_overrides(&mut config, &args);

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
    }
}
