use anyhow::Context;
use clap::Parser;

use hostplane::cli::{check, run, CheckCommand, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run::execute(&args)
            .await
            .with_context(|| format!("running with {}", args.config.display())),
        Commands::Check(CheckCommand::Config(arg)) => check::execute_config(&arg.config)
            .with_context(|| format!("invalid configuration {}", arg.config.display())),
    }
}
