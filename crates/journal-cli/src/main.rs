//! Journal CLI - drive the offline-first journal and its sync engine from a terminal

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::common::{resolve_config_path, resolve_db_path};
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::run_list;
use crate::commands::mark::run_mark;
use crate::commands::sync::run_sync_command;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = match "journal=info".parse::<Directive>() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;

    match cli.command {
        Commands::Add {
            text,
            location,
            images,
            marked,
        } => run_add(&text, location, images, marked, &db_path).await?,
        Commands::List { limit, json } => run_list(limit, json, &db_path).await?,
        Commands::Edit { id, text } => run_edit(&id, &text, &db_path).await?,
        Commands::Mark { id, unmark } => run_mark(&id, !unmark, &db_path).await?,
        Commands::Delete { id } => run_delete(&id, &db_path).await?,
        Commands::Sync { command } => {
            let config_path = resolve_config_path(cli.config)?;
            run_sync_command(command, &db_path, &config_path).await?;
        }
        Commands::Config { command } => {
            let config_path = resolve_config_path(cli.config)?;
            run_config(command, &db_path, &config_path).await?;
        }
    }

    Ok(())
}
