//! Scrawl CLI - local-first notes from the terminal
//!
//! Notes are written to the on-device store immediately; `scrawl sync` and
//! `scrawl watch` reconcile them with the remote note service.

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;
#[cfg(test)]
mod tests;

use clap::{CommandFactory, Parser};
use tracing_subscriber::filter::{Directive, EnvFilter};

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::add::run_add;
use crate::commands::attach::run_attach;
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::CliContext;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::run_list;
use crate::commands::pending::run_pending;
use crate::commands::search::run_search;
use crate::commands::show::run_show;
use crate::commands::sync::{run_sync, run_sync_conflicts, run_sync_resolve};
use crate::commands::watch::run_watch;
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

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "scrawl=info".parse::<Directive>() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    match cli.command {
        Some(Commands::Config { command }) => run_config(command, profile),
        Some(Commands::Auth { command }) => run_auth(command, profile),
        Some(Commands::Completions { shell, output }) => run_completions(shell, output.as_deref()),
        None if cli.note.is_empty() => {
            Cli::command().print_help().map_err(CliError::Io)?;
            println!();
            Ok(())
        }
        command => {
            let context = CliContext::load(cli.db_path, profile)?;
            run_with_store(command, &cli.note, &context).await
        }
    }
}

async fn run_with_store(
    command: Option<Commands>,
    quick_note: &[String],
    context: &CliContext,
) -> Result<(), CliError> {
    match command {
        Some(Commands::Add { title, body }) => {
            run_add(title.as_deref(), &body, &context.open_notes()?)
        }
        Some(Commands::List { limit, json }) => run_list(limit, json, &context.open_notes()?),
        Some(Commands::Show { id, json }) => run_show(&id, json, &context.open_notes()?),
        Some(Commands::Search { query, limit, json }) => {
            run_search(&query, limit, json, &context.open_notes()?)
        }
        Some(Commands::Edit { id, title, body }) => {
            run_edit(&id, title, body, &context.open_notes()?)
        }
        Some(Commands::Attach {
            id,
            kind,
            url,
            clear,
        }) => run_attach(&id, kind, url.as_deref(), clear, &context.open_notes()?),
        Some(Commands::Delete { id }) => run_delete(&id, &context.open_notes()?),
        Some(Commands::Pending { json }) => run_pending(json, &context.open_notes()?),
        Some(Commands::Sync { command }) => match command {
            None => run_sync(context).await,
            Some(SyncCommands::Conflicts { json }) => {
                run_sync_conflicts(json, &context.open_notes()?)
            }
            Some(SyncCommands::Resolve { id }) => run_sync_resolve(&id, &context.open_notes()?),
        },
        Some(Commands::Watch) => run_watch(context).await,
        Some(Commands::Config { command }) => run_config(command, Some(&context.profile_name)),
        Some(Commands::Auth { command }) => run_auth(command, Some(&context.profile_name)),
        Some(Commands::Completions { shell, output }) => run_completions(shell, output.as_deref()),
        // Quick capture mode: scrawl "my thought"
        None => run_add(None, quick_note, &context.open_notes()?),
    }
}
