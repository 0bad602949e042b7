//! Prism CLI - contacts that work offline and sync in the background
//!
//! Every change is written locally first; with a remote configured it is
//! pushed right away, otherwise it waits in the sync queue.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ContactCommands, GroupCommands, QueueCommands, SchemaCommands};
use crate::commands::common::{GlobalOptions, Session};
use crate::commands::completions::run_completions;
use crate::commands::contact::{
    run_contact_add, run_contact_delete, run_contact_edit, run_contact_list,
};
use crate::commands::group::{run_group_add, run_group_delete, run_group_list};
use crate::commands::queue::{run_queue_list, run_queue_retry};
use crate::commands::schema::{run_schema_add, run_schema_delete, run_schema_list};
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "prism=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let options = GlobalOptions {
        db_path: cli.db_path,
        config_path: cli.config,
        offline: cli.offline,
    };
    let session = Session::open(&options)?;

    match cli.command {
        Commands::Contact { command } => match command {
            ContactCommands::Add { first_name, fields } => {
                run_contact_add(&first_name, &fields, &session).await?;
            }
            ContactCommands::List {
                prefix,
                limit,
                json,
            } => run_contact_list(prefix.as_deref(), limit, json, &session)?,
            ContactCommands::Edit {
                id,
                first_name,
                fields,
            } => run_contact_edit(&id, first_name.as_deref(), &fields, &session).await?,
            ContactCommands::Delete { id } => run_contact_delete(&id, &session).await?,
        },
        Commands::Group { command } => match command {
            GroupCommands::Add { name, color } => run_group_add(&name, color, &session).await?,
            GroupCommands::List { json } => run_group_list(json, &session)?,
            GroupCommands::Delete { id } => run_group_delete(&id, &session).await?,
        },
        Commands::Schema { command } => match command {
            SchemaCommands::Add {
                key,
                label,
                field_type,
                options,
            } => run_schema_add(&key, &label, field_type.into(), options, &session).await?,
            SchemaCommands::List { json } => run_schema_list(json, &session)?,
            SchemaCommands::Delete { id } => run_schema_delete(&id, &session).await?,
        },
        Commands::Sync { pull, force } => run_sync(pull, force, &session).await?,
        Commands::Queue { command } => match command {
            QueueCommands::List { failed, json } => run_queue_list(failed, json, &session)?,
            QueueCommands::Retry { id } => run_queue_retry(id, &session).await?,
        },
        Commands::Watch { collection, json } => run_watch(collection, json, &session).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
