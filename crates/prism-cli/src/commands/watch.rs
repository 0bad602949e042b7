use prism_core::{Collection, Entity, EntityRepository, Query};

use crate::cli::WatchTarget;
use crate::commands::common::Session;
use crate::commands::contact::format_contact_lines;
use crate::commands::group::format_group_lines;
use crate::commands::schema::format_schema_lines;
use crate::error::CliError;

/// Print the collection now and after every change until Ctrl-C
pub async fn run_watch(target: WatchTarget, as_json: bool, session: &Session) -> Result<(), CliError> {
    let worker = session.is_online().then(|| session.ctx.start_worker());
    tracing::info!("Watching {}", Collection::from(target));

    let result = match target {
        WatchTarget::Contacts => {
            watch_repository(&session.ctx.contacts, as_json, format_contact_lines).await
        }
        WatchTarget::Groups => {
            watch_repository(&session.ctx.groups, as_json, format_group_lines).await
        }
        WatchTarget::Schemas => {
            watch_repository(&session.ctx.schemas, as_json, format_schema_lines).await
        }
    };

    if let Some(worker) = worker {
        worker.shutdown().await;
    }
    result
}

async fn watch_repository<E: Entity>(
    repository: &EntityRepository<E>,
    as_json: bool,
    render: fn(&[E]) -> Vec<String>,
) -> Result<(), CliError> {
    let mut live = repository.observe(Query::all())?;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            next = live.next() => {
                let Some(records) = next else { break };
                if as_json {
                    println!("{}", serde_json::to_string(&*records)?);
                } else {
                    println!("{} {}(s)", records.len(), E::LABEL);
                    for line in render(&records) {
                        println!("  {line}");
                    }
                }
            }
        }
    }
    Ok(())
}
