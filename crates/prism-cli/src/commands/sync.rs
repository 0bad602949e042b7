use prism_core::{DrainOutcome, PullOutcome, SkipReason};

use crate::commands::common::Session;
use crate::error::CliError;

pub async fn run_sync(pull: bool, force: bool, session: &Session) -> Result<(), CliError> {
    if !session.remote_configured {
        return Err(CliError::SyncNotConfigured);
    }
    if !session.is_online() {
        return Err(CliError::Offline);
    }

    // A previous run may have died with items on the wire.
    let recovered = session.ctx.engine.recover_interrupted()?;
    if recovered > 0 {
        tracing::info!("Requeued {recovered} interrupted item(s)");
    }

    match session.ctx.drain().await? {
        DrainOutcome::Completed(summary) if summary.processed() == 0 => {
            println!("Nothing to push");
        }
        DrainOutcome::Completed(summary) => {
            println!(
                "Pushed {} change(s), {} failed, {} parked",
                summary.succeeded, summary.failed, summary.parked
            );
        }
        DrainOutcome::Skipped { reason } => println!("Push skipped: {}", skip_reason(reason)),
    }

    if pull {
        for (collection, outcome) in session.ctx.pull_all(force).await? {
            match outcome {
                PullOutcome::Fresh => println!("{collection}: up to date"),
                PullOutcome::Pulled { upserted, rejected } if rejected > 0 => {
                    println!("{collection}: {upserted} pulled, {rejected} rejected");
                }
                PullOutcome::Pulled { upserted, .. } => println!("{collection}: {upserted} pulled"),
            }
        }
    }

    Ok(())
}

const fn skip_reason(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::AlreadyDraining => "another sync is running",
        SkipReason::Offline => "offline",
    }
}
