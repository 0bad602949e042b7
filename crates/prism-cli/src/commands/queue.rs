use prism_core::{QueueItem, QueueStatus};

use crate::commands::common::{print_json, truncate, Session};
use crate::error::CliError;

pub fn run_queue_list(failed_only: bool, as_json: bool, session: &Session) -> Result<(), CliError> {
    let items = session
        .ctx
        .queue
        .list(failed_only.then_some(QueueStatus::Failed))?;

    if as_json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("Sync queue is empty.");
        return Ok(());
    }

    for line in format_queue_lines(&items) {
        println!("{line}");
    }
    let counts = session.ctx.queue.counts()?;
    println!(
        "{} pending, {} in flight, {} failed",
        counts.pending, counts.in_flight, counts.failed
    );
    Ok(())
}

pub async fn run_queue_retry(id: Option<i64>, session: &Session) -> Result<(), CliError> {
    let revived = session.ctx.queue.retry_failed(id)?;
    println!("Requeued {revived} item(s)");
    if revived > 0 {
        session.push_pending().await?;
    }
    Ok(())
}

pub fn format_queue_lines(items: &[QueueItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let mut line = format!(
                "#{:<5} {:<6}  {:<20}  {:<42}  {:<9}  attempts={}",
                item.id,
                item.operation.as_str(),
                item.entity_type.to_string(),
                item.entity_id.to_string(),
                item.status.as_str(),
                item.attempts
            );
            if let Some(error) = &item.last_error {
                line.push_str("  ");
                line.push_str(&truncate(error, 60));
            }
            line
        })
        .collect()
}
