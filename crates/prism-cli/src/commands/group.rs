use prism_core::models::NewGroup;
use prism_core::util::normalize_text_option;
use prism_core::{Group, Query};

use crate::commands::common::{print_json, resolve_record, Session};
use crate::error::CliError;

pub async fn run_group_add(
    name: &str,
    color: Option<String>,
    session: &Session,
) -> Result<(), CliError> {
    let id = session.ctx.groups.create(NewGroup {
        name: name.trim().to_string(),
        color: normalize_text_option(color),
    })?;
    println!("{id}");
    session.push_pending().await
}

pub fn run_group_list(as_json: bool, session: &Session) -> Result<(), CliError> {
    let groups = session.ctx.groups.list(&Query::all())?;

    if as_json {
        return print_json(&groups);
    }
    if groups.is_empty() {
        println!("No groups.");
        return Ok(());
    }
    for line in format_group_lines(&groups) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_group_delete(id: &str, session: &Session) -> Result<(), CliError> {
    let group = resolve_record(&session.ctx.groups, id)?;
    session.ctx.groups.delete(&group.meta.id)?;
    println!("{}", group.meta.id);
    session.push_pending().await
}

pub fn format_group_lines(groups: &[Group]) -> Vec<String> {
    groups
        .iter()
        .map(|group| {
            let id = group.meta.id.to_string();
            match &group.color {
                Some(color) => format!("{id:<20}  {:<30}  {color}", group.name),
                None => format!("{id:<20}  {}", group.name),
            }
        })
        .collect()
}
