use std::collections::BTreeMap;

use chrono::Utc;
use prism_core::models::{patch_object, ContactPatch, NewContact};
use prism_core::{Contact, Query, RecordId};
use serde_json::Value;

use crate::cli::ContactFields;
use crate::commands::common::{
    format_relative_time, parse_field_assignment, print_json, resolve_record, truncate, Session,
};
use crate::error::CliError;

fn parse_custom_fields(raw: &[String]) -> Result<BTreeMap<String, Value>, CliError> {
    raw.iter().map(|field| parse_field_assignment(field)).collect()
}

fn resolve_groups(raw: &[String], session: &Session) -> Result<Vec<RecordId>, CliError> {
    raw.iter()
        .map(|group| Ok(resolve_record(&session.ctx.groups, group)?.meta.id))
        .collect()
}

pub async fn run_contact_add(
    first_name: &str,
    fields: &ContactFields,
    session: &Session,
) -> Result<(), CliError> {
    let draft = NewContact {
        first_name: first_name.trim().to_string(),
        last_name: fields.last_name.clone().unwrap_or_default(),
        phone_numbers: fields.phones.clone(),
        email: fields.email.as_deref().and_then(cleared_if_blank),
        gender: None,
        notes: fields.notes.as_deref().and_then(cleared_if_blank),
        group_ids: resolve_groups(&fields.groups, session)?,
        custom_fields: parse_custom_fields(&fields.fields)?,
    };

    let id = session.ctx.contacts.create(draft)?;
    println!("{id}");
    session.push_pending().await
}

pub fn list_contacts(
    prefix: Option<&str>,
    limit: Option<usize>,
    session: &Session,
) -> Result<Vec<Contact>, CliError> {
    let mut query = Query::all();
    if let Some(prefix) = prefix {
        query = query.name_starts_with(prefix);
    }
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    Ok(session.ctx.contacts.list(&query)?)
}

pub fn run_contact_list(
    prefix: Option<&str>,
    limit: Option<usize>,
    as_json: bool,
    session: &Session,
) -> Result<(), CliError> {
    let contacts = list_contacts(prefix, limit, session)?;

    if as_json {
        return print_json(&contacts);
    }
    if contacts.is_empty() {
        println!("No contacts.");
        return Ok(());
    }
    for line in format_contact_lines(&contacts) {
        println!("{line}");
    }
    Ok(())
}

pub fn build_contact_patch(
    current: &Contact,
    first_name: Option<&str>,
    fields: &ContactFields,
    session: &Session,
) -> Result<ContactPatch, CliError> {
    let custom_fields = if fields.fields.is_empty() {
        None
    } else {
        let mut merged = current.custom_fields.clone();
        merged.extend(parse_custom_fields(&fields.fields)?);
        Some(merged)
    };

    Ok(ContactPatch {
        first_name: first_name.map(|name| name.trim().to_string()),
        last_name: fields.last_name.clone(),
        phone_numbers: (!fields.phones.is_empty()).then(|| fields.phones.clone()),
        email: fields.email.as_deref().map(cleared_if_blank),
        gender: None,
        notes: fields.notes.as_deref().map(cleared_if_blank),
        group_ids: if fields.groups.is_empty() {
            None
        } else {
            Some(resolve_groups(&fields.groups, session)?)
        },
        custom_fields,
    })
}

/// An empty value given on the command line clears the field
fn cleared_if_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

pub async fn run_contact_edit(
    id: &str,
    first_name: Option<&str>,
    fields: &ContactFields,
    session: &Session,
) -> Result<(), CliError> {
    let current = resolve_record(&session.ctx.contacts, id)?;
    let patch = build_contact_patch(&current, first_name, fields, session)?;
    if patch_object(&patch)?.is_empty() {
        return Err(CliError::EmptyPatch);
    }

    let updated = session.ctx.contacts.update(&current.meta.id, &patch)?;
    println!("{}", updated.meta.id);
    session.push_pending().await
}

pub async fn run_contact_delete(id: &str, session: &Session) -> Result<(), CliError> {
    let contact = resolve_record(&session.ctx.contacts, id)?;
    session.ctx.contacts.delete(&contact.meta.id)?;
    println!("{}", contact.meta.id);
    session.push_pending().await
}

pub fn format_contact_lines(contacts: &[Contact]) -> Vec<String> {
    let now = Utc::now();
    contacts
        .iter()
        .map(|contact| {
            let name = truncate(&contact.display_name(), 30);
            let phones = contact.phone_numbers.join(", ");
            let updated = format_relative_time(contact.meta.updated_at, now);
            let id = contact.meta.id.to_string();
            format!("{id:<20}  {name:<30}  {phones:<16}  {updated}")
        })
        .collect()
}
