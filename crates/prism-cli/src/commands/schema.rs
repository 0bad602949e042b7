use prism_core::models::{FieldType, NewCustomFieldSchema};
use prism_core::{CustomFieldSchema, Query};

use crate::commands::common::{print_json, resolve_record, Session};
use crate::error::CliError;

pub async fn run_schema_add(
    key: &str,
    label: &str,
    field_type: FieldType,
    options: Vec<String>,
    session: &Session,
) -> Result<(), CliError> {
    let id = session.ctx.schemas.create(NewCustomFieldSchema {
        key: key.trim().to_string(),
        label: label.trim().to_string(),
        field_type,
        options,
    })?;
    println!("{id}");
    session.push_pending().await
}

pub fn run_schema_list(as_json: bool, session: &Session) -> Result<(), CliError> {
    let schemas = session.ctx.schemas.list(&Query::all())?;

    if as_json {
        return print_json(&schemas);
    }
    if schemas.is_empty() {
        println!("No custom fields declared.");
        return Ok(());
    }
    for line in format_schema_lines(&schemas) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_schema_delete(id: &str, session: &Session) -> Result<(), CliError> {
    let schema = resolve_record(&session.ctx.schemas, id)?;
    session.ctx.schemas.delete(&schema.meta.id)?;
    println!("{}", schema.meta.id);
    session.push_pending().await
}

const fn field_type_name(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Text => "text",
        FieldType::Number => "number",
        FieldType::Date => "date",
        FieldType::List => "list",
    }
}

pub fn format_schema_lines(schemas: &[CustomFieldSchema]) -> Vec<String> {
    schemas
        .iter()
        .map(|schema| {
            let mut line = format!(
                "{:<20}  {:<16}  {:<24}  {}",
                schema.meta.id.to_string(),
                schema.key,
                schema.label,
                field_type_name(schema.field_type)
            );
            if !schema.options.is_empty() {
                line.push_str(&format!(" [{}]", schema.options.join(", ")));
            }
            line
        })
        .collect()
}
