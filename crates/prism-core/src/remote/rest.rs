//! Supabase / PostgREST table client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{RemoteClient, RemoteError, RemoteResult};
use crate::config::RemoteConfig;
use crate::models::{Collection, RecordId, TEMP_ID_PREFIX};
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Local owner field and the remote column it maps to
const LOCAL_OWNER_FIELD: &str = "owner_id";
const REMOTE_OWNER_FIELD: &str = "user_id";

#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
    user_id: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    pub fn new(config: &RemoteConfig) -> RemoteResult<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        let anon_key = normalize_text_option(Some(config.anon_key.clone())).ok_or_else(|| {
            RemoteError::NotConfigured("anon key must not be empty".to_string())
        })?;

        Ok(Self {
            base_url,
            anon_key,
            access_token: normalize_text_option(config.access_token.clone()),
            user_id: normalize_text_option(config.user_id.clone()),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()?,
        })
    }

    fn table_url(&self, collection: Collection) -> String {
        format!("{}/rest/v1/{}", self.base_url, collection.table_name())
    }

    fn row_url(&self, collection: Collection, id: &RecordId) -> String {
        let encoded_id = urlencoding::encode(&id.to_string()).into_owned();
        format!("{}?id=eq.{encoded_id}", self.table_url(collection))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let token = self.access_token.as_deref().unwrap_or(&self.anon_key);
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
    }
}

#[async_trait]
impl RemoteClient for RestClient {
    async fn insert(&self, collection: Collection, row: &Value) -> RemoteResult<Value> {
        let response = self
            .request(Method::POST, &self.table_url(collection))
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return=representation")
            .json(&to_remote_row(row))
            .send()
            .await?;

        let rows: Vec<Value> = check(response).await?.json().await?;
        rows.into_iter().next().ok_or_else(|| {
            RemoteError::InvalidResponse("insert returned no representation".to_string())
        })
    }

    async fn update(
        &self,
        collection: Collection,
        id: &RecordId,
        patch: &Value,
    ) -> RemoteResult<()> {
        let mut body = to_remote_row(patch);
        if let Value::Object(map) = &mut body {
            map.remove("id");
        }

        let response = self
            .request(Method::PATCH, &self.row_url(collection, id))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> RemoteResult<()> {
        let response = self
            .request(Method::DELETE, &self.row_url(collection, id))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn select_all(&self, collection: Collection) -> RemoteResult<Vec<Value>> {
        let url = format!("{}?select=*", self.table_url(collection));
        let response = self.request(Method::GET, &url).send().await?;
        Ok(check(response).await?.json().await?)
    }

    fn current_principal(&self) -> Option<String> {
        self.user_id.clone()
    }
}

/// Shape a local record or diff for the remote table.
///
/// Temporary ids are dropped so the server assigns the permanent one.
fn to_remote_row(row: &Value) -> Value {
    let mut row = row.clone();
    if let Value::Object(map) = &mut row {
        let temporary = map
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| id.starts_with(TEMP_ID_PREFIX));
        if temporary {
            map.remove("id");
        }
        if let Some(owner) = map.remove(LOCAL_OWNER_FIELD) {
            map.insert(REMOTE_OWNER_FIELD.to_string(), owner);
        }
    }
    row
}

async fn check(response: Response) -> RemoteResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Api {
        status: status.as_u16(),
        message: parse_api_error(status, &body),
    })
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    hint: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload
            .message
            .or(payload.error_description)
            .or(payload.error)
        {
            return match normalize_text_option(payload.hint) {
                Some(hint) => format!("{} (hint: {hint})", message.trim()),
                None => message.trim().to_string(),
            };
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}

fn normalize_base_url(raw: &str) -> RemoteResult<String> {
    let url = normalize_text_option(Some(raw.to_string())).ok_or_else(|| {
        RemoteError::NotConfigured("base URL must not be empty".to_string())
    })?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::NotConfigured(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config() -> RemoteConfig {
        RemoteConfig {
            base_url: "https://project.supabase.co/".to_string(),
            anon_key: "anon-key".to_string(),
            access_token: Some("secret-token".to_string()),
            user_id: Some("user-1".to_string()),
            request_timeout_secs: 5,
        }
    }

    #[test]
    fn new_rejects_invalid_configuration() {
        let mut bad_url = config();
        bad_url.base_url = "project.supabase.co".to_string();
        assert!(matches!(
            RestClient::new(&bad_url),
            Err(RemoteError::NotConfigured(_))
        ));

        let mut no_key = config();
        no_key.anon_key = "  ".to_string();
        assert!(RestClient::new(&no_key).is_err());
    }

    #[test]
    fn urls_target_rest_tables() {
        let client = RestClient::new(&config()).unwrap();
        assert_eq!(
            client.table_url(Collection::CustomFieldSchemas),
            "https://project.supabase.co/rest/v1/custom_field_schemas"
        );
        assert_eq!(
            client.row_url(Collection::Contacts, &RecordId::permanent("42")),
            "https://project.supabase.co/rest/v1/contacts?id=eq.42"
        );
        assert_eq!(
            client.row_url(Collection::Groups, &RecordId::permanent("a&b")),
            "https://project.supabase.co/rest/v1/groups?id=eq.a%26b"
        );
        assert_eq!(client.current_principal().as_deref(), Some("user-1"));
    }

    #[test]
    fn debug_redacts_credentials() {
        let client = RestClient::new(&config()).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-token"));
        assert!(!debug.contains("anon-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn remote_rows_drop_temporary_ids_and_rename_owner() {
        let row = json!({
            "id": "temp_0190b2a4-7a3c-7cc1-8e1f-6f3b2d9d8a10",
            "owner_id": "user-1",
            "name": "Friends"
        });
        assert_eq!(
            to_remote_row(&row),
            json!({ "user_id": "user-1", "name": "Friends" })
        );

        let permanent = json!({ "id": "42", "name": "Friends" });
        assert_eq!(to_remote_row(&permanent), permanent);
    }

    #[test]
    fn parse_api_error_prefers_message() {
        let body = r#"{"code":"23505","message":"duplicate key","hint":"use upsert"}"#;
        assert_eq!(
            parse_api_error(StatusCode::CONFLICT, body),
            "duplicate key (hint: use upsert)"
        );
        assert_eq!(
            parse_api_error(StatusCode::UNAUTHORIZED, r#"{"error":"invalid_grant"}"#),
            "invalid_grant"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }
}
