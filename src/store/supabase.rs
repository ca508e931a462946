//! Supabase REST client (PostgREST tables and Storage objects)

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::Config;

/// PostgreSQL: relation does not exist
pub const RELATION_UNDEFINED: &str = "42P01";
/// PostgREST: table not found in the schema cache
pub const SCHEMA_CACHE_MISS: &str = "PGRST205";

/// Supabase client for a single caller identity.
///
/// Requests always carry the project's anon key; when an access token is
/// attached the request runs as that user and row level security applies.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: &Config) -> Self {
        Self::from_parts(&config.supabase_url, &config.supabase_anon_key)
    }

    pub fn from_parts(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token: None,
        }
    }

    /// Same connection pool, acting as the given user
    pub fn with_access_token(&self, token: &str) -> Self {
        Self {
            access_token: Some(token.to_string()),
            ..self.clone()
        }
    }

    /// Get the REST API URL for a table
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn storage_url(&self, path: &str) -> String {
        format!("{}/storage/v1/{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    /// Make an authenticated GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<Vec<T>, SupabaseError> {
        let url = format!("{}?{}", self.rest_url(table), query);

        let response = self
            .authorize(self.client.get(&url))
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check(response).await?;
        response.json().await.map_err(SupabaseError::Parse)
    }

    /// Make an authenticated POST request (insert)
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        data: &T,
    ) -> Result<R, SupabaseError> {
        let url = self.rest_url(table);

        let response = self
            .authorize(self.client.post(&url))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check(response).await?;

        // PostgREST returns an array, get first element
        let results: Vec<R> = response.json().await.map_err(SupabaseError::Parse)?;
        results
            .into_iter()
            .next()
            .ok_or(SupabaseError::NoRowReturned)
    }

    /// PATCH matching rows and return them; an empty result means nothing matched
    pub async fn update<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
        data: &T,
    ) -> Result<Vec<R>, SupabaseError> {
        let url = format!("{}?{}", self.rest_url(table), query);

        let response = self
            .authorize(self.client.patch(&url))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check(response).await?;
        response.json().await.map_err(SupabaseError::Parse)
    }

    /// DELETE matching rows and return them
    pub async fn delete<R: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<Vec<R>, SupabaseError> {
        let url = format!("{}?{}", self.rest_url(table), query);

        let response = self
            .authorize(self.client.delete(&url))
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check(response).await?;
        response.json().await.map_err(SupabaseError::Parse)
    }

    /// Upload (or overwrite) a Storage object
    pub async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), SupabaseError> {
        let url = self.storage_url(&format!("object/{}/{}", bucket, path));

        let response = self
            .authorize(self.client.post(&url))
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(body)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        check(response).await?;
        Ok(())
    }

    /// List Storage objects under a folder prefix
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<StorageObject>, SupabaseError> {
        let url = self.storage_url(&format!("object/list/{}", bucket));
        let body = serde_json::json!({
            "prefix": prefix,
            "limit": 1000,
            "offset": 0,
            "sortBy": { "column": "name", "order": "asc" },
        });

        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check(response).await?;
        response.json().await.map_err(SupabaseError::Parse)
    }

    /// Remove Storage objects, returning the ones that existed
    pub async fn remove_objects(
        &self,
        bucket: &str,
        paths: &[String],
    ) -> Result<Vec<StorageObject>, SupabaseError> {
        let url = self.storage_url(&format!("object/{}", bucket));
        let body = serde_json::json!({ "prefixes": paths });

        let response = self
            .authorize(self.client.delete(&url))
            .json(&body)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check(response).await?;
        response.json().await.map_err(SupabaseError::Parse)
    }
}

/// Turn a non-success response into a typed error carrying the backend code
async fn check(response: Response) -> Result<Response, SupabaseError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();

    Err(SupabaseError::Api {
        status,
        code: parsed.code,
        message: parsed.message.unwrap_or(body),
    })
}

/// Error body shared by PostgREST (`code`) and Storage (`error`, `statusCode`)
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Object metadata as returned by the Storage list endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageObject {
    pub name: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<StorageObjectMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageObjectMetadata {
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub mimetype: Option<String>,
}

/// Supabase errors
#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}, code {code:?}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),

    #[error("No row returned from insert")]
    NoRowReturned,
}

impl SupabaseError {
    /// Backend error code (SQLSTATE or PGRST*), when the body carried one
    pub fn code(&self) -> Option<&str> {
        match self {
            SupabaseError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            SupabaseError::Api { status, .. } => Some(*status),
            SupabaseError::Request(err) | SupabaseError::Parse(err) => {
                err.status().map(|s| s.as_u16())
            }
            SupabaseError::NoRowReturned => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_extracts_postgrest_code() {
        let body = r#"{"code":"PGRST205","details":null,"hint":"Perhaps you meant the table 'public.roles'","message":"Could not find the table 'public.platform_roles' in the schema cache"}"#;
        let parsed: ErrorBody = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.code.as_deref(), Some(SCHEMA_CACHE_MISS));
        assert!(parsed.message.unwrap().contains("schema cache"));
    }

    #[test]
    fn storage_error_body_has_no_code() {
        let body = r#"{"statusCode":"404","error":"not_found","message":"Object not found"}"#;
        let parsed: ErrorBody = serde_json::from_str(body).unwrap();
        assert!(parsed.code.is_none());
        assert_eq!(parsed.message.as_deref(), Some("Object not found"));
    }

    #[test]
    fn api_error_exposes_code_and_status() {
        let err = SupabaseError::Api {
            status: 404,
            code: Some(RELATION_UNDEFINED.to_string()),
            message: "relation \"public.platform_roles\" does not exist".to_string(),
        };
        assert_eq!(err.code(), Some("42P01"));
        assert_eq!(err.status(), Some(404));
        assert_eq!(SupabaseError::NoRowReturned.code(), None);
    }

    #[test]
    fn access_token_replaces_api_key_as_bearer() {
        let anon = SupabaseClient::from_parts("http://localhost:54321/", "anon");
        assert_eq!(anon.base_url, "http://localhost:54321");
        assert!(anon.access_token.is_none());

        let user = anon.with_access_token("user-jwt");
        assert_eq!(user.access_token.as_deref(), Some("user-jwt"));
        assert_eq!(user.api_key, "anon");
        assert_eq!(user.rest_url("module_records"), "http://localhost:54321/rest/v1/module_records");
    }
}
