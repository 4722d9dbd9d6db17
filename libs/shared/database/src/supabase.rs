use async_trait::async_trait;
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::query::Query;
use crate::store::{Database, DatabaseError};

/// PostgREST client authenticated with the service key.
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            service_key: config.supabase_service_key.clone(),
        }
    }

    fn get_headers(&self) -> Result<HeaderMap, DatabaseError> {
        let mut headers = HeaderMap::new();

        let apikey = if self.anon_key.is_empty() { &self.service_key } else { &self.anon_key };
        headers.insert(
            "apikey",
            HeaderValue::from_str(apikey).map_err(|_| DatabaseError::Auth("API key contains invalid characters".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.service_key))
                .map_err(|_| DatabaseError::Auth("Service key contains invalid characters".to_string()))?,
        );

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, DatabaseError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, DatabaseError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers()?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => DatabaseError::Auth(error_text),
                404 => DatabaseError::NotFound(error_text),
                409 => DatabaseError::Conflict(error_text),
                code => DatabaseError::Api { status: code, message: error_text },
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    fn table_path(table: &str, query: &str) -> String {
        if query.is_empty() {
            format!("/rest/v1/{}", table)
        } else {
            format!("/rest/v1/{}?{}", table, query)
        }
    }

    fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Database for SupabaseClient {
    async fn insert(&self, table: &str, row: Value) -> Result<Value, DatabaseError> {
        let mut result: Vec<Value> = self
            .request_with_headers(
                Method::POST,
                &Self::table_path(table, ""),
                Some(row),
                Some(Self::representation_headers()),
            )
            .await?;

        if result.is_empty() {
            return Err(DatabaseError::InvalidRow(format!("Insert into {} returned no rows", table)));
        }

        Ok(result.remove(0))
    }

    async fn insert_many(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, DatabaseError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        // A single POST with an array body is one statement, so PostgREST stores all rows or none.
        self.request_with_headers(
            Method::POST,
            &Self::table_path(table, ""),
            Some(Value::Array(rows)),
            Some(Self::representation_headers()),
        )
        .await
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, DatabaseError> {
        self.request(Method::GET, &Self::table_path(table, &query.to_postgrest()), None)
            .await
    }

    async fn update(&self, table: &str, id: Uuid, changes: Value) -> Result<Option<Value>, DatabaseError> {
        let path = Self::table_path(table, &format!("id=eq.{}", id));
        let mut result: Vec<Value> = self
            .request_with_headers(Method::PATCH, &path, Some(changes), Some(Self::representation_headers()))
            .await?;

        Ok(if result.is_empty() { None } else { Some(result.remove(0)) })
    }

    async fn delete(&self, table: &str, id: Uuid) -> Result<bool, DatabaseError> {
        let path = Self::table_path(table, &format!("id=eq.{}", id));
        let result: Vec<Value> = self
            .request_with_headers(Method::DELETE, &path, None, Some(Self::representation_headers()))
            .await?;

        Ok(!result.is_empty())
    }
}
