//! Definition web service client
//!
//! Bearer-token REST client for storing and sharing application
//! definitions. Tokens are obtained with an OAuth2 client-credentials
//! grant and cached in memory (and, in CLI mode, on disk) until expiry;
//! a 401 response triggers exactly one silent re-authentication per call.

pub mod cache;
pub mod error;

pub use cache::DiskCache;
pub use error::{ClientError, Result};

use chrono::Utc;
use forgeflow_config::{Context, Credentials};
use forgeflow_core::Definition;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;

const DEFAULT_ENDPOINT: &str = "https://master.metering.accelize.com";
const ACCEPT_HEADER: &str = "application/vnd.accelize.v1+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded transport-level retry on 5xx/connect errors, separate from any
/// higher-level retry policy
const TRANSPORT_RETRIES: u32 = 3;
const TRANSPORT_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
struct Token {
    value: String,
    expires_at: i64,
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    expires_in: i64,
}

/// Split an application id formatted as `product_id[:version]`
pub fn parse_id(id: &str) -> (&str, Option<&str>) {
    match id.split_once(':') {
        Some((product_id, version)) => (product_id, Some(version)),
        None => (id, None),
    }
}

/// Authenticated client for the definition web service
pub struct WsClient {
    ctx: Context,
    credentials: Credentials,
    endpoint: String,
    http: reqwest::Client,
    cache: DiskCache,
    token: Mutex<Option<Token>>,
}

impl WsClient {
    pub fn new(ctx: Context, credentials: Credentials) -> Result<Self> {
        let endpoint = credentials
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let cache = DiskCache::new(ctx.cache_dir());
        Ok(Self {
            ctx,
            credentials,
            endpoint,
            http,
            cache,
            token: Mutex::new(None),
        })
    }

    /// Fetch a definition by `product_id[:version]` id string
    pub async fn fetch_by_id(&self, id: &str) -> Result<Definition> {
        let (product_id, version) = parse_id(id);
        self.fetch(product_id, version).await
    }

    /// Fetch a definition from the web service
    pub async fn fetch(&self, product_id: &str, version: Option<&str>) -> Result<Definition> {
        let mut query = vec![("product_id", product_id)];
        if let Some(version) = version {
            query.push(("version", version));
        }
        let body = self
            .request(
                reqwest::Method::GET,
                "/auth/getapplicationdefinition/",
                Some(&query),
                None,
            )
            .await?;
        let value = serde_yaml::to_value(&body)
            .map_err(|error| ClientError::InvalidResponse(error.to_string()))?;
        Ok(Definition::from_value(value)?)
    }

    /// List available applications, optionally filtered by id prefix
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let body = self
            .request(
                reqwest::Method::GET,
                "/auth/listapplicationdefinitions/",
                Some(&[("prefix", prefix)]),
                None,
            )
            .await?;
        as_string_list(&body)
    }

    /// List available versions of an application
    pub async fn list_versions(&self, product_id: &str, prefix: &str) -> Result<Vec<String>> {
        let body = self
            .request(
                reqwest::Method::GET,
                "/auth/listapplicationdefinitionversions/",
                Some(&[("product_id", product_id), ("prefix", prefix)]),
                None,
            )
            .await?;
        as_string_list(&body)
    }

    /// Push a definition to the web service
    pub async fn push(&self, definition: &Definition) -> Result<()> {
        let body = serde_json::to_value(definition.to_value())
            .map_err(|error| ClientError::InvalidResponse(error.to_string()))?;
        self.request(
            reqwest::Method::POST,
            "/auth/pushapplicationdefinition/",
            None,
            Some(&body),
        )
        .await?;
        Ok(())
    }

    /// Delete a definition from the web service
    pub async fn delete(&self, product_id: &str, version: Option<&str>) -> Result<()> {
        let mut query = vec![("product_id", product_id)];
        if let Some(version) = version {
            query.push(("version", version));
        }
        self.request(
            reqwest::Method::DELETE,
            "/auth/deleteapplicationdefinition/",
            Some(&query),
            None,
        )
        .await?;
        Ok(())
    }

    /// Perform an authenticated request
    ///
    /// A 401 drops the cached token and retries exactly once.
    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        query: Option<&[(&str, &str)]>,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let mut reauthenticated = false;
        loop {
            let token = self.token().await?;
            let mut builder = self
                .http
                .request(method.clone(), format!("{}{}", self.endpoint, path))
                .bearer_auth(&token)
                .header(reqwest::header::ACCEPT, ACCEPT_HEADER);
            if let Some(query) = query {
                builder = builder.query(query);
            }
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let response = self.send_with_transport_retry(builder).await?;
            let status = response.status();

            if status == reqwest::StatusCode::UNAUTHORIZED && !reauthenticated {
                tracing::debug!("Token rejected, re-authenticating once");
                self.invalidate_token().await;
                reauthenticated = true;
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(ClientError::WebServer {
                    status: status.as_u16(),
                    message: extract_message(&text),
                });
            }
            if text.trim().is_empty() {
                return Ok(serde_json::Value::Null);
            }
            return serde_json::from_str(&text)
                .map_err(|error| ClientError::InvalidResponse(error.to_string()));
        }
    }

    /// Send with bounded retry on 5xx and transport errors
    async fn send_with_transport_retry(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let mut delay = TRANSPORT_RETRY_DELAY;
        let mut attempt = 0;
        loop {
            let Some(request) = builder.try_clone() else {
                return Ok(builder.send().await?);
            };
            match request.send().await {
                Ok(response)
                    if response.status().is_server_error() && attempt < TRANSPORT_RETRIES =>
                {
                    tracing::debug!("Server error {}, retrying", response.status());
                }
                Ok(response) => return Ok(response),
                Err(_) if attempt < TRANSPORT_RETRIES => {
                    tracing::debug!("Transport error, retrying");
                }
                Err(error) => return Err(error.into()),
            }
            attempt += 1;
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }

    /// Get a bearer token, from memory, disk cache (CLI mode) or a fresh
    /// client-credentials exchange
    async fn token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        let now = Utc::now().timestamp();

        if let Some(token) = guard.as_ref()
            && token.expires_at > now
        {
            return Ok(token.value.clone());
        }

        let cache_key = self.token_cache_key();
        if self.ctx.is_cli_mode()
            && let Some(cached) = self.cache.get(&cache_key)
            && let (Some(value), Some(expires_at)) = (
                cached["access_token"].as_str(),
                cached["expires_at"].as_i64(),
            )
            && expires_at > now
        {
            *guard = Some(Token {
                value: value.to_string(),
                expires_at,
            });
            return Ok(value.to_string());
        }

        let response = self
            .http
            .post(format!("{}/o/token/", self.endpoint))
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            let client_id = &self.credentials.client_id;
            let shown = &client_id[..client_id.len().min(10)];
            return Err(ClientError::Authentication(format!(
                "Unable to authenticate client ID starting by \"{shown}\":\n{}",
                response.text().await.unwrap_or_default()
            )));
        }

        let grant: TokenGrant = response.json().await?;
        let expires_at = now + grant.expires_in - 1;

        if self.ctx.is_cli_mode() {
            let entry = serde_json::json!({
                "access_token": grant.access_token,
                "expires_at": expires_at,
            });
            if let Err(error) = self.cache.set(&cache_key, &entry, expires_at) {
                tracing::debug!("Unable to persist token cache: {error}");
            }
        }

        *guard = Some(Token {
            value: grant.access_token.clone(),
            expires_at,
        });
        Ok(grant.access_token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
        if self.ctx.is_cli_mode() {
            self.cache.remove(&self.token_cache_key());
        }
    }

    fn token_cache_key(&self) -> String {
        format!("token|{}", self.credentials.client_id)
    }
}

/// Extract a human-readable message from an error response body
///
/// JSON bodies with a `detail` or `error` field use that field, anything
/// else is returned verbatim.
fn extract_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["detail", "error"] {
            if let Some(message) = value[field].as_str() {
                return message.to_string();
            }
        }
    }
    body.to_string()
}

/// Accept either a bare JSON array of strings or `{"results": [...]}`
fn as_string_list(body: &serde_json::Value) -> Result<Vec<String>> {
    let entries = body
        .as_array()
        .or_else(|| body["results"].as_array())
        .ok_or_else(|| ClientError::InvalidResponse("Expected a list of strings".to_string()))?;
    Ok(entries
        .iter()
        .filter_map(|entry| entry.as_str())
        .map(str::to_string)
        .collect())
}
