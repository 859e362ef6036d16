//! HTTP client for the management API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::record::{Payload, Record};

/// Responses are logged up to this many characters.
const LOG_BODY_LIMIT: usize = 2048;

/// HTTP verb for a mutating call. Reads go through [`Backend::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Post,
    Patch,
    Delete,
}

impl Verb {
    fn method(self) -> Method {
        match self {
            Verb::Post => Method::POST,
            Verb::Patch => Method::PATCH,
            Verb::Delete => Method::DELETE,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method().as_str())
    }
}

/// Access to resource collections by name.
///
/// The reconciler only talks to the array through this trait.
#[async_trait]
pub trait Backend: Send + Sync {
    /// List records of `collection` matching `filters`.
    async fn query(&self, collection: &str, filters: &[(&str, Value)]) -> Result<Vec<Record>>;

    /// Create, update or delete. `collection` may carry an id suffix
    /// (`views/17`).
    async fn mutate(&self, verb: Verb, collection: &str, body: Option<Value>)
    -> Result<Option<Record>>;
}

/// Connection settings for [`RestClient`].
#[derive(Clone)]
pub struct RestConfig {
    /// API root, e.g. `https://vms.example.com/api`.
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Verify the server certificate.
    pub ssl_verify: bool,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

impl fmt::Debug for RestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("ssl_verify", &self.ssl_verify)
            .field("connect_timeout", &self.connect_timeout)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// REST session against one management endpoint.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl RestClient {
    pub fn new(config: &RestConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.ssl_verify)
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Full URL of a collection, always with a trailing slash.
    pub fn url(&self, collection: &str) -> String {
        format!(
            "{base}/{collection}/",
            base = self.base_url,
            collection = collection.trim_matches('/')
        )
    }

    /// Issue one request and decode the response.
    pub async fn request(
        &self,
        method: Method,
        collection: &str,
        params: &[(&str, Value)],
        body: Option<&Value>,
    ) -> Result<Option<Payload>> {
        let url = self.url(collection);
        let query = encode_params(params);

        info!(method = %method, url = %url, ">>> request");
        if !query.is_empty() {
            info!(params = ?query, "request params");
        }

        let mut builder = self
            .http
            .request(method.clone(), &url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&query);

        if let Some(body) = body {
            let data = serde_json::to_string(body)?;
            info!(data = %data, "request body");
            builder = builder.body(data);
        }

        let response = builder.send().await.map_err(|e| {
            error!(url = %url, error = %e, "Error requesting from {}", collection);
            Error::from(e)
        })?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            let text = response.text().await?;
            if !text.is_empty() {
                error!(url = %url, "{}", text);
                return Err(Error::Api(text));
            }
            error!(url = %url, status = %status, "Error requesting from {}", collection);
            return Err(Error::Api(format!(
                "HTTP status server error ({status}) for url ({url})"
            )));
        }
        if let Err(e) = response.error_for_status_ref() {
            error!(url = %url, error = %e, "Error requesting from {}", collection);
            return Err(Error::from(e));
        }

        info!(method = %method, url = %url, status = %status, "<<< response");
        let bytes = response.bytes().await?;
        let payload = if bytes.is_empty() {
            None
        } else {
            let value: Value = serde_json::from_slice(&bytes)?;
            info!(body = %truncate(&pretty(&value), LOG_BODY_LIMIT), "response body");
            Some(Payload::from_value(value)?)
        };
        info!(method = %method, url = %url, "--- done");

        Ok(payload)
    }

    pub async fn get(&self, collection: &str, params: &[(&str, Value)]) -> Result<Vec<Record>> {
        Ok(self
            .request(Method::GET, collection, params, None)
            .await?
            .map(Payload::into_records)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Backend for RestClient {
    async fn query(&self, collection: &str, filters: &[(&str, Value)]) -> Result<Vec<Record>> {
        self.get(collection, filters).await
    }

    async fn mutate(
        &self,
        verb: Verb,
        collection: &str,
        body: Option<Value>,
    ) -> Result<Option<Record>> {
        Ok(self
            .request(verb.method(), collection, &[], body.as_ref())
            .await?
            .and_then(Payload::into_record))
    }
}

/// Flatten filter values into query pairs. Arrays repeat the key once per
/// element, nulls are dropped.
pub fn encode_params(params: &[(&str, Value)]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in params {
        match value {
            Value::Array(items) => {
                for item in items {
                    if let Some(v) = scalar(item) {
                        pairs.push((key.to_string(), v));
                    }
                }
            }
            other => {
                if let Some(v) = scalar(other) {
                    pairs.push((key.to_string(), v));
                }
            }
        }
    }
    pairs
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}... ({} bytes total)", &text[..idx], text.len()),
        None => text.to_string(),
    }
}
