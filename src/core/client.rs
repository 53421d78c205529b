//! HTTP client for the ERP REST API
//!
//! Every request goes through [`ApiClient::request`], which is the only place
//! session expiry is checked and the bearer token is attached. Requests are
//! sent once; nothing is retried.

use chrono::Utc;
use miette::Diagnostic;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::core::config::{Config, ConfigError};
use crate::core::session::{Session, SessionError};
use crate::core::stage::Stage;

/// Classified API failure
#[derive(Debug, Error, Diagnostic)]
pub enum ApiError {
    #[error("could not reach {url}: {message}")]
    #[diagnostic(
        code(mft::api::network),
        help("Check the network connection and api_url, then try again")
    )]
    Network { url: String, message: String },

    #[error("request to {url} timed out")]
    #[diagnostic(
        code(mft::api::timeout),
        help("Try again, or raise timeout_secs in the config")
    )]
    Timeout { url: String },

    #[error("not authorized for {url} (HTTP {status})")]
    #[diagnostic(
        code(mft::api::unauthorized),
        help("The token was refused; run `mft session set <TOKEN>` with a fresh one")
    )]
    Unauthorized { url: String, status: u16 },

    #[error("request rejected (HTTP {status}): {message}")]
    #[diagnostic(code(mft::api::rejected))]
    Rejected { status: u16, message: String },

    #[error("server error (HTTP {status}): {message}")]
    #[diagnostic(code(mft::api::server), help("The ERP server failed; try again later"))]
    Server { status: u16, message: String },

    #[error("unexpected response from {url}: {message}")]
    #[diagnostic(code(mft::api::decode))]
    Decode { url: String, message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

impl ApiError {
    /// Whether the same request could succeed if sent again unchanged
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network { .. } | ApiError::Timeout { .. } | ApiError::Server { .. } => true,
            ApiError::Rejected { status, .. } => *status == 429,
            _ => false,
        }
    }

    fn from_transport(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout {
                url: url.to_string(),
            }
        } else {
            ApiError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Map a non-success HTTP status and body to an error
pub fn classify_status(url: &str, status: u16, body: &str) -> ApiError {
    match status {
        401 | 403 => ApiError::Unauthorized {
            url: url.to_string(),
            status,
        },
        400..=499 => ApiError::Rejected {
            status,
            message: server_message(body),
        },
        _ => ApiError::Server {
            status,
            message: server_message(body),
        },
    }
}

/// Best-effort human message from an error body
///
/// Understands `{"detail": ..}`, `{"message": ..}`, `{"error": ..}` and
/// field-error maps like `{"pieces": ["must be positive"]}`.
fn server_message(body: &str) -> String {
    let body = body.trim();
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return if body.is_empty() {
            "no details".to_string()
        } else {
            body.chars().take(200).collect()
        };
    };

    if let Some(obj) = value.as_object() {
        for key in ["detail", "message", "error"] {
            if let Some(s) = obj.get(key).and_then(Value::as_str) {
                return s.to_string();
            }
        }
        let fields: Vec<String> = obj
            .iter()
            .map(|(k, v)| match v {
                Value::Array(items) => format!(
                    "{}: {}",
                    k,
                    items
                        .iter()
                        .map(|i| i.as_str().map(String::from).unwrap_or_else(|| i.to_string()))
                        .collect::<Vec<_>>()
                        .join("; ")
                ),
                Value::String(s) => format!("{}: {}", k, s),
                other => format!("{}: {}", k, other),
            })
            .collect();
        if !fields.is_empty() {
            return fields.join(", ");
        }
    }
    value.to_string()
}

/// Pull the record list out of a response body
///
/// Endpoints answer with either a bare array or a paginated object holding
/// `results` (or `data`).
pub fn extract_list(value: Value) -> Result<Vec<Value>, String> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => {
            for key in ["results", "data"] {
                if let Some(Value::Array(items)) = obj.remove(key) {
                    return Ok(items);
                }
            }
            Err("expected a list or an object with 'results'".to_string())
        }
        _ => Err("expected a list of records".to_string()),
    }
}

/// Client bound to one API base URL and one session
pub struct ApiClient {
    base_url: String,
    session: Option<Session>,
    http: Client,
    config: Config,
}

impl ApiClient {
    /// Build a client from configuration and an optional session
    pub fn new(config: &Config, session: Option<Session>) -> Result<Self, ApiError> {
        let base_url = config.api_url()?;
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ApiError::Network {
                url: base_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            base_url,
            session,
            http,
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// Absolute URL for a path relative to the base URL
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request: the single point where the session is checked
    fn request(&self, method: Method, path: &str) -> Result<(String, RequestBuilder), ApiError> {
        let url = self.url(path);
        let mut builder = self
            .http
            .request(method.clone(), &url)
            .header("Accept", "application/json");
        if let Some(session) = &self.session {
            session.ensure_valid_at(Utc::now())?;
            builder = builder.bearer_auth(&session.access_token);
        }
        debug!(%method, %url, "api request");
        Ok((url, builder))
    }

    fn send<T: DeserializeOwned>(url: &str, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder
            .send()
            .map_err(|e| ApiError::from_transport(url, e))?;
        Self::read_response(url, response)
    }

    fn read_response<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, ApiError> {
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ApiError::from_transport(url, e))?;
        debug!(%url, status = status.as_u16(), bytes = body.len(), "api response");

        if !status.is_success() {
            return Err(classify_status(url, status.as_u16(), &body));
        }
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        serde_json::from_str(body).map_err(|e| ApiError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    pub fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let (url, builder) = self.request(Method::GET, path)?;
        Self::send(&url, builder.query(query))
    }

    pub fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let (url, builder) = self.request(Method::POST, path)?;
        Self::send(&url, builder.json(body))
    }

    pub fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let (url, builder) = self.request(Method::PUT, path)?;
        Self::send(&url, builder.json(body))
    }

    fn get_list(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<Value>, ApiError> {
        let value: Value = self.get_json(path, query)?;
        extract_list(value).map_err(|message| ApiError::Decode {
            url: self.url(path),
            message,
        })
    }

    /// Raw batch (Block MT) records
    pub fn fetch_batches(&self, query: &[(&str, &str)]) -> Result<Vec<Value>, ApiError> {
        let path = self.config.endpoint("batches")?;
        self.get_list(&path, query)
    }

    /// Raw records for one stage
    pub fn fetch_stage_records(
        &self,
        stage: Stage,
        query: &[(&str, &str)],
    ) -> Result<Vec<Value>, ApiError> {
        let path = self.config.stage_endpoint(stage)?;
        self.get_list(&path, query)
    }

    /// Raw schedule lines
    pub fn fetch_schedule(&self, query: &[(&str, &str)]) -> Result<Vec<Value>, ApiError> {
        let path = self.config.endpoint("schedule")?;
        self.get_list(&path, query)
    }

    /// POST a validated form payload to its endpoint
    pub fn submit_form(
        &self,
        endpoint: &str,
        payload: &serde_json::Map<String, Value>,
    ) -> Result<Value, ApiError> {
        self.post_json(endpoint, payload)
    }
}
