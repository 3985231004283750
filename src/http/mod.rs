use std::sync::Arc;
use std::time::Duration;

use url::Url;

pub mod client;

pub use client::ReqwestTransport;

pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A request handed to the transport.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: HttpMethod::Get,
            url,
            headers: vec![("Accept".into(), CONTENT_TYPE_JSON.into())],
            body: None,
            timeout: None,
        }
    }

    pub fn post_form(url: Url, body: String) -> Self {
        Self {
            method: HttpMethod::Post,
            url,
            headers: vec![
                ("Accept".into(), CONTENT_TYPE_JSON.into()),
                ("Content-Type".into(), CONTENT_TYPE_FORM.into()),
            ],
            body: Some(body.into_bytes()),
            timeout: None,
        }
    }

    pub fn post_json(url: Url, body: &serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url,
            headers: vec![
                ("Accept".into(), CONTENT_TYPE_JSON.into()),
                ("Content-Type".into(), CONTENT_TYPE_JSON.into()),
            ],
            body: Some(body.to_string().into_bytes()),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport failure: {0}")]
    Other(String),
}

/// Executes HTTP exchanges on behalf of the authorization service.
///
/// Implementations must honour [`HttpRequest::timeout`] and must not retry.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[async_trait::async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request).await
    }
}
