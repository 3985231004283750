use std::fmt;

use crate::auth::error::AuthorizationException;
use crate::http::HttpResponse;

/// OAuth 2.0 error body (RFC 6749 §5.2).
#[derive(Debug, Clone)]
#[derive(serde::Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(rename = "error_description")]
    pub description: Option<String>,
    #[serde(rename = "error_uri")]
    pub uri: Option<String>,
}

pub trait ResultExt<T> {
    /// Replaces any error with a copy of `template` carrying the error as its cause.
    fn or_exception(self, template: &AuthorizationException) -> Result<T, AuthorizationException>;
}

impl<T, E: fmt::Display> ResultExt<T> for Result<T, E> {
    fn or_exception(self, template: &AuthorizationException) -> Result<T, AuthorizationException> {
        self.map_err(|e| AuthorizationException::from_template(template, e))
    }
}

/// Maps a failed endpoint response to the catalogue.
///
/// Bodies carrying an OAuth `error` go through `lookup`; anything else becomes `fallback`.
pub fn exception_for_response(
    response: &HttpResponse,
    lookup: fn(Option<&str>) -> AuthorizationException,
    fallback: &AuthorizationException,
) -> AuthorizationException {
    match serde_json::from_slice::<ErrorResponse>(&response.body) {
        Ok(body) => AuthorizationException::from_oauth_template(
            &lookup(Some(&body.error)),
            Some(&body.error),
            body.description.as_deref(),
            body.uri.as_deref(),
        ),
        Err(_) => AuthorizationException::from_template(
            fallback,
            format!("HTTP {}: {}", response.status, response.text()),
        ),
    }
}
