#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use url::Url;

use tomiko_client::http::{HttpRequest, HttpResponse, HttpTransport, TransportError};

pub const ISSUER: &str = "https://idp.example.com";
pub const CLIENT_ID: &str = "c1";
pub const REDIRECT_URI: &str = "https://app/cb";
pub const NOW_SECS: i64 = 1_700_000_000;

pub fn discovery_document() -> Value {
    json!({
        "issuer": ISSUER,
        "authorization_endpoint": format!("{}/authorize", ISSUER),
        "token_endpoint": format!("{}/token", ISSUER),
        "registration_endpoint": format!("{}/register", ISSUER),
        "end_session_endpoint": format!("{}/logout", ISSUER),
        "jwks_uri": format!("{}/jwks", ISSUER),
        "response_types_supported": ["code"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["HS256"],
        "code_challenge_methods_supported": ["S256"]
    })
}

pub fn redirect_uri() -> Url {
    Url::parse(REDIRECT_URI).unwrap()
}

/// An HS256 ID token issued at `NOW_SECS` and valid for an hour.
pub fn mint_id_token(overrides: Value) -> String {
    let mut claims = json!({
        "iss": ISSUER,
        "sub": "user-1",
        "aud": CLIENT_ID,
        "exp": NOW_SECS + 3600,
        "iat": NOW_SECS,
    });
    if let (Some(claims), Some(overrides)) = (claims.as_object_mut(), overrides.as_object()) {
        for (k, v) in overrides {
            if v.is_null() {
                claims.remove(k);
            } else {
                claims.insert(k.clone(), v.clone());
            }
        }
    }
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test-secret")).unwrap()
}

/// Replays canned responses in order and records every request it was handed.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, status: u16, body: impl Into<Vec<u8>>) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse::new(status, body)));
        self
    }

    pub fn respond_json(&self, status: u16, body: &Value) -> &Self {
        self.respond(status, body.to_string())
    }

    pub fn fail(&self, error: TransportError) -> &Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("no canned response".into())))
    }
}
