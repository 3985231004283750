use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How ID token signatures are trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignaturePolicy {
    /// ID tokens are accepted on the strength of the TLS connection to the token endpoint;
    /// their JWS signature is not verified against the provider's JWKS.
    #[default]
    TransportTrust,
}

/// Settings for [`AuthorizationService`](super::AuthorizationService).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Accept non-https issuers during ID token validation. For local test providers only.
    pub skip_issuer_https_check: bool,
    /// Applied to every request handed to the transport.
    pub request_timeout: Duration,
    pub signature_policy: SignaturePolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            skip_issuer_https_check: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            signature_policy: SignaturePolicy::TransportTrust,
        }
    }
}

impl ServiceConfig {
    pub fn with_skip_issuer_https_check(mut self, skip: bool) -> Self {
        self.skip_issuer_https_check = skip;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
