//! ID token claim decoding and validation (OpenID Connect Core 3.1.3.7).
//!
//! The signature is not checked. ID tokens only reach this client straight from the token
//! endpoint over a server-authenticated TLS connection, and that channel stands in for the
//! signature; see [`SignaturePolicy`](crate::provider::config::SignaturePolicy).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};
use url::Url;

use crate::auth::error::{general_errors, AuthorizationException};
use crate::auth::token::TokenRequest;
use crate::core::{clock::Clock, types::GrantType};

/// Allowed distance between `iat` and the local clock.
pub const MAX_ISSUED_AT_SKEW_SECS: i64 = 600;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdTokenError {
    #[error("ID token must have both header and claims section")]
    MissingClaimsSection,
    #[error("ID token claims section is not base64url")]
    ClaimsEncoding,
    #[error("ID token claims section is not a JSON object")]
    ClaimsJson,
    #[error("Issuer mismatch")]
    IssuerMismatch,
    #[error("Issuer must be an https URL")]
    IssuerNotHttps,
    #[error("Issuer host can not be empty")]
    IssuerHostEmpty,
    #[error("Issuer URL should not contain query parameters or fragment components")]
    IssuerHasQueryOrFragment,
    #[error("Audience mismatch")]
    AudienceMismatch,
    #[error("ID Token expired")]
    Expired,
    #[error("Issued at time is more than 10 minutes before or after the current time")]
    IssuedAtSkew,
    #[error("Nonce mismatch")]
    NonceMismatch,
}

/// The decoded, unverified claims of an ID token. Times are seconds since the epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct IdToken {
    pub issuer: String,
    pub subject: String,
    pub audience: Vec<String>,
    pub expiration: i64,
    pub issued_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized_party: Option<String>,
}

impl IdToken {
    /// Decodes the claims segment of a compact JWT. The header is not looked at.
    ///
    /// Claims that are missing or of the wrong type default to `0` or empty.
    pub fn from_compact(token: &str) -> Result<Self, IdTokenError> {
        let mut sections: Vec<&str> = token.split('.').collect();
        while sections.last().map_or(false, |s| s.is_empty()) {
            sections.pop();
        }
        if sections.len() < 2 {
            return Err(IdTokenError::MissingClaimsSection);
        }

        let decoded = URL_SAFE_NO_PAD
            .decode(sections[1].trim_end_matches('='))
            .map_err(|_| IdTokenError::ClaimsEncoding)?;
        let claims: Map<String, Value> =
            serde_json::from_slice(&decoded).map_err(|_| IdTokenError::ClaimsJson)?;

        Ok(Self::from_claims(&claims))
    }

    /// Like [`from_compact`](Self::from_compact), failing with `ID_TOKEN_PARSING_ERROR`.
    pub fn parse(token: &str) -> Result<Self, AuthorizationException> {
        Self::from_compact(token).map_err(|e| {
            AuthorizationException::from_template(&general_errors::ID_TOKEN_PARSING_ERROR, e)
        })
    }

    fn from_claims(claims: &Map<String, Value>) -> Self {
        let string = |name: &str| claims.get(name).and_then(Value::as_str).map(str::to_string);
        let number = |name: &str| {
            claims
                .get(name)
                .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
                .unwrap_or(0)
        };
        let audience = match claims.get("aud") {
            Some(Value::String(aud)) => vec![aud.clone()],
            Some(Value::Array(auds)) => auds
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };

        Self {
            issuer: string("iss").unwrap_or_default(),
            subject: string("sub").unwrap_or_default(),
            audience,
            expiration: number("exp"),
            issued_at: number("iat"),
            nonce: string("nonce"),
            authorized_party: string("azp"),
        }
    }

    pub fn validate(&self, request: &TokenRequest, clock: &dyn Clock) -> Result<(), AuthorizationException> {
        self.validate_with(request, clock, false)
    }

    /// Checks the claims against the request that obtained the token.
    ///
    /// Only providers configured through discovery are checked; a hand-configured provider
    /// has no expected issuer to compare against.
    pub fn validate_with(
        &self,
        request: &TokenRequest,
        clock: &dyn Clock,
        skip_issuer_https_check: bool,
    ) -> Result<(), AuthorizationException> {
        self.check(request, clock, skip_issuer_https_check).map_err(|e| {
            AuthorizationException::from_template(&general_errors::ID_TOKEN_VALIDATION_ERROR, e)
        })
    }

    fn check(
        &self,
        request: &TokenRequest,
        clock: &dyn Clock,
        skip_issuer_https_check: bool,
    ) -> Result<(), IdTokenError> {
        let discovery = match &request.configuration().discovery {
            Some(discovery) => discovery,
            None => return Ok(()),
        };

        if self.issuer != discovery.issuer {
            return Err(IdTokenError::IssuerMismatch);
        }

        let issuer_uri = Url::parse(&self.issuer).ok();
        if !skip_issuer_https_check && issuer_uri.as_ref().map(Url::scheme) != Some("https") {
            return Err(IdTokenError::IssuerNotHttps);
        }
        let issuer_uri = match issuer_uri {
            Some(uri) if uri.host_str().map_or(false, |h| !h.is_empty()) => uri,
            _ => return Err(IdTokenError::IssuerHostEmpty),
        };
        if issuer_uri.fragment().is_some() || issuer_uri.query_pairs().next().is_some() {
            return Err(IdTokenError::IssuerHasQueryOrFragment);
        }

        // 3.1.3.7 rule 3: aud contains the client, or azp names it
        let client_id = request.client_id();
        if !self.audience.iter().any(|a| a == client_id)
            && self.authorized_party.as_deref() != Some(client_id)
        {
            return Err(IdTokenError::AudienceMismatch);
        }

        let now = clock.current_time_secs();
        if now > self.expiration {
            return Err(IdTokenError::Expired);
        }
        let skewed = now
            .checked_sub(self.issued_at)
            .map_or(true, |d| d.unsigned_abs() > MAX_ISSUED_AT_SKEW_SECS as u64);
        if skewed {
            return Err(IdTokenError::IssuedAtSkew);
        }

        if request.grant_type() == &GrantType::AuthorizationCode
            && self.nonce.as_deref() != request.nonce()
        {
            return Err(IdTokenError::NonceMismatch);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{clock::FixedClock, models::AuthorizationServiceConfiguration};
    use crate::oidc::AuthorizationServiceDiscovery;

    const NOW: i64 = 1_700_000_000;

    fn compact(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let body = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{}.{}.", header, body)
    }

    fn claims() -> serde_json::Value {
        serde_json::json!({
            "iss": "https://accounts.example.com",
            "sub": "user-1",
            "aud": "c1",
            "exp": NOW + 10,
            "iat": NOW,
            "nonce": "n1",
        })
    }

    fn request(issuer: &str, discovered: bool) -> TokenRequest {
        let discovery: AuthorizationServiceDiscovery =
            serde_json::from_value(serde_json::json!({
                "issuer": issuer,
                "authorization_endpoint": "https://accounts.example.com/auth",
                "token_endpoint": "https://accounts.example.com/token",
                "jwks_uri": "https://accounts.example.com/certs",
                "response_types_supported": ["code"],
                "subject_types_supported": ["public"],
                "id_token_signing_alg_values_supported": ["RS256"],
            }))
            .unwrap();
        let configuration = if discovered {
            AuthorizationServiceConfiguration::from_discovery(discovery)
        } else {
            AuthorizationServiceConfiguration::new(
                discovery.authorization_endpoint,
                discovery.token_endpoint,
            )
        };
        TokenRequest::builder(configuration, "c1")
            .authorization_code("code".to_string())
            .redirect_uri(Url::parse("https://app/cb").unwrap())
            .nonce("n1".to_string())
            .build()
            .unwrap()
    }

    fn failure(token: &IdToken, req: &TokenRequest, now: i64) -> Option<IdTokenError> {
        token.check(req, &FixedClock::from_secs(now), false).err()
    }

    #[test]
    fn parses_claims_leniently() {
        let token = IdToken::from_compact(&compact(serde_json::json!({
            "iss": "https://idp",
            "aud": ["a", "b"],
            "exp": "soon",
        })))
        .unwrap();
        assert_eq!(token.audience, vec!["a", "b"]);
        assert_eq!(token.expiration, 0);
        assert_eq!(token.issued_at, 0);
        assert_eq!(token.subject, "");
        assert_eq!(token.nonce, None);
    }

    #[test]
    fn rejects_tokens_without_claims() {
        assert_eq!(IdToken::from_compact("header"), Err(IdTokenError::MissingClaimsSection));
        assert_eq!(IdToken::from_compact("header.."), Err(IdTokenError::MissingClaimsSection));
        assert_eq!(IdToken::from_compact("a.!!!.c"), Err(IdTokenError::ClaimsEncoding));
        let not_object = format!("a.{}.c", URL_SAFE_NO_PAD.encode("[1]"));
        assert_eq!(IdToken::from_compact(&not_object), Err(IdTokenError::ClaimsJson));
        assert_eq!(
            IdToken::parse("header").unwrap_err(),
            general_errors::ID_TOKEN_PARSING_ERROR
        );
    }

    #[test]
    fn valid_token_passes() {
        let token = IdToken::from_compact(&compact(claims())).unwrap();
        let req = request("https://accounts.example.com", true);
        assert_eq!(failure(&token, &req, NOW), None);
        assert!(token.validate(&req, &FixedClock::from_secs(NOW)).is_ok());
    }

    #[test]
    fn expiry_is_checked_against_clock() {
        let token = IdToken::from_compact(&compact(claims())).unwrap();
        let req = request("https://accounts.example.com", true);
        assert_eq!(failure(&token, &req, NOW + 10), None);
        assert_eq!(failure(&token, &req, NOW + 20), Some(IdTokenError::Expired));

        let err = token.validate(&req, &FixedClock::from_secs(NOW + 20)).unwrap_err();
        assert_eq!(err, general_errors::ID_TOKEN_VALIDATION_ERROR);
        assert_eq!(err.cause(), Some("ID Token expired"));
    }

    #[test]
    fn issuer_rules() {
        let mut c = claims();
        c["iss"] = "http://accounts.example.com".into();
        let token = IdToken::from_compact(&compact(c.clone())).unwrap();
        let req = request("http://accounts.example.com", true);
        assert_eq!(failure(&token, &req, NOW), Some(IdTokenError::IssuerNotHttps));
        assert!(token.check(&req, &FixedClock::from_secs(NOW), true).is_ok());

        let token = IdToken::from_compact(&compact(claims())).unwrap();
        let other = request("https://other.example.com", true);
        assert_eq!(failure(&token, &other, NOW), Some(IdTokenError::IssuerMismatch));

        c["iss"] = "https://accounts.example.com?tenant=1".into();
        let token = IdToken::from_compact(&compact(c)).unwrap();
        let req = request("https://accounts.example.com?tenant=1", true);
        assert_eq!(failure(&token, &req, NOW), Some(IdTokenError::IssuerHasQueryOrFragment));
    }

    #[test]
    fn audience_or_authorized_party() {
        let mut c = claims();
        c["aud"] = serde_json::json!(["api"]);
        let req = request("https://accounts.example.com", true);
        let token = IdToken::from_compact(&compact(c.clone())).unwrap();
        assert_eq!(failure(&token, &req, NOW), Some(IdTokenError::AudienceMismatch));

        c["azp"] = "c1".into();
        let token = IdToken::from_compact(&compact(c)).unwrap();
        assert_eq!(failure(&token, &req, NOW), None);
    }

    #[test]
    fn issued_at_skew_and_nonce() {
        let mut c = claims();
        c["iat"] = (NOW - 601).into();
        let req = request("https://accounts.example.com", true);
        let token = IdToken::from_compact(&compact(c)).unwrap();
        assert_eq!(failure(&token, &req, NOW), Some(IdTokenError::IssuedAtSkew));

        let mut c = claims();
        c["nonce"] = "other".into();
        let token = IdToken::from_compact(&compact(c)).unwrap();
        assert_eq!(failure(&token, &req, NOW), Some(IdTokenError::NonceMismatch));
    }

    #[test]
    fn extreme_issued_at_is_skewed() {
        let req = request("https://accounts.example.com", true);
        for iat in [serde_json::json!(i64::MIN), serde_json::json!(-1e30), serde_json::json!(i64::MAX)] {
            let mut c = claims();
            c["iat"] = iat;
            let token = IdToken::from_compact(&compact(c)).unwrap();
            assert_eq!(failure(&token, &req, NOW), Some(IdTokenError::IssuedAtSkew));
        }
        let mut c = claims();
        c["iat"] = i64::MIN.into();
        let token = IdToken::from_compact(&compact(c)).unwrap();
        assert_eq!(failure(&token, &req, 0), Some(IdTokenError::IssuedAtSkew));
    }

    #[test]
    fn hand_configured_provider_is_not_checked() {
        let mut c = claims();
        c["iss"] = "https://elsewhere".into();
        c["exp"] = 0.into();
        let token = IdToken::from_compact(&compact(c)).unwrap();
        let req = request("https://accounts.example.com", false);
        assert_eq!(failure(&token, &req, NOW), None);
    }
}
