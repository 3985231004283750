//! The closed catalogue of failures surfaced to callers.
//!
//! Every protocol-level failure maps to exactly one catalogued [`AuthorizationException`].
//! Codes are grouped by phase: general `0..=999`, authorization endpoint `1000..=1999`,
//! token endpoint `2000..=2999`, registration endpoint `4000..=4999`. Two exceptions are
//! equal when their type and code match, whatever their description says.

use std::{
    borrow::Cow,
    fmt,
    hash::{Hash, Hasher},
};

use url::Url;

use crate::util::params::query_parameters;

pub const PARAM_ERROR: &str = "error";
pub const PARAM_ERROR_DESCRIPTION: &str = "error_description";
pub const PARAM_ERROR_URI: &str = "error_uri";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    General,
    OAuthAuthorization,
    OAuthToken,
    ResourceServerAuthorization,
    OAuthRegistration,
}

impl ErrorType {
    pub fn as_code(&self) -> u8 {
        match self {
            Self::General => 0,
            Self::OAuthAuthorization => 1,
            Self::OAuthToken => 2,
            Self::ResourceServerAuthorization => 3,
            Self::OAuthRegistration => 4,
        }
    }
}

#[derive(Debug, Clone)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct AuthorizationException {
    #[serde(rename = "type")]
    pub kind: ErrorType,
    pub code: u16,
    #[serde(default)]
    pub error: Option<Cow<'static, str>>,
    #[serde(rename = "error_description")]
    #[serde(default)]
    pub description: Option<Cow<'static, str>>,
    #[serde(rename = "error_uri")]
    #[serde(default)]
    pub uri: Option<Cow<'static, str>>,
    #[serde(skip)]
    cause: Option<String>,
}

const fn general(code: u16, description: &'static str) -> AuthorizationException {
    AuthorizationException {
        kind: ErrorType::General,
        code,
        error: None,
        description: Some(Cow::Borrowed(description)),
        uri: None,
        cause: None,
    }
}

const fn oauth(kind: ErrorType, code: u16, error: Option<&'static str>) -> AuthorizationException {
    let error = match error {
        Some(e) => Some(Cow::Borrowed(e)),
        None => None,
    };
    AuthorizationException {
        kind,
        code,
        error,
        description: None,
        uri: None,
        cause: None,
    }
}

/// Failures specific to this client rather than defined by OAuth 2.0 or OpenID Connect.
pub mod general_errors {
    use super::{general, AuthorizationException};

    pub const INVALID_DISCOVERY_DOCUMENT: AuthorizationException = general(0, "Invalid discovery document");
    pub const USER_CANCELED_AUTH_FLOW: AuthorizationException = general(1, "User cancelled flow");
    pub const PROGRAM_CANCELED_AUTH_FLOW: AuthorizationException = general(2, "Flow cancelled programmatically");
    pub const NETWORK_ERROR: AuthorizationException = general(3, "Network error");
    pub const SERVER_ERROR: AuthorizationException = general(4, "Server error");
    pub const JSON_DESERIALIZATION_ERROR: AuthorizationException = general(5, "JSON deserialization error");
    pub const TOKEN_RESPONSE_CONSTRUCTION_ERROR: AuthorizationException = general(6, "Token response construction error");
    pub const INVALID_REGISTRATION_RESPONSE: AuthorizationException = general(7, "Invalid registration response");
    pub const ID_TOKEN_PARSING_ERROR: AuthorizationException = general(8, "Unable to parse ID Token");
    pub const ID_TOKEN_VALIDATION_ERROR: AuthorizationException = general(9, "Invalid ID Token");
}

/// Errors returned to the redirect URI by the authorization endpoint.
pub mod authorization_errors {
    use super::{general, oauth, AuthorizationException, ErrorType::OAuthAuthorization};

    pub const INVALID_REQUEST: AuthorizationException = oauth(OAuthAuthorization, 1000, Some("invalid_request"));
    pub const UNAUTHORIZED_CLIENT: AuthorizationException = oauth(OAuthAuthorization, 1001, Some("unauthorized_client"));
    pub const ACCESS_DENIED: AuthorizationException = oauth(OAuthAuthorization, 1002, Some("access_denied"));
    pub const UNSUPPORTED_RESPONSE_TYPE: AuthorizationException = oauth(OAuthAuthorization, 1003, Some("unsupported_response_type"));
    pub const INVALID_SCOPE: AuthorizationException = oauth(OAuthAuthorization, 1004, Some("invalid_scope"));
    pub const SERVER_ERROR: AuthorizationException = oauth(OAuthAuthorization, 1005, Some("server_error"));
    pub const TEMPORARILY_UNAVAILABLE: AuthorizationException = oauth(OAuthAuthorization, 1006, Some("temporarily_unavailable"));
    pub const CLIENT_ERROR: AuthorizationException = oauth(OAuthAuthorization, 1007, None);
    pub const OTHER: AuthorizationException = oauth(OAuthAuthorization, 1008, None);
    // Shares (General, 9) with ID_TOKEN_VALIDATION_ERROR; kept for wire compatibility.
    pub const STATE_MISMATCH: AuthorizationException = general(9, "Response state param did not match request state");

    pub fn by_string(error: Option<&str>) -> AuthorizationException {
        match error {
            Some("invalid_request") => INVALID_REQUEST,
            Some("unauthorized_client") => UNAUTHORIZED_CLIENT,
            Some("access_denied") => ACCESS_DENIED,
            Some("unsupported_response_type") => UNSUPPORTED_RESPONSE_TYPE,
            Some("invalid_scope") => INVALID_SCOPE,
            Some("server_error") => SERVER_ERROR,
            Some("temporarily_unavailable") => TEMPORARILY_UNAVAILABLE,
            _ => OTHER,
        }
    }
}

/// Errors returned by the token endpoint.
pub mod token_errors {
    use super::{oauth, AuthorizationException, ErrorType::OAuthToken};

    pub const INVALID_REQUEST: AuthorizationException = oauth(OAuthToken, 2000, Some("invalid_request"));
    pub const INVALID_CLIENT: AuthorizationException = oauth(OAuthToken, 2001, Some("invalid_client"));
    pub const INVALID_GRANT: AuthorizationException = oauth(OAuthToken, 2002, Some("invalid_grant"));
    pub const UNAUTHORIZED_CLIENT: AuthorizationException = oauth(OAuthToken, 2003, Some("unauthorized_client"));
    pub const UNSUPPORTED_GRANT_TYPE: AuthorizationException = oauth(OAuthToken, 2004, Some("unsupported_grant_type"));
    pub const INVALID_SCOPE: AuthorizationException = oauth(OAuthToken, 2005, Some("invalid_scope"));
    pub const CLIENT_ERROR: AuthorizationException = oauth(OAuthToken, 2006, None);
    pub const OTHER: AuthorizationException = oauth(OAuthToken, 2007, None);

    pub fn by_string(error: Option<&str>) -> AuthorizationException {
        match error {
            Some("invalid_request") => INVALID_REQUEST,
            Some("invalid_client") => INVALID_CLIENT,
            Some("invalid_grant") => INVALID_GRANT,
            Some("unauthorized_client") => UNAUTHORIZED_CLIENT,
            Some("unsupported_grant_type") => UNSUPPORTED_GRANT_TYPE,
            Some("invalid_scope") => INVALID_SCOPE,
            _ => OTHER,
        }
    }
}

/// Errors returned by the dynamic client registration endpoint.
pub mod registration_errors {
    use super::{oauth, AuthorizationException, ErrorType::OAuthRegistration};

    pub const INVALID_REQUEST: AuthorizationException = oauth(OAuthRegistration, 4000, Some("invalid_request"));
    pub const INVALID_REDIRECT_URI: AuthorizationException = oauth(OAuthRegistration, 4001, Some("invalid_redirect_uri"));
    pub const INVALID_CLIENT_METADATA: AuthorizationException = oauth(OAuthRegistration, 4002, Some("invalid_client_metadata"));
    pub const CLIENT_ERROR: AuthorizationException = oauth(OAuthRegistration, 4003, None);
    pub const OTHER: AuthorizationException = oauth(OAuthRegistration, 4004, None);

    pub fn by_string(error: Option<&str>) -> AuthorizationException {
        match error {
            Some("invalid_request") => INVALID_REQUEST,
            Some("invalid_redirect_uri") => INVALID_REDIRECT_URI,
            Some("invalid_client_metadata") => INVALID_CLIENT_METADATA,
            _ => OTHER,
        }
    }
}

impl AuthorizationException {
    /// A copy of the catalogued `template` with a diagnostic cause attached.
    pub fn from_template(template: &AuthorizationException, cause: impl fmt::Display) -> Self {
        Self {
            cause: Some(cause.to_string()),
            ..template.clone()
        }
    }

    /// A copy of `template` with the server-supplied fields laid over the catalogued ones.
    pub fn from_oauth_template(
        template: &AuthorizationException,
        error: Option<&str>,
        description: Option<&str>,
        uri: Option<&str>,
    ) -> Self {
        let overlay = |value: Option<&str>, default: &Option<Cow<'static, str>>| {
            value.map(|v| Cow::Owned(v.to_string())).or_else(|| default.clone())
        };
        Self {
            kind: template.kind,
            code: template.code,
            error: overlay(error, &template.error),
            description: overlay(description, &template.description),
            uri: overlay(uri, &template.uri),
            cause: None,
        }
    }

    /// Reads `error`, `error_description` and `error_uri` from an authorization redirect.
    pub fn from_oauth_redirect(redirect_uri: &Url) -> Self {
        let params = query_parameters(redirect_uri);
        let error = params.get(PARAM_ERROR).map(String::as_str);
        let base = authorization_errors::by_string(error);
        Self::from_oauth_template(
            &base,
            error,
            params.get(PARAM_ERROR_DESCRIPTION).map(String::as_str),
            params.get(PARAM_ERROR_URI).map(String::as_str),
        )
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Diagnostic detail; not part of the serialized form.
    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    /// Authorization-endpoint refusals are the only errors an `AuthState` keeps.
    pub fn is_authorization_error(&self) -> bool {
        self.kind == ErrorType::OAuthAuthorization
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl PartialEq for AuthorizationException {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.code == other.code
    }
}

impl Eq for AuthorizationException {}

impl Hash for AuthorizationException {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.code.hash(state);
    }
}

impl fmt::Display for AuthorizationException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "authorization error {}/{}", self.kind.as_code(), self.code)?;
        if let Some(error) = &self.error {
            write!(f, " ({})", error)?;
        }
        if let Some(description) = &self.description {
            write!(f, ": {}", description)?;
        }
        if let Some(cause) = &self.cause {
            write!(f, " [{}]", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for AuthorizationException {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_description() {
        let overridden = AuthorizationException::from_oauth_template(
            &token_errors::INVALID_GRANT,
            None,
            Some("code expired"),
            None,
        );
        assert_eq!(overridden, token_errors::INVALID_GRANT);
        assert_ne!(token_errors::INVALID_REQUEST, authorization_errors::INVALID_REQUEST);
    }

    #[test]
    fn lookup_defaults_to_other() {
        assert_eq!(authorization_errors::by_string(Some("access_denied")).code, 1002);
        assert_eq!(authorization_errors::by_string(Some("nope")), authorization_errors::OTHER);
        assert_eq!(authorization_errors::by_string(None), authorization_errors::OTHER);
        assert_eq!(token_errors::by_string(Some("invalid_grant")), token_errors::INVALID_GRANT);
        assert_eq!(
            registration_errors::by_string(Some("invalid_redirect_uri")),
            registration_errors::INVALID_REDIRECT_URI
        );
    }

    #[test]
    fn redirect_error_overlays_description() {
        let uri = Url::parse(
            "com.example.app:/callback?error=access_denied&error_description=User+said+no&error_uri=https%3A%2F%2Fidp%2Fdocs",
        )
        .unwrap();
        let ex = AuthorizationException::from_oauth_redirect(&uri);
        assert_eq!(ex, authorization_errors::ACCESS_DENIED);
        assert_eq!(ex.kind, ErrorType::OAuthAuthorization);
        assert_eq!(ex.error(), Some("access_denied"));
        assert_eq!(ex.description(), Some("User said no"));
        assert_eq!(ex.uri(), Some("https://idp/docs"));
    }

    #[test]
    fn unknown_redirect_error_keeps_wire_string() {
        let uri = Url::parse("app:/cb?error=interaction_required").unwrap();
        let ex = AuthorizationException::from_oauth_redirect(&uri);
        assert_eq!(ex, authorization_errors::OTHER);
        assert_eq!(ex.error(), Some("interaction_required"));
    }

    #[test]
    fn json_round_trip_preserves_fields() {
        let ex = AuthorizationException::from_oauth_template(
            &registration_errors::INVALID_CLIENT_METADATA,
            None,
            Some("bad jwks"),
            None,
        );
        let back = AuthorizationException::from_json(&ex.to_json().unwrap()).unwrap();
        assert_eq!(back, ex);
        assert_eq!(back.description(), Some("bad jwks"));
        assert_eq!(back.error(), Some("invalid_client_metadata"));
    }
}
