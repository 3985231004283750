//! Dynamic client registration (RFC 7591 / OpenID Connect Dynamic Registration).

use indexmap::IndexMap;
use url::Url;

use crate::auth::token::string_extras;
use crate::core::{
    clock::Clock, error::UsageError, models::AuthorizationServiceConfiguration,
};
use crate::util::params::{check_additional_params, AdditionalParameters};

pub const APPLICATION_TYPE_NATIVE: &str = "native";
pub const SUBJECT_TYPE_PUBLIC: &str = "public";
pub const SUBJECT_TYPE_PAIRWISE: &str = "pairwise";

pub mod params {
    pub const REDIRECT_URIS: &str = "redirect_uris";
    pub const RESPONSE_TYPES: &str = "response_types";
    pub const GRANT_TYPES: &str = "grant_types";
    pub const APPLICATION_TYPE: &str = "application_type";
    pub const SUBJECT_TYPE: &str = "subject_type";
    pub const JWKS_URI: &str = "jwks_uri";
    pub const JWKS: &str = "jwks";
    pub const TOKEN_ENDPOINT_AUTH_METHOD: &str = "token_endpoint_auth_method";

    pub const CLIENT_ID: &str = "client_id";
    pub const CLIENT_SECRET: &str = "client_secret";
    pub const CLIENT_SECRET_EXPIRES_AT: &str = "client_secret_expires_at";
    pub const REGISTRATION_ACCESS_TOKEN: &str = "registration_access_token";
    pub const REGISTRATION_CLIENT_URI: &str = "registration_client_uri";
    pub const CLIENT_ID_ISSUED_AT: &str = "client_id_issued_at";
}

const REQUEST_BUILT_IN_PARAMS: &[&str] = &[
    params::REDIRECT_URIS,
    params::RESPONSE_TYPES,
    params::GRANT_TYPES,
    params::APPLICATION_TYPE,
    params::SUBJECT_TYPE,
    params::JWKS_URI,
    params::JWKS,
    params::TOKEN_ENDPOINT_AUTH_METHOD,
];

const RESPONSE_BUILT_IN_PARAMS: &[&str] = &[
    params::CLIENT_ID,
    params::CLIENT_SECRET,
    params::CLIENT_SECRET_EXPIRES_AT,
    params::REGISTRATION_ACCESS_TOKEN,
    params::REGISTRATION_CLIENT_URI,
    params::CLIENT_ID_ISSUED_AT,
    params::TOKEN_ENDPOINT_AUTH_METHOD,
];

#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct RegistrationRequest {
    configuration: AuthorizationServiceConfiguration,
    redirect_uris: Vec<Url>,
    application_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    grant_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jwks_uri: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jwks: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_endpoint_auth_method: Option<String>,
    #[serde(default)]
    additional_parameters: AdditionalParameters,
}

impl RegistrationRequest {
    pub fn builder(
        configuration: AuthorizationServiceConfiguration,
        redirect_uris: Vec<Url>,
    ) -> RegistrationRequestBuilder {
        RegistrationRequestBuilder::new(configuration, redirect_uris)
    }

    pub fn configuration(&self) -> &AuthorizationServiceConfiguration {
        &self.configuration
    }

    pub fn redirect_uris(&self) -> &[Url] {
        &self.redirect_uris
    }

    pub fn application_type(&self) -> &str {
        &self.application_type
    }

    pub fn response_types(&self) -> Option<&[String]> {
        self.response_types.as_deref()
    }

    pub fn grant_types(&self) -> Option<&[String]> {
        self.grant_types.as_deref()
    }

    pub fn subject_type(&self) -> Option<&str> {
        self.subject_type.as_deref()
    }

    pub fn token_endpoint_auth_method(&self) -> Option<&str> {
        self.token_endpoint_auth_method.as_deref()
    }

    pub fn additional_parameters(&self) -> &AdditionalParameters {
        &self.additional_parameters
    }

    /// The JSON document POSTed to the registration endpoint.
    pub fn to_wire_json(&self) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        body.insert(
            params::REDIRECT_URIS.into(),
            self.redirect_uris.iter().map(|u| u.as_str()).collect(),
        );
        body.insert(params::APPLICATION_TYPE.into(), self.application_type.clone().into());
        if let Some(types) = &self.response_types {
            body.insert(params::RESPONSE_TYPES.into(), types.clone().into());
        }
        if let Some(types) = &self.grant_types {
            body.insert(params::GRANT_TYPES.into(), types.clone().into());
        }
        if let Some(subject_type) = &self.subject_type {
            body.insert(params::SUBJECT_TYPE.into(), subject_type.clone().into());
        }
        if let Some(jwks_uri) = &self.jwks_uri {
            body.insert(params::JWKS_URI.into(), jwks_uri.as_str().into());
        }
        if let Some(jwks) = &self.jwks {
            body.insert(params::JWKS.into(), jwks.clone());
        }
        if let Some(method) = &self.token_endpoint_auth_method {
            body.insert(params::TOKEN_ENDPOINT_AUTH_METHOD.into(), method.clone().into());
        }
        for (key, value) in &self.additional_parameters {
            body.insert(key.clone(), value.clone().into());
        }
        serde_json::Value::Object(body)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone)]
pub struct RegistrationRequestBuilder {
    configuration: AuthorizationServiceConfiguration,
    redirect_uris: Vec<Url>,
    response_types: Option<Vec<String>>,
    grant_types: Option<Vec<String>>,
    subject_type: Option<String>,
    jwks_uri: Option<Url>,
    jwks: Option<serde_json::Value>,
    token_endpoint_auth_method: Option<String>,
    additional_parameters: AdditionalParameters,
}

impl RegistrationRequestBuilder {
    pub fn new(configuration: AuthorizationServiceConfiguration, redirect_uris: Vec<Url>) -> Self {
        Self {
            configuration,
            redirect_uris,
            response_types: None,
            grant_types: None,
            subject_type: None,
            jwks_uri: None,
            jwks: None,
            token_endpoint_auth_method: None,
            additional_parameters: AdditionalParameters::new(),
        }
    }

    pub fn response_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.response_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn grant_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grant_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn subject_type(mut self, subject_type: impl Into<String>) -> Self {
        self.subject_type = Some(subject_type.into());
        self
    }

    pub fn jwks_uri(mut self, jwks_uri: Url) -> Self {
        self.jwks_uri = Some(jwks_uri);
        self
    }

    pub fn jwks(mut self, jwks: serde_json::Value) -> Self {
        self.jwks = Some(jwks);
        self
    }

    pub fn token_endpoint_auth_method(mut self, method: impl Into<String>) -> Self {
        self.token_endpoint_auth_method = Some(method.into());
        self
    }

    pub fn additional_parameters(mut self, additional_parameters: AdditionalParameters) -> Self {
        self.additional_parameters = additional_parameters;
        self
    }

    pub fn build(self) -> Result<RegistrationRequest, UsageError> {
        check_additional_params(&self.additional_parameters, REQUEST_BUILT_IN_PARAMS)?;
        Ok(RegistrationRequest {
            configuration: self.configuration,
            redirect_uris: self.redirect_uris,
            application_type: APPLICATION_TYPE_NATIVE.to_string(),
            response_types: self.response_types,
            grant_types: self.grant_types,
            subject_type: self.subject_type,
            jwks_uri: self.jwks_uri,
            jwks: self.jwks,
            token_endpoint_auth_method: self.token_endpoint_auth_method,
            additional_parameters: self.additional_parameters,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct RegistrationResponse {
    request: RegistrationRequest,
    client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id_issued_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret_expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    registration_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    registration_client_uri: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_endpoint_auth_method: Option<String>,
    #[serde(default)]
    additional_parameters: AdditionalParameters,
}

#[derive(serde::Deserialize)]
struct RegistrationResponseBody {
    client_id: Option<String>,
    client_id_issued_at: Option<i64>,
    client_secret: Option<String>,
    client_secret_expires_at: Option<i64>,
    registration_access_token: Option<String>,
    registration_client_uri: Option<Url>,
    token_endpoint_auth_method: Option<String>,
    #[serde(flatten)]
    extra: IndexMap<String, serde_json::Value>,
}

/// Why a registration endpoint body could not become a [`RegistrationResponse`].
#[derive(Debug, thiserror::Error)]
pub enum RegistrationParseError {
    #[error("malformed registration response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("registration response is missing client_id")]
    MissingClientId,
}

impl RegistrationResponse {
    pub fn builder(request: RegistrationRequest) -> RegistrationResponseBuilder {
        RegistrationResponseBuilder::new(request)
    }

    /// Parses a registration endpoint JSON body. Unknown string fields are kept.
    pub fn from_json_body(
        request: RegistrationRequest,
        body: &str,
    ) -> Result<Self, RegistrationParseError> {
        let body: RegistrationResponseBody = serde_json::from_str(body)?;
        let client_id = body.client_id.ok_or(RegistrationParseError::MissingClientId)?;
        Ok(RegistrationResponse {
            request,
            client_id,
            client_id_issued_at: body.client_id_issued_at,
            client_secret: body.client_secret,
            client_secret_expires_at: body.client_secret_expires_at,
            registration_access_token: body.registration_access_token,
            registration_client_uri: body.registration_client_uri,
            token_endpoint_auth_method: body.token_endpoint_auth_method,
            additional_parameters: string_extras(body.extra),
        })
    }

    pub fn request(&self) -> &RegistrationRequest {
        &self.request
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_id_issued_at(&self) -> Option<i64> {
        self.client_id_issued_at
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    /// Seconds since the epoch; 0 means the secret never expires.
    pub fn client_secret_expires_at(&self) -> Option<i64> {
        self.client_secret_expires_at
    }

    pub fn registration_access_token(&self) -> Option<&str> {
        self.registration_access_token.as_deref()
    }

    pub fn registration_client_uri(&self) -> Option<&Url> {
        self.registration_client_uri.as_ref()
    }

    pub fn token_endpoint_auth_method(&self) -> Option<&str> {
        self.token_endpoint_auth_method.as_deref()
    }

    pub fn additional_parameters(&self) -> &AdditionalParameters {
        &self.additional_parameters
    }

    pub fn has_client_secret_expired(&self, clock: &dyn Clock) -> bool {
        self.client_secret_expires_at
            .map_or(false, |expires| clock.current_time_secs() > expires)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone)]
pub struct RegistrationResponseBuilder {
    request: RegistrationRequest,
    client_id: Option<String>,
    client_id_issued_at: Option<i64>,
    client_secret: Option<String>,
    client_secret_expires_at: Option<i64>,
    registration_access_token: Option<String>,
    registration_client_uri: Option<Url>,
    token_endpoint_auth_method: Option<String>,
    additional_parameters: AdditionalParameters,
}

impl RegistrationResponseBuilder {
    pub fn new(request: RegistrationRequest) -> Self {
        Self {
            request,
            client_id: None,
            client_id_issued_at: None,
            client_secret: None,
            client_secret_expires_at: None,
            registration_access_token: None,
            registration_client_uri: None,
            token_endpoint_auth_method: None,
            additional_parameters: AdditionalParameters::new(),
        }
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn client_id_issued_at(mut self, secs: i64) -> Self {
        self.client_id_issued_at = Some(secs);
        self
    }

    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn client_secret_expires_at(mut self, secs: i64) -> Self {
        self.client_secret_expires_at = Some(secs);
        self
    }

    pub fn registration_access_token(mut self, token: impl Into<String>) -> Self {
        self.registration_access_token = Some(token.into());
        self
    }

    pub fn registration_client_uri(mut self, uri: Url) -> Self {
        self.registration_client_uri = Some(uri);
        self
    }

    pub fn token_endpoint_auth_method(mut self, method: impl Into<String>) -> Self {
        self.token_endpoint_auth_method = Some(method.into());
        self
    }

    pub fn additional_parameters(mut self, additional_parameters: AdditionalParameters) -> Self {
        self.additional_parameters = additional_parameters;
        self
    }

    pub fn build(self) -> Result<RegistrationResponse, UsageError> {
        let client_id = self.client_id.ok_or(UsageError::MissingClientId)?;
        check_additional_params(&self.additional_parameters, RESPONSE_BUILT_IN_PARAMS)?;
        Ok(RegistrationResponse {
            request: self.request,
            client_id,
            client_id_issued_at: self.client_id_issued_at,
            client_secret: self.client_secret,
            client_secret_expires_at: self.client_secret_expires_at,
            registration_access_token: self.registration_access_token,
            registration_client_uri: self.registration_client_uri,
            token_endpoint_auth_method: self.token_endpoint_auth_method,
            additional_parameters: self.additional_parameters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;

    fn request() -> RegistrationRequest {
        let configuration = AuthorizationServiceConfiguration::new(
            Url::parse("https://idp.example.com/authorize").unwrap(),
            Url::parse("https://idp.example.com/token").unwrap(),
        );
        RegistrationRequest::builder(configuration, vec![Url::parse("com.example.app:/cb").unwrap()])
            .response_types(["code"])
            .grant_types(["authorization_code", "refresh_token"])
            .subject_type(SUBJECT_TYPE_PUBLIC)
            .build()
            .unwrap()
    }

    #[test]
    fn wire_body_is_native_application() {
        let body = request().to_wire_json();
        assert_eq!(body["application_type"], "native");
        assert_eq!(body["redirect_uris"][0], "com.example.app:/cb");
        assert_eq!(body["grant_types"][1], "refresh_token");
        assert!(body.get("jwks").is_none());
    }

    #[test]
    fn response_requires_client_id() {
        let err = RegistrationResponse::from_json_body(request(), r#"{"client_secret":"s"}"#)
            .unwrap_err();
        assert!(matches!(err, RegistrationParseError::MissingClientId));
        assert_eq!(
            RegistrationResponse::builder(request()).build(),
            Err(UsageError::MissingClientId)
        );
    }

    #[test]
    fn client_secret_expiry_is_in_seconds() {
        let response = RegistrationResponse::from_json_body(
            request(),
            r#"{"client_id":"c1","client_secret":"s","client_secret_expires_at":1000,"software_id":"x"}"#,
        )
        .unwrap();
        assert_eq!(response.client_id(), "c1");
        assert_eq!(
            response.additional_parameters().get("software_id").map(String::as_str),
            Some("x")
        );
        assert!(!response.has_client_secret_expired(&FixedClock::from_secs(1000)));
        assert!(response.has_client_secret_expired(&FixedClock::from_secs(1001)));
    }
}
