use indexmap::IndexMap;
use url::Url;

use crate::auth::pkce;
use crate::core::{
    clock::{expiry_from_now, Clock},
    error::UsageError,
    models::AuthorizationServiceConfiguration,
    types::{GrantType, Scope},
};
use crate::oidc::IdToken;
use crate::util::params::{check_additional_params, form_url_encode, AdditionalParameters};

pub mod params {
    pub const CODE: &str = "code";
    pub const SCOPE: &str = "scope";
    pub const CLIENT_ID: &str = "client_id";
    pub const GRANT_TYPE: &str = "grant_type";
    pub const REDIRECT_URI: &str = "redirect_uri";
    pub const CODE_VERIFIER: &str = "code_verifier";
    pub const REFRESH_TOKEN: &str = "refresh_token";

    pub const TOKEN_TYPE: &str = "token_type";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const EXPIRES_IN: &str = "expires_in";
    pub const EXPIRES_AT: &str = "expires_at";
    pub const ID_TOKEN: &str = "id_token";
}

const REQUEST_BUILT_IN_PARAMS: &[&str] = &[
    params::CODE,
    params::SCOPE,
    params::CLIENT_ID,
    params::GRANT_TYPE,
    params::REDIRECT_URI,
    params::CODE_VERIFIER,
    params::REFRESH_TOKEN,
];

const RESPONSE_BUILT_IN_PARAMS: &[&str] = &[
    params::TOKEN_TYPE,
    params::ACCESS_TOKEN,
    params::EXPIRES_IN,
    params::REFRESH_TOKEN,
    params::ID_TOKEN,
    params::SCOPE,
];

/// A request to the token endpoint.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct TokenRequest {
    configuration: AuthorizationServiceConfiguration,
    client_id: String,
    grant_type: GrantType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authorization_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code_verifier: Option<String>,
    #[serde(default)]
    additional_parameters: AdditionalParameters,
}

impl TokenRequest {
    pub fn builder(
        configuration: AuthorizationServiceConfiguration,
        client_id: impl Into<String>,
    ) -> TokenRequestBuilder {
        TokenRequestBuilder::new(configuration, client_id)
    }

    pub fn configuration(&self) -> &AuthorizationServiceConfiguration {
        &self.configuration
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn grant_type(&self) -> &GrantType {
        &self.grant_type
    }

    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    pub fn redirect_uri(&self) -> Option<&Url> {
        self.redirect_uri.as_ref()
    }

    pub fn authorization_code(&self) -> Option<&str> {
        self.authorization_code.as_deref()
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn scope_set(&self) -> Scope {
        self.scope
            .as_deref()
            .map(Scope::from_delimited_parts)
            .unwrap_or_default()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn code_verifier(&self) -> Option<&str> {
        self.code_verifier.as_deref()
    }

    pub fn additional_parameters(&self) -> &AdditionalParameters {
        &self.additional_parameters
    }

    /// Wire parameters, built-ins first.
    pub fn request_parameters(&self) -> IndexMap<String, String> {
        let mut out = IndexMap::new();
        out.insert(params::CLIENT_ID.to_string(), self.client_id.clone());
        out.insert(params::GRANT_TYPE.to_string(), self.grant_type.to_string());
        let optional = [
            (params::SCOPE, self.scope.clone()),
            (params::CODE, self.authorization_code.clone()),
            (params::REDIRECT_URI, self.redirect_uri.as_ref().map(Url::to_string)),
            (params::REFRESH_TOKEN, self.refresh_token.clone()),
            (params::CODE_VERIFIER, self.code_verifier.clone()),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                out.insert(key.to_string(), value);
            }
        }
        for (key, value) in &self.additional_parameters {
            out.insert(key.clone(), value.clone());
        }
        out
    }

    /// `application/x-www-form-urlencoded` body for the token endpoint.
    pub fn form_body(&self) -> String {
        form_url_encode(&self.request_parameters())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone)]
pub struct TokenRequestBuilder {
    configuration: AuthorizationServiceConfiguration,
    client_id: String,
    grant_type: Option<GrantType>,
    nonce: Option<String>,
    redirect_uri: Option<Url>,
    authorization_code: Option<String>,
    scope: Option<String>,
    refresh_token: Option<String>,
    code_verifier: Option<String>,
    additional_parameters: AdditionalParameters,
}

impl TokenRequestBuilder {
    pub fn new(configuration: AuthorizationServiceConfiguration, client_id: impl Into<String>) -> Self {
        Self {
            configuration,
            client_id: client_id.into(),
            grant_type: None,
            nonce: None,
            redirect_uri: None,
            authorization_code: None,
            scope: None,
            refresh_token: None,
            code_verifier: None,
            additional_parameters: AdditionalParameters::new(),
        }
    }

    /// Inferred from the code or refresh token when left unset.
    pub fn grant_type(mut self, grant_type: GrantType) -> Self {
        self.grant_type = Some(grant_type);
        self
    }

    /// An empty nonce is treated as absent.
    pub fn nonce(mut self, nonce: impl Into<Option<String>>) -> Self {
        self.nonce = nonce.into().filter(|n| !n.is_empty());
        self
    }

    pub fn redirect_uri(mut self, redirect_uri: impl Into<Option<Url>>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn authorization_code(mut self, code: impl Into<Option<String>>) -> Self {
        self.authorization_code = code.into();
        self
    }

    pub fn scope(mut self, scope: Option<&str>) -> Self {
        self.scope = scope.and_then(Scope::normalize);
        self
    }

    pub fn refresh_token(mut self, refresh_token: impl Into<Option<String>>) -> Self {
        self.refresh_token = refresh_token.into();
        self
    }

    pub fn code_verifier(mut self, code_verifier: impl Into<Option<String>>) -> Self {
        self.code_verifier = code_verifier.into();
        self
    }

    pub fn additional_parameters(mut self, additional_parameters: AdditionalParameters) -> Self {
        self.additional_parameters = additional_parameters;
        self
    }

    pub fn additional_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_parameters.insert(key.into(), value.into());
        self
    }

    fn infer_grant_type(&self) -> Result<GrantType, UsageError> {
        match (&self.grant_type, &self.authorization_code, &self.refresh_token) {
            (Some(grant_type), _, _) => Ok(grant_type.clone()),
            (None, Some(_), _) => Ok(GrantType::AuthorizationCode),
            (None, None, Some(_)) => Ok(GrantType::RefreshToken),
            (None, None, None) => Err(UsageError::GrantTypeUnresolvable),
        }
    }

    pub fn build(self) -> Result<TokenRequest, UsageError> {
        if self.client_id.is_empty() {
            return Err(UsageError::MissingClientId);
        }
        let grant_type = self.infer_grant_type()?;

        match grant_type {
            GrantType::AuthorizationCode if self.authorization_code.is_none() => {
                return Err(UsageError::MissingAuthorizationCode)
            }
            GrantType::AuthorizationCode if self.redirect_uri.is_none() => {
                return Err(UsageError::MissingRedirectUri)
            }
            GrantType::RefreshToken if self.refresh_token.is_none() => {
                return Err(UsageError::MissingRefreshToken)
            }
            _ => {}
        }
        if let Some(verifier) = &self.code_verifier {
            pkce::check_code_verifier(verifier)?;
        }
        check_additional_params(&self.additional_parameters, REQUEST_BUILT_IN_PARAMS)?;

        Ok(TokenRequest {
            configuration: self.configuration,
            client_id: self.client_id,
            grant_type,
            nonce: self.nonce,
            redirect_uri: self.redirect_uri,
            authorization_code: self.authorization_code,
            scope: self.scope,
            refresh_token: self.refresh_token,
            code_verifier: self.code_verifier,
            additional_parameters: self.additional_parameters,
        })
    }
}

/// A successful token endpoint response, tied to the request that produced it.
///
/// `access_token_expiration_time` is fixed when the response is built: `expires_at` if the
/// server sent one, else now plus `expires_in`.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct TokenResponse {
    request: TokenRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token_expiration_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(default)]
    additional_parameters: AdditionalParameters,
}

// Token endpoint body. Unknown keys land in `extra`.
#[derive(serde::Deserialize)]
struct TokenResponseBody {
    token_type: Option<String>,
    access_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    expires_in: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    expires_at: Option<i64>,
    id_token: Option<String>,
    refresh_token: Option<String>,
    scope: Option<String>,
    #[serde(flatten)]
    extra: IndexMap<String, serde_json::Value>,
}

// Some servers send numbers as strings.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Keeps the string-valued entries of an unknown-field map.
pub(crate) fn string_extras(extra: IndexMap<String, serde_json::Value>) -> AdditionalParameters {
    extra
        .into_iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::String(s) => Some((k, s)),
            _ => None,
        })
        .collect()
}

impl TokenResponse {
    pub fn builder(request: TokenRequest) -> TokenResponseBuilder {
        TokenResponseBuilder::new(request)
    }

    /// Parses a token endpoint JSON body.
    pub fn from_json_body(
        request: TokenRequest,
        body: &str,
        clock: &dyn Clock,
    ) -> Result<Self, serde_json::Error> {
        let body: TokenResponseBody = serde_json::from_str(body)?;
        let extra = string_extras(body.extra);
        Ok(TokenResponseBuilder::new(request)
            .token_type(body.token_type)
            .access_token(body.access_token)
            .expires_in(body.expires_in)
            .expires_at(body.expires_at)
            .id_token(body.id_token)
            .refresh_token(body.refresh_token)
            .scope(body.scope.as_deref())
            .additional_parameters(extra)
            .assemble(clock))
    }

    pub fn request(&self) -> &TokenRequest {
        &self.request
    }

    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn expires_in(&self) -> Option<i64> {
        self.expires_in
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }

    /// Milliseconds since the epoch.
    pub fn access_token_expiration_time(&self) -> Option<i64> {
        self.access_token_expiration_time
    }

    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
    }

    pub fn parsed_id_token(&self) -> Option<IdToken> {
        self.id_token.as_deref().and_then(|t| IdToken::from_compact(t).ok())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn scope_set(&self) -> Option<Scope> {
        self.scope.as_deref().map(Scope::from_delimited_parts)
    }

    pub fn additional_parameters(&self) -> &AdditionalParameters {
        &self.additional_parameters
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone)]
pub struct TokenResponseBuilder {
    request: TokenRequest,
    token_type: Option<String>,
    access_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    id_token: Option<String>,
    refresh_token: Option<String>,
    scope: Option<String>,
    additional_parameters: AdditionalParameters,
}

impl TokenResponseBuilder {
    pub fn new(request: TokenRequest) -> Self {
        Self {
            request,
            token_type: None,
            access_token: None,
            expires_in: None,
            expires_at: None,
            id_token: None,
            refresh_token: None,
            scope: None,
            additional_parameters: AdditionalParameters::new(),
        }
    }

    pub fn token_type(mut self, token_type: impl Into<Option<String>>) -> Self {
        self.token_type = token_type.into();
        self
    }

    pub fn access_token(mut self, access_token: impl Into<Option<String>>) -> Self {
        self.access_token = access_token.into();
        self
    }

    /// Seconds from now.
    pub fn expires_in(mut self, expires_in: Option<i64>) -> Self {
        self.expires_in = expires_in;
        self
    }

    /// Absolute, milliseconds since the epoch. Wins over `expires_in`.
    pub fn expires_at(mut self, expires_at: Option<i64>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn id_token(mut self, id_token: impl Into<Option<String>>) -> Self {
        self.id_token = id_token.into();
        self
    }

    pub fn refresh_token(mut self, refresh_token: impl Into<Option<String>>) -> Self {
        self.refresh_token = refresh_token.into();
        self
    }

    pub fn scope(mut self, scope: Option<&str>) -> Self {
        self.scope = scope.and_then(Scope::normalize);
        self
    }

    pub fn additional_parameters(mut self, additional_parameters: AdditionalParameters) -> Self {
        self.additional_parameters = additional_parameters;
        self
    }

    pub fn build(self, clock: &dyn Clock) -> Result<TokenResponse, UsageError> {
        check_additional_params(&self.additional_parameters, RESPONSE_BUILT_IN_PARAMS)?;
        Ok(self.assemble(clock))
    }

    fn assemble(self, clock: &dyn Clock) -> TokenResponse {
        let access_token_expiration_time = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| expiry_from_now(clock, secs)));
        TokenResponse {
            request: self.request,
            token_type: self.token_type,
            access_token: self.access_token,
            expires_in: self.expires_in,
            expires_at: self.expires_at,
            access_token_expiration_time,
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            scope: self.scope,
            additional_parameters: self.additional_parameters,
        }
    }
}
