use url::Url;

use crate::auth::error::{AuthorizationException, PARAM_ERROR};
use crate::auth::pkce::{self, Transformation};
use crate::auth::token::{TokenRequest, TokenRequestBuilder};
use crate::auth::verify_state;
use crate::core::{
    clock::{expiry_from_now, Clock},
    error::UsageError,
    models::AuthorizationServiceConfiguration,
    types::{GrantType, Scope},
};
use crate::util::params::{
    append_parameter, check_additional_params, query_parameters, unreserved_parameters,
    AdditionalParameters,
};
use crate::util::random::generate_random_state;

pub mod params {
    pub const CLIENT_ID: &str = "client_id";
    pub const CODE_CHALLENGE: &str = "code_challenge";
    pub const CODE_CHALLENGE_METHOD: &str = "code_challenge_method";
    pub const DISPLAY: &str = "display";
    pub const LOGIN_HINT: &str = "login_hint";
    pub const PROMPT: &str = "prompt";
    pub const UI_LOCALES: &str = "ui_locales";
    pub const REDIRECT_URI: &str = "redirect_uri";
    pub const RESPONSE_MODE: &str = "response_mode";
    pub const RESPONSE_TYPE: &str = "response_type";
    pub const SCOPE: &str = "scope";
    pub const STATE: &str = "state";
    pub const NONCE: &str = "nonce";
    pub const CLAIMS: &str = "claims";
    pub const CLAIMS_LOCALES: &str = "claims_locales";

    pub const TOKEN_TYPE: &str = "token_type";
    pub const CODE: &str = "code";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const EXPIRES_IN: &str = "expires_in";
    pub const ID_TOKEN: &str = "id_token";
}

const REQUEST_BUILT_IN_PARAMS: &[&str] = &[
    params::CLIENT_ID,
    params::CODE_CHALLENGE,
    params::CODE_CHALLENGE_METHOD,
    params::DISPLAY,
    params::LOGIN_HINT,
    params::PROMPT,
    params::UI_LOCALES,
    params::REDIRECT_URI,
    params::RESPONSE_MODE,
    params::RESPONSE_TYPE,
    params::SCOPE,
    params::STATE,
    params::NONCE,
    params::CLAIMS,
    params::CLAIMS_LOCALES,
];

const RESPONSE_BUILT_IN_PARAMS: &[&str] = &[
    params::STATE,
    params::TOKEN_TYPE,
    params::CODE,
    params::ACCESS_TOKEN,
    params::EXPIRES_IN,
    params::ID_TOKEN,
    params::SCOPE,
];

/// An OAuth 2.0 authorization request, to be opened in a browser.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct AuthorizationRequest {
    configuration: AuthorizationServiceConfiguration,
    client_id: String,
    redirect_uri: Url,
    response_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    login_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ui_locales: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    claims: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    claims_locales: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code_verifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code_verifier_challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code_verifier_challenge_method: Option<Transformation>,
    #[serde(default)]
    additional_parameters: AdditionalParameters,
}

impl AuthorizationRequest {
    pub fn builder(
        configuration: AuthorizationServiceConfiguration,
        client_id: impl Into<String>,
        redirect_uri: Url,
        response_type: impl Into<String>,
    ) -> AuthorizationRequestBuilder {
        AuthorizationRequestBuilder::new(configuration, client_id, redirect_uri, response_type)
    }

    pub fn configuration(&self) -> &AuthorizationServiceConfiguration {
        &self.configuration
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    pub fn response_type(&self) -> &str {
        &self.response_type
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn scope_set(&self) -> Option<Scope> {
        self.scope.as_deref().map(Scope::from_delimited_parts)
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    pub fn display(&self) -> Option<&str> {
        self.display.as_deref()
    }

    pub fn login_hint(&self) -> Option<&str> {
        self.login_hint.as_deref()
    }

    pub fn ui_locales(&self) -> Option<&str> {
        self.ui_locales.as_deref()
    }

    pub fn response_mode(&self) -> Option<&str> {
        self.response_mode.as_deref()
    }

    pub fn claims(&self) -> Option<&str> {
        self.claims.as_deref()
    }

    pub fn claims_locales(&self) -> Option<&str> {
        self.claims_locales.as_deref()
    }

    pub fn code_verifier(&self) -> Option<&str> {
        self.code_verifier.as_deref()
    }

    pub fn code_verifier_challenge(&self) -> Option<&str> {
        self.code_verifier_challenge.as_deref()
    }

    pub fn code_verifier_challenge_method(&self) -> Option<Transformation> {
        self.code_verifier_challenge_method
    }

    pub fn additional_parameters(&self) -> &AdditionalParameters {
        &self.additional_parameters
    }

    /// The authorization endpoint with every present parameter appended to the query.
    pub fn to_uri(&self) -> Url {
        let mut uri = self.configuration.authorization_endpoint.clone();
        append_parameter(&mut uri, params::CLIENT_ID, Some(&self.client_id));
        append_parameter(&mut uri, params::REDIRECT_URI, Some(self.redirect_uri.as_str()));
        append_parameter(&mut uri, params::RESPONSE_TYPE, Some(&self.response_type));
        append_parameter(&mut uri, params::SCOPE, self.scope());
        append_parameter(&mut uri, params::STATE, self.state());
        append_parameter(&mut uri, params::NONCE, self.nonce());
        if self.code_verifier.is_some() {
            append_parameter(&mut uri, params::CODE_CHALLENGE, self.code_verifier_challenge());
            append_parameter(
                &mut uri,
                params::CODE_CHALLENGE_METHOD,
                self.code_verifier_challenge_method.as_ref().map(Transformation::as_str),
            );
        }
        append_parameter(&mut uri, params::DISPLAY, self.display());
        append_parameter(&mut uri, params::LOGIN_HINT, self.login_hint());
        append_parameter(&mut uri, params::PROMPT, self.prompt());
        append_parameter(&mut uri, params::UI_LOCALES, self.ui_locales());
        append_parameter(&mut uri, params::RESPONSE_MODE, self.response_mode());
        append_parameter(&mut uri, params::CLAIMS, self.claims());
        append_parameter(&mut uri, params::CLAIMS_LOCALES, self.claims_locales());
        for (key, value) in &self.additional_parameters {
            append_parameter(&mut uri, key, Some(value));
        }
        uri
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Builds an [`AuthorizationRequest`].
///
/// A fresh `state`, `nonce` and PKCE code verifier are generated up front; each can be
/// replaced or dropped before [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct AuthorizationRequestBuilder {
    configuration: AuthorizationServiceConfiguration,
    client_id: String,
    redirect_uri: Url,
    response_type: String,
    scope: Option<String>,
    state: Option<String>,
    nonce: Option<String>,
    prompt: Option<String>,
    display: Option<String>,
    login_hint: Option<String>,
    ui_locales: Option<String>,
    response_mode: Option<String>,
    claims: Option<String>,
    claims_locales: Option<String>,
    code_verifier: Option<String>,
    additional_parameters: AdditionalParameters,
}

impl AuthorizationRequestBuilder {
    pub fn new(
        configuration: AuthorizationServiceConfiguration,
        client_id: impl Into<String>,
        redirect_uri: Url,
        response_type: impl Into<String>,
    ) -> Self {
        Self {
            configuration,
            client_id: client_id.into(),
            redirect_uri,
            response_type: response_type.into(),
            scope: None,
            state: Some(generate_random_state()),
            nonce: Some(generate_random_state()),
            prompt: None,
            display: None,
            login_hint: None,
            ui_locales: None,
            response_mode: None,
            claims: None,
            claims_locales: None,
            code_verifier: Some(pkce::generate_random_code_verifier()),
            additional_parameters: AdditionalParameters::new(),
        }
    }

    /// Space-delimited scope; blank input clears it.
    pub fn scope(mut self, scope: &str) -> Self {
        self.scope = Scope::normalize(scope);
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scope = Scope::from_parts(scopes);
        self.scope = (!scope.is_empty()).then(|| scope.as_joined());
        self
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn without_state(mut self) -> Self {
        self.state = None;
        self
    }

    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn without_nonce(mut self) -> Self {
        self.nonce = None;
        self
    }

    /// Checked against RFC 7636 when the request is built.
    pub fn code_verifier(mut self, code_verifier: impl Into<String>) -> Self {
        self.code_verifier = Some(code_verifier.into());
        self
    }

    pub fn without_code_verifier(mut self) -> Self {
        self.code_verifier = None;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn login_hint(mut self, login_hint: impl Into<String>) -> Self {
        self.login_hint = Some(login_hint.into());
        self
    }

    pub fn ui_locales(mut self, ui_locales: impl Into<String>) -> Self {
        self.ui_locales = Some(ui_locales.into());
        self
    }

    pub fn response_mode(mut self, response_mode: impl Into<String>) -> Self {
        self.response_mode = Some(response_mode.into());
        self
    }

    pub fn claims(mut self, claims: impl Into<String>) -> Self {
        self.claims = Some(claims.into());
        self
    }

    pub fn claims_locales(mut self, claims_locales: impl Into<String>) -> Self {
        self.claims_locales = Some(claims_locales.into());
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

    pub fn build(self) -> Result<AuthorizationRequest, UsageError> {
        if self.client_id.is_empty() {
            return Err(UsageError::MissingClientId);
        }
        check_additional_params(&self.additional_parameters, REQUEST_BUILT_IN_PARAMS)?;

        let challenge = match &self.code_verifier {
            Some(verifier) => {
                pkce::check_code_verifier(verifier)?;
                Some(pkce::derive_code_verifier_challenge(verifier))
            }
            None => None,
        };
        let (code_verifier_challenge, code_verifier_challenge_method) = match challenge {
            Some(challenge) => (Some(challenge.code), Some(challenge.method)),
            None => (None, None),
        };

        Ok(AuthorizationRequest {
            configuration: self.configuration,
            client_id: self.client_id,
            redirect_uri: self.redirect_uri,
            response_type: self.response_type,
            scope: self.scope,
            state: self.state,
            nonce: self.nonce,
            prompt: self.prompt,
            display: self.display,
            login_hint: self.login_hint,
            ui_locales: self.ui_locales,
            response_mode: self.response_mode,
            claims: self.claims,
            claims_locales: self.claims_locales,
            code_verifier: self.code_verifier,
            code_verifier_challenge,
            code_verifier_challenge_method,
            additional_parameters: self.additional_parameters,
        })
    }
}

/// What came back from the authorization endpoint on success.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct AuthorizationResponse {
    request: AuthorizationRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authorization_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token_expiration_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(default)]
    additional_parameters: AdditionalParameters,
}

impl AuthorizationResponse {
    pub fn builder(request: AuthorizationRequest) -> AuthorizationResponseBuilder {
        AuthorizationResponseBuilder::new(request)
    }

    /// Reads the success parameters of a redirect. Does not look at `error` or check `state`.
    pub fn from_uri(request: AuthorizationRequest, uri: &Url, clock: &dyn Clock) -> Self {
        AuthorizationResponseBuilder::new(request)
            .from_uri(uri, clock)
            .assemble()
    }

    /// Turns a redirect into a response, or the error it carries.
    ///
    /// An `error` parameter always wins; otherwise the returned `state` must equal the
    /// request's, both absent counting as equal.
    pub fn from_redirect(
        request: AuthorizationRequest,
        uri: &Url,
        clock: &dyn Clock,
    ) -> Result<Self, AuthorizationException> {
        if uri.query_pairs().any(|(k, _)| k == PARAM_ERROR) {
            return Err(AuthorizationException::from_oauth_redirect(uri));
        }
        let response = Self::from_uri(request, uri, clock);
        verify_state(response.request.state(), response.state())?;
        Ok(response)
    }

    pub fn request(&self) -> &AuthorizationRequest {
        &self.request
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    pub fn authorization_code(&self) -> Option<&str> {
        self.authorization_code.as_deref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Milliseconds since the epoch.
    pub fn access_token_expiration_time(&self) -> Option<i64> {
        self.access_token_expiration_time
    }

    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
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

    pub fn has_access_token_expired(&self, clock: &dyn Clock) -> bool {
        self.access_token_expiration_time
            .map_or(false, |expires| clock.current_time_millis() > expires)
    }

    /// The code-for-token exchange for this response.
    pub fn create_token_exchange_request(
        &self,
        additional_parameters: AdditionalParameters,
    ) -> Result<TokenRequest, UsageError> {
        let code = self
            .authorization_code
            .clone()
            .ok_or(UsageError::NoAuthorizationCode)?;

        TokenRequestBuilder::new(self.request.configuration().clone(), self.request.client_id())
            .grant_type(GrantType::AuthorizationCode)
            .redirect_uri(self.request.redirect_uri().clone())
            .code_verifier(self.request.code_verifier.clone())
            .authorization_code(code)
            .additional_parameters(additional_parameters)
            .nonce(self.request.nonce.clone())
            .build()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationResponseBuilder {
    request: AuthorizationRequest,
    state: Option<String>,
    token_type: Option<String>,
    authorization_code: Option<String>,
    access_token: Option<String>,
    access_token_expiration_time: Option<i64>,
    id_token: Option<String>,
    scope: Option<String>,
    additional_parameters: AdditionalParameters,
}

impl AuthorizationResponseBuilder {
    pub fn new(request: AuthorizationRequest) -> Self {
        Self {
            request,
            state: None,
            token_type: None,
            authorization_code: None,
            access_token: None,
            access_token_expiration_time: None,
            id_token: None,
            scope: None,
            additional_parameters: AdditionalParameters::new(),
        }
    }

    pub fn state(mut self, state: impl Into<Option<String>>) -> Self {
        self.state = state.into();
        self
    }

    pub fn token_type(mut self, token_type: impl Into<Option<String>>) -> Self {
        self.token_type = token_type.into();
        self
    }

    pub fn authorization_code(mut self, code: impl Into<Option<String>>) -> Self {
        self.authorization_code = code.into();
        self
    }

    pub fn access_token(mut self, access_token: impl Into<Option<String>>) -> Self {
        self.access_token = access_token.into();
        self
    }

    /// Relative lifetime in seconds, made absolute against `clock`.
    pub fn access_token_expires_in(mut self, expires_in: Option<i64>, clock: &dyn Clock) -> Self {
        self.access_token_expiration_time = expires_in.map(|secs| expiry_from_now(clock, secs));
        self
    }

    pub fn access_token_expiration_time(mut self, millis: Option<i64>) -> Self {
        self.access_token_expiration_time = millis;
        self
    }

    pub fn id_token(mut self, id_token: impl Into<Option<String>>) -> Self {
        self.id_token = id_token.into();
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

    pub fn from_uri(self, uri: &Url, clock: &dyn Clock) -> Self {
        let mut query = query_parameters(uri);
        let additional = unreserved_parameters(&query, RESPONSE_BUILT_IN_PARAMS);
        let expires_in = query
            .get(params::EXPIRES_IN)
            .and_then(|v| v.parse::<i64>().ok());
        let scope = query.shift_remove(params::SCOPE);

        self.state(query.shift_remove(params::STATE))
            .token_type(query.shift_remove(params::TOKEN_TYPE))
            .authorization_code(query.shift_remove(params::CODE))
            .access_token(query.shift_remove(params::ACCESS_TOKEN))
            .access_token_expires_in(expires_in, clock)
            .id_token(query.shift_remove(params::ID_TOKEN))
            .scope(scope.as_deref())
            .additional_parameters(additional)
    }

    pub fn build(self) -> Result<AuthorizationResponse, UsageError> {
        check_additional_params(&self.additional_parameters, RESPONSE_BUILT_IN_PARAMS)?;
        Ok(self.assemble())
    }

    fn assemble(self) -> AuthorizationResponse {
        AuthorizationResponse {
            request: self.request,
            state: self.state,
            token_type: self.token_type,
            authorization_code: self.authorization_code,
            access_token: self.access_token,
            access_token_expiration_time: self.access_token_expiration_time,
            id_token: self.id_token,
            scope: self.scope,
            additional_parameters: self.additional_parameters,
        }
    }
}
