//! RP-initiated logout (OpenID Connect RP-Initiated Logout 1.0).

use url::Url;

use crate::auth::error::{AuthorizationException, PARAM_ERROR};
use crate::auth::verify_state;
use crate::core::{error::UsageError, models::AuthorizationServiceConfiguration};
use crate::util::params::{
    append_parameter, check_additional_params, query_parameters, AdditionalParameters,
};
use crate::util::random::generate_random_state;

pub mod params {
    pub const STATE: &str = "state";
    pub const UI_LOCALES: &str = "ui_locales";
    pub const ID_TOKEN_HINT: &str = "id_token_hint";
    pub const POST_LOGOUT_REDIRECT_URI: &str = "post_logout_redirect_uri";
}

const BUILT_IN_PARAMS: &[&str] = &[
    params::STATE,
    params::UI_LOCALES,
    params::ID_TOKEN_HINT,
    params::POST_LOGOUT_REDIRECT_URI,
];

#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct EndSessionRequest {
    configuration: AuthorizationServiceConfiguration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    post_logout_redirect_uri: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ui_locales: Option<String>,
    #[serde(default)]
    additional_parameters: AdditionalParameters,
}

impl EndSessionRequest {
    pub fn builder(configuration: AuthorizationServiceConfiguration) -> EndSessionRequestBuilder {
        EndSessionRequestBuilder::new(configuration)
    }

    pub fn configuration(&self) -> &AuthorizationServiceConfiguration {
        &self.configuration
    }

    pub fn id_token_hint(&self) -> Option<&str> {
        self.id_token_hint.as_deref()
    }

    pub fn post_logout_redirect_uri(&self) -> Option<&Url> {
        self.post_logout_redirect_uri.as_ref()
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn ui_locales(&self) -> Option<&str> {
        self.ui_locales.as_deref()
    }

    pub fn additional_parameters(&self) -> &AdditionalParameters {
        &self.additional_parameters
    }

    /// `None` when the provider has no end-session endpoint.
    pub fn to_uri(&self) -> Option<Url> {
        let mut uri = self.configuration.end_session_endpoint.clone()?;
        append_parameter(&mut uri, params::STATE, self.state());
        append_parameter(&mut uri, params::UI_LOCALES, self.ui_locales());
        append_parameter(&mut uri, params::ID_TOKEN_HINT, self.id_token_hint());
        append_parameter(
            &mut uri,
            params::POST_LOGOUT_REDIRECT_URI,
            self.post_logout_redirect_uri.as_ref().map(Url::as_str),
        );
        for (key, value) in &self.additional_parameters {
            append_parameter(&mut uri, key, Some(value));
        }
        Some(uri)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone)]
pub struct EndSessionRequestBuilder {
    configuration: AuthorizationServiceConfiguration,
    id_token_hint: Option<String>,
    post_logout_redirect_uri: Option<Url>,
    state: Option<String>,
    ui_locales: Option<String>,
    additional_parameters: AdditionalParameters,
}

impl EndSessionRequestBuilder {
    pub fn new(configuration: AuthorizationServiceConfiguration) -> Self {
        Self {
            configuration,
            id_token_hint: None,
            post_logout_redirect_uri: None,
            state: Some(generate_random_state()),
            ui_locales: None,
            additional_parameters: AdditionalParameters::new(),
        }
    }

    pub fn id_token_hint(mut self, id_token_hint: impl Into<Option<String>>) -> Self {
        self.id_token_hint = id_token_hint.into();
        self
    }

    pub fn post_logout_redirect_uri(mut self, uri: impl Into<Option<Url>>) -> Self {
        self.post_logout_redirect_uri = uri.into();
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

    pub fn ui_locales(mut self, ui_locales: impl Into<String>) -> Self {
        self.ui_locales = Some(ui_locales.into());
        self
    }

    pub fn additional_parameters(mut self, additional_parameters: AdditionalParameters) -> Self {
        self.additional_parameters = additional_parameters;
        self
    }

    pub fn build(self) -> Result<EndSessionRequest, UsageError> {
        check_additional_params(&self.additional_parameters, BUILT_IN_PARAMS)?;
        Ok(EndSessionRequest {
            configuration: self.configuration,
            id_token_hint: self.id_token_hint,
            post_logout_redirect_uri: self.post_logout_redirect_uri,
            state: self.state,
            ui_locales: self.ui_locales,
            additional_parameters: self.additional_parameters,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct EndSessionResponse {
    request: EndSessionRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<String>,
}

impl EndSessionResponse {
    pub fn new(request: EndSessionRequest, state: Option<String>) -> Self {
        Self { request, state }
    }

    pub fn from_uri(request: EndSessionRequest, uri: &Url) -> Self {
        let state = query_parameters(uri).shift_remove(params::STATE);
        Self { request, state }
    }

    /// Same rules as an authorization redirect: `error` wins, then `state` must match.
    pub fn from_redirect(request: EndSessionRequest, uri: &Url) -> Result<Self, AuthorizationException> {
        if uri.query_pairs().any(|(k, _)| k == PARAM_ERROR) {
            return Err(AuthorizationException::from_oauth_redirect(uri));
        }
        let response = Self::from_uri(request, uri);
        verify_state(response.request.state(), response.state())?;
        Ok(response)
    }

    pub fn request(&self) -> &EndSessionRequest {
        &self.request
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
