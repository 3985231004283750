//! The client's session: what it currently knows about its authorization.

pub mod manager;

pub use manager::{AuthStateManager, FileStateStore, MemoryStateStore, StateError, StateStore, StoreError};

use tracing::{event, warn, Level};

use crate::auth::error::AuthorizationException;
use crate::auth::{AuthorizationResponse, RegistrationResponse, TokenRequest, TokenResponse};
use crate::core::{
    clock::Clock,
    error::UsageError,
    models::AuthorizationServiceConfiguration,
    types::GrantType,
};
use crate::oidc::IdToken;
use crate::util::params::AdditionalParameters;

/// Access tokens expiring within this window already count as expired.
pub const EXPIRY_TIME_TOLERANCE_MS: i64 = 60_000;

/// An immutable snapshot of the session.
///
/// Every update returns a new snapshot; the host decides where the current one lives.
/// Only authorization-endpoint refusals are kept in `authorization_exception`, and only a
/// later successful authorization response clears it.
#[derive(Debug, Clone, Default, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct AuthState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_authorization_response: Option<AuthorizationResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_token_response: Option<TokenResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_registration_response: Option<RegistrationResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    config: Option<AuthorizationServiceConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authorization_exception: Option<AuthorizationException>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    needs_token_refresh: bool,
}

impl AuthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session whose provider is known but which has not been authorized yet.
    pub fn with_configuration(config: AuthorizationServiceConfiguration) -> Self {
        Self {
            config: Some(config),
            ..Self::default()
        }
    }

    pub fn from_authorization(
        response: Option<AuthorizationResponse>,
        ex: Option<AuthorizationException>,
    ) -> Result<Self, UsageError> {
        Self::default().update_authorization(response, ex)
    }

    pub fn from_token(
        authorization: AuthorizationResponse,
        response: Option<TokenResponse>,
        ex: Option<AuthorizationException>,
    ) -> Result<Self, UsageError> {
        Self::default()
            .update_authorization(Some(authorization), None)?
            .update_token(response, ex)
    }

    pub fn from_registration(response: RegistrationResponse) -> Self {
        Self::default().update_registration(response)
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn last_authorization_response(&self) -> Option<&AuthorizationResponse> {
        self.last_authorization_response.as_ref()
    }

    pub fn last_token_response(&self) -> Option<&TokenResponse> {
        self.last_token_response.as_ref()
    }

    pub fn last_registration_response(&self) -> Option<&RegistrationResponse> {
        self.last_registration_response.as_ref()
    }

    pub fn authorization_exception(&self) -> Option<&AuthorizationException> {
        self.authorization_exception.as_ref()
    }

    /// The configuration of the last authorization request, else the stored one.
    pub fn authorization_service_configuration(&self) -> Option<&AuthorizationServiceConfiguration> {
        self.last_authorization_response
            .as_ref()
            .map(|r| r.request().configuration())
            .or(self.config.as_ref())
    }

    pub fn access_token(&self) -> Option<&str> {
        self.last_token_response
            .as_ref()
            .and_then(TokenResponse::access_token)
            .or_else(|| {
                self.last_authorization_response
                    .as_ref()
                    .and_then(AuthorizationResponse::access_token)
            })
    }

    /// Milliseconds since the epoch.
    pub fn access_token_expiration_time(&self) -> Option<i64> {
        self.last_token_response
            .as_ref()
            .and_then(TokenResponse::access_token_expiration_time)
            .or_else(|| {
                self.last_authorization_response
                    .as_ref()
                    .and_then(AuthorizationResponse::access_token_expiration_time)
            })
    }

    pub fn id_token(&self) -> Option<&str> {
        self.last_token_response
            .as_ref()
            .and_then(TokenResponse::id_token)
            .or_else(|| {
                self.last_authorization_response
                    .as_ref()
                    .and_then(AuthorizationResponse::id_token)
            })
    }

    /// The current ID token's claims, if it decodes.
    pub fn parsed_id_token(&self) -> Option<IdToken> {
        self.id_token().and_then(|t| IdToken::from_compact(t).ok())
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.last_registration_response
            .as_ref()
            .and_then(RegistrationResponse::client_secret)
    }

    /// Seconds since the epoch; 0 means never.
    pub fn client_secret_expiration_time(&self) -> Option<i64> {
        self.last_registration_response
            .as_ref()
            .and_then(RegistrationResponse::client_secret_expires_at)
    }

    pub fn has_client_secret_expired(&self, clock: &dyn Clock) -> bool {
        match self.client_secret_expiration_time() {
            None | Some(0) => false,
            Some(expires) => expires <= clock.current_time_secs(),
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.authorization_exception.is_none()
            && (self.access_token().is_some() || self.id_token().is_some())
    }

    /// True when forced, when there is no access token, or when it expires within a minute.
    pub fn needs_token_refresh(&self, clock: &dyn Clock) -> bool {
        if self.needs_token_refresh {
            return true;
        }
        match self.access_token_expiration_time() {
            Some(expires) => expires <= clock.current_time_millis() + EXPIRY_TIME_TOLERANCE_MS,
            None => self.access_token().is_none(),
        }
    }

    pub fn with_needs_token_refresh(&self, needs_token_refresh: bool) -> Self {
        Self {
            needs_token_refresh,
            ..self.clone()
        }
    }

    /// Folds in the outcome of an authorization round trip.
    ///
    /// Exactly one of `response` and `ex` must be given. An authorization-endpoint error
    /// becomes the sticky exception; any other error drops the last response and its scope.
    pub fn update_authorization(
        &self,
        response: Option<AuthorizationResponse>,
        ex: Option<AuthorizationException>,
    ) -> Result<Self, UsageError> {
        match (response, ex) {
            (Some(response), None) => Ok(self.apply_authorization(Ok(response))),
            (None, Some(ex)) => Ok(self.apply_authorization(Err(ex))),
            _ => Err(UsageError::ExactlyOneOf("authorization response or exception")),
        }
    }

    /// Folds in the outcome of a token request. Same rules as
    /// [`update_authorization`](Self::update_authorization), except that a successful
    /// response does not clear the sticky exception.
    pub fn update_token(
        &self,
        response: Option<TokenResponse>,
        ex: Option<AuthorizationException>,
    ) -> Result<Self, UsageError> {
        match (response, ex) {
            (Some(response), None) => Ok(self.apply_token(Ok(response))),
            (None, Some(ex)) => Ok(self.apply_token(Err(ex))),
            _ => Err(UsageError::ExactlyOneOf("token response or exception")),
        }
    }

    pub fn apply_authorization(&self, result: Result<AuthorizationResponse, AuthorizationException>) -> Self {
        let response = match result {
            Ok(response) => response,
            Err(ex) if ex.is_authorization_error() => return self.with_authorization_exception(ex),
            Err(ex) => {
                event!(Level::DEBUG, error = %ex, "authorization failed, dropping last response");
                return Self {
                    scope: None,
                    last_authorization_response: None,
                    ..self.clone()
                };
            }
        };
        let scope = response
            .scope()
            .or_else(|| response.request().scope())
            .map(str::to_string);
        Self {
            scope,
            last_authorization_response: Some(response),
            authorization_exception: None,
            ..self.clone()
        }
    }

    /// The token, refresh token and scope all come from the response. A response without
    /// a refresh token leaves the state without one.
    pub fn apply_token(&self, result: Result<TokenResponse, AuthorizationException>) -> Self {
        let response = match result {
            Ok(response) => Some(response),
            Err(ex) if ex.is_authorization_error() => return self.with_authorization_exception(ex),
            Err(ex) => {
                event!(Level::DEBUG, error = %ex, "token request failed, dropping tokens");
                None
            }
        };
        Self {
            scope: response.as_ref().and_then(|r| r.scope()).map(str::to_string),
            refresh_token: response.as_ref().and_then(|r| r.refresh_token()).map(str::to_string),
            needs_token_refresh: response.is_none() && self.needs_token_refresh,
            last_token_response: response,
            ..self.clone()
        }
    }

    /// Records a registration and pins the configuration it was made against.
    pub fn update_registration(&self, response: RegistrationResponse) -> Self {
        Self {
            config: self.authorization_service_configuration().cloned(),
            last_registration_response: Some(response),
            ..self.clone()
        }
    }

    fn with_authorization_exception(&self, ex: AuthorizationException) -> Self {
        Self {
            authorization_exception: Some(ex),
            ..self.clone()
        }
    }

    /// A refresh-token grant against the provider of the last authorization.
    pub fn create_token_refresh(
        &self,
        additional_parameters: AdditionalParameters,
    ) -> Result<TokenRequest, UsageError> {
        let refresh_token = self.refresh_token.clone().ok_or(UsageError::NoRefreshToken)?;
        let authorization = self
            .last_authorization_response
            .as_ref()
            .ok_or(UsageError::NoAuthorizationResponse)?;
        let request = authorization.request();

        TokenRequest::builder(request.configuration().clone(), request.client_id())
            .grant_type(GrantType::RefreshToken)
            .scope(self.scope.as_deref())
            .refresh_token(refresh_token)
            .additional_parameters(additional_parameters)
            .build()
    }

    /// Logging out forgets everything.
    pub fn logout(&self) -> Self {
        Self::default()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Like [`from_json`](Self::from_json), but anything unreadable is a fresh session.
    pub fn from_json_or_default(json: Option<&str>) -> Self {
        match json {
            Some(json) => Self::from_json(json).unwrap_or_else(|e| {
                warn!(error = %e, "discarding malformed stored auth state");
                Self::default()
            }),
            None => Self::default(),
        }
    }
}
