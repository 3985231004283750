pub mod config;
pub mod error;

use std::sync::Arc;

use tracing::{event, warn, Level};
use url::Url;

use crate::auth::error::{general_errors, registration_errors, token_errors, AuthorizationException};
use crate::auth::registration::RegistrationParseError;
use crate::auth::{RegistrationRequest, RegistrationResponse, TokenRequest, TokenResponse};
use crate::core::{
    clock::{Clock, SystemClock},
    models::{discovery_uri_for_issuer, AuthorizationServiceConfiguration},
};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::oidc::{AuthorizationServiceDiscovery, IdToken};

pub use config::{ServiceConfig, SignaturePolicy};
use error::{exception_for_response, ResultExt};

/// Talks to the provider's discovery, token and registration endpoints.
///
/// Every failure comes back as a catalogued [`AuthorizationException`]. Nothing is retried.
pub struct AuthorizationService<T: HttpTransport> {
    transport: T,
    config: ServiceConfig,
    clock: Arc<dyn Clock>,
}

impl<T: HttpTransport> AuthorizationService<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ServiceConfig::default())
    }

    pub fn with_config(transport: T, config: ServiceConfig) -> Self {
        Self {
            transport,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Fetches and parses an OpenID Provider configuration document.
    #[tracing::instrument(skip(self, discovery_uri), fields(uri = %discovery_uri))]
    pub async fn fetch_configuration(
        &self,
        discovery_uri: &Url,
    ) -> Result<AuthorizationServiceConfiguration, AuthorizationException> {
        let response = self.send(HttpRequest::get(discovery_uri.clone())).await?;
        if !response.is_success() {
            warn!(status = response.status, "discovery request failed");
            return Err(AuthorizationException::from_template(
                &general_errors::NETWORK_ERROR,
                format!("HTTP {}", response.status),
            ));
        }

        let discovery = AuthorizationServiceDiscovery::from_json(&response.text())
            .or_exception(&general_errors::INVALID_DISCOVERY_DOCUMENT)?;
        event!(Level::DEBUG, issuer = %discovery.issuer, "discovered provider");
        Ok(AuthorizationServiceConfiguration::from_discovery(discovery))
    }

    /// Discovery from `{issuer}/.well-known/openid-configuration`.
    pub async fn fetch_from_issuer(
        &self,
        issuer: &Url,
    ) -> Result<AuthorizationServiceConfiguration, AuthorizationException> {
        self.fetch_configuration(&discovery_uri_for_issuer(issuer)).await
    }

    /// Runs a token request and validates any ID token in the response.
    ///
    /// A response whose ID token fails validation is not returned.
    #[tracing::instrument(skip(self, request), fields(grant_type = %request.grant_type()))]
    pub async fn perform_token_request(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, AuthorizationException> {
        let endpoint = request.configuration().token_endpoint.clone();
        let response = self
            .send(HttpRequest::post_form(endpoint, request.form_body()))
            .await?;
        if !response.is_success() {
            let ex = exception_for_response(
                &response,
                token_errors::by_string,
                &general_errors::SERVER_ERROR,
            );
            warn!(status = response.status, code = ex.code, "token request refused");
            return Err(ex);
        }

        let token = TokenResponse::from_json_body(request, &response.text(), self.clock())
            .or_exception(&general_errors::JSON_DESERIALIZATION_ERROR)?;

        if let Some(id_token) = token.id_token() {
            IdToken::parse(id_token)?.validate_with(
                token.request(),
                self.clock(),
                self.config.skip_issuer_https_check,
            )?;
        }
        event!(Level::DEBUG, has_refresh_token = token.refresh_token().is_some(), "token response accepted");
        Ok(token)
    }

    /// Registers this client with the provider's registration endpoint.
    #[tracing::instrument(skip(self, request))]
    pub async fn perform_registration_request(
        &self,
        request: RegistrationRequest,
    ) -> Result<RegistrationResponse, AuthorizationException> {
        let endpoint = request
            .configuration()
            .registration_endpoint
            .clone()
            .ok_or_else(|| {
                AuthorizationException::from_template(
                    &general_errors::INVALID_REGISTRATION_RESPONSE,
                    "provider has no registration endpoint",
                )
            })?;
        let response = self
            .send(HttpRequest::post_json(endpoint, &request.to_wire_json()))
            .await?;
        if !response.is_success() {
            let ex = exception_for_response(
                &response,
                registration_errors::by_string,
                &general_errors::SERVER_ERROR,
            );
            warn!(status = response.status, code = ex.code, "registration refused");
            return Err(ex);
        }

        RegistrationResponse::from_json_body(request, &response.text()).map_err(|e| match e {
            RegistrationParseError::Json(_) => {
                AuthorizationException::from_template(&general_errors::JSON_DESERIALIZATION_ERROR, e)
            }
            RegistrationParseError::MissingClientId => {
                AuthorizationException::from_template(&general_errors::INVALID_REGISTRATION_RESPONSE, e)
            }
        })
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AuthorizationException> {
        let request = request.with_timeout(self.config.request_timeout);
        self.transport.execute(request).await.map_err(|e| {
            warn!(error = %e, "transport failure");
            AuthorizationException::from_template(&general_errors::NETWORK_ERROR, e)
        })
    }
}
