use url::Url;

pub mod authorization;
pub mod end_session;
pub mod error;
pub mod pkce;
pub mod registration;
pub mod token;

pub use authorization::{
    AuthorizationRequest, AuthorizationRequestBuilder, AuthorizationResponse,
    AuthorizationResponseBuilder,
};
pub use end_session::{EndSessionRequest, EndSessionRequestBuilder, EndSessionResponse};
pub use error::AuthorizationException;
pub use registration::{
    RegistrationRequest, RegistrationRequestBuilder, RegistrationResponse,
    RegistrationResponseBuilder,
};
pub use token::{TokenRequest, TokenRequestBuilder, TokenResponse, TokenResponseBuilder};

use crate::core::clock::Clock;
use error::{authorization_errors, general_errors};

/// A request that is completed by sending the user agent to the provider and back.
pub trait AuthorizationManagementRequest {
    fn state(&self) -> Option<&str>;

    /// Where to send the user agent, if the provider supports this kind of request.
    fn request_uri(&self) -> Option<Url>;

    fn to_json(&self) -> Result<String, serde_json::Error>;
}

impl AuthorizationManagementRequest for AuthorizationRequest {
    fn state(&self) -> Option<&str> {
        AuthorizationRequest::state(self)
    }

    fn request_uri(&self) -> Option<Url> {
        Some(self.to_uri())
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        AuthorizationRequest::to_json(self)
    }
}

impl AuthorizationManagementRequest for EndSessionRequest {
    fn state(&self) -> Option<&str> {
        EndSessionRequest::state(self)
    }

    fn request_uri(&self) -> Option<Url> {
        self.to_uri()
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        EndSessionRequest::to_json(self)
    }
}

/// A pending browser round trip, as stored while the user is away.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "request")]
#[serde(rename_all = "snake_case")]
pub enum ManagementRequest {
    Authorization(AuthorizationRequest),
    EndSession(EndSessionRequest),
}

#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "response")]
#[serde(rename_all = "snake_case")]
pub enum ManagementResponse {
    Authorization(AuthorizationResponse),
    EndSession(EndSessionResponse),
}

/// How the browser round trip ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// The provider redirected back to this URI.
    Completed(Url),
    UserCanceled,
    ProgramCanceled,
}

impl ManagementRequest {
    pub fn state(&self) -> Option<&str> {
        self.as_request().state()
    }

    pub fn request_uri(&self) -> Option<Url> {
        self.as_request().request_uri()
    }

    fn as_request(&self) -> &dyn AuthorizationManagementRequest {
        match self {
            Self::Authorization(request) => request,
            Self::EndSession(request) => request,
        }
    }

    /// Produces the response matching this request, or the error the round trip ended with.
    pub fn complete(
        self,
        outcome: RedirectOutcome,
        clock: &dyn Clock,
    ) -> Result<ManagementResponse, AuthorizationException> {
        let uri = match outcome {
            RedirectOutcome::Completed(uri) => uri,
            RedirectOutcome::UserCanceled => return Err(general_errors::USER_CANCELED_AUTH_FLOW),
            RedirectOutcome::ProgramCanceled => {
                return Err(general_errors::PROGRAM_CANCELED_AUTH_FLOW)
            }
        };
        match self {
            Self::Authorization(request) => {
                AuthorizationResponse::from_redirect(request, &uri, clock)
                    .map(ManagementResponse::Authorization)
            }
            Self::EndSession(request) => {
                EndSessionResponse::from_redirect(request, &uri).map(ManagementResponse::EndSession)
            }
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl From<AuthorizationRequest> for ManagementRequest {
    fn from(request: AuthorizationRequest) -> Self {
        Self::Authorization(request)
    }
}

impl From<EndSessionRequest> for ManagementRequest {
    fn from(request: EndSessionRequest) -> Self {
        Self::EndSession(request)
    }
}

impl ManagementResponse {
    pub fn state(&self) -> Option<&str> {
        match self {
            Self::Authorization(response) => response.state(),
            Self::EndSession(response) => response.state(),
        }
    }
}

/// CSRF check between the state sent and the state returned.
///
/// Any difference is a mismatch, including one side being absent.
pub fn verify_state(expected: Option<&str>, actual: Option<&str>) -> Result<(), AuthorizationException> {
    if expected == actual {
        Ok(())
    } else {
        Err(authorization_errors::STATE_MISMATCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{clock::FixedClock, models::AuthorizationServiceConfiguration};

    fn configuration() -> AuthorizationServiceConfiguration {
        AuthorizationServiceConfiguration::new(
            Url::parse("https://idp.example.com/authorize").unwrap(),
            Url::parse("https://idp.example.com/token").unwrap(),
        )
        .with_end_session_endpoint(Url::parse("https://idp.example.com/logout").unwrap())
    }

    fn pending_authorization() -> ManagementRequest {
        AuthorizationRequest::builder(
            configuration(),
            "c1",
            Url::parse("https://app/cb").unwrap(),
            "code",
        )
        .state("s1")
        .build()
        .unwrap()
        .into()
    }

    #[test]
    fn state_comparison_is_strict() {
        assert!(verify_state(Some("a"), Some("a")).is_ok());
        assert!(verify_state(None, None).is_ok());
        assert!(verify_state(Some("a"), None).is_err());
        assert!(verify_state(None, Some("a")).is_err());
        assert!(verify_state(Some("a"), Some("b")).is_err());
    }

    #[test]
    fn cancellation_maps_to_general_errors() {
        let clock = FixedClock(0);
        assert_eq!(
            pending_authorization().complete(RedirectOutcome::UserCanceled, &clock),
            Err(general_errors::USER_CANCELED_AUTH_FLOW)
        );
        assert_eq!(
            pending_authorization().complete(RedirectOutcome::ProgramCanceled, &clock),
            Err(general_errors::PROGRAM_CANCELED_AUTH_FLOW)
        );
    }

    #[test]
    fn dispatches_on_request_kind() {
        let clock = FixedClock(0);
        let uri = Url::parse("https://app/cb?code=abc&state=s1").unwrap();
        match pending_authorization().complete(RedirectOutcome::Completed(uri), &clock) {
            Ok(ManagementResponse::Authorization(response)) => {
                assert_eq!(response.authorization_code(), Some("abc"))
            }
            other => panic!("unexpected {:?}", other),
        }

        let end_session: ManagementRequest = EndSessionRequest::builder(configuration())
            .state("s2")
            .build()
            .unwrap()
            .into();
        assert!(end_session.request_uri().is_some());
        let uri = Url::parse("https://app/bye?state=s2").unwrap();
        assert!(matches!(
            end_session.complete(RedirectOutcome::Completed(uri), &clock),
            Ok(ManagementResponse::EndSession(_))
        ));
    }

    #[test]
    fn pending_request_survives_json() {
        let pending = pending_authorization();
        let json = pending.to_json().unwrap();
        assert!(json.contains("\"type\":\"authorization\""));
        assert_eq!(ManagementRequest::from_json(&json).unwrap(), pending);
    }
}
