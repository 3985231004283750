use url::Url;

use crate::oidc::AuthorizationServiceDiscovery;

pub const WELL_KNOWN_PATH: &str = ".well-known";
pub const OPENID_CONFIGURATION_RESOURCE: &str = "openid-configuration";

/// Endpoints of an authorization server, either hand-configured or discovered.
///
/// When `discovery` is present the provider was discovered and ID tokens it issues are
/// validated against the discovered issuer.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct AuthorizationServiceConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "userinfo_endpoint")]
    pub user_info_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<AuthorizationServiceDiscovery>,
}

impl AuthorizationServiceConfiguration {
    pub fn new(authorization_endpoint: Url, token_endpoint: Url) -> Self {
        Self {
            issuer: None,
            authorization_endpoint,
            token_endpoint,
            end_session_endpoint: None,
            registration_endpoint: None,
            user_info_endpoint: None,
            discovery: None,
        }
    }

    pub fn from_discovery(discovery: AuthorizationServiceDiscovery) -> Self {
        Self {
            issuer: Some(discovery.issuer.clone()),
            authorization_endpoint: discovery.authorization_endpoint.clone(),
            token_endpoint: discovery.token_endpoint.clone(),
            end_session_endpoint: discovery.end_session_endpoint.clone(),
            registration_endpoint: discovery.registration_endpoint.clone(),
            user_info_endpoint: discovery.userinfo_endpoint.clone(),
            discovery: Some(discovery),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_end_session_endpoint(mut self, endpoint: Url) -> Self {
        self.end_session_endpoint = Some(endpoint);
        self
    }

    pub fn with_registration_endpoint(mut self, endpoint: Url) -> Self {
        self.registration_endpoint = Some(endpoint);
        self
    }

    pub fn with_user_info_endpoint(mut self, endpoint: Url) -> Self {
        self.user_info_endpoint = Some(endpoint);
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// `{issuer}/.well-known/openid-configuration`, keeping any issuer path.
pub fn discovery_uri_for_issuer(issuer: &Url) -> Url {
    let mut uri = issuer.clone();
    uri.set_query(None);
    uri.set_fragment(None);
    let path = uri.path().trim_end_matches('/').to_string();
    uri.set_path(&format!(
        "{}/{}/{}",
        path, WELL_KNOWN_PATH, OPENID_CONFIGURATION_RESOURCE
    ));
    uri
}
