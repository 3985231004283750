use crate::auth::pkce::PkceError;

/// Contract violations by the calling code.
///
/// These are bugs in the caller, never protocol refusals, and are kept out of the
/// [`AuthorizationException`](crate::auth::error::AuthorizationException) catalogue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("parameter {0} is directly supported via the builder, use the builder method instead")]
    ReservedParameter(String),

    #[error(transparent)]
    Pkce(#[from] PkceError),

    #[error("grant type not specified and cannot be inferred")]
    GrantTypeUnresolvable,

    #[error("authorization code must be specified for grant_type = authorization_code")]
    MissingAuthorizationCode,

    #[error("no redirect URI specified on token request for code exchange")]
    MissingRedirectUri,

    #[error("refresh token must be specified for grant_type = refresh_token")]
    MissingRefreshToken,

    #[error("client_id is required")]
    MissingClientId,

    #[error("exactly one of {0} should be present")]
    ExactlyOneOf(&'static str),

    #[error("authorization code not available for exchange request")]
    NoAuthorizationCode,

    #[error("no refresh token available for refresh request")]
    NoRefreshToken,

    #[error("no authorization response available for refresh request")]
    NoAuthorizationResponse,
}
