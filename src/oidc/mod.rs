pub mod id_token;
pub mod models;
pub mod types;

pub use id_token::{IdToken, IdTokenError};
pub use models::AuthorizationServiceDiscovery;
pub use types::{Display, Prompt, UnknownValue};
