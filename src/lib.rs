pub mod auth;
pub mod core;
pub mod http;
pub mod oidc;
pub mod provider;
pub mod state;
pub mod util;
