use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// OAuth 2.0 grant types understood by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    Implicit,
    /// Extension grant, carried verbatim.
    Other(String),
}

impl GrantType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::Implicit => "implicit",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "authorization_code" => Self::AuthorizationCode,
            "refresh_token" => Self::RefreshToken,
            "implicit" => Self::Implicit,
            other => Self::Other(other.to_string()),
        })
    }
}

impl Serialize for GrantType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for GrantType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or(Self::Other(s)))
    }
}

/// Values for the `response_type` authorization parameter.
pub mod response_type {
    /// Requests an authorization code.
    pub const CODE: &str = "code";
    /// Requests an access token via the implicit grant.
    pub const TOKEN: &str = "token";
    /// Requests an OpenID Connect ID token.
    pub const ID_TOKEN: &str = "id_token";
}

pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// A space-delimited scope list. Keeps first-seen order and drops duplicates.
#[derive(Debug, Clone, Default, Eq)]
pub struct Scope(Vec<String>);

impl Scope {
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scope = Self::default();
        for part in parts {
            let part = part.into();
            if !part.is_empty() && !scope.0.contains(&part) {
                scope.0.push(part);
            }
        }
        scope
    }

    pub fn from_delimited_parts(parts: &str) -> Self {
        Self::from_parts(parts.split_whitespace())
    }

    /// Collapses runs of whitespace; an empty scope string becomes `None`.
    pub fn normalize(scope: &str) -> Option<String> {
        let scope = Self::from_delimited_parts(scope);
        if scope.is_empty() {
            None
        } else {
            Some(scope.as_joined())
        }
    }

    pub fn as_joined(&self) -> String {
        self.0.join(" ")
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s == scope)
    }

    pub fn contains_all(&self, other: &Scope) -> bool {
        other.0.iter().all(|s| self.contains(s))
    }

    pub fn as_parts(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_openid(&self) -> bool {
        self.contains("openid")
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.contains_all(other)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_joined())
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let parts = String::deserialize(deserializer)?;
        Ok(Self::from_delimited_parts(&parts))
    }
}

impl Serialize for Scope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.as_joined())
    }
}
