// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Connection authentication
//!
//! Bolt clients present an auth token (`scheme`, `principal`,
//! `credentials`) in HELLO or LOGON. The server hands it to an
//! [`Authenticator`]; the only built-in one compares against a single
//! configured user.

use crate::config::AuthConfig;
use crate::error::{codes, Neo4jStatus};
use crate::storage::Value;
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("The client is unauthorized due to authentication failure.")]
    InvalidCredentials,

    #[error("Unsupported authentication scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("Authentication required")]
    Required,
}

impl Neo4jStatus for AuthError {
    fn status_code(&self) -> &'static str {
        codes::UNAUTHORIZED
    }
}

/// Credentials presented by a client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthToken {
    pub scheme: String,
    pub principal: String,
    pub credentials: String,
}

impl AuthToken {
    /// Pull the auth fields out of a HELLO or LOGON map
    pub fn from_map(map: &BTreeMap<String, Value>) -> Self {
        let field = |name: &str| {
            map.get(name)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Self {
            scheme: field("scheme"),
            principal: field("principal"),
            credentials: field("credentials"),
        }
    }

    pub fn basic(principal: &str, credentials: &str) -> Self {
        Self {
            scheme: "basic".to_string(),
            principal: principal.to_string(),
            credentials: credentials.to_string(),
        }
    }
}

impl std::fmt::Display for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print credentials
        write!(f, "{}:{}", self.scheme, self.principal)
    }
}

/// Identity of an authenticated connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &AuthToken) -> Result<Principal, AuthError>;
}

/// Accepts every token, including scheme `none`
#[derive(Debug, Default, Clone)]
pub struct AllowAll;

#[async_trait]
impl Authenticator for AllowAll {
    async fn authenticate(&self, token: &AuthToken) -> Result<Principal, AuthError> {
        let username = if token.principal.is_empty() {
            "anonymous".to_string()
        } else {
            token.principal.clone()
        };
        Ok(Principal { username })
    }
}

/// Single configured user with `basic` auth
#[derive(Debug, Clone)]
pub struct StaticAuthenticator {
    username: String,
    password: String,
}

impl StaticAuthenticator {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, token: &AuthToken) -> Result<Principal, AuthError> {
        match token.scheme.as_str() {
            "basic" => {
                if token.principal == self.username && token.credentials == self.password {
                    Ok(Principal {
                        username: token.principal.clone(),
                    })
                } else {
                    Err(AuthError::InvalidCredentials)
                }
            }
            "none" | "" => Err(AuthError::Required),
            other => Err(AuthError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Authenticator matching the `[server.auth]` settings
pub fn from_config(config: &AuthConfig) -> std::sync::Arc<dyn Authenticator> {
    if config.enabled {
        std::sync::Arc::new(StaticAuthenticator::new(
            config.username.clone(),
            config.password.clone(),
        ))
    } else {
        std::sync::Arc::new(AllowAll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_authenticator() {
        let auth = StaticAuthenticator::new("neo4j", "secret");
        assert_eq!(
            auth.authenticate(&AuthToken::basic("neo4j", "secret"))
                .await
                .unwrap()
                .username,
            "neo4j"
        );
        assert_eq!(
            auth.authenticate(&AuthToken::basic("neo4j", "wrong")).await,
            Err(AuthError::InvalidCredentials)
        );
        let none = AuthToken {
            scheme: "none".to_string(),
            ..AuthToken::default()
        };
        assert_eq!(auth.authenticate(&none).await, Err(AuthError::Required));
        let kerberos = AuthToken {
            scheme: "kerberos".to_string(),
            ..AuthToken::default()
        };
        assert!(matches!(
            auth.authenticate(&kerberos).await,
            Err(AuthError::UnsupportedScheme(_))
        ));
    }

    #[tokio::test]
    async fn test_allow_all() {
        let principal = AllowAll.authenticate(&AuthToken::default()).await.unwrap();
        assert_eq!(principal.username, "anonymous");
    }

    #[test]
    fn test_token_from_map() {
        let mut map = BTreeMap::new();
        map.insert("scheme".to_string(), Value::from("basic"));
        map.insert("principal".to_string(), Value::from("neo4j"));
        map.insert("credentials".to_string(), Value::from("pw"));
        map.insert("user_agent".to_string(), Value::from("driver/5.0"));
        let token = AuthToken::from_map(&map);
        assert_eq!(token, AuthToken::basic("neo4j", "pw"));
        assert_eq!(token.to_string(), "basic:neo4j");
    }
}
