//! Caller identification for the HTTP transport.
//!
//! Every request is tagged with a [`Principal`] stored in the request
//! extensions. With no tokens configured every caller is an administrator.
//! With tokens configured a valid bearer token makes the caller an
//! administrator, a missing header makes the caller anonymous, and anything
//! else is rejected with 401.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::models::AccessLevel;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    enabled: bool,
    tokens: HashSet<String>,
}

impl AuthConfig {
    /// Create a new AuthConfig from a list of admin tokens.
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self, String> {
        let mut valid_tokens = HashSet::new();
        for token in tokens {
            let trimmed = token.trim().to_string();
            if trimmed.is_empty() {
                return Err("Empty token value in configuration".to_string());
            }
            valid_tokens.insert(trimmed);
        }
        let enabled = !valid_tokens.is_empty();
        Ok(Self {
            enabled,
            tokens: valid_tokens,
        })
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            tokens: HashSet::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

/// The identity a request runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    Admin,
}

impl Principal {
    /// Check whether this caller may perform an operation at `level` on an
    /// item. Anonymous callers may only read public items.
    pub fn allows(&self, level: AccessLevel, public: bool) -> bool {
        match self {
            Self::Admin => true,
            Self::Anonymous => level == AccessLevel::Read && public,
        }
    }
}

/// Identify the caller and store the [`Principal`] in the request extensions.
pub async fn auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let principal = if !auth_config.is_enabled() {
        Principal::Admin
    } else {
        match extract_bearer_token(&request) {
            Ok(None) => {
                debug!("No Authorization header, continuing as anonymous");
                Principal::Anonymous
            }
            Ok(Some(token)) if verify_token(&auth_config, token) => Principal::Admin,
            Ok(Some(token)) => {
                warn!(token_prefix = %mask_token(token), "Authentication failed: invalid token");
                return unauthorized_response(
                    "Invalid Bearer token",
                    "Check that you are using a valid token configured on the server",
                );
            }
            Err(msg) => {
                warn!("Authentication failed: invalid header format");
                return unauthorized_response(
                    msg,
                    "Use the format: 'Authorization: Bearer <your-token>'",
                );
            }
        }
    };

    request.extensions_mut().insert(principal);
    next.run(request).await
}

fn extract_bearer_token(request: &Request<Body>) -> Result<Option<&str>, &'static str> {
    let Some(auth_header) = request.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Authorization header contains invalid characters")?;

    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Err("Invalid Authorization header format. Expected 'Bearer <token>'");
    };

    if token.is_empty() {
        return Err("Bearer token is empty");
    }

    Ok(Some(token))
}

fn verify_token(config: &AuthConfig, provided: &str) -> bool {
    // Check every token so timing does not reveal which one matched
    let mut found = false;
    for expected in &config.tokens {
        if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
            found = true;
        }
    }
    found
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn mask_token(token: &str) -> String {
    match token.get(..3) {
        Some(prefix) if token.len() > 3 => format!("{}***", prefix),
        _ => "***".to_string(),
    }
}

fn unauthorized_response(message: impl Into<String>, suggestion: impl Into<String>) -> Response {
    #[derive(Serialize)]
    struct ErrorResponse {
        error: ErrorDetail,
    }
    #[derive(Serialize)]
    struct ErrorDetail {
        code: &'static str,
        message: String,
        suggestion: String,
    }

    let body = ErrorResponse {
        error: ErrorDetail {
            code: "unauthorized",
            message: message.into(),
            suggestion: suggestion.into(),
        },
    };
    let json = serde_json::to_string(&body).unwrap_or_else(|_| {
        r#"{"error":{"code":"unauthorized","message":"Authentication failed"}}"#.to_string()
    });

    (
        StatusCode::UNAUTHORIZED,
        [(header::CONTENT_TYPE, "application/json")],
        json,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tokens() {
        let config = AuthConfig::from_tokens(vec![" abc ".to_string(), "def".to_string()]).unwrap();
        assert!(config.is_enabled());
        assert_eq!(config.token_count(), 2);
        assert!(verify_token(&config, "abc"));
        assert!(!verify_token(&config, "abd"));
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(AuthConfig::from_tokens(vec!["  ".to_string()]).is_err());
    }

    #[test]
    fn test_disabled_by_default() {
        assert!(!AuthConfig::default().is_enabled());
        assert!(!AuthConfig::from_tokens(vec![]).unwrap().is_enabled());
    }

    #[test]
    fn test_principal_allows() {
        assert!(Principal::Admin.allows(AccessLevel::Admin, false));
        assert!(Principal::Anonymous.allows(AccessLevel::Read, true));
        assert!(!Principal::Anonymous.allows(AccessLevel::Read, false));
        assert!(!Principal::Anonymous.allows(AccessLevel::Admin, true));
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("ab"), "***");
        assert_eq!(mask_token("secret"), "sec***");
    }

    #[test]
    fn test_extract_bearer_token() {
        let request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer tok")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&request), Ok(Some("tok")));

        let request = Request::builder()
            .header(header::AUTHORIZATION, "Basic tok")
            .body(Body::empty())
            .unwrap();
        assert!(extract_bearer_token(&request).is_err());

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_bearer_token(&request), Ok(None));
    }
}
