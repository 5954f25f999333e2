//! Request identity.
//!
//! The server never verifies credentials itself. A resolver turns request
//! headers into a user id, or nothing; handlers only see the resolved id.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderName};

use simulado_storage::IdentityConfig;

/// Maps request headers to an authenticated user id.
pub trait IdentityResolver: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// The user the request acts as, if it carries a valid identity.
    fn resolve(&self, headers: &HeaderMap) -> Option<String>;
}

/// `Authorization: Bearer <token>` looked up in a fixed table.
pub struct StaticTokens {
    tokens: HashMap<String, String>,
}

impl StaticTokens {
    /// Blank tokens (an unset `${VAR}`, say) are dropped.
    pub fn new(tokens: HashMap<String, String>) -> Self {
        let tokens = tokens
            .into_iter()
            .filter(|(token, _)| !token.trim().is_empty())
            .collect();
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl IdentityResolver for StaticTokens {
    fn name(&self) -> &str {
        "static"
    }

    fn resolve(&self, headers: &HeaderMap) -> Option<String> {
        let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let token = value.strip_prefix("Bearer ")?.trim();
        self.tokens.get(token).cloned()
    }
}

/// A header set by an authenticating proxy, trusted as-is.
pub struct TrustedHeader {
    header: HeaderName,
}

impl TrustedHeader {
    pub fn new(header: &str) -> Result<Self> {
        let header = HeaderName::try_from(header)
            .with_context(|| format!("invalid identity header name: {header}"))?;
        Ok(Self { header })
    }
}

impl IdentityResolver for TrustedHeader {
    fn name(&self) -> &str {
        "trusted_header"
    }

    fn resolve(&self, headers: &HeaderMap) -> Option<String> {
        let user = headers.get(&self.header)?.to_str().ok()?.trim();
        (!user.is_empty()).then(|| user.to_string())
    }
}

/// Build the configured resolver.
pub fn from_config(config: &IdentityConfig) -> Result<Arc<dyn IdentityResolver>> {
    match config {
        IdentityConfig::Static { tokens } => {
            let resolver = StaticTokens::new(tokens.clone());
            if resolver.is_empty() {
                tracing::warn!("no identity tokens configured; every /api request will get 401");
            }
            Ok(Arc::new(resolver))
        }
        IdentityConfig::TrustedHeader { header } => Ok(Arc::new(TrustedHeader::new(header)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn static_tokens_need_bearer_prefix() {
        let resolver = StaticTokens::new(HashMap::from([("abc".to_string(), "u1".to_string())]));
        let mut headers = HeaderMap::new();
        assert_eq!(resolver.resolve(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("abc"));
        assert_eq!(resolver.resolve(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(resolver.resolve(&headers).as_deref(), Some("u1"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer other"));
        assert_eq!(resolver.resolve(&headers), None);
    }

    #[test]
    fn blank_tokens_are_dropped() {
        let resolver = StaticTokens::new(HashMap::from([
            (String::new(), "nobody".to_string()),
            ("t".to_string(), "u1".to_string()),
        ]));
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn trusted_header_ignores_blank_values() {
        let resolver = TrustedHeader::new("x-user-id").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("  "));
        assert_eq!(resolver.resolve(&headers), None);

        headers.insert("x-user-id", HeaderValue::from_static("aluno-7"));
        assert_eq!(resolver.resolve(&headers).as_deref(), Some("aluno-7"));
    }

    #[test]
    fn rejects_invalid_header_name() {
        assert!(TrustedHeader::new("not a header").is_err());
    }
}
