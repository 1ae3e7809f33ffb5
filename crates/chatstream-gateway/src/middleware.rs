use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

/// Auth configuration for the gateway.
///
/// A request without a key is rejected unless `allow_anonymous` is set.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// API keys that are allowed to stream.
    pub api_keys: Vec<String>,
    /// Let requests that present no key through as [`CallerIdentity::anonymous`].
    pub allow_anonymous: bool,
}

impl AuthConfig {
    /// Accept exactly `api_keys`; requests without a key are rejected.
    pub fn new(api_keys: Vec<String>) -> Self {
        Self {
            api_keys,
            allow_anonymous: false,
        }
    }

    /// No keys, every caller streams as anonymous.
    pub fn open() -> Self {
        Self {
            api_keys: Vec::new(),
            allow_anonymous: true,
        }
    }

    /// Returns true if at least one API key is configured.
    pub fn is_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    /// Returns true if no request could ever be admitted.
    pub fn rejects_everyone(&self) -> bool {
        !self.is_enabled() && !self.allow_anonymous
    }

    /// Resolve a presented key to a caller identity.
    pub fn identify(&self, key: &str) -> Option<CallerIdentity> {
        self.api_keys
            .iter()
            .position(|k| k == key)
            .map(|i| CallerIdentity(format!("api-key-{i}")))
    }
}

/// Who is calling. Attached to every request that passed [`auth_middleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub String);

impl CallerIdentity {
    /// Identity of a caller admitted without a key.
    pub fn anonymous() -> Self {
        Self("anonymous".to_string())
    }
}

/// Query parameters read by [`auth_middleware`].
#[derive(serde::Deserialize, Default)]
pub struct AuthQuery {
    /// `?api_key=` value.
    pub api_key: Option<String>,
}

/// Auth middleware: validates API key from header or query param.
///
/// Checks `Authorization: Bearer <key>` header first, then `?api_key=<key>` query param.
/// A request with no key proceeds as [`CallerIdentity::anonymous`] only when
/// [`AuthConfig::allow_anonymous`] is set. A rejected request never reaches the
/// handler, so no stream is opened.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    headers: HeaderMap,
    query: Query<AuthQuery>,
    mut request: Request,
    next: Next,
) -> Response {
    let key_from_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string());

    let key = key_from_header.or_else(|| query.api_key.clone());

    let identity = match key {
        Some(k) => match auth.identify(&k) {
            Some(identity) => identity,
            None => {
                warn!("Rejected request: invalid API key");
                return unauthorized();
            }
        },
        None if auth.allow_anonymous => CallerIdentity::anonymous(),
        None => {
            warn!("Rejected request: missing API key");
            return unauthorized();
        }
    };

    request.extensions_mut().insert(identity);
    next.run(request).await
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_config_default_admits_nobody() {
        let config = AuthConfig::default();
        assert!(!config.is_enabled());
        assert!(!config.allow_anonymous);
        assert!(config.rejects_everyone());
    }

    #[test]
    fn test_auth_config_open() {
        let config = AuthConfig::open();
        assert!(!config.is_enabled());
        assert!(!config.rejects_everyone());
    }

    #[test]
    fn test_auth_config_identifies_known_keys() {
        let config = AuthConfig::new(vec!["a".to_string(), "b".to_string()]);
        assert!(config.is_enabled());
        assert_eq!(config.identify("b"), Some(CallerIdentity("api-key-1".into())));
        assert_eq!(config.identify("c"), None);
    }
}
