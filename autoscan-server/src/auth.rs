//! Basic-auth gate for the webhook surface.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;

use crate::config::AuthConfig;

pub async fn require_basic_auth(
    State(auth): State<Arc<AuthConfig>>,
    request: Request,
    next: Next,
) -> Response {
    if authorized(&auth, request.headers().get(header::AUTHORIZATION)) {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"autoscan\"")],
        )
            .into_response()
    }
}

fn authorized(auth: &AuthConfig, header: Option<&HeaderValue>) -> bool {
    let Some(value) = header.and_then(|value| value.to_str().ok()) else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = BASE64_STANDARD.decode(encoded) else {
        return false;
    };
    let Ok(credentials) = String::from_utf8(decoded) else {
        return false;
    };

    match credentials.split_once(':') {
        Some((username, password)) => {
            username == auth.username && password == auth.password
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> AuthConfig {
        AuthConfig {
            username: "user".to_string(),
            password: "pass".to_string(),
        }
    }

    fn basic(credentials: &str) -> HeaderValue {
        let encoded = BASE64_STANDARD.encode(credentials);
        HeaderValue::from_str(&format!("Basic {encoded}")).unwrap()
    }

    #[test]
    fn accepts_matching_credentials() {
        assert!(authorized(&auth(), Some(&basic("user:pass"))));
    }

    #[test]
    fn rejects_wrong_password_and_username() {
        assert!(!authorized(&auth(), Some(&basic("user:wrong"))));
        assert!(!authorized(&auth(), Some(&basic("other:pass"))));
    }

    #[test]
    fn rejects_missing_or_malformed_headers() {
        assert!(!authorized(&auth(), None));
        assert!(!authorized(
            &auth(),
            Some(&HeaderValue::from_static("Bearer token"))
        ));
        assert!(!authorized(
            &auth(),
            Some(&HeaderValue::from_static("Basic not-base64!"))
        ));
        assert!(!authorized(&auth(), Some(&basic("no-separator"))));
    }

    #[test]
    fn passwords_may_contain_colons() {
        let auth = AuthConfig {
            username: "user".to_string(),
            password: "pa:ss".to_string(),
        };

        assert!(authorized(&auth, Some(&basic("user:pa:ss"))));
    }
}
