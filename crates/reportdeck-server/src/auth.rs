//! Request gates.
//!
//! Write endpoints (upload, delete, cleanup) take a bearer token; with no token
//! configured they are open. Read endpoints take a signed session cookie,
//! checked only when OAuth credentials are configured. The sign-in flow that
//! issues the cookie lives outside this service.

use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

pub const SESSION_COOKIE: &str = "reportdeck_session";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Default)]
pub struct AuthSettings {
    upload_token: Option<String>,
    session_key: Option<Vec<u8>>,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("upload_token", &self.upload_token.as_ref().map(|_| "<redacted>"))
            .field("sessions_enabled", &self.sessions_enabled())
            .finish()
    }
}

impl AuthSettings {
    pub fn new(upload_token: Option<String>, session_secret: Option<String>) -> Self {
        Self {
            upload_token,
            session_key: session_secret.map(String::into_bytes),
        }
    }

    pub fn sessions_enabled(&self) -> bool {
        self.session_key.is_some()
    }

    /// Accepts `Authorization: Bearer <token>` when a token is configured.
    pub fn check_bearer(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.upload_token else {
            return true;
        };
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        matches!(presented, Some(t) if !t.is_empty() && tokens_match(t, expected))
    }

    /// Cookie value `<user>.<hex hmac>` for `user`, or `None` when sessions are off.
    pub fn sign_session(&self, user: &str) -> Option<String> {
        let mac = self.mac_for(user)?;
        Some(format!("{user}.{}", hex::encode(mac.finalize().into_bytes())))
    }

    /// User named by a valid cookie value.
    pub fn verify_session<'a>(&self, value: &'a str) -> Option<&'a str> {
        let (user, sig) = value.rsplit_once('.')?;
        if user.is_empty() {
            return None;
        }
        let sig = hex::decode(sig).ok()?;
        let mac = self.mac_for(user)?;
        mac.verify_slice(&sig).ok()?;
        Some(user)
    }

    pub fn check_session(&self, headers: &HeaderMap) -> bool {
        if !self.sessions_enabled() {
            return true;
        }
        session_cookie(headers).is_some_and(|v| self.verify_session(v).is_some())
    }

    fn mac_for(&self, user: &str) -> Option<HmacSha256> {
        let key = self.session_key.as_ref()?;
        let mut mac = HmacSha256::new_from_slice(key).ok()?;
        mac.update(user.as_bytes());
        Some(mac)
    }
}

/// Constant-time comparison through HMAC tags.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let tag = |key: &str| {
        HmacSha256::new_from_slice(key.as_bytes()).map(|mut mac| {
            mac.update(b"reportdeck-upload-token");
            mac
        })
    };
    match (tag(presented), tag(expected)) {
        (Ok(presented), Ok(expected)) => expected
            .verify_slice(&presented.finalize().into_bytes())
            .is_ok(),
        _ => false,
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

pub async fn require_token(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !state.auth.check_bearer(req.headers()) {
        tracing::warn!(path = %req.uri().path(), "rejected request with invalid upload token");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid token" })),
        )
            .into_response();
    }
    next.run(req).await
}

pub async fn require_session(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !state.auth.check_session(req.headers()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response();
    }
    next.run(req).await
}
