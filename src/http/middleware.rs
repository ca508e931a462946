//! Request middleware: client session, authentication and route entry

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

use crate::app::AppState;
use crate::data::provider::SessionIdentity;
use crate::session::registry::{ClientSession, SessionError};

use super::routes::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the client's session id
pub static CLIENT_SESSION_HEADER: HeaderName = HeaderName::from_static("x-client-session");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Organization the user belongs to, once onboarding resolved one
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// JWT claims from Supabase auth token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,
    #[serde(default)]
    pub aud: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub app_metadata: AppMetadata,
}

#[derive(Debug, Deserialize)]
struct JwtHeader {
    alg: String,
}

/// Verify an HS256 token and extract claims
pub fn verify_jwt(token: &str, secret: &str) -> Result<JwtClaims, AuthError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::InvalidToken);
    };

    let header: JwtHeader = decode_segment(header_b64)?;
    if header.alg != "HS256" {
        return Err(AuthError::InvalidToken);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());

    let provided_signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    mac.verify_slice(&provided_signature)
        .map_err(|_| AuthError::InvalidToken)?;

    let claims: JwtClaims = decode_segment(payload_b64)?;
    if claims.exp < Utc::now().timestamp() {
        return Err(AuthError::TokenExpired);
    }
    if claims.sub.is_empty() {
        return Err(AuthError::InvalidToken);
    }

    Ok(claims)
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, AuthError> {
    let raw = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::InvalidToken)?;
    serde_json::from_slice(&raw).map_err(|_| AuthError::InvalidToken)
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingHeader,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Authenticated user extractor result
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub claims: JwtClaims,
    pub access_token: String,
}

impl AuthenticatedUser {
    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            user_id: self.user_id.clone(),
            tenant_id: self.claims.app_metadata.tenant_id.clone(),
            access_token: self.access_token.clone(),
        }
    }
}

/// Middleware to require authentication
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(AuthError::MissingHeader)?;
    let token = bearer.token();

    let claims = verify_jwt(token, &state.config.supabase_jwt_secret)?;

    let auth_user = AuthenticatedUser {
        user_id: claims.sub.clone(),
        claims,
        access_token: token.to_string(),
    };

    // Insert into request extensions for handlers to access
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Resolve the client session named by the session header
pub async fn attach_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let id = request
        .headers()
        .get(&CLIENT_SESSION_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| {
            AppError::BadRequest(format!("missing or malformed {} header", CLIENT_SESSION_HEADER))
        })?;

    let session = state.sessions.get_or_open(id).map_err(|e| match e {
        SessionError::AtCapacity(_) => AppError::Unavailable(e.to_string()),
        SessionError::Storage(_) => AppError::Internal(e.to_string()),
    })?;

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// Treat the request as a navigation into its route: run the entry guard,
/// then hand the handler the provider for that route's mode.
pub async fn enter_route(mut request: Request, next: Next) -> Result<Response, AppError> {
    let session = request
        .extensions()
        .get::<Arc<ClientSession>>()
        .cloned()
        .ok_or_else(|| AppError::Internal("client session not attached".to_string()))?;
    let path = request.uri().path().to_string();

    // Purge finishes before any live handler runs
    let outcome = session
        .clone()
        .enter(path.clone())
        .await
        .map_err(|e| AppError::Internal(format!("entry guard: {}", e)))?;
    if outcome.purged {
        debug!(session_id = %session.id(), path = %path, "Entered live zone");
    }

    let identity = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(AuthenticatedUser::identity);
    let provider = session.data().for_path(&path, identity.as_ref());

    request.extensions_mut().insert(provider);
    Ok(next.run(request).await)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sign(claims: &serde_json::Value, secret: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", header, payload).as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{}.{}.{}", header, payload, signature)
    }

    fn claims(exp_offset: i64) -> serde_json::Value {
        json!({
            "sub": "8d3c1c1e-0000-4000-8000-000000000001",
            "exp": Utc::now().timestamp() + exp_offset,
            "email": "pm@acme.test",
            "app_metadata": {"tenant_id": "acme"}
        })
    }

    #[test]
    fn accepts_valid_token_and_reads_tenant() {
        let token = sign(&claims(3600), "secret");
        let claims = verify_jwt(&token, "secret").unwrap();
        assert_eq!(claims.app_metadata.tenant_id.as_deref(), Some("acme"));
        assert_eq!(claims.email.as_deref(), Some("pm@acme.test"));
    }

    #[test]
    fn rejects_wrong_secret_and_expired_tokens() {
        let token = sign(&claims(3600), "secret");
        assert!(matches!(verify_jwt(&token, "other"), Err(AuthError::InvalidToken)));

        let expired = sign(&claims(-10), "secret");
        assert!(matches!(verify_jwt(&expired, "secret"), Err(AuthError::TokenExpired)));

        assert!(matches!(verify_jwt("a.b", "secret"), Err(AuthError::InvalidToken)));
        assert!(matches!(verify_jwt("a.b.c.d", "secret"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn missing_tenant_claim_yields_identity_without_tenant() {
        let token = sign(
            &json!({"sub": "u-1", "exp": Utc::now().timestamp() + 60}),
            "secret",
        );
        let claims = verify_jwt(&token, "secret").unwrap();
        let user = AuthenticatedUser {
            user_id: claims.sub.clone(),
            claims,
            access_token: token,
        };
        assert_eq!(user.identity().tenant_id, None);
    }
}
