//! Bearer-JWT validation for the viewer-facing playlist/segment/cue routes
//! (§6.1): `Authorization: Bearer <token>`, RS256 or HS256 selected by the
//! token's own header, no algorithm negotiation accepted from the caller.
//! Validation is a yes/no gate — claim contents beyond expiry aren't
//! inspected or forwarded downstream, matching the spec's "validated" rather
//! than "authorized per-claim" wording.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::warn;

use crate::config::AuthConfig;
use crate::error::CoreError;
use crate::server::state::AppState;

/// Claims this crate cares about; anything else in the token is ignored.
/// `exp`/`nbf` are checked by `jsonwebtoken` itself via [`Validation`].
#[derive(Debug, Deserialize)]
struct Claims {
    #[allow(dead_code)]
    sub: Option<String>,
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Validates a bearer token against whichever key material is configured.
/// The token's own `alg` header picks HS256 vs RS256; a token claiming an
/// algorithm this deployment didn't configure a key for is rejected rather
/// than silently accepted under a different one.
fn validate_token(token: &str, auth: &AuthConfig) -> Result<(), CoreError> {
    let header = jsonwebtoken::decode_header(token)
        .map_err(|e| CoreError::ValidationError(format!("malformed bearer token: {e}")))?;

    let (key, validation) = match header.alg {
        Algorithm::HS256 => {
            let secret = auth
                .hmac_secret
                .as_deref()
                .ok_or_else(|| CoreError::ValidationError("HS256 token but no HMAC secret configured".into()))?;
            (DecodingKey::from_secret(secret.as_bytes()), Validation::new(Algorithm::HS256))
        }
        Algorithm::RS256 => {
            let pem = auth
                .rsa_public_key_pem
                .as_deref()
                .ok_or_else(|| CoreError::ValidationError("RS256 token but no RSA public key configured".into()))?;
            let key = DecodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|e| CoreError::ConfigError(format!("invalid JWT_RSA_PUBLIC_KEY_PEM: {e}")))?;
            (key, Validation::new(Algorithm::RS256))
        }
        other => {
            return Err(CoreError::ValidationError(format!("unsupported JWT algorithm: {other:?}")));
        }
    };

    jsonwebtoken::decode::<Claims>(token, &key, &validation)
        .map(|_| ())
        .map_err(|e| CoreError::ValidationError(format!("bearer token rejected: {e}")))
}

/// Axum middleware gate for the viewer routes. A no-op when `auth.required`
/// is false (the dev-mode default with no keys configured).
pub async fn require_bearer_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, CoreError> {
    if !state.config.auth.required {
        return Ok(next.run(request).await);
    }

    let token = bearer_token(&request).ok_or_else(|| {
        warn!("viewer request missing bearer token");
        CoreError::ValidationError("missing bearer token".into())
    })?;

    validate_token(token, &state.config.auth)?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: usize,
    }

    fn far_future_exp() -> usize {
        // Fixed far-future timestamp; tests never call `Date`/`SystemTime::now`.
        4_102_444_800 // 2100-01-01T00:00:00Z
    }

    #[test]
    fn valid_hs256_token_is_accepted() {
        let secret = "test-secret";
        let token = encode(
            &Header::new(Algorithm::HS256),
            &TestClaims { sub: "viewer-1".into(), exp: far_future_exp() },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        let auth = AuthConfig { required: true, hmac_secret: Some(secret.into()), rsa_public_key_pem: None };
        assert!(validate_token(&token, &auth).is_ok());
    }

    #[test]
    fn hs256_token_with_wrong_secret_is_rejected() {
        let token = encode(
            &Header::new(Algorithm::HS256),
            &TestClaims { sub: "viewer-1".into(), exp: far_future_exp() },
            &EncodingKey::from_secret(b"right-secret"),
        )
        .unwrap();
        let auth = AuthConfig { required: true, hmac_secret: Some("wrong-secret".into()), rsa_public_key_pem: None };
        assert!(validate_token(&token, &auth).is_err());
    }

    #[test]
    fn rs256_token_without_configured_key_is_rejected() {
        let token = encode(
            &Header::new(Algorithm::HS256),
            &TestClaims { sub: "viewer-1".into(), exp: far_future_exp() },
            &EncodingKey::from_secret(b"whatever"),
        )
        .unwrap();
        // header claims HS256 but no HMAC secret configured, only RSA.
        let auth = AuthConfig {
            required: true,
            hmac_secret: None,
            rsa_public_key_pem: Some("not-a-real-key".into()),
        };
        assert!(validate_token(&token, &auth).is_err());
    }

    #[test]
    fn malformed_token_is_rejected() {
        let auth = AuthConfig { required: true, hmac_secret: Some("s".into()), rsa_public_key_pem: None };
        assert!(validate_token("not-a-jwt", &auth).is_err());
    }
}
