// src/handlers/auth.rs
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;

use crate::{
    errors::{RideShareError, RideShareResult},
    models::user::{AuthClaims, Caller, Role},
    state::AppState,
};

/// Pull the token out of an `Authorization: Bearer ...` header value.
pub fn extract_token(auth_header: &str) -> RideShareResult<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| RideShareError::unauthorized("Expected a Bearer token"))
}

pub fn validate_token(token: &str, secret: &str) -> RideShareResult<AuthClaims> {
    let validation = Validation::new(Algorithm::HS256);
    let key = DecodingKey::from_secret(secret.as_bytes());
    let data = decode::<AuthClaims>(token, &key, &validation)?;
    Ok(data.claims)
}

/// Sign a token for `user_id`. Used by tests and local tooling; production
/// tokens come from the account service.
pub fn issue_token(user_id: &str, role: Role, secret: &str, ttl_seconds: u64) -> RideShareResult<String> {
    let now = Utc::now().timestamp().max(0) as u64;
    let claims = AuthClaims {
        sub: user_id.to_string(),
        role,
        exp: now + ttl_seconds,
        iat: now,
    };
    let key = EncodingKey::from_secret(secret.as_bytes());
    Ok(encode(&Header::new(Algorithm::HS256), &claims, &key)?)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = RideShareError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| RideShareError::unauthorized("Missing Authorization header"))?;

        let token = extract_token(header)?;
        let caller = Caller::from(validate_token(token, &state.config.jwt_secret)?);

        if caller.role == Role::Driver && state.moderation_service.is_banned(&caller.id).await? {
            tracing::warn!("Rejected request from banned driver {}", caller.id);
            return Err(RideShareError::forbidden("This account has been deleted by an administrator"));
        }

        Ok(caller)
    }
}

impl Caller {
    pub fn require_role(&self, role: Role) -> RideShareResult<()> {
        if self.role != role {
            return Err(RideShareError::InsufficientPermissions);
        }
        Ok(())
    }

    pub fn require_admin(&self) -> RideShareResult<()> {
        if !self.is_admin() {
            return Err(RideShareError::InsufficientPermissions);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-at-least-32-bytes";

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token("Bearer abc.def").unwrap(), "abc.def");
        assert!(extract_token("Basic abc").is_err());
        assert!(extract_token("Bearer ").is_err());
    }

    #[test]
    fn test_token_round_trip() {
        let token = issue_token("usr-1", Role::Driver, SECRET, 60).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "usr-1");
        assert_eq!(claims.role, Role::Driver);
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = issue_token("usr-1", Role::Passenger, SECRET, 60).unwrap();
        let err = validate_token(&token, "another-secret-that-is-also-32-bytes").unwrap_err();
        assert!(matches!(err, RideShareError::TokenInvalid));
    }

    #[test]
    fn test_expired_token() {
        let now = Utc::now().timestamp() as u64;
        let claims = AuthClaims {
            sub: "usr-1".to_string(),
            role: Role::Passenger,
            exp: now - 3600,
            iat: now - 7200,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(
            validate_token(&token, SECRET),
            Err(RideShareError::TokenExpired)
        ));
    }

    #[test]
    fn test_role_guard() {
        let caller = Caller::new("usr-1", Role::Passenger);
        assert!(caller.require_role(Role::Passenger).is_ok());
        assert!(matches!(
            caller.require_admin(),
            Err(RideShareError::InsufficientPermissions)
        ));
        assert!(Caller::new("usr-2", Role::Admin).require_admin().is_ok());
    }
}
