//! JWT validation and the request extractors built on it.
//!
//! Token issuance is not part of this service; callers arrive with an HS256
//! bearer token whose subject is the user id. Admin-only routes take
//! [`AdminUser`], everything else under the account takes [`CurrentUser`].

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::AppState;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_CUSTOMER: &str = "customer";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// The authenticated caller, extracted from the Authorization header.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: String,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Decodes and validates a bearer token. Expiry is enforced by the decoder.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ServiceError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            ServiceError::Unauthorized("token expired".to_string())
        }
        _ => ServiceError::Unauthorized("invalid token".to_string()),
    })
}

fn bearer_token(parts: &Parts) -> Result<&str, ServiceError> {
    let header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized("missing authorization header".to_string()))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ServiceError::Unauthorized("expected bearer token".to_string()))
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let token = bearer_token(parts)?;
        let claims = verify_token(&app_state.config.jwt_secret, token)?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::Unauthorized("invalid token subject".to_string()))?;

        Ok(CurrentUser {
            user_id,
            name: claims.name,
            email: claims.email,
            role: claims.role,
        })
    }
}

/// Extractor that additionally requires the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ServiceError::Forbidden("admin role required".to_string()));
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "unit-test-secret-0123456789abcdef0123456789abcdef";

    fn token_for(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn valid_claims() -> Claims {
        let now = chrono::Utc::now().timestamp();
        Claims {
            sub: Uuid::new_v4().to_string(),
            name: Some("Asha".to_string()),
            email: Some("asha@example.com".to_string()),
            role: ROLE_CUSTOMER.to_string(),
            iat: now,
            exp: now + 3600,
        }
    }

    #[test]
    fn accepts_valid_token() {
        let claims = valid_claims();
        let token = token_for(&claims, SECRET);

        let decoded = verify_token(SECRET, &token).unwrap();
        assert_eq!(decoded.sub, claims.sub);
        assert_eq!(decoded.role, ROLE_CUSTOMER);
    }

    #[test]
    fn rejects_expired_token() {
        let mut claims = valid_claims();
        claims.iat -= 7200;
        claims.exp = chrono::Utc::now().timestamp() - 3600;
        let token = token_for(&claims, SECRET);

        let err = verify_token(SECRET, &token).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(msg) if msg.contains("expired")));
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = token_for(&valid_claims(), "another-secret-0123456789abcdef0123456789");
        assert!(verify_token(SECRET, &token).is_err());
    }
}
