//! Bearer-token authentication: JWT issuing, verification, and the `Claims`
//! extractor protected handlers take as an argument.
//!
//! The token payload carries the owning user id in `sub`; every owner-scoped
//! query filters by it. A missing `Authorization` header is rejected with
//! 403, an invalid or expired token with 401; both happen before any
//! database session is opened.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, Response, StatusCode},
    response::{IntoResponse, Json},
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeaderRejectionReason,
    TypedHeader,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

const TOKEN_LIFETIME_HOURS: i64 = 24;

/// Signing and verification material derived from `JWT_SECRET`.
#[derive(Clone)]
pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// The contents of a JSON Web Token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Id of the user the token was issued to.
    pub sub: Uuid,
    /// The expiry time of the token.
    pub exp: usize,
    /// The time the token was issued.
    pub iat: usize,
}

#[async_trait]
impl<S> FromRequestParts<S> for Claims
where
    AuthKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|rejection| match rejection.reason() {
                TypedHeaderRejectionReason::Missing => AuthError::MissingToken,
                _ => AuthError::InvalidToken,
            })?;

        let keys = AuthKeys::from_ref(state);
        let token_data = decode_jwt(bearer.token(), &keys)?;

        Ok(token_data.claims)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No authentication token was provided.")]
    MissingToken,
    #[error("The authentication token is invalid or has expired.")]
    InvalidToken,
    #[error("Email or password is incorrect.")]
    WrongCredentials,
    #[error("Could not create an authentication token.")]
    TokenCreation,
    #[error("An unexpected error occurred on the server.")]
    Internal,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response<Body> {
        let status = match self {
            AuthError::MissingToken => StatusCode::FORBIDDEN,
            AuthError::InvalidToken | AuthError::WrongCredentials => StatusCode::UNAUTHORIZED,
            AuthError::TokenCreation | AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "message": self.to_string() }));

        (status, body).into_response()
    }
}

pub fn encode_jwt(user_id: Uuid, keys: &AuthKeys) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        exp: (now + Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(&Header::default(), &claims, &keys.encoding).map_err(|_| AuthError::TokenCreation)
}

fn decode_jwt(token: &str, keys: &AuthKeys) -> Result<TokenData<Claims>, AuthError> {
    decode(token, &keys.decoding, &Validation::default()).map_err(|_| AuthError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use axum::{routing::get, Router};
    use axum_test::TestServer;

    use super::*;

    fn test_keys() -> AuthKeys {
        AuthKeys::new("test-secret")
    }

    #[test]
    fn decode_jwt_gives_back_the_user_id() {
        let keys = test_keys();
        let user_id = Uuid::new_v4();

        let token = encode_jwt(user_id, &keys).unwrap();
        let claims = decode_jwt(&token, &keys).unwrap().claims;

        assert_eq!(claims.sub, user_id);
    }

    #[test]
    fn decode_jwt_rejects_token_signed_with_other_secret() {
        let token = encode_jwt(Uuid::new_v4(), &AuthKeys::new("other-secret")).unwrap();

        assert!(matches!(
            decode_jwt(&token, &test_keys()),
            Err(AuthError::InvalidToken)
        ));
    }

    async fn protected(claims: Claims) -> Json<serde_json::Value> {
        Json(json!({ "userId": claims.sub }))
    }

    fn protected_app() -> Router {
        Router::new()
            .route("/protected", get(protected))
            .with_state(test_keys())
    }

    #[tokio::test]
    async fn missing_header_is_forbidden() {
        let server = TestServer::new(protected_app()).unwrap();

        server
            .get("/protected")
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn garbage_token_is_unauthorized() {
        let server = TestServer::new(protected_app()).unwrap();

        server
            .get("/protected")
            .authorization_bearer("not-a-jwt")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_token_reaches_the_handler() {
        let server = TestServer::new(protected_app()).unwrap();
        let user_id = Uuid::new_v4();
        let token = encode_jwt(user_id, &test_keys()).unwrap();

        let response = server.get("/protected").authorization_bearer(token).await;

        response.assert_status_ok();
        let body = response.json::<serde_json::Value>();
        assert_eq!(body["userId"], user_id.to_string());
    }
}
