//! Stateless HS256 access tokens.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use lodge_application::AccessTokenIssuer;
use lodge_core::{AppError, AppResult};
use lodge_domain::UserId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iss: String,
    iat: i64,
    exp: i64,
}

/// HS256 access-token issuer/validator.
///
/// Validation enforces the signing algorithm, issuer equality, and expiry;
/// an expired-but-otherwise-valid token maps to [`AppError::TokenExpired`]
/// so clients know to refresh rather than re-authenticate.
#[derive(Clone)]
pub struct JwtAccessTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl_seconds: i64,
}

impl JwtAccessTokens {
    /// Creates an issuer from the shared secret and configured server URL.
    pub fn new(secret: &str, issuer: impl Into<String>, ttl_seconds: i64) -> AppResult<Self> {
        if secret.len() < 32 {
            return Err(AppError::Validation(
                "JWT_SECRET must be at least 32 characters".to_owned(),
            ));
        }
        if ttl_seconds <= 0 {
            return Err(AppError::Validation(
                "access token TTL must be positive".to_owned(),
            ));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            ttl_seconds,
        })
    }
}

impl AccessTokenIssuer for JwtAccessTokens {
    fn issue(&self, user_id: UserId) -> AppResult<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.ttl_seconds,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|error| AppError::Internal(format!("failed to sign access token: {error}")))
    }

    fn validate(&self, token: &str) -> AppResult<UserId> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|error| {
            match error.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
                _ => AppError::Unauthorized("invalid access token".to_owned()),
            }
        })?;

        data.claims
            .sub
            .parse()
            .map_err(|_| AppError::Unauthorized("invalid token subject".to_owned()))
    }
}
