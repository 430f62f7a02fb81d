//! JWT identity verification.

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::services::{AuthError, IdentityVerifier};
use crate::domain::value_objects::UserId;

/// JWT claims structure
///
/// The user id is read from `userId`, falling back to the standard `sub`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Subject (user ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Claims for `user_id` valid for `ttl_secs` from now.
    pub fn for_user(user_id: impl Into<String>, ttl_secs: i64) -> Self {
        Self {
            user_id: Some(user_id.into()),
            sub: None,
            exp: chrono::Utc::now().timestamp() + ttl_secs,
        }
    }

    fn subject(self) -> Option<String> {
        self.user_id.or(self.sub).filter(|id| !id.is_empty())
    }
}

/// HMAC-SHA256 token verifier
pub struct JwtIdentityVerifier {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
}

impl JwtIdentityVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Sign claims with the verifier's secret.
    pub fn issue(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            })?;

        token_data
            .claims
            .subject()
            .map(UserId::new)
            .ok_or_else(|| AuthError::InvalidToken("token carries no user id".into()))
    }
}
