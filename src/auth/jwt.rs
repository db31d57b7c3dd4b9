use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::error::AppError;

use super::Claims;

/// Reads claims out of a bearer token without verifying its signature.
///
/// The backend authenticates the token when the STOMP session is opened; the
/// client only needs the role claim to decide which channels to subscribe to.
pub struct TokenReader {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenReader {
    pub fn new() -> Self {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            decoding_key: DecodingKey::from_secret(&[]),
            validation,
        }
    }

    pub fn read_claims(&self, token: &str) -> Result<Claims, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::TokenDecode(format!("Invalid token: {}", e)))?;

        Ok(token_data.claims)
    }

    /// Decode the token and return its role claim (empty when absent)
    pub fn read_role(&self, token: &str) -> Result<String, AppError> {
        let claims = self.read_claims(token)?;
        let user_id = claims.user_id();
        if claims.is_expired() {
            tracing::warn!(sub = ?claims.sub, user_id = ?user_id, "Bearer token is expired, server may reject the session");
        }
        tracing::debug!(user_id = ?user_id, role = %claims.role(), "Read bearer token claims");
        Ok(claims.role().to_string())
    }
}

impl Default for TokenReader {
    fn default() -> Self {
        Self::new()
    }
}
