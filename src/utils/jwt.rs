//! Utilidades JWT
//!
//! Generación y verificación de tokens HS256. Los claims llevan
//! `user_id` y `role` además de los timestamps estándar.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::errors::AppError;

/// Vida del access token (15 minutos)
const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;
/// Vida del refresh token (7 días)
const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Claims del JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub role: String,
    pub iat: usize,
    pub exp: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "type")]
    pub token_type: Option<String>,
}

/// Par de tokens emitidos en login/refresh
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Generar par access/refresh para un usuario
pub fn generate_token_pair(user_id: Uuid, role: &str, secret: &[u8]) -> Result<TokenPair, AppError> {
    let now = chrono::Utc::now().timestamp();

    let access_claims = Claims {
        user_id: user_id.to_string(),
        role: role.to_string(),
        iat: now as usize,
        exp: (now + ACCESS_TOKEN_TTL_SECS) as usize,
        token_type: None,
    };

    let refresh_claims = Claims {
        user_id: user_id.to_string(),
        role: role.to_string(),
        iat: now as usize,
        exp: (now + REFRESH_TOKEN_TTL_SECS) as usize,
        token_type: Some("refresh".to_string()),
    };

    let key = EncodingKey::from_secret(secret);
    let access_token = encode(&Header::new(Algorithm::HS256), &access_claims, &key)
        .map_err(|e| AppError::Jwt(format!("failed to sign access token: {}", e)))?;
    let refresh_token = encode(&Header::new(Algorithm::HS256), &refresh_claims, &key)
        .map_err(|e| AppError::Jwt(format!("failed to sign refresh token: {}", e)))?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Verificar y decodificar un token HS256
pub fn verify_token(token: &str, secret: &[u8]) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| AppError::Unauthorized(format!("invalid token: {}", e)))?;

    Ok(data.claims)
}

/// Extraer el token de un header/campo `Bearer <token>`
pub fn strip_bearer(value: &str) -> &str {
    value.strip_prefix("Bearer ").unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"supersecretkey";

    #[test]
    fn test_generate_and_verify() {
        let user_id = Uuid::new_v4();
        let pair = generate_token_pair(user_id, "PASSENGER", SECRET).unwrap();

        let claims = verify_token(&pair.access_token, SECRET).unwrap();
        assert_eq!(claims.user_id, user_id.to_string());
        assert_eq!(claims.role, "PASSENGER");
        assert!(claims.exp > claims.iat);

        let refresh = verify_token(&pair.refresh_token, SECRET).unwrap();
        assert_eq!(refresh.token_type.as_deref(), Some("refresh"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let pair = generate_token_pair(Uuid::new_v4(), "DRIVER", SECRET).unwrap();
        assert!(verify_token(&pair.access_token, b"otherkey").is_err());
    }

    #[test]
    fn test_strip_bearer() {
        assert_eq!(strip_bearer("Bearer abc.def.ghi"), "abc.def.ghi");
        assert_eq!(strip_bearer("abc.def.ghi"), "abc.def.ghi");
    }
}
