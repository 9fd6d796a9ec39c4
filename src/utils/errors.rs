//! Sistema de manejo de errores
//!
//! Este módulo define todos los tipos de errores del sistema
//! y su conversión a respuestas HTTP apropiadas.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Errores principales de la aplicación
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("JWT error: {0}")]
    Jwt(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Código de acción para logging estructurado
    pub fn action_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "db_error",
            AppError::Validation(_) | AppError::BadRequest(_) => "validation_error",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Jwt(_) => "jwt_error",
            AppError::Broker(_) => "publish_error",
            AppError::ServiceUnavailable(_) => "service_unavailable",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Errores transitorios de infraestructura: se reintentan con backoff,
    /// los consumidores del broker hacen nack-with-requeue.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::ServiceUnavailable(_) => true,
            AppError::Database(e) => is_transient_db_error(e),
            _ => false,
        }
    }
}

/// Clasifica errores de conexión típicos de PostgreSQL
pub fn is_transient_db_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
        sqlx::Error::Io(_) => true,
        other => {
            let msg = other.to_string();
            msg.contains("pool is not initialized")
                || msg.contains("connection refused")
                || msg.contains("connection reset by peer")
                || msg.contains("timed out")
        }
    }
}

/// Respuesta de error para la API: {status_code, message}
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    status_code: u16,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::Jwt(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(e) if is_transient_db_error(e) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Broker(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Los errores de validación no se loguean a nivel error
        match status {
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::CONFLICT => {
                tracing::debug!(action = self.action_code(), error = %self, "request rejected");
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::warn!(action = self.action_code(), error = %self, "auth failure");
            }
            _ => {
                tracing::error!(action = self.action_code(), error = %self, "request failed");
            }
        }

        let message = match &self {
            // Nunca exponemos detalles internos de la base de datos
            AppError::Database(_) => "An error occurred while accessing the database".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = ErrorResponse {
            status_code: status.as_u16(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_codes() {
        assert_eq!(AppError::Conflict("x".into()).action_code(), "conflict");
        assert_eq!(AppError::BadRequest("x".into()).action_code(), "validation_error");
        assert_eq!(AppError::Broker("x".into()).action_code(), "publish_error");
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::ServiceUnavailable("db down".into()).is_transient());
        assert!(AppError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!AppError::Conflict("terminal".into()).is_transient());
        assert!(!AppError::BadRequest("bad coords".into()).is_transient());
    }
}
