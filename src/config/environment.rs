//! Configuración de variables de entorno
//!
//! Este módulo maneja la configuración del entorno. Cada variable tiene un
//! valor por defecto razonable para desarrollo local; en producción todas
//! vienen del entorno (o de un archivo .env cargado por dotenvy).

use std::env;

/// Configuración del entorno
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    // Servidor HTTP
    pub host: String,
    pub port: u16,

    // Base de datos
    pub db_host: String,
    pub db_port: String,
    pub db_user: String,
    pub db_password: String,
    pub db_name: String,
    pub db_sslmode: String,

    // RabbitMQ
    pub rabbitmq_host: String,
    pub rabbitmq_port: String,
    pub rabbitmq_user: String,
    pub rabbitmq_password: String,
    pub rabbitmq_vhost: String,

    // Auth
    pub jwt_secret: String,

    // Logging
    pub log_level: String,
}

fn get_env(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

impl EnvironmentConfig {
    pub fn from_env() -> Self {
        let port = get_env("SERVICE_PORT", "3000").parse().unwrap_or(3000);

        Self {
            host: get_env("SERVICE_HOST", "0.0.0.0"),
            port,
            db_host: get_env("DB_HOST", "localhost"),
            db_port: get_env("DB_PORT", "5432"),
            db_user: get_env("DB_USER", "postgres"),
            db_password: get_env("DB_PASSWORD", "postgres"),
            db_name: get_env("DB_NAME", "ride_hail"),
            db_sslmode: get_env("DB_SSLMODE", "disable"),
            rabbitmq_host: get_env("RABBITMQ_HOST", "localhost"),
            rabbitmq_port: get_env("RABBITMQ_PORT", "5672"),
            rabbitmq_user: get_env("RABBITMQ_USER", "guest"),
            rabbitmq_password: get_env("RABBITMQ_PASSWORD", "guest"),
            rabbitmq_vhost: get_env("RABBITMQ_VHOST", "/"),
            jwt_secret: get_env("JWT_SECRET", "supersecretkey"),
            log_level: get_env("LOG_LEVEL", "info"),
        }
    }

    /// Obtener la dirección del servidor
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        // Sin variables seteadas caemos a los defaults de desarrollo
        let config = EnvironmentConfig::from_env();
        assert!(!config.db_host.is_empty());
        assert!(!config.jwt_secret.is_empty());
        assert!(config.port > 0);
    }
}
