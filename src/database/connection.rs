//! Conexión a PostgreSQL
//!
//! El pool vive detrás de un RwLock para poder reemplazarlo en un
//! reconnect sin parar el proceso: las queries toman el lado de lectura,
//! `reconnect` toma el de escritura.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::{error, warn};

use crate::database::config::DbConfig;
use crate::utils::errors::AppError;

const MAX_CONNECTIONS: u32 = 25;
const MIN_CONNECTIONS: u32 = 5;
const MAX_LIFETIME: Duration = Duration::from_secs(15 * 60);
const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    config: DbConfig,
    pool: RwLock<Option<PgPool>>,
}

impl Database {
    pub fn new(config: DbConfig) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                config,
                pool: RwLock::new(None),
            }),
        }
    }

    /// Crear el pool y verificar la conexión
    pub async fn connect(&self) -> Result<(), AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .min_connections(MIN_CONNECTIONS)
            .max_lifetime(MAX_LIFETIME)
            .idle_timeout(IDLE_TIMEOUT)
            .connect(&self.inner.config.dsn())
            .await?;

        // Ping inicial: si la base no responde, fallamos el arranque
        sqlx::query("SELECT 1").execute(&pool).await?;

        let mut guard = self.inner.pool.write().await;
        if let Some(old) = guard.take() {
            old.close().await;
        }
        *guard = Some(pool);

        Ok(())
    }

    /// Obtener el pool actual. Falla si todavía no hay conexión.
    pub async fn pool(&self) -> Result<PgPool, AppError> {
        let guard = self.inner.pool.read().await;
        guard
            .clone()
            .ok_or_else(|| AppError::ServiceUnavailable("database pool is not initialized".to_string()))
    }

    /// Probe de liveness: SELECT 1 sobre el pool actual
    pub async fn is_healthy(&self) -> bool {
        let pool = {
            let guard = self.inner.pool.read().await;
            guard.clone()
        };

        match pool {
            Some(pool) => sqlx::query("SELECT 1").execute(&pool).await.is_ok(),
            None => false,
        }
    }

    /// Cerrar el pool actual y reconectar
    pub async fn reconnect(&self) -> Result<(), AppError> {
        {
            let mut guard = self.inner.pool.write().await;
            if let Some(old) = guard.take() {
                old.close().await;
            }
        }

        self.connect().await
    }

    pub async fn close(&self) {
        let mut guard = self.inner.pool.write().await;
        if let Some(pool) = guard.take() {
            pool.close().await;
        }
    }

    /// Ejecutar una operación con reintentos ante errores transitorios.
    /// Backoff exponencial: 100ms, 200ms, 400ms, ...
    pub async fn with_retry<'a, T, F>(&'a self, max_retries: u32, mut f: F) -> Result<T, AppError>
    where
        F: FnMut() -> BoxFuture<'a, Result<T, AppError>>,
    {
        let mut last_err = AppError::ServiceUnavailable("no attempts made".to_string());

        for attempt in 0..max_retries {
            if attempt > 0 && !self.is_healthy().await {
                if let Err(e) = self.reconnect().await {
                    warn!(attempt, error = %e, "reconnect failed during retry");
                    last_err = e;
                    continue;
                }
            }

            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    warn!(attempt, error = %e, "transient database error, retrying");
                    last_err = e;
                    if attempt + 1 < max_retries {
                        let backoff = Duration::from_millis(100u64 << attempt);
                        tokio::time::sleep(backoff).await;
                    }
                }
                // Cualquier otro error sube de inmediato
                Err(e) => return Err(e),
            }
        }

        error!(max_retries, error = %last_err, "retries exhausted");
        Err(AppError::ServiceUnavailable(format!(
            "failed after {} retries: {}",
            max_retries, last_err
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_not_initialized() {
        let db = Database::new(DbConfig::new("localhost", "5432", "u", "p", "db", "disable"));
        let err = db.pool().await.unwrap_err();
        assert!(err.to_string().contains("database pool is not initialized"));
        assert!(err.is_transient());
        assert!(!db.is_healthy().await);
    }

    #[tokio::test]
    async fn test_with_retry_surfaces_permanent_errors_immediately() {
        let db = Database::new(DbConfig::new("localhost", "5432", "u", "p", "db", "disable"));
        let mut calls = 0u32;
        let result: Result<(), AppError> = db
            .with_retry(3, || {
                calls += 1;
                Box::pin(async { Err(AppError::Conflict("not retryable".to_string())) })
            })
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(calls, 1);
    }
}
