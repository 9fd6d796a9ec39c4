//! Manejo de transacciones
//!
//! `with_tx` abre una transacción y le pasa el handle (`&mut PgConnection`)
//! a la clausura. Las operaciones anidadas reciben ese mismo handle, de modo
//! que se suman a la transacción exterior en lugar de abrir una nueva: por
//! scope exterior hay exactamente un commit o un rollback.

use futures::future::BoxFuture;
use sqlx::PgConnection;
use tracing::error;

use crate::database::connection::Database;
use crate::utils::errors::AppError;

#[derive(Clone)]
pub struct TxManager {
    db: Database,
}

impl TxManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Ejecutar `f` dentro de una transacción. Commit si devuelve Ok,
    /// rollback si devuelve Err.
    pub async fn with_tx<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, AppError>>,
    {
        let pool = self.db.pool().await?;
        let mut tx = pool.begin().await?;

        match f(&mut *tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(error = %rollback_err, "failed to rollback transaction");
                }
                Err(e)
            }
        }
    }
}
