//! Repositorio de sesiones de conductor

use sqlx::PgConnection;
use uuid::Uuid;

use crate::database::Database;
use crate::models::driver::DriverSession;
use crate::utils::errors::AppError;

#[derive(Clone)]
pub struct SessionRepository {
    db: Database,
}

impl SessionRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, conn: &mut PgConnection, driver_id: Uuid) -> Result<Uuid, AppError> {
        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO driver_sessions (driver_id, started_at) VALUES ($1, NOW()) RETURNING id",
        )
        .bind(driver_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(id)
    }

    /// Sesión activa (ended_at IS NULL); hay a lo sumo una por conductor
    pub async fn get_active(
        &self,
        conn: &mut PgConnection,
        driver_id: Uuid,
    ) -> Result<Option<DriverSession>, AppError> {
        let session = sqlx::query_as::<_, DriverSession>(
            r#"
            SELECT id, driver_id, started_at, ended_at, total_rides, total_earnings
            FROM driver_sessions
            WHERE driver_id = $1 AND ended_at IS NULL
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(driver_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(session)
    }

    pub async fn close(&self, conn: &mut PgConnection, session_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE driver_sessions SET ended_at = NOW() WHERE id = $1")
            .bind(session_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Acumular un viaje completado en los totales de la sesión
    pub async fn add_completed_ride(
        &self,
        conn: &mut PgConnection,
        session_id: Uuid,
        earnings: f64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE driver_sessions
            SET total_rides = total_rides + 1,
                total_earnings = total_earnings + $2
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(earnings)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
