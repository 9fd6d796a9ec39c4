//! Repositorio de drivers
//!
//! La reserva de un conductor para un viaje es un update condicional
//! AVAILABLE -> BUSY: ante dos ofertas simultáneas gana exactamente una.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::database::Database;
use crate::models::driver::{Driver, DriverStatus, DriverWithDistance};
use crate::models::ride::VehicleType;
use crate::utils::errors::AppError;

#[derive(Clone)]
pub struct DriverRepository {
    db: Database,
}

impl DriverRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get_by_id(&self, driver_id: Uuid) -> Result<Option<Driver>, AppError> {
        let pool = self.db.pool().await?;
        let driver = sqlx::query_as::<_, Driver>("SELECT * FROM drivers WHERE id = $1")
            .bind(driver_id)
            .fetch_optional(&pool)
            .await?;
        Ok(driver)
    }

    pub async fn get_by_id_tx(
        &self,
        conn: &mut PgConnection,
        driver_id: Uuid,
    ) -> Result<Option<Driver>, AppError> {
        let driver = sqlx::query_as::<_, Driver>("SELECT * FROM drivers WHERE id = $1")
            .bind(driver_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(driver)
    }

    pub async fn update_status(
        &self,
        conn: &mut PgConnection,
        driver_id: Uuid,
        status: DriverStatus,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE drivers SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(driver_id)
            .bind(status)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Reserva atómica: AVAILABLE -> BUSY. Devuelve false si el conductor
    /// ya no estaba disponible (otra oferta ganó la carrera).
    pub async fn try_reserve(&self, driver_id: Uuid) -> Result<bool, AppError> {
        let pool = self.db.pool().await?;
        let result = sqlx::query(
            "UPDATE drivers SET status = 'BUSY', updated_at = NOW() WHERE id = $1 AND status = 'AVAILABLE'",
        )
        .bind(driver_id)
        .execute(&pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Liberar al conductor tras una cancelación: BUSY/EN_ROUTE -> AVAILABLE
    pub async fn release(
        &self,
        conn: &mut PgConnection,
        driver_id: Uuid,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE drivers SET status = 'AVAILABLE', updated_at = NOW()
            WHERE id = $1 AND status IN ('BUSY', 'EN_ROUTE')
            "#,
        )
        .bind(driver_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Acumular un viaje completado en los totales del conductor
    pub async fn add_completed_ride(
        &self,
        conn: &mut PgConnection,
        driver_id: Uuid,
        earnings: f64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE drivers
            SET total_rides = total_rides + 1,
                total_earnings = total_earnings + $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(driver_id)
        .bind(earnings)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Conductores AVAILABLE del tipo pedido dentro del radio, ordenados
    /// por distancia y rating. El radio va en metros (ST_DWithin sobre
    /// geography).
    pub async fn find_available_nearby(
        &self,
        lat: f64,
        lng: f64,
        vehicle_type: VehicleType,
        radius_meters: f64,
        limit: i64,
    ) -> Result<Vec<DriverWithDistance>, AppError> {
        let pool = self.db.pool().await?;

        let drivers = sqlx::query_as::<_, DriverWithDistance>(
            r#"
            SELECT d.id, u.email, d.rating, d.vehicle_attrs, c.latitude, c.longitude,
                   ST_Distance(
                     ST_MakePoint(c.longitude, c.latitude)::geography,
                     ST_MakePoint($1, $2)::geography
                   ) / 1000 AS distance_km
            FROM drivers d
            JOIN users u ON d.id = u.id
            JOIN coordinates c ON c.entity_id = d.id
              AND c.entity_type = 'driver'
              AND c.is_current = true
            WHERE d.status = 'AVAILABLE'
              AND d.vehicle_type = $3
              AND ST_DWithin(
                    ST_MakePoint(c.longitude, c.latitude)::geography,
                    ST_MakePoint($1, $2)::geography,
                    $4
                  )
            ORDER BY distance_km, d.rating DESC
            LIMIT $5
            "#,
        )
        .bind(lng)
        .bind(lat)
        .bind(vehicle_type)
        .bind(radius_meters)
        .bind(limit)
        .fetch_all(&pool)
        .await?;

        Ok(drivers)
    }
}
