//! Repositorio del historial de ubicaciones (append-only)

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::database::Database;
use crate::utils::errors::AppError;

/// Fila nueva del historial
#[derive(Debug)]
pub struct NewLocationHistory {
    pub driver_id: Uuid,
    pub coordinate_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub heading_degrees: Option<f64>,
    pub ride_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct LocationRepository {
    db: Database,
}

impl LocationRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn append(
        &self,
        conn: &mut PgConnection,
        entry: NewLocationHistory,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO location_history
                (driver_id, coordinate_id, latitude, longitude,
                 accuracy_meters, speed_kmh, heading_degrees, ride_id, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.driver_id)
        .bind(entry.coordinate_id)
        .bind(entry.latitude)
        .bind(entry.longitude)
        .bind(entry.accuracy_meters)
        .bind(entry.speed_kmh)
        .bind(entry.heading_degrees)
        .bind(entry.ride_id)
        .bind(entry.recorded_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
