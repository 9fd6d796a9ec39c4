//! Repositorio de rides
//!
//! Todas las transiciones de estado usan updates condicionales
//! (`WHERE status = <anterior>`) como compare-and-swap: ante consumidores
//! concurrentes gana exactamente uno y el resto ve 0 filas afectadas.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::database::Database;
use crate::models::ride::{Ride, RideStatus, VehicleType};
use crate::utils::errors::AppError;

/// Datos para insertar un ride nuevo (las coordenadas ya existen)
#[derive(Debug)]
pub struct NewRide {
    pub id: Uuid,
    pub ride_number: String,
    pub passenger_id: Uuid,
    pub vehicle_type: VehicleType,
    pub pickup_coordinate_id: Uuid,
    pub destination_coordinate_id: Uuid,
    pub estimated_fare: f64,
    pub estimated_distance_km: f64,
    pub estimated_duration_minutes: i32,
}

#[derive(Clone)]
pub struct RideRepository {
    db: Database,
}

impl RideRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insertar el ride en estado REQUESTED (dentro de la transacción
    /// que ya creó sus dos coordenadas)
    pub async fn create(&self, conn: &mut PgConnection, new_ride: NewRide) -> Result<Ride, AppError> {
        let ride = sqlx::query_as::<_, Ride>(
            r#"
            INSERT INTO rides (
                id, ride_number, passenger_id, vehicle_type, status,
                pickup_coordinate_id, destination_coordinate_id,
                estimated_fare, estimated_distance_km, estimated_duration_minutes
            )
            VALUES ($1, $2, $3, $4, 'REQUESTED', $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(new_ride.id)
        .bind(&new_ride.ride_number)
        .bind(new_ride.passenger_id)
        .bind(new_ride.vehicle_type)
        .bind(new_ride.pickup_coordinate_id)
        .bind(new_ride.destination_coordinate_id)
        .bind(new_ride.estimated_fare)
        .bind(new_ride.estimated_distance_km)
        .bind(new_ride.estimated_duration_minutes)
        .fetch_one(&mut *conn)
        .await?;

        Ok(ride)
    }

    pub async fn get_by_id(&self, ride_id: Uuid) -> Result<Option<Ride>, AppError> {
        let pool = self.db.pool().await?;
        let ride = sqlx::query_as::<_, Ride>("SELECT * FROM rides WHERE id = $1")
            .bind(ride_id)
            .fetch_optional(&pool)
            .await?;
        Ok(ride)
    }

    pub async fn get_by_id_tx(
        &self,
        conn: &mut PgConnection,
        ride_id: Uuid,
    ) -> Result<Option<Ride>, AppError> {
        let ride = sqlx::query_as::<_, Ride>("SELECT * FROM rides WHERE id = $1")
            .bind(ride_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(ride)
    }

    pub async fn list_by_passenger(
        &self,
        passenger_id: Uuid,
        status: Option<RideStatus>,
    ) -> Result<Vec<Ride>, AppError> {
        let pool = self.db.pool().await?;

        let rides = match status {
            Some(status) => {
                sqlx::query_as::<_, Ride>(
                    "SELECT * FROM rides WHERE passenger_id = $1 AND status = $2 ORDER BY requested_at DESC",
                )
                .bind(passenger_id)
                .bind(status)
                .fetch_all(&pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Ride>(
                    "SELECT * FROM rides WHERE passenger_id = $1 ORDER BY requested_at DESC",
                )
                .bind(passenger_id)
                .fetch_all(&pool)
                .await?
            }
        };

        Ok(rides)
    }

    /// REQUESTED -> MATCHED: asigna driver y sella matched_at.
    /// Devuelve false si otro escritor llegó primero.
    pub async fn mark_matched(
        &self,
        conn: &mut PgConnection,
        ride_id: Uuid,
        driver_id: Uuid,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE rides
            SET status = 'MATCHED', driver_id = $2, matched_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'REQUESTED'
            "#,
        )
        .bind(ride_id)
        .bind(driver_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// MATCHED -> EN_ROUTE
    pub async fn mark_en_route(
        &self,
        conn: &mut PgConnection,
        ride_id: Uuid,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE rides SET status = 'EN_ROUTE', updated_at = NOW() WHERE id = $1 AND status = 'MATCHED'",
        )
        .bind(ride_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// EN_ROUTE -> ARRIVED, sella arrived_at
    pub async fn mark_arrived(
        &self,
        conn: &mut PgConnection,
        ride_id: Uuid,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE rides SET status = 'ARRIVED', arrived_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'EN_ROUTE'
            "#,
        )
        .bind(ride_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Arranque del viaje: el conductor puede estar todavía en una fase de
    /// pickup sin registrar (MATCHED/EN_ROUTE/ARRIVED), las tres colapsan
    /// a IN_PROGRESS y se sella started_at.
    pub async fn mark_in_progress(
        &self,
        conn: &mut PgConnection,
        ride_id: Uuid,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE rides SET status = 'IN_PROGRESS', started_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status IN ('MATCHED', 'EN_ROUTE', 'ARRIVED')
            "#,
        )
        .bind(ride_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// IN_PROGRESS -> COMPLETED con la tarifa final
    pub async fn mark_completed(
        &self,
        conn: &mut PgConnection,
        ride_id: Uuid,
        final_fare: f64,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE rides
            SET status = 'COMPLETED', final_fare = $2, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'IN_PROGRESS'
            "#,
        )
        .bind(ride_id)
        .bind(final_fare)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cancelación del pasajero: sólo antes de que el viaje arranque.
    /// Devuelve la fila actualizada (con driver_id, para liberar al
    /// conductor) o None si el estado actual no lo permite.
    pub async fn cancel_before_start(
        &self,
        conn: &mut PgConnection,
        ride_id: Uuid,
        reason: &str,
    ) -> Result<Option<Ride>, AppError> {
        let ride = sqlx::query_as::<_, Ride>(
            r#"
            UPDATE rides
            SET status = 'CANCELLED', cancellation_reason = $2, cancelled_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status IN ('REQUESTED', 'MATCHED', 'EN_ROUTE', 'ARRIVED')
            RETURNING *
            "#,
        )
        .bind(ride_id)
        .bind(reason)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(ride)
    }

    /// Cancelar desde cualquier estado no terminal (lo usan los
    /// consumidores de eventos de estado). Devuelve la fila actualizada
    /// o None si el viaje ya estaba en un estado terminal.
    pub async fn cancel(
        &self,
        conn: &mut PgConnection,
        ride_id: Uuid,
        reason: &str,
    ) -> Result<Option<Ride>, AppError> {
        let ride = sqlx::query_as::<_, Ride>(
            r#"
            UPDATE rides
            SET status = 'CANCELLED', cancellation_reason = $2, cancelled_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status IN ('REQUESTED', 'MATCHED', 'EN_ROUTE', 'ARRIVED', 'IN_PROGRESS')
            RETURNING *
            "#,
        )
        .bind(ride_id)
        .bind(reason)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(ride)
    }
}
