//! Servicio de conductores
//!
//! Máquina de estados del conductor: sesión, estado operativo y ubicación.
//! Cada operación muta la base en una sola transacción y publica el evento
//! correspondiente después del commit.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::broker::{self, messages, Rmq};
use crate::database::{Database, TxManager};
use crate::models::coordinate::entity_type;
use crate::models::driver::{DriverStatus, SessionSummary};
use crate::models::location::LocationUpdateCommand;
use crate::models::ride::RideStatus;
use crate::repositories::coordinate_repository::CoordinateRepository;
use crate::repositories::driver_repository::DriverRepository;
use crate::repositories::location_repository::{LocationRepository, NewLocationHistory};
use crate::repositories::ride_repository::RideRepository;
use crate::repositories::session_repository::SessionRepository;
use crate::services::fare::{driver_earnings, FareCalculator};
use crate::services::rate_limiter::RateLimiter;
use crate::utils::errors::AppError;
use crate::utils::validation::validate_lat_lng;

/// Intervalo mínimo entre updates de ubicación aceptados
const LOCATION_MIN_INTERVAL: Duration = Duration::from_secs(1);
/// Reintentos ante errores transitorios de la base
const DB_MAX_RETRIES: u32 = 3;

pub struct DriverService {
    db: Database,
    tx: TxManager,
    drivers: DriverRepository,
    sessions: SessionRepository,
    coordinates: CoordinateRepository,
    locations: LocationRepository,
    rides: RideRepository,
    broker: Rmq,
    rate_limiter: RateLimiter,
}

impl DriverService {
    pub fn new(db: Database, broker: Rmq) -> Self {
        Self {
            tx: TxManager::new(db.clone()),
            drivers: DriverRepository::new(db.clone()),
            sessions: SessionRepository::new(db.clone()),
            coordinates: CoordinateRepository::new(db.clone()),
            locations: LocationRepository::new(db.clone()),
            rides: RideRepository::new(db.clone()),
            rate_limiter: RateLimiter::new(LOCATION_MIN_INTERVAL),
            db,
            broker,
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Pasar a AVAILABLE: abre sesión, fija la ubicación inicial y
    /// registra el primer punto del historial, todo en una transacción.
    pub async fn go_online(&self, driver_id: Uuid, lat: f64, lng: f64) -> Result<Uuid, AppError> {
        validate_lat_lng(lat, lng)?;

        let drivers = self.drivers.clone();
        let sessions = self.sessions.clone();
        let coordinates = self.coordinates.clone();
        let locations = self.locations.clone();

        let session_id = self
            .tx
            .with_tx(move |conn: &mut PgConnection| {
                Box::pin(async move {
                    let driver = drivers
                        .get_by_id_tx(conn, driver_id)
                        .await?
                        .ok_or_else(|| AppError::NotFound("driver not found".to_string()))?;

                    if driver.status != DriverStatus::Offline {
                        return Err(AppError::Conflict(format!(
                            "cannot go online: current status {}",
                            driver.status
                        )));
                    }

                    let session_id = sessions.create(conn, driver_id).await?;
                    drivers
                        .update_status(conn, driver_id, DriverStatus::Available)
                        .await?;

                    let coordinate_id = coordinates
                        .create_or_update(conn, driver_id, entity_type::DRIVER, lat, lng, None)
                        .await?;

                    locations
                        .append(
                            conn,
                            NewLocationHistory {
                                driver_id,
                                coordinate_id,
                                latitude: lat,
                                longitude: lng,
                                accuracy_meters: None,
                                speed_kmh: None,
                                heading_degrees: None,
                                ride_id: None,
                                recorded_at: Utc::now(),
                            },
                        )
                        .await?;

                    Ok(session_id)
                })
            })
            .await?;

        info!(%driver_id, %session_id, "driver online");
        self.publish_driver_status(driver_id, DriverStatus::Available, None)
            .await;

        Ok(session_id)
    }

    /// Pasar a OFFLINE. Se rechaza si el conductor está BUSY/EN_ROUTE:
    /// primero tiene que terminar el viaje activo.
    pub async fn go_offline(&self, driver_id: Uuid) -> Result<SessionSummary, AppError> {
        let drivers = self.drivers.clone();
        let sessions = self.sessions.clone();

        let summary = self
            .tx
            .with_tx(move |conn: &mut PgConnection| {
                Box::pin(async move {
                    let driver = drivers
                        .get_by_id_tx(conn, driver_id)
                        .await?
                        .ok_or_else(|| AppError::NotFound("driver not found".to_string()))?;

                    if driver.status != DriverStatus::Available {
                        return Err(AppError::Conflict(format!(
                            "cannot go offline: current status {} (complete active ride first)",
                            driver.status
                        )));
                    }

                    let session = sessions
                        .get_active(conn, driver_id)
                        .await?
                        .ok_or_else(|| AppError::NotFound("no active session found".to_string()))?;

                    sessions.close(conn, session.id).await?;
                    drivers
                        .update_status(conn, driver_id, DriverStatus::Offline)
                        .await?;

                    let duration_hours =
                        (Utc::now() - session.started_at).num_seconds() as f64 / 3600.0;

                    Ok(SessionSummary {
                        session_id: session.id,
                        duration_hours,
                        rides_completed: session.total_rides,
                        earnings: session.total_earnings,
                    })
                })
            })
            .await?;

        info!(%driver_id, session_id = %summary.session_id, "driver offline");
        self.publish_driver_status(driver_id, DriverStatus::Offline, None)
            .await;

        Ok(summary)
    }

    /// Update de ubicación: upsert de la coordenada vigente + fila de
    /// historial en la misma transacción, y broadcast por el fanout.
    /// Devuelve None si el update cayó por rate limit (se descarta en
    /// silencio).
    pub async fn update_location(
        &self,
        driver_id: Uuid,
        update: LocationUpdateCommand,
    ) -> Result<Option<(Uuid, DateTime<Utc>)>, AppError> {
        validate_lat_lng(update.latitude, update.longitude)?;

        if !self.rate_limiter.allow(driver_id) {
            return Ok(None);
        }

        let driver = self
            .drivers
            .get_by_id(driver_id)
            .await?
            .ok_or_else(|| AppError::NotFound("driver not found".to_string()))?;

        if driver.status == DriverStatus::Offline {
            return Err(AppError::Conflict(
                "cannot update location: driver offline".to_string(),
            ));
        }

        let coordinates = self.coordinates.clone();
        let locations = self.locations.clone();
        let recorded_at = Utc::now();
        let tx_update = update.clone();

        let coordinate_id = self
            .tx
            .with_tx(move |conn: &mut PgConnection| {
                Box::pin(async move {
                    let coordinate_id = coordinates
                        .create_or_update(
                            conn,
                            driver_id,
                            entity_type::DRIVER,
                            tx_update.latitude,
                            tx_update.longitude,
                            tx_update.address.as_deref(),
                        )
                        .await?;

                    locations
                        .append(
                            conn,
                            NewLocationHistory {
                                driver_id,
                                coordinate_id,
                                latitude: tx_update.latitude,
                                longitude: tx_update.longitude,
                                accuracy_meters: tx_update.accuracy_meters,
                                speed_kmh: tx_update.speed_kmh,
                                heading_degrees: tx_update.heading_degrees,
                                ride_id: tx_update.ride_id,
                                recorded_at,
                            },
                        )
                        .await?;

                    Ok(coordinate_id)
                })
            })
            .await?;

        let message = messages::LocationUpdate {
            driver_id,
            ride_id: update.ride_id,
            location: messages::Coordinate {
                lat: update.latitude,
                lng: update.longitude,
                address: update.address,
            },
            speed_kmh: update.speed_kmh,
            heading_degrees: update.heading_degrees,
            timestamp: recorded_at,
        };

        if let Err(e) = self
            .broker
            .publish_json(broker::EXCHANGE_LOCATION_FANOUT, "", &message)
            .await
        {
            warn!(%driver_id, action = "publish_error", error = %e, "failed to broadcast location");
        }

        Ok(Some((coordinate_id, recorded_at)))
    }

    /// Última posición conocida del conductor
    pub async fn current_location(
        &self,
        driver_id: Uuid,
    ) -> Result<Option<(Uuid, DateTime<Utc>)>, AppError> {
        let coordinate = self
            .coordinates
            .get_current(driver_id, entity_type::DRIVER)
            .await?;
        Ok(coordinate.map(|c| (c.id, c.updated_at)))
    }

    /// Arrancar el viaje: el conductor (BUSY) está con el pasajero a bordo
    pub async fn start_ride(
        &self,
        driver_id: Uuid,
        ride_id: Uuid,
        lat: f64,
        lng: f64,
    ) -> Result<DateTime<Utc>, AppError> {
        validate_lat_lng(lat, lng)?;

        let drivers = self.drivers.clone();
        let rides = self.rides.clone();
        let coordinates = self.coordinates.clone();
        let locations = self.locations.clone();
        let started_at = Utc::now();

        self.tx
            .with_tx(move |conn: &mut PgConnection| {
                Box::pin(async move {
                    let driver = drivers
                        .get_by_id_tx(conn, driver_id)
                        .await?
                        .ok_or_else(|| AppError::NotFound("driver not found".to_string()))?;

                    if driver.status != DriverStatus::Busy {
                        return Err(AppError::Conflict(format!(
                            "cannot start ride: driver status is {}, must be BUSY",
                            driver.status
                        )));
                    }

                    let ride = rides
                        .get_by_id_tx(conn, ride_id)
                        .await?
                        .ok_or_else(|| AppError::NotFound("ride not found".to_string()))?;

                    if ride.driver_id != Some(driver_id) {
                        return Err(AppError::Forbidden(
                            "ride is not assigned to this driver".to_string(),
                        ));
                    }

                    if !rides.mark_in_progress(conn, ride_id).await? {
                        return Err(AppError::Conflict(format!(
                            "cannot start ride: current status {}",
                            ride.status
                        )));
                    }

                    let coordinate_id = coordinates
                        .create_or_update(conn, driver_id, entity_type::DRIVER, lat, lng, None)
                        .await?;

                    locations
                        .append(
                            conn,
                            NewLocationHistory {
                                driver_id,
                                coordinate_id,
                                latitude: lat,
                                longitude: lng,
                                accuracy_meters: None,
                                speed_kmh: None,
                                heading_degrees: None,
                                ride_id: Some(ride_id),
                                recorded_at: started_at,
                            },
                        )
                        .await?;

                    Ok(())
                })
            })
            .await?;

        info!(%driver_id, %ride_id, "ride started");
        self.publish_ride_status(ride_id, Some(driver_id), RideStatus::InProgress, None, None)
            .await;

        Ok(started_at)
    }

    /// Completar el viaje: tarifa final con distancia/duración reales,
    /// conductor de vuelta a AVAILABLE, totales del conductor y de la
    /// sesión acumulados. Todo en una transacción; ante un error
    /// transitorio la operación completa se reintenta.
    pub async fn complete_ride(
        &self,
        driver_id: Uuid,
        ride_id: Uuid,
        final_lat: f64,
        final_lng: f64,
        actual_distance_km: f64,
        actual_duration_minutes: f64,
    ) -> Result<(DateTime<Utc>, f64), AppError> {
        validate_lat_lng(final_lat, final_lng)?;
        if actual_distance_km < 0.0 || actual_duration_minutes < 0.0 {
            return Err(AppError::BadRequest(
                "distance and duration must be non-negative".to_string(),
            ));
        }

        let (completed_at, earnings, final_fare) = self
            .db
            .with_retry(DB_MAX_RETRIES, || {
                Box::pin(self.complete_ride_tx(
                    driver_id,
                    ride_id,
                    final_lat,
                    final_lng,
                    actual_distance_km,
                    actual_duration_minutes,
                ))
            })
            .await?;

        info!(%driver_id, %ride_id, final_fare, earnings, "ride completed");
        self.publish_ride_status(
            ride_id,
            Some(driver_id),
            RideStatus::Completed,
            Some(final_fare),
            None,
        )
        .await;
        self.publish_driver_status(driver_id, DriverStatus::Available, Some(ride_id))
            .await;

        Ok((completed_at, earnings))
    }

    async fn complete_ride_tx(
        &self,
        driver_id: Uuid,
        ride_id: Uuid,
        final_lat: f64,
        final_lng: f64,
        actual_distance_km: f64,
        actual_duration_minutes: f64,
    ) -> Result<(DateTime<Utc>, f64, f64), AppError> {
        let drivers = self.drivers.clone();
        let sessions = self.sessions.clone();
        let coordinates = self.coordinates.clone();
        let locations = self.locations.clone();
        let rides = self.rides.clone();
        let completed_at = Utc::now();

        self.tx
            .with_tx(move |conn: &mut PgConnection| {
                Box::pin(async move {
                    let ride = rides
                        .get_by_id_tx(conn, ride_id)
                        .await?
                        .ok_or_else(|| AppError::NotFound("ride not found".to_string()))?;

                    if ride.driver_id != Some(driver_id) {
                        return Err(AppError::Forbidden(
                            "ride is not assigned to this driver".to_string(),
                        ));
                    }

                    let final_fare = FareCalculator::for_vehicle(ride.vehicle_type)
                        .calculate(actual_distance_km, actual_duration_minutes);

                    if !rides.mark_completed(conn, ride_id, final_fare).await? {
                        return Err(AppError::Conflict(format!(
                            "cannot complete ride: current status {}",
                            ride.status
                        )));
                    }

                    let coordinate_id = coordinates
                        .create_or_update(
                            conn,
                            driver_id,
                            entity_type::DRIVER,
                            final_lat,
                            final_lng,
                            None,
                        )
                        .await?;

                    locations
                        .append(
                            conn,
                            NewLocationHistory {
                                driver_id,
                                coordinate_id,
                                latitude: final_lat,
                                longitude: final_lng,
                                accuracy_meters: None,
                                speed_kmh: None,
                                heading_degrees: None,
                                ride_id: Some(ride_id),
                                recorded_at: completed_at,
                            },
                        )
                        .await?;

                    drivers
                        .update_status(conn, driver_id, DriverStatus::Available)
                        .await?;

                    let earnings = driver_earnings(final_fare);
                    drivers.add_completed_ride(conn, driver_id, earnings).await?;

                    let session = sessions
                        .get_active(conn, driver_id)
                        .await?
                        .ok_or_else(|| AppError::NotFound("no active session found".to_string()))?;
                    sessions
                        .add_completed_ride(conn, session.id, earnings)
                        .await?;

                    Ok((completed_at, earnings, final_fare))
                })
            })
            .await
    }

    async fn publish_driver_status(
        &self,
        driver_id: Uuid,
        status: DriverStatus,
        ride_id: Option<Uuid>,
    ) {
        let message = messages::DriverStatusUpdate {
            driver_id,
            status: status.as_str().to_string(),
            ride_id,
            timestamp: Utc::now(),
        };

        if let Err(e) = self
            .broker
            .publish_json(
                broker::EXCHANGE_DRIVER_TOPIC,
                &broker::driver_status_routing_key(&driver_id),
                &message,
            )
            .await
        {
            warn!(%driver_id, action = "publish_error", error = %e, "failed to publish driver status");
        }
    }

    async fn publish_ride_status(
        &self,
        ride_id: Uuid,
        driver_id: Option<Uuid>,
        status: RideStatus,
        final_fare: Option<f64>,
        message_text: Option<String>,
    ) {
        let message = messages::RideStatusUpdate {
            ride_id,
            driver_id,
            status: status.as_str().to_string(),
            timestamp: Utc::now(),
            final_fare,
            message: message_text,
            correlation_id: None,
        };

        if let Err(e) = self
            .broker
            .publish_json(
                broker::EXCHANGE_RIDE_TOPIC,
                &broker::ride_status_routing_key(status.as_str()),
                &message,
            )
            .await
        {
            warn!(%ride_id, action = "publish_error", error = %e, "failed to publish ride status");
        }
    }
}
