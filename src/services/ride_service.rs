//! Servicio de viajes
//!
//! Máquina de estados del ride. Las transiciones se linealizan con updates
//! condicionales: un consumidor que observa un edge fuera de orden lo
//! descarta como no-op idempotente.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgConnection;
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::{self, messages, BrokerMessage, Rmq};
use crate::database::{Database, TxManager};
use crate::models::coordinate::entity_type;
use crate::models::ride::{Ride, RideStatus, VehicleType};
use crate::repositories::coordinate_repository::CoordinateRepository;
use crate::repositories::driver_repository::DriverRepository;
use crate::repositories::ride_repository::{NewRide, RideRepository};
use crate::services::fare::{estimate_duration_minutes, haversine_km, FareCalculator};
use crate::utils::errors::AppError;
use crate::utils::validation::validate_lat_lng;
use crate::ws::messages::{Coords, DriverInfoFrame, OutboundFrame};
use crate::ws::Hub;

/// Radio que viaja en el match request
const MATCH_MAX_DISTANCE_KM: f64 = 5.0;
/// Plazo de respuesta que viaja en el match request
const MATCH_TIMEOUT_SECONDS: u64 = 60;

/// Comando de creación de viaje, ya validado por el borde HTTP
#[derive(Debug, Clone)]
pub struct CreateRideCommand {
    pub passenger_id: Uuid,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub pickup_address: String,
    pub destination_latitude: f64,
    pub destination_longitude: f64,
    pub destination_address: String,
    pub ride_type: String,
}

pub struct RideService {
    tx: TxManager,
    rides: RideRepository,
    coordinates: CoordinateRepository,
    drivers: DriverRepository,
    broker: Rmq,
    passenger_hub: Hub,
    driver_hub: Hub,
}

impl RideService {
    pub fn new(db: Database, broker: Rmq, passenger_hub: Hub, driver_hub: Hub) -> Self {
        Self {
            tx: TxManager::new(db.clone()),
            rides: RideRepository::new(db.clone()),
            coordinates: CoordinateRepository::new(db.clone()),
            drivers: DriverRepository::new(db),
            broker,
            passenger_hub,
            driver_hub,
        }
    }

    /// Crear el viaje: estimaciones, número humano, inserción de las dos
    /// coordenadas y del ride en una transacción, y publicación del match
    /// request después del commit.
    pub async fn create_ride(&self, cmd: CreateRideCommand) -> Result<Ride, AppError> {
        validate_lat_lng(cmd.pickup_latitude, cmd.pickup_longitude)?;
        validate_lat_lng(cmd.destination_latitude, cmd.destination_longitude)?;

        let vehicle_type = VehicleType::parse(&cmd.ride_type)
            .ok_or_else(|| AppError::BadRequest(format!("invalid ride_type {}", cmd.ride_type)))?;

        let distance_km = haversine_km(
            cmd.pickup_latitude,
            cmd.pickup_longitude,
            cmd.destination_latitude,
            cmd.destination_longitude,
        );
        let duration_minutes = estimate_duration_minutes(distance_km);
        let estimated_fare = FareCalculator::for_vehicle(vehicle_type)
            .calculate(distance_km, duration_minutes as f64);

        let now = Utc::now();
        let ride_id = Uuid::new_v4();
        let ride_number = format!(
            "RIDE-{}",
            now.timestamp_nanos_opt()
                .unwrap_or_else(|| now.timestamp_millis() * 1_000_000)
        );

        let coordinates = self.coordinates.clone();
        let rides = self.rides.clone();
        let tx_cmd = cmd.clone();
        let tx_ride_number = ride_number.clone();

        let ride = self
            .tx
            .with_tx(move |conn: &mut PgConnection| {
                Box::pin(async move {
                    let pickup_coordinate_id = coordinates
                        .insert(
                            conn,
                            ride_id,
                            entity_type::RIDE_PICKUP,
                            tx_cmd.pickup_latitude,
                            tx_cmd.pickup_longitude,
                            Some(&tx_cmd.pickup_address),
                        )
                        .await?;

                    let destination_coordinate_id = coordinates
                        .insert(
                            conn,
                            ride_id,
                            entity_type::RIDE_DESTINATION,
                            tx_cmd.destination_latitude,
                            tx_cmd.destination_longitude,
                            Some(&tx_cmd.destination_address),
                        )
                        .await?;

                    rides
                        .create(
                            conn,
                            NewRide {
                                id: ride_id,
                                ride_number: tx_ride_number,
                                passenger_id: tx_cmd.passenger_id,
                                vehicle_type,
                                pickup_coordinate_id,
                                destination_coordinate_id,
                                estimated_fare,
                                estimated_distance_km: distance_km,
                                estimated_duration_minutes: duration_minutes,
                            },
                        )
                        .await
                })
            })
            .await?;

        info!(
            ride_id = %ride.id,
            ride_number = %ride.ride_number,
            passenger_id = %ride.passenger_id,
            vehicle_type = %ride.vehicle_type,
            estimated_fare,
            "ride created"
        );

        let request = messages::RideMatchRequest {
            ride_id: ride.id,
            ride_number: ride.ride_number.clone(),
            pickup_location: messages::Coordinate {
                lat: cmd.pickup_latitude,
                lng: cmd.pickup_longitude,
                address: Some(cmd.pickup_address),
            },
            destination_location: messages::Coordinate {
                lat: cmd.destination_latitude,
                lng: cmd.destination_longitude,
                address: Some(cmd.destination_address),
            },
            ride_type: vehicle_type.as_str().to_string(),
            estimated_fare,
            max_distance_km: MATCH_MAX_DISTANCE_KM,
            timeout_seconds: MATCH_TIMEOUT_SECONDS,
            correlation_id: None,
            requested_at: ride.requested_at,
        };

        if let Err(e) = self
            .broker
            .publish_json(
                broker::EXCHANGE_RIDE_TOPIC,
                &broker::ride_request_routing_key(vehicle_type.as_str()),
                &request,
            )
            .await
        {
            error!(ride_id = %ride.id, action = "publish_error", error = %e,
                "failed to publish ride match request");
        }

        Ok(ride)
    }

    /// Cancelación del pasajero. Conflict si el viaje ya es terminal o ya
    /// arrancó; si había conductor asignado se lo libera y se le avisa.
    pub async fn cancel_ride(
        &self,
        ride_id: Uuid,
        passenger_id: Uuid,
        reason: &str,
    ) -> Result<Ride, AppError> {
        let rides = self.rides.clone();
        let drivers = self.drivers.clone();
        let tx_reason = reason.to_string();

        let cancelled = self
            .tx
            .with_tx(move |conn: &mut PgConnection| {
                Box::pin(async move {
                    let ride = rides
                        .get_by_id_tx(conn, ride_id)
                        .await?
                        .ok_or_else(|| AppError::NotFound("ride not found".to_string()))?;

                    if ride.passenger_id != passenger_id {
                        return Err(AppError::Forbidden(
                            "ride does not belong to this passenger".to_string(),
                        ));
                    }

                    let cancelled = rides
                        .cancel_before_start(conn, ride_id, &tx_reason)
                        .await?
                        .ok_or_else(|| {
                            AppError::Conflict(format!(
                                "cannot cancel ride: current status {}",
                                ride.status
                            ))
                        })?;

                    if let Some(driver_id) = cancelled.driver_id {
                        drivers.release(conn, driver_id).await?;
                    }

                    Ok(cancelled)
                })
            })
            .await?;

        info!(%ride_id, reason, "ride cancelled by passenger");

        self.publish_ride_status(&cancelled, RideStatus::Cancelled, Some(reason.to_string()))
            .await;

        if let Some(driver_id) = cancelled.driver_id {
            self.publish_driver_available(driver_id, ride_id).await;

            let _ = self
                .driver_hub
                .send_json_to_user(
                    &driver_id.to_string(),
                    &OutboundFrame::RideCancelled {
                        ride_id,
                        reason: reason.to_string(),
                    },
                )
                .await;
        }

        Ok(cancelled)
    }

    pub async fn get_ride(&self, ride_id: Uuid, passenger_id: Uuid) -> Result<Ride, AppError> {
        let ride = self
            .rides
            .get_by_id(ride_id)
            .await?
            .ok_or_else(|| AppError::NotFound("ride not found".to_string()))?;

        if ride.passenger_id != passenger_id {
            return Err(AppError::Forbidden(
                "ride does not belong to this passenger".to_string(),
            ));
        }

        Ok(ride)
    }

    pub async fn list_rides(
        &self,
        passenger_id: Uuid,
        status: Option<&str>,
    ) -> Result<Vec<Ride>, AppError> {
        let status = match status {
            Some(raw) => Some(
                RideStatus::parse(raw)
                    .ok_or_else(|| AppError::BadRequest(format!("invalid status {}", raw)))?,
            ),
            None => None,
        };

        self.rides.list_by_passenger(passenger_id, status).await
    }

    // ---------- Consumidores ----------

    /// Consumidor de `driver_responses`: aplica REQUESTED -> MATCHED y
    /// notifica al pasajero. Respuestas para rides que ya no están en
    /// REQUESTED se descartan.
    pub async fn run_driver_responses(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        consume_loop(
            self.broker.clone(),
            broker::QUEUE_DRIVER_RESPONSES,
            "ride-service-responses",
            &mut shutdown,
            |msg| {
                let service = self.clone();
                async move { service.handle_driver_response(msg).await }
            },
        )
        .await;
    }

    async fn handle_driver_response(&self, msg: BrokerMessage) {
        let response: messages::DriverMatchResponse = match serde_json::from_slice(msg.body()) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "malformed driver response, dropping");
                let _ = msg.ack().await;
                return;
            }
        };

        if !response.accepted {
            let _ = msg.ack().await;
            return;
        }

        match self.apply_match(&response).await {
            Ok(()) => {
                let _ = msg.ack().await;
            }
            Err(e) if e.is_transient() => {
                warn!(ride_id = %response.ride_id, error = %e, "transient error, requeueing");
                let _ = msg.nack(true).await;
            }
            Err(e) => {
                error!(ride_id = %response.ride_id, action = e.action_code(), error = %e,
                    "failed to apply match");
                let _ = msg.ack().await;
            }
        }
    }

    async fn apply_match(&self, response: &messages::DriverMatchResponse) -> Result<(), AppError> {
        let rides = self.rides.clone();
        let ride_id = response.ride_id;
        let driver_id = response.driver_id;

        let applied = self
            .tx
            .with_tx(move |conn: &mut PgConnection| {
                Box::pin(async move { rides.mark_matched(conn, ride_id, driver_id).await })
            })
            .await?;

        if !applied {
            // Otro escritor ganó o el ride ya no está en REQUESTED
            debug!(%ride_id, "discarding response for non-REQUESTED ride");
            return Ok(());
        }

        let ride = self.rides.get_by_id(ride_id).await?;
        let Some(ride) = ride else { return Ok(()) };

        info!(%ride_id, %driver_id, "ride matched");

        // Publicación propia del edge para los demás consumidores
        self.publish_ride_status(&ride, RideStatus::Matched, None).await;

        let driver_info = response.driver_info.as_ref().map(|info| DriverInfoFrame {
            driver_id: info.driver_id,
            name: info.name.clone(),
            rating: info.rating,
            vehicle: info
                .vehicle
                .as_ref()
                .and_then(|v| serde_json::to_value(v).ok()),
        });

        let _ = self
            .passenger_hub
            .send_json_to_user(
                &ride.passenger_id.to_string(),
                &OutboundFrame::RideStatusUpdate {
                    ride_id,
                    ride_number: Some(ride.ride_number.clone()),
                    status: RideStatus::Matched.as_str().to_string(),
                    message: None,
                    final_fare: None,
                    driver_info,
                },
            )
            .await;

        Ok(())
    }

    /// Consumidor de `ride_status`: aplica los edges del DAG (publicados
    /// por este servicio o por el de conductores) y notifica al pasajero.
    /// Un edge fuera de orden es un no-op.
    pub async fn run_ride_status(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        consume_loop(
            self.broker.clone(),
            broker::QUEUE_RIDE_STATUS,
            "ride-service-status",
            &mut shutdown,
            |msg| {
                let service = self.clone();
                async move { service.handle_ride_status(msg).await }
            },
        )
        .await;
    }

    async fn handle_ride_status(&self, msg: BrokerMessage) {
        let event: messages::RideStatusUpdate = match serde_json::from_slice(msg.body()) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "malformed ride status event, dropping");
                let _ = msg.ack().await;
                return;
            }
        };

        match self.apply_status_event(&event).await {
            Ok(()) => {
                let _ = msg.ack().await;
            }
            Err(e) if e.is_transient() => {
                warn!(ride_id = %event.ride_id, error = %e, "transient error, requeueing");
                let _ = msg.nack(true).await;
            }
            Err(e) => {
                error!(ride_id = %event.ride_id, action = e.action_code(), error = %e,
                    "failed to apply status event");
                let _ = msg.ack().await;
            }
        }
    }

    async fn apply_status_event(&self, event: &messages::RideStatusUpdate) -> Result<(), AppError> {
        let Some(status) = RideStatus::parse(&event.status) else {
            warn!(ride_id = %event.ride_id, status = %event.status, "unknown ride status, dropping");
            return Ok(());
        };

        let rides = self.rides.clone();
        let drivers = self.drivers.clone();
        let ride_id = event.ride_id;
        let final_fare = event.final_fare;
        let reason = event
            .message
            .clone()
            .unwrap_or_else(|| "cancelled".to_string());

        // Cada edge con su update condicional; 0 filas = no-op idempotente
        let applied = self
            .tx
            .with_tx(move |conn: &mut PgConnection| {
                Box::pin(async move {
                    match status {
                        RideStatus::EnRoute => rides.mark_en_route(conn, ride_id).await,
                        RideStatus::Arrived => rides.mark_arrived(conn, ride_id).await,
                        RideStatus::InProgress => rides.mark_in_progress(conn, ride_id).await,
                        RideStatus::Completed => match final_fare {
                            Some(fare) => rides.mark_completed(conn, ride_id, fare).await,
                            None => {
                                warn!(%ride_id, "completed event without final_fare, dropping");
                                Ok(false)
                            }
                        },
                        RideStatus::Cancelled => {
                            match rides.cancel(conn, ride_id, &reason).await? {
                                Some(cancelled) => {
                                    if let Some(driver_id) = cancelled.driver_id {
                                        drivers.release(conn, driver_id).await?;
                                    }
                                    Ok(true)
                                }
                                None => Ok(false),
                            }
                        }
                        // MATCHED lo aplica el consumidor de respuestas;
                        // REQUESTED no es un edge
                        RideStatus::Matched | RideStatus::Requested => Ok(false),
                    }
                })
            })
            .await?;

        if applied {
            debug!(%ride_id, status = %status, "status edge applied");
        }

        // El pasajero se entera del evento aunque el edge ya estuviera
        // aplicado en la base (redelivery, publicación propia)
        if status != RideStatus::Matched {
            self.notify_passenger_status(event, status).await;
        }

        if status == RideStatus::Cancelled && applied {
            if let Some(Some(driver_id)) = self
                .rides
                .get_by_id(ride_id)
                .await
                .map(|r| r.and_then(|ride| ride.driver_id))
                .ok()
            {
                self.publish_driver_available(driver_id, ride_id).await;
                let _ = self
                    .driver_hub
                    .send_json_to_user(
                        &driver_id.to_string(),
                        &OutboundFrame::RideCancelled {
                            ride_id,
                            reason: event
                                .message
                                .clone()
                                .unwrap_or_else(|| "cancelled".to_string()),
                        },
                    )
                    .await;
            }
        }

        Ok(())
    }

    async fn notify_passenger_status(
        &self,
        event: &messages::RideStatusUpdate,
        status: RideStatus,
    ) {
        let ride = match self.rides.get_by_id(event.ride_id).await {
            Ok(Some(ride)) => ride,
            Ok(None) => {
                debug!(ride_id = %event.ride_id, "status event for unknown ride");
                return;
            }
            Err(e) => {
                warn!(ride_id = %event.ride_id, error = %e, "cannot load ride for notification");
                return;
            }
        };

        let _ = self
            .passenger_hub
            .send_json_to_user(
                &ride.passenger_id.to_string(),
                &OutboundFrame::RideStatusUpdate {
                    ride_id: event.ride_id,
                    ride_number: Some(ride.ride_number.clone()),
                    status: status.as_str().to_string(),
                    message: event.message.clone(),
                    final_fare: event.final_fare,
                    driver_info: None,
                },
            )
            .await;
    }

    /// Consumidor del fanout de ubicaciones: reenvía la posición del
    /// conductor al pasajero del viaje en curso.
    pub async fn run_location_updates(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        consume_loop(
            self.broker.clone(),
            broker::QUEUE_LOCATION_UPDATES,
            "ride-service-locations",
            &mut shutdown,
            |msg| {
                let service = self.clone();
                async move { service.handle_location_update(msg).await }
            },
        )
        .await;
    }

    async fn handle_location_update(&self, msg: BrokerMessage) {
        let update: messages::LocationUpdate = match serde_json::from_slice(msg.body()) {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "malformed location update, dropping");
                let _ = msg.ack().await;
                return;
            }
        };

        // Sólo interesa la posición durante un viaje
        if let Some(ride_id) = update.ride_id {
            if let Ok(Some(ride)) = self.rides.get_by_id(ride_id).await {
                let _ = self
                    .passenger_hub
                    .send_json_to_user(
                        &ride.passenger_id.to_string(),
                        &OutboundFrame::DriverLocationUpdate {
                            ride_id,
                            driver_location: Coords {
                                lat: update.location.lat,
                                lng: update.location.lng,
                            },
                            speed_kmh: update.speed_kmh,
                            heading_degrees: update.heading_degrees,
                        },
                    )
                    .await;
            }
        }

        let _ = msg.ack().await;
    }

    // ---------- Publicaciones ----------

    async fn publish_ride_status(&self, ride: &Ride, status: RideStatus, message: Option<String>) {
        let event = messages::RideStatusUpdate {
            ride_id: ride.id,
            driver_id: ride.driver_id,
            status: status.as_str().to_string(),
            timestamp: Utc::now(),
            final_fare: ride.final_fare,
            message,
            correlation_id: None,
        };

        if let Err(e) = self
            .broker
            .publish_json(
                broker::EXCHANGE_RIDE_TOPIC,
                &broker::ride_status_routing_key(status.as_str()),
                &event,
            )
            .await
        {
            error!(ride_id = %ride.id, action = "publish_error", error = %e,
                "failed to publish ride status");
        }
    }

    async fn publish_driver_available(&self, driver_id: Uuid, ride_id: Uuid) {
        let message = messages::DriverStatusUpdate {
            driver_id,
            status: "AVAILABLE".to_string(),
            ride_id: Some(ride_id),
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
            warn!(%driver_id, action = "publish_error", error = %e,
                "failed to publish driver status");
        }
    }
}

/// Skeleton compartido de los loops consumidores: abre el consumer,
/// procesa cada delivery en su propia tarea y reintenta cuando el stream
/// se corta (el supervisor se encarga de reconectar el broker).
async fn consume_loop<F, Fut>(
    broker: Rmq,
    queue: &'static str,
    tag: &'static str,
    shutdown: &mut watch::Receiver<bool>,
    mut handle: F,
) where
    F: FnMut(BrokerMessage) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    loop {
        let mut consumer = match broker.consume(queue, tag).await {
            Ok(consumer) => consumer,
            Err(e) => {
                warn!(queue, error = %e, "cannot open consumer, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(2)) => continue,
                    _ = shutdown.changed() => return,
                }
            }
        };

        info!(queue, "consumer started");

        loop {
            tokio::select! {
                delivery = consumer.next() => {
                    match delivery {
                        Some(Ok(delivery)) => {
                            tokio::spawn(handle(BrokerMessage::new(delivery)));
                        }
                        Some(Err(e)) => {
                            warn!(queue, error = %e, "consumer stream error");
                            break;
                        }
                        None => {
                            warn!(queue, "consumer stream closed");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!(queue, "consumer stopping");
                    return;
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(2)) => {},
            _ = shutdown.changed() => return,
        }
    }
}
