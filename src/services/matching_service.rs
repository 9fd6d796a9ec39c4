//! Servicio de matching
//!
//! Consume `ride_requests`, busca candidatos por radio y les ofrece el
//! viaje de a uno por vez a través del hub de conductores. La respuesta
//! entra por el canal realtime y se enruta a la oferta pendiente; la
//! reserva del conductor es un update condicional AVAILABLE -> BUSY, así
//! dos ofertas simultáneas nunca reservan al mismo conductor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::broker::{self, messages, BrokerMessage, Rmq};
use crate::models::driver::DriverWithDistance;
use crate::models::ride::VehicleType;
use crate::repositories::driver_repository::DriverRepository;
use crate::services::fare::{driver_earnings, estimate_duration_minutes, haversine_km};
use crate::utils::errors::AppError;
use crate::ws::messages::{Coords, LocationInfo, OutboundFrame};
use crate::ws::Hub;

/// Radio de búsqueda por defecto
const DEFAULT_MAX_DISTANCE_KM: f64 = 5.0;
/// Plazo por defecto para que un conductor responda una oferta
const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
/// Candidatos máximos por request
const CANDIDATE_LIMIT: i64 = 10;
/// Motivo de cancelación cuando no hay conductores
const NO_DRIVERS_REASON: &str = "no_drivers_available";

/// Respuesta de un conductor a una oferta pendiente
#[derive(Debug, Clone)]
pub struct OfferAnswer {
    pub accepted: bool,
    pub current_location: Option<Coords>,
}

/// Ofertas pendientes: offer_id -> canal de respuesta.
/// Una respuesta para una oferta ya vencida devuelve Err.
#[derive(Clone, Default)]
pub struct OfferRegistry {
    pending: Arc<Mutex<HashMap<Uuid, oneshot::Sender<OfferAnswer>>>>,
}

impl OfferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, offer_id: Uuid) -> oneshot::Receiver<OfferAnswer> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(offer_id, tx);
        }
        rx
    }

    fn remove(&self, offer_id: &Uuid) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(offer_id);
        }
    }

    /// Entregar la respuesta del conductor. Err si la oferta ya venció.
    pub fn resolve(&self, offer_id: &Uuid, answer: OfferAnswer) -> Result<(), AppError> {
        let sender = {
            let mut pending = self
                .pending
                .lock()
                .map_err(|_| AppError::Internal("offer registry poisoned".to_string()))?;
            pending.remove(offer_id)
        };

        match sender {
            Some(sender) => {
                // Si el matcher ya dejó de esperar, la oferta venció igual
                sender
                    .send(answer)
                    .map_err(|_| AppError::Conflict("offer_expired".to_string()))
            }
            None => Err(AppError::Conflict("offer_expired".to_string())),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}

pub struct MatchingService {
    drivers: DriverRepository,
    broker: Rmq,
    driver_hub: Hub,
    offers: OfferRegistry,
}

impl MatchingService {
    pub fn new(drivers: DriverRepository, broker: Rmq, driver_hub: Hub) -> Self {
        Self {
            drivers,
            broker,
            driver_hub,
            offers: OfferRegistry::new(),
        }
    }

    pub fn offers(&self) -> &OfferRegistry {
        &self.offers
    }

    /// Loop consumidor de `ride_requests`. Cada mensaje se procesa en su
    /// propia tarea; el ack llega recién cuando el cambio de estado que
    /// dispara ya está commiteado.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let mut consumer = match self
                .broker
                .consume(broker::QUEUE_RIDE_REQUESTS, "matching-service")
                .await
            {
                Ok(consumer) => consumer,
                Err(e) => {
                    warn!(error = %e, "cannot consume ride_requests, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(2)) => continue,
                        _ = shutdown.changed() => return,
                    }
                }
            };

            info!("matching consumer started");

            loop {
                tokio::select! {
                    delivery = consumer.next() => {
                        match delivery {
                            Some(Ok(delivery)) => {
                                let service = self.clone();
                                tokio::spawn(async move {
                                    service.handle_delivery(BrokerMessage::new(delivery)).await;
                                });
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "ride_requests stream error");
                                break;
                            }
                            None => {
                                warn!("ride_requests stream closed");
                                break;
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("matching consumer stopping");
                        return;
                    }
                }
            }

            // Conexión perdida: el supervisor reconecta, reintentamos
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(2)) => {},
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn handle_delivery(&self, msg: BrokerMessage) {
        let request: messages::RideMatchRequest = match serde_json::from_slice(msg.body()) {
            Ok(request) => request,
            Err(e) => {
                // Payload envenenado: no tiene sentido reencolarlo
                warn!(error = %e, "malformed ride request, dropping");
                let _ = msg.ack().await;
                return;
            }
        };

        match self.dispatch(&request).await {
            Ok(()) => {
                let _ = msg.ack().await;
            }
            Err(e) if e.is_transient() => {
                warn!(ride_id = %request.ride_id, error = %e, "transient error, requeueing");
                let _ = msg.nack(true).await;
            }
            Err(e) => {
                error!(ride_id = %request.ride_id, action = e.action_code(), error = %e, "match failed");
                let _ = msg.ack().await;
            }
        }
    }

    /// Ofrecer el viaje a los candidatos en orden hasta que uno acepte y
    /// quede reservado, o se agoten.
    async fn dispatch(&self, request: &messages::RideMatchRequest) -> Result<(), AppError> {
        let vehicle_type = VehicleType::parse(&request.ride_type).ok_or_else(|| {
            AppError::BadRequest(format!("unknown ride type {}", request.ride_type))
        })?;

        let max_distance_km = if request.max_distance_km > 0.0 {
            request.max_distance_km
        } else {
            DEFAULT_MAX_DISTANCE_KM
        };

        let candidates = self
            .drivers
            .find_available_nearby(
                request.pickup_location.lat,
                request.pickup_location.lng,
                vehicle_type,
                max_distance_km * 1000.0,
                CANDIDATE_LIMIT,
            )
            .await?;

        info!(
            ride_id = %request.ride_id,
            candidates = candidates.len(),
            "dispatching ride request"
        );

        for candidate in &candidates {
            if self.offer_to_candidate(request, candidate).await? {
                return Ok(());
            }
        }

        // Sin conductores: el servicio de viajes aplica la cancelación
        info!(ride_id = %request.ride_id, "no drivers available");
        self.publish_no_drivers(request).await;
        Ok(())
    }

    /// Una oferta a un candidato. Devuelve true si el viaje quedó asignado.
    async fn offer_to_candidate(
        &self,
        request: &messages::RideMatchRequest,
        candidate: &DriverWithDistance,
    ) -> Result<bool, AppError> {
        let driver_id = candidate.id.to_string();
        if !self.driver_hub.is_connected(&driver_id) {
            return Ok(false);
        }

        let timeout_seconds = if request.timeout_seconds > 0 {
            request.timeout_seconds
        } else {
            DEFAULT_TIMEOUT_SECONDS
        };

        let offer_id = Uuid::new_v4();
        let expires_at = Utc::now() + chrono::Duration::seconds(timeout_seconds as i64);
        let answer_rx = self.offers.register(offer_id);

        let ride_distance_km = haversine_km(
            request.pickup_location.lat,
            request.pickup_location.lng,
            request.destination_location.lat,
            request.destination_location.lng,
        );

        let offer = OutboundFrame::RideOffer {
            offer_id,
            ride_id: request.ride_id,
            ride_number: request.ride_number.clone(),
            pickup_location: LocationInfo {
                latitude: request.pickup_location.lat,
                longitude: request.pickup_location.lng,
                address: request.pickup_location.address.clone(),
            },
            destination_location: LocationInfo {
                latitude: request.destination_location.lat,
                longitude: request.destination_location.lng,
                address: request.destination_location.address.clone(),
            },
            estimated_fare: request.estimated_fare,
            driver_earnings: driver_earnings(request.estimated_fare),
            distance_to_pickup_km: candidate.distance_km,
            estimated_ride_duration_minutes: estimate_duration_minutes(ride_distance_km),
            expires_at,
        };

        if self.driver_hub.send_json_to_user(&driver_id, &offer).await.is_err() {
            self.offers.remove(&offer_id);
            return Ok(false);
        }

        let answer = match tokio::time::timeout(Duration::from_secs(timeout_seconds), answer_rx).await
        {
            Ok(Ok(answer)) => answer,
            // Canal descartado o plazo vencido: siguiente candidato
            _ => {
                self.offers.remove(&offer_id);
                return Ok(false);
            }
        };

        if !answer.accepted {
            let _ = self
                .driver_hub
                .send_json_to_user(
                    &driver_id,
                    &OutboundFrame::RideResponseReceived {
                        offer_id,
                        ride_id: request.ride_id,
                        accepted: false,
                        message: "Response received".to_string(),
                    },
                )
                .await;
            return Ok(false);
        }

        // Reserva atómica antes de confirmar la oferta
        if !self.drivers.try_reserve(candidate.id).await? {
            let _ = self
                .driver_hub
                .send_json_to_user(
                    &driver_id,
                    &OutboundFrame::RideResponseReceived {
                        offer_id,
                        ride_id: request.ride_id,
                        accepted: true,
                        message: "Ride was assigned to another driver".to_string(),
                    },
                )
                .await;
            return Ok(false);
        }

        self.confirm_match(request, candidate, offer_id, &answer).await;
        Ok(true)
    }

    /// El candidato aceptó y quedó reservado: publicar la respuesta para
    /// el servicio de viajes y avisarle al conductor.
    async fn confirm_match(
        &self,
        request: &messages::RideMatchRequest,
        candidate: &DriverWithDistance,
        offer_id: Uuid,
        answer: &OfferAnswer,
    ) {
        let driver_id = candidate.id.to_string();

        let driver_location = answer
            .current_location
            .as_ref()
            .map(|loc| messages::Coordinate {
                lat: loc.lat,
                lng: loc.lng,
                address: None,
            })
            .or(Some(messages::Coordinate {
                lat: candidate.latitude,
                lng: candidate.longitude,
                address: None,
            }));

        let arrival_minutes = estimate_duration_minutes(candidate.distance_km).max(1);

        let vehicle = serde_json::from_value::<messages::VehicleInfo>(candidate.vehicle_attrs.clone()).ok();

        let response = messages::DriverMatchResponse {
            ride_id: request.ride_id,
            driver_id: candidate.id,
            accepted: true,
            estimated_arrival_minutes: Some(arrival_minutes),
            driver_location,
            driver_info: Some(messages::DriverInfo {
                driver_id: candidate.id,
                name: Some(candidate.email.clone()),
                rating: Some(candidate.rating),
                vehicle,
            }),
            correlation_id: request.correlation_id.clone(),
        };

        if let Err(e) = self
            .broker
            .publish_json(
                broker::EXCHANGE_DRIVER_TOPIC,
                &broker::driver_response_routing_key(&request.ride_id),
                &response,
            )
            .await
        {
            error!(ride_id = %request.ride_id, action = "publish_error", error = %e,
                "failed to publish driver response");
        }

        let status = messages::DriverStatusUpdate {
            driver_id: candidate.id,
            status: "BUSY".to_string(),
            ride_id: Some(request.ride_id),
            timestamp: Utc::now(),
        };
        if let Err(e) = self
            .broker
            .publish_json(
                broker::EXCHANGE_DRIVER_TOPIC,
                &broker::driver_status_routing_key(&candidate.id),
                &status,
            )
            .await
        {
            warn!(driver_id = %candidate.id, action = "publish_error", error = %e,
                "failed to publish driver status");
        }

        let _ = self
            .driver_hub
            .send_json_to_user(
                &driver_id,
                &OutboundFrame::RideResponseReceived {
                    offer_id,
                    ride_id: request.ride_id,
                    accepted: true,
                    message: "Ride assigned".to_string(),
                },
            )
            .await;

        let _ = self
            .driver_hub
            .send_json_to_user(
                &driver_id,
                &OutboundFrame::RideDetails {
                    ride_id: request.ride_id,
                    pickup_location: LocationInfo {
                        latitude: request.pickup_location.lat,
                        longitude: request.pickup_location.lng,
                        address: request.pickup_location.address.clone(),
                    },
                    destination_location: LocationInfo {
                        latitude: request.destination_location.lat,
                        longitude: request.destination_location.lng,
                        address: request.destination_location.address.clone(),
                    },
                },
            )
            .await;

        info!(ride_id = %request.ride_id, driver_id = %candidate.id, "driver matched");
    }

    async fn publish_no_drivers(&self, request: &messages::RideMatchRequest) {
        let message = messages::RideStatusUpdate {
            ride_id: request.ride_id,
            driver_id: None,
            status: "CANCELLED".to_string(),
            timestamp: Utc::now(),
            final_fare: None,
            message: Some(NO_DRIVERS_REASON.to_string()),
            correlation_id: request.correlation_id.clone(),
        };

        if let Err(e) = self
            .broker
            .publish_json(
                broker::EXCHANGE_RIDE_TOPIC,
                &broker::ride_status_routing_key("CANCELLED"),
                &message,
            )
            .await
        {
            error!(ride_id = %request.ride_id, action = "publish_error", error = %e,
                "failed to publish cancellation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offer_resolve_roundtrip() {
        let registry = OfferRegistry::new();
        let offer_id = Uuid::new_v4();
        let rx = registry.register(offer_id);

        registry
            .resolve(
                &offer_id,
                OfferAnswer {
                    accepted: true,
                    current_location: None,
                },
            )
            .unwrap();

        let answer = rx.await.unwrap();
        assert!(answer.accepted);
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_late_answer_is_expired() {
        let registry = OfferRegistry::new();
        let offer_id = Uuid::new_v4();
        let rx = registry.register(offer_id);

        // El matcher dejó de esperar (timeout) y quitó la oferta
        drop(rx);
        registry.remove(&offer_id);

        let result = registry.resolve(
            &offer_id,
            OfferAnswer {
                accepted: true,
                current_location: None,
            },
        );
        assert!(matches!(result, Err(AppError::Conflict(msg)) if msg == "offer_expired"));
    }

    #[tokio::test]
    async fn test_answer_for_unknown_offer_is_expired() {
        let registry = OfferRegistry::new();
        let result = registry.resolve(
            &Uuid::new_v4(),
            OfferAnswer {
                accepted: false,
                current_location: None,
            },
        );
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_offer_wait_times_out() {
        let registry = OfferRegistry::new();
        let offer_id = Uuid::new_v4();
        let rx = registry.register(offer_id);

        let result = tokio::time::timeout(Duration::from_millis(50), rx).await;
        assert!(result.is_err());
        registry.remove(&offer_id);
        assert_eq!(registry.pending_count(), 0);
    }
}
