//! DTOs del servicio de viajes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::ride::Ride;

/// Request para crear un viaje
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRideRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    pub pickup_latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub pickup_longitude: f64,

    #[validate(length(min = 1, max = 255))]
    pub pickup_address: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub destination_latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub destination_longitude: f64,

    #[validate(length(min = 1, max = 255))]
    pub destination_address: String,

    pub ride_type: String,
}

#[derive(Debug, Serialize)]
pub struct CreateRideResponse {
    pub ride_id: Uuid,
    pub ride_number: String,
    pub status: String,
    pub estimated_fare: f64,
    pub estimated_duration_minutes: i32,
    pub estimated_distance_km: f64,
}

impl From<&Ride> for CreateRideResponse {
    fn from(ride: &Ride) -> Self {
        Self {
            ride_id: ride.id,
            ride_number: ride.ride_number.clone(),
            status: ride.status.as_str().to_string(),
            estimated_fare: ride.estimated_fare,
            estimated_duration_minutes: ride.estimated_duration_minutes,
            estimated_distance_km: ride.estimated_distance_km,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelRideRequest {
    #[validate(length(min = 1, max = 255))]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct CancelRideResponse {
    pub ride_id: Uuid,
    pub status: String,
    pub cancelled_at: DateTime<Utc>,
    pub message: String,
}

/// Vista de un viaje para el pasajero
#[derive(Debug, Serialize)]
pub struct RideView {
    pub ride_id: Uuid,
    pub ride_number: String,
    pub status: String,
    pub vehicle_type: String,
    pub estimated_fare: f64,
    pub estimated_distance_km: f64,
    pub estimated_duration_minutes: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_fare: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<Uuid>,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
}

impl From<&Ride> for RideView {
    fn from(ride: &Ride) -> Self {
        Self {
            ride_id: ride.id,
            ride_number: ride.ride_number.clone(),
            status: ride.status.as_str().to_string(),
            vehicle_type: ride.vehicle_type.as_str().to_string(),
            estimated_fare: ride.estimated_fare,
            estimated_distance_km: ride.estimated_distance_km,
            estimated_duration_minutes: ride.estimated_duration_minutes,
            final_fare: ride.final_fare,
            driver_id: ride.driver_id,
            requested_at: ride.requested_at,
            completed_at: ride.completed_at,
            cancelled_at: ride.cancelled_at,
            cancellation_reason: ride.cancellation_reason.clone(),
        }
    }
}

/// Filtro de listado: GET /rides?status=
#[derive(Debug, Deserialize)]
pub struct ListRidesQuery {
    pub status: Option<String>,
}
