//! DTOs del servicio de conductores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::driver::SessionSummary;

#[derive(Debug, Deserialize, Validate)]
pub struct GoOnlineRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
pub struct GoOnlineResponse {
    pub status: String,
    pub session_id: Uuid,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct GoOfflineResponse {
    pub status: String,
    pub session_id: Uuid,
    pub session_summary: SessionSummary,
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLocationRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    pub address: Option<String>,
    pub accuracy_meters: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub heading_degrees: Option<f64>,
    pub ride_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct UpdateLocationResponse {
    pub coordinate_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

/// Ubicación embebida en start/complete
#[derive(Debug, Deserialize, Validate)]
pub struct DriverLocation {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartRideRequest {
    pub ride_id: Uuid,
    #[validate]
    pub driver_location: DriverLocation,
}

#[derive(Debug, Serialize)]
pub struct StartRideResponse {
    pub ride_id: Uuid,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompleteRideRequest {
    pub ride_id: Uuid,
    #[validate]
    pub final_location: DriverLocation,
    #[validate(range(min = 0.0))]
    pub actual_distance_km: f64,
    #[validate(range(min = 0.0))]
    pub actual_duration_minutes: f64,
}

#[derive(Debug, Serialize)]
pub struct CompleteRideResponse {
    pub ride_id: Uuid,
    pub status: String,
    pub completed_at: DateTime<Utc>,
    pub driver_earnings: f64,
    pub message: String,
}
