//! Esquemas de mensajes del broker
//!
//! Todos los payloads son JSON. Los campos desconocidos se ignoran al
//! deserializar, así los esquemas pueden crecer sin romper consumidores
//! viejos.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------- Tipos anidados ----------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverInfo {
    pub driver_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<VehicleInfo>,
}

// ---------- Ride service -> matching (ride_topic, ride.request.{type}) ----------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideMatchRequest {
    pub ride_id: Uuid,
    pub ride_number: String,
    pub pickup_location: Coordinate,
    pub destination_location: Coordinate,
    pub ride_type: String,
    pub estimated_fare: f64,
    pub max_distance_km: f64,
    pub timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub requested_at: DateTime<Utc>,
}

// ---------- Driver -> ride service (driver_topic, driver.response.{ride_id}) ----------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverMatchResponse {
    pub ride_id: Uuid,
    pub driver_id: Uuid,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_arrival_minutes: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_location: Option<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_info: Option<DriverInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

// ---------- Estado de viaje (ride_topic, ride.status.{status}) ----------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideStatusUpdate {
    pub ride_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<Uuid>,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_fare: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

// ---------- Estado de conductor (driver_topic, driver.status.{driver_id}) ----------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverStatusUpdate {
    pub driver_id: Uuid,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ride_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

// ---------- Ubicación (location_fanout) ----------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub driver_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ride_id: Option<Uuid>,
    pub location: Coordinate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_degrees: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_fields_are_ignored() {
        // Compatibilidad hacia adelante: un productor más nuevo puede
        // agregar campos sin romper a este consumidor
        let raw = r#"{
            "ride_id": "7b7c2a1e-93e0-4a95-8437-5bfe1c7d0f49",
            "driver_id": "11111111-2222-3333-4444-555555555555",
            "accepted": true,
            "surge_multiplier": 1.4,
            "some_future_field": {"a": 1}
        }"#;

        let msg: DriverMatchResponse = serde_json::from_str(raw).unwrap();
        assert!(msg.accepted);
        assert!(msg.driver_info.is_none());
    }

    #[test]
    fn test_ride_match_request_field_names() {
        let msg = RideMatchRequest {
            ride_id: Uuid::nil(),
            ride_number: "RIDE-1".into(),
            pickup_location: Coordinate {
                lat: 43.238949,
                lng: 76.889709,
                address: Some("Almaty Central Park".into()),
            },
            destination_location: Coordinate {
                lat: 43.222015,
                lng: 76.851511,
                address: Some("Kok-Tobe Hill".into()),
            },
            ride_type: "ECONOMY".into(),
            estimated_fare: 1222.9,
            max_distance_km: 5.0,
            timeout_seconds: 60,
            correlation_id: None,
            requested_at: Utc::now(),
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("pickup_location").is_some());
        assert!(value.get("destination_location").is_some());
        assert!(value.get("timeout_seconds").is_some());
        // Los opcionales ausentes no se serializan
        assert!(value.get("correlation_id").is_none());
    }
}
