//! Modelo de Ride
//!
//! El struct Ride mapea exactamente a la tabla `rides`. Las transiciones de
//! estado forman un DAG: cada timestamp se escribe una sola vez, en la
//! transición que le corresponde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tipo de vehículo - mapea al ENUM vehicle_type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vehicle_type")]
pub enum VehicleType {
    #[sqlx(rename = "ECONOMY")]
    #[serde(rename = "ECONOMY")]
    Economy,
    #[sqlx(rename = "PREMIUM")]
    #[serde(rename = "PREMIUM")]
    Premium,
    #[sqlx(rename = "XL")]
    #[serde(rename = "XL")]
    Xl,
}

impl VehicleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Economy => "ECONOMY",
            VehicleType::Premium => "PREMIUM",
            VehicleType::Xl => "XL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ECONOMY" => Some(VehicleType::Economy),
            "PREMIUM" => Some(VehicleType::Premium),
            "XL" => Some(VehicleType::Xl),
            _ => None,
        }
    }
}

impl std::fmt::Display for VehicleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estado del viaje - mapea al ENUM ride_status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ride_status")]
pub enum RideStatus {
    #[sqlx(rename = "REQUESTED")]
    #[serde(rename = "REQUESTED")]
    Requested,
    #[sqlx(rename = "MATCHED")]
    #[serde(rename = "MATCHED")]
    Matched,
    #[sqlx(rename = "EN_ROUTE")]
    #[serde(rename = "EN_ROUTE")]
    EnRoute,
    #[sqlx(rename = "ARRIVED")]
    #[serde(rename = "ARRIVED")]
    Arrived,
    #[sqlx(rename = "IN_PROGRESS")]
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[sqlx(rename = "COMPLETED")]
    #[serde(rename = "COMPLETED")]
    Completed,
    #[sqlx(rename = "CANCELLED")]
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Requested => "REQUESTED",
            RideStatus::Matched => "MATCHED",
            RideStatus::EnRoute => "EN_ROUTE",
            RideStatus::Arrived => "ARRIVED",
            RideStatus::InProgress => "IN_PROGRESS",
            RideStatus::Completed => "COMPLETED",
            RideStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "REQUESTED" => Some(RideStatus::Requested),
            "MATCHED" => Some(RideStatus::Matched),
            "EN_ROUTE" => Some(RideStatus::EnRoute),
            "ARRIVED" => Some(RideStatus::Arrived),
            "IN_PROGRESS" => Some(RideStatus::InProgress),
            "COMPLETED" => Some(RideStatus::Completed),
            "CANCELLED" => Some(RideStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    /// Transiciones válidas del DAG. CANCELLED es alcanzable desde
    /// cualquier estado no terminal.
    pub fn can_transition_to(&self, next: RideStatus) -> bool {
        if next == RideStatus::Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (RideStatus::Requested, RideStatus::Matched)
                | (RideStatus::Matched, RideStatus::EnRoute)
                | (RideStatus::EnRoute, RideStatus::Arrived)
                | (RideStatus::Arrived, RideStatus::InProgress)
                | (RideStatus::InProgress, RideStatus::Completed)
        )
    }
}

impl std::fmt::Display for RideStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ride principal - mapea exactamente a la tabla rides
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ride {
    pub id: Uuid,
    pub ride_number: String,
    pub passenger_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub vehicle_type: VehicleType,
    pub status: RideStatus,

    // Coordenadas propias del viaje (pickup y destino)
    pub pickup_coordinate_id: Uuid,
    pub destination_coordinate_id: Uuid,

    // Estimaciones calculadas al crear
    pub estimated_fare: f64,
    pub estimated_distance_km: f64,
    pub estimated_duration_minutes: i32,
    pub final_fare: Option<f64>,

    // Timestamps: cada uno se escribe una sola vez
    pub requested_at: DateTime<Utc>,
    pub matched_at: Option<DateTime<Utc>>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tarifa por clase de vehículo
#[derive(Debug, Clone, Copy)]
pub struct Pricing {
    pub base_fare: f64,
    pub rate_per_km: f64,
    pub rate_per_min: f64,
}

/// Tabla de tarifas
pub fn pricing_for(vehicle_type: VehicleType) -> Pricing {
    match vehicle_type {
        VehicleType::Economy => Pricing {
            base_fare: 500.0,
            rate_per_km: 100.0,
            rate_per_min: 50.0,
        },
        VehicleType::Premium => Pricing {
            base_fare: 800.0,
            rate_per_km: 120.0,
            rate_per_min: 60.0,
        },
        VehicleType::Xl => Pricing {
            base_fare: 1000.0,
            rate_per_km: 150.0,
            rate_per_min: 75.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            RideStatus::Requested,
            RideStatus::Matched,
            RideStatus::EnRoute,
            RideStatus::Arrived,
            RideStatus::InProgress,
            RideStatus::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_cancel_from_any_non_terminal() {
        for status in [
            RideStatus::Requested,
            RideStatus::Matched,
            RideStatus::EnRoute,
            RideStatus::Arrived,
            RideStatus::InProgress,
        ] {
            assert!(status.can_transition_to(RideStatus::Cancelled));
        }
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for terminal in [RideStatus::Completed, RideStatus::Cancelled] {
            for next in [
                RideStatus::Requested,
                RideStatus::Matched,
                RideStatus::EnRoute,
                RideStatus::Arrived,
                RideStatus::InProgress,
                RideStatus::Completed,
                RideStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next), "{} -> {}", terminal, next);
            }
        }
    }

    #[test]
    fn test_skipping_states_rejected() {
        assert!(!RideStatus::Requested.can_transition_to(RideStatus::Completed));
        assert!(!RideStatus::Requested.can_transition_to(RideStatus::EnRoute));
        assert!(!RideStatus::Matched.can_transition_to(RideStatus::Requested));
        assert!(!RideStatus::InProgress.can_transition_to(RideStatus::Matched));
    }

    #[test]
    fn test_vehicle_type_parse() {
        assert_eq!(VehicleType::parse("ECONOMY"), Some(VehicleType::Economy));
        assert_eq!(VehicleType::parse("economy"), None);
        assert_eq!(VehicleType::parse("SCOOTER"), None);
    }

    #[test]
    fn test_pricing_table() {
        let economy = pricing_for(VehicleType::Economy);
        assert_eq!(economy.base_fare, 500.0);
        assert_eq!(economy.rate_per_km, 100.0);
        assert_eq!(economy.rate_per_min, 50.0);

        assert_eq!(pricing_for(VehicleType::Xl).base_fare, 1000.0);
    }
}
