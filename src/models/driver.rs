//! Modelo de Driver
//!
//! Un driver comparte id con su fila en `users`. `vehicle_attrs` es un JSONB
//! libre (make/model/color/plate).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::ride::VehicleType;

/// Estado operativo del conductor - mapea al ENUM driver_status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "driver_status")]
pub enum DriverStatus {
    #[sqlx(rename = "OFFLINE")]
    #[serde(rename = "OFFLINE")]
    Offline,
    #[sqlx(rename = "AVAILABLE")]
    #[serde(rename = "AVAILABLE")]
    Available,
    #[sqlx(rename = "BUSY")]
    #[serde(rename = "BUSY")]
    Busy,
    #[sqlx(rename = "EN_ROUTE")]
    #[serde(rename = "EN_ROUTE")]
    EnRoute,
}

impl DriverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Offline => "OFFLINE",
            DriverStatus::Available => "AVAILABLE",
            DriverStatus::Busy => "BUSY",
            DriverStatus::EnRoute => "EN_ROUTE",
        }
    }
}

impl std::fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Driver principal - mapea exactamente a la tabla drivers
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Driver {
    pub id: Uuid,
    pub license_number: String,
    pub vehicle_type: VehicleType,
    pub vehicle_attrs: serde_json::Value,
    pub status: DriverStatus,
    pub rating: f64,
    pub total_rides: i32,
    pub total_earnings: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sesión de trabajo de un conductor. A lo sumo una activa
/// (ended_at IS NULL) por driver.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DriverSession {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_rides: i32,
    pub total_earnings: f64,
}

/// Resumen devuelto al cerrar sesión
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub duration_hours: f64,
    pub rides_completed: i32,
    pub earnings: f64,
}

/// Candidato devuelto por la búsqueda por radio, ordenado por
/// distancia y rating
#[derive(Debug, Clone, FromRow)]
pub struct DriverWithDistance {
    pub id: Uuid,
    pub email: String,
    pub rating: f64,
    pub vehicle_attrs: serde_json::Value,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_km: f64,
}
