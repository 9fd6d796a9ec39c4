//! Historial de ubicaciones
//!
//! Filas append-only por conductor, con `recorded_at` monótono (hora del
//! servidor). Cada update de ubicación aceptado agrega exactamente una fila
//! en la misma transacción que actualiza la coordenada vigente.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LocationHistory {
    pub id: Uuid,
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

/// Comando de update de ubicación (HTTP o frame ws del conductor)
#[derive(Debug, Clone, Default)]
pub struct LocationUpdateCommand {
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub accuracy_meters: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub heading_degrees: Option<f64>,
    pub ride_id: Option<Uuid>,
}
