//! Modelo de Coordinate
//!
//! Una coordenada es una fila propia para que varias entidades puedan
//! referenciarla históricamente. Por (entity_id, entity_type) hay a lo sumo
//! una fila con is_current = true.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tipo de entidad dueña de la coordenada
pub mod entity_type {
    pub const PASSENGER: &str = "passenger";
    pub const DRIVER: &str = "driver";
    pub const RIDE_PICKUP: &str = "ride_pickup";
    pub const RIDE_DESTINATION: &str = "ride_destination";
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Coordinate {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Par lat/lng con dirección, tal como viaja en requests y mensajes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
}
