//! Envelopes de frames WebSocket
//!
//! Todos los frames son JSON con un campo `type` discriminante. Un `type`
//! desconocido de un cliente autenticado se rechaza con un frame de error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coordenadas simples lat/lng
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coords {
    pub lat: f64,
    pub lng: f64,
}

/// Ubicación con dirección para ofertas y detalles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationInfo {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Info del conductor visible para el pasajero
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverInfoFrame {
    pub driver_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<serde_json::Value>,
}

/// Frames entrantes (cliente -> servidor)
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Auth {
        token: String,
    },
    Ping,
    /// Respuesta del conductor a una oferta
    RideResponse {
        offer_id: Uuid,
        ride_id: Uuid,
        accepted: bool,
        #[serde(default)]
        current_location: Option<Coords>,
    },
    /// Update de ubicación del conductor por el canal realtime
    LocationUpdate {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        address: Option<String>,
        #[serde(default)]
        accuracy_meters: Option<f64>,
        #[serde(default)]
        speed_kmh: Option<f64>,
        #[serde(default)]
        heading_degrees: Option<f64>,
        #[serde(default)]
        ride_id: Option<Uuid>,
    },
}

/// Frames salientes (servidor -> cliente)
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    AuthSuccess {
        message: String,
    },
    AuthError {
        message: String,
    },
    Error {
        message: String,
    },
    Pong,
    /// Cambio de estado del viaje, para el pasajero
    RideStatusUpdate {
        ride_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        ride_number: Option<String>,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        final_fare: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        driver_info: Option<DriverInfoFrame>,
    },
    /// Posición del conductor durante el viaje, para el pasajero
    DriverLocationUpdate {
        ride_id: Uuid,
        driver_location: Coords,
        #[serde(skip_serializing_if = "Option::is_none")]
        speed_kmh: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        heading_degrees: Option<f64>,
    },
    /// Oferta de viaje, para el conductor
    RideOffer {
        offer_id: Uuid,
        ride_id: Uuid,
        ride_number: String,
        pickup_location: LocationInfo,
        destination_location: LocationInfo,
        estimated_fare: f64,
        driver_earnings: f64,
        distance_to_pickup_km: f64,
        estimated_ride_duration_minutes: i32,
        expires_at: DateTime<Utc>,
    },
    /// Detalles enviados al conductor tras aceptar
    RideDetails {
        ride_id: Uuid,
        pickup_location: LocationInfo,
        destination_location: LocationInfo,
    },
    /// El viaje fue cancelado, para el conductor asignado
    RideCancelled {
        ride_id: Uuid,
        reason: String,
    },
    /// Acuse de la respuesta del conductor
    RideResponseReceived {
        offer_id: Uuid,
        ride_id: Uuid,
        accepted: bool,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_auth_frame() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"type":"auth","token":"Bearer abc.def.ghi"}"#).unwrap();
        match frame {
            InboundFrame::Auth { token } => assert_eq!(token, "Bearer abc.def.ghi"),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_inbound_unknown_type_rejected() {
        let result = serde_json::from_str::<InboundFrame>(r#"{"type":"teleport","to":"mars"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_outbound_type_tags() {
        let frame = OutboundFrame::Pong;
        assert_eq!(serde_json::to_value(&frame).unwrap()["type"], "pong");

        let frame = OutboundFrame::RideStatusUpdate {
            ride_id: Uuid::nil(),
            ride_number: None,
            status: "MATCHED".into(),
            message: None,
            final_fare: None,
            driver_info: None,
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "ride_status_update");
        assert_eq!(value["status"], "MATCHED");
        // Opcionales ausentes no aparecen
        assert!(value.get("driver_info").is_none());
    }

    #[test]
    fn test_ride_response_optional_location() {
        let frame: InboundFrame = serde_json::from_str(
            r#"{"type":"ride_response","offer_id":"7b7c2a1e-93e0-4a95-8437-5bfe1c7d0f49","ride_id":"7b7c2a1e-93e0-4a95-8437-5bfe1c7d0f40","accepted":true}"#,
        )
        .unwrap();
        match frame {
            InboundFrame::RideResponse {
                accepted,
                current_location,
                ..
            } => {
                assert!(accepted);
                assert!(current_location.is_none());
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}
