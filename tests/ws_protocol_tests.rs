//! Tests del camino realtime en memoria
//!
//! Hub + envelopes + registro de ofertas, sin sockets reales: lo que viaja
//! por la cola de salida de un cliente es exactamente el JSON del frame.

use chrono::Utc;
use uuid::Uuid;

use ride_hail_backend::services::matching_service::{OfferAnswer, OfferRegistry};
use ride_hail_backend::ws::messages::{Coords, LocationInfo, OutboundFrame};
use ride_hail_backend::ws::Hub;

#[tokio::test]
async fn test_offer_frame_reaches_driver_through_hub() {
    let hub = Hub::start("drivers");
    let driver_id = Uuid::new_v4().to_string();
    let (_conn_id, mut outbound) = hub.register(&driver_id).await;

    let offer = OutboundFrame::RideOffer {
        offer_id: Uuid::new_v4(),
        ride_id: Uuid::new_v4(),
        ride_number: "RIDE-1".to_string(),
        pickup_location: LocationInfo {
            latitude: 43.238949,
            longitude: 76.889709,
            address: Some("Almaty Central Park".to_string()),
        },
        destination_location: LocationInfo {
            latitude: 43.222015,
            longitude: 76.851511,
            address: Some("Kok-Tobe Hill".to_string()),
        },
        estimated_fare: 1222.9,
        driver_earnings: 978.32,
        distance_to_pickup_km: 1.2,
        estimated_ride_duration_minutes: 7,
        expires_at: Utc::now() + chrono::Duration::seconds(60),
    };

    hub.send_json_to_user(&driver_id, &offer).await.unwrap();

    let raw = outbound.recv().await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["type"], "ride_offer");
    assert_eq!(value["ride_number"], "RIDE-1");
    assert!(value["expires_at"].is_string());
    assert_eq!(value["pickup_location"]["address"], "Almaty Central Park");
}

#[tokio::test]
async fn test_late_driver_response_gets_offer_expired() {
    let registry = OfferRegistry::new();
    let hub = Hub::start("drivers");
    let driver_id = Uuid::new_v4().to_string();
    let (_conn_id, mut outbound) = hub.register(&driver_id).await;

    // Sin oferta pendiente, la respuesta del conductor llega tarde
    let result = registry.resolve(
        &Uuid::new_v4(),
        OfferAnswer {
            accepted: true,
            current_location: None,
        },
    );
    assert!(result.is_err());

    // El conductor recibe el aviso de expiración como frame de error
    hub.send_json_to_user(
        &driver_id,
        &OutboundFrame::Error {
            message: "offer_expired".to_string(),
        },
    )
    .await
    .unwrap();

    let raw = outbound.recv().await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["type"], "error");
    assert_eq!(value["message"], "offer_expired");
}

#[tokio::test]
async fn test_passenger_status_update_frame_shape() {
    let hub = Hub::start("passengers");
    let passenger_id = Uuid::new_v4().to_string();
    let (_conn_id, mut outbound) = hub.register(&passenger_id).await;

    hub.send_json_to_user(
        &passenger_id,
        &OutboundFrame::RideStatusUpdate {
            ride_id: Uuid::new_v4(),
            ride_number: Some("RIDE-2".to_string()),
            status: "CANCELLED".to_string(),
            message: Some("no_drivers_available".to_string()),
            final_fare: None,
            driver_info: None,
        },
    )
    .await
    .unwrap();

    let raw = outbound.recv().await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["type"], "ride_status_update");
    assert_eq!(value["status"], "CANCELLED");
    assert_eq!(value["message"], "no_drivers_available");

    hub.send_json_to_user(
        &passenger_id,
        &OutboundFrame::DriverLocationUpdate {
            ride_id: Uuid::new_v4(),
            driver_location: Coords {
                lat: 43.23,
                lng: 76.88,
            },
            speed_kmh: Some(42.0),
            heading_degrees: None,
        },
    )
    .await
    .unwrap();

    let raw = outbound.recv().await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["type"], "driver_location_update");
    assert_eq!(value["driver_location"]["lat"], 43.23);
}
