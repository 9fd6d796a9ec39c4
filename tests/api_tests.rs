//! Tests de la superficie HTTP sin infraestructura
//!
//! El estado se construye sin conectar a PostgreSQL ni RabbitMQ: la capa
//! de auth y la validación cortan antes de tocar la base, y cuando una
//! operación sí la necesita el pool sin inicializar tiene que salir como
//! 503 (error transitorio), nunca como 500.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use ride_hail_backend::broker::{BrokerConfig, Rmq};
use ride_hail_backend::config::environment::EnvironmentConfig;
use ride_hail_backend::database::{Database, DbConfig};
use ride_hail_backend::repositories::driver_repository::DriverRepository;
use ride_hail_backend::routes;
use ride_hail_backend::services::driver_service::DriverService;
use ride_hail_backend::services::matching_service::MatchingService;
use ride_hail_backend::services::ride_service::RideService;
use ride_hail_backend::state::AppState;
use ride_hail_backend::utils::jwt::generate_token_pair;
use ride_hail_backend::ws::Hub;

const JWT_SECRET: &str = "supersecretkey";

fn test_state() -> AppState {
    let mut config = EnvironmentConfig::from_env();
    config.jwt_secret = JWT_SECRET.to_string();

    let db = Database::new(DbConfig::new("localhost", "5432", "u", "p", "test", "disable"));
    let broker = Rmq::new(BrokerConfig::from_environment(&config));
    let passenger_hub = Hub::start("passengers");
    let driver_hub = Hub::start("drivers");

    AppState {
        ride_service: Arc::new(RideService::new(
            db.clone(),
            broker.clone(),
            passenger_hub.clone(),
            driver_hub.clone(),
        )),
        driver_service: Arc::new(DriverService::new(db.clone(), broker.clone())),
        matching_service: Arc::new(MatchingService::new(
            DriverRepository::new(db.clone()),
            broker.clone(),
            driver_hub.clone(),
        )),
        db,
        config,
        broker,
        passenger_hub,
        driver_hub,
    }
}

fn test_app() -> Router {
    let state = test_state();
    Router::new()
        .nest("/rides", routes::ride_routes::create_ride_router(state.clone()))
        .nest("/drivers", routes::driver_routes::create_driver_router(state.clone()))
        .with_state(state)
}

fn bearer_for(user_id: Uuid, role: &str) -> String {
    let pair = generate_token_pair(user_id, role, JWT_SECRET.as_bytes()).unwrap();
    format!("Bearer {}", pair.access_token)
}

fn ride_body() -> serde_json::Value {
    json!({
        "pickup_latitude": 43.238949,
        "pickup_longitude": 76.889709,
        "pickup_address": "Almaty Central Park",
        "destination_latitude": 43.222015,
        "destination_longitude": 76.851511,
        "destination_address": "Kok-Tobe Hill",
        "ride_type": "ECONOMY"
    })
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_create_ride_without_token_is_401() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/rides")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(ride_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_ride_with_driver_role_is_403() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/rides")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, bearer_for(Uuid::new_v4(), "DRIVER"))
                .body(Body::from(ride_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_ride_invalid_latitude_is_400() {
    let app = test_app();

    let mut body = ride_body();
    body["pickup_latitude"] = json!(95.0);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/rides")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, bearer_for(Uuid::new_v4(), "PASSENGER"))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status_code"], 400);
}

#[tokio::test]
async fn test_create_ride_unknown_type_is_400() {
    let app = test_app();

    let mut body = ride_body();
    body["ride_type"] = json!("SCOOTER");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/rides")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, bearer_for(Uuid::new_v4(), "PASSENGER"))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_ride_without_database_is_503() {
    // Request válida: la caída tiene que ser transitoria (503), no 500
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/rides")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, bearer_for(Uuid::new_v4(), "PASSENGER"))
                .body(Body::from(ride_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["status_code"], 503);
}

#[tokio::test]
async fn test_driver_route_rejects_mismatched_path_id() {
    let app = test_app();

    let token_driver = Uuid::new_v4();
    let other_driver = Uuid::new_v4();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/drivers/{}/online", other_driver))
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, bearer_for(token_driver, "DRIVER"))
                .body(Body::from(
                    json!({"latitude": 43.2, "longitude": 76.8}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_driver_route_rejects_passenger_role() {
    let app = test_app();
    let driver_id = Uuid::new_v4();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/drivers/{}/offline", driver_id))
                .header(header::AUTHORIZATION, bearer_for(driver_id, "PASSENGER"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_garbage_token_is_401() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/rides")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, "Bearer not.a.token")
                .body(Body::from(ride_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
