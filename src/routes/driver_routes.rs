//! Rutas HTTP del servicio de conductores (auth: DRIVER)
//!
//! El {driver_id} de la ruta tiene que coincidir con el user_id del token.

use axum::{
    extract::{Extension, Path, State},
    middleware,
    routing::post,
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::driver_dto::{
    CompleteRideRequest, CompleteRideResponse, GoOfflineResponse, GoOnlineRequest,
    GoOnlineResponse, StartRideRequest, StartRideResponse, UpdateLocationRequest,
    UpdateLocationResponse,
};
use crate::middleware::auth::{driver_auth_middleware, AuthenticatedUser};
use crate::models::location::LocationUpdateCommand;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_driver_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/:driver_id/online", post(go_online))
        .route("/:driver_id/offline", post(go_offline))
        .route("/:driver_id/location", post(update_location))
        .route("/:driver_id/start", post(start_ride))
        .route("/:driver_id/complete", post(complete_ride))
        .layer(middleware::from_fn_with_state(state, driver_auth_middleware))
}

fn check_path_matches_token(driver_id: Uuid, user: &AuthenticatedUser) -> Result<(), AppError> {
    if driver_id != user.user_id {
        return Err(AppError::Forbidden(
            "driver id does not match token".to_string(),
        ));
    }
    Ok(())
}

async fn go_online(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(driver_id): Path<Uuid>,
    Json(request): Json<GoOnlineRequest>,
) -> Result<Json<GoOnlineResponse>, AppError> {
    check_path_matches_token(driver_id, &user)?;
    request.validate()?;

    let session_id = state
        .driver_service
        .go_online(driver_id, request.latitude, request.longitude)
        .await?;

    Ok(Json(GoOnlineResponse {
        status: "AVAILABLE".to_string(),
        session_id,
        message: "You are now online".to_string(),
    }))
}

async fn go_offline(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(driver_id): Path<Uuid>,
) -> Result<Json<GoOfflineResponse>, AppError> {
    check_path_matches_token(driver_id, &user)?;

    let summary = state.driver_service.go_offline(driver_id).await?;

    Ok(Json(GoOfflineResponse {
        status: "OFFLINE".to_string(),
        session_id: summary.session_id,
        session_summary: summary,
        message: "Session closed".to_string(),
    }))
}

async fn update_location(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(driver_id): Path<Uuid>,
    Json(request): Json<UpdateLocationRequest>,
) -> Result<Json<UpdateLocationResponse>, AppError> {
    check_path_matches_token(driver_id, &user)?;
    request.validate()?;

    let accepted = state
        .driver_service
        .update_location(
            driver_id,
            LocationUpdateCommand {
                latitude: request.latitude,
                longitude: request.longitude,
                address: request.address,
                accuracy_meters: request.accuracy_meters,
                speed_kmh: request.speed_kmh,
                heading_degrees: request.heading_degrees,
                ride_id: request.ride_id,
            },
        )
        .await?;

    match accepted {
        Some((coordinate_id, updated_at)) => Ok(Json(UpdateLocationResponse {
            coordinate_id,
            updated_at,
        })),
        // Update descartado por rate limit: respondemos la posición
        // vigente sin error
        None => {
            let current = state
                .driver_service
                .current_location(driver_id)
                .await?
                .ok_or_else(|| AppError::NotFound("no current location".to_string()))?;
            Ok(Json(UpdateLocationResponse {
                coordinate_id: current.0,
                updated_at: current.1,
            }))
        }
    }
}

async fn start_ride(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(driver_id): Path<Uuid>,
    Json(request): Json<StartRideRequest>,
) -> Result<Json<StartRideResponse>, AppError> {
    check_path_matches_token(driver_id, &user)?;
    request.validate()?;

    let started_at = state
        .driver_service
        .start_ride(
            driver_id,
            request.ride_id,
            request.driver_location.latitude,
            request.driver_location.longitude,
        )
        .await?;

    Ok(Json(StartRideResponse {
        ride_id: request.ride_id,
        status: "BUSY".to_string(),
        started_at,
        message: "Ride started".to_string(),
    }))
}

async fn complete_ride(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(driver_id): Path<Uuid>,
    Json(request): Json<CompleteRideRequest>,
) -> Result<Json<CompleteRideResponse>, AppError> {
    check_path_matches_token(driver_id, &user)?;
    request.validate()?;

    let (completed_at, driver_earnings) = state
        .driver_service
        .complete_ride(
            driver_id,
            request.ride_id,
            request.final_location.latitude,
            request.final_location.longitude,
            request.actual_distance_km,
            request.actual_duration_minutes,
        )
        .await?;

    Ok(Json(CompleteRideResponse {
        ride_id: request.ride_id,
        status: "AVAILABLE".to_string(),
        completed_at,
        driver_earnings,
        message: "Ride completed".to_string(),
    }))
}
