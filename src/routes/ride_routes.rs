//! Rutas HTTP del servicio de viajes (auth: PASSENGER)

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::dto::ride_dto::{
    CancelRideRequest, CancelRideResponse, CreateRideRequest, CreateRideResponse, ListRidesQuery,
    RideView,
};
use crate::middleware::auth::{passenger_auth_middleware, AuthenticatedUser};
use crate::services::ride_service::CreateRideCommand;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_ride_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(create_ride).get(list_rides))
        .route("/:ride_id", get(get_ride))
        .route("/:ride_id/cancel", post(cancel_ride))
        .layer(middleware::from_fn_with_state(
            state,
            passenger_auth_middleware,
        ))
}

async fn create_ride(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<CreateRideRequest>,
) -> Result<(StatusCode, Json<CreateRideResponse>), AppError> {
    request.validate()?;

    let ride = state
        .ride_service
        .create_ride(CreateRideCommand {
            passenger_id: user.user_id,
            pickup_latitude: request.pickup_latitude,
            pickup_longitude: request.pickup_longitude,
            pickup_address: request.pickup_address,
            destination_latitude: request.destination_latitude,
            destination_longitude: request.destination_longitude,
            destination_address: request.destination_address,
            ride_type: request.ride_type,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(CreateRideResponse::from(&ride))))
}

async fn cancel_ride(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(ride_id): Path<Uuid>,
    Json(request): Json<CancelRideRequest>,
) -> Result<Json<CancelRideResponse>, AppError> {
    request.validate()?;

    let ride = state
        .ride_service
        .cancel_ride(ride_id, user.user_id, &request.reason)
        .await?;

    Ok(Json(CancelRideResponse {
        ride_id: ride.id,
        status: "CANCELLED".to_string(),
        cancelled_at: ride.cancelled_at.unwrap_or_else(Utc::now),
        message: "Ride cancelled successfully".to_string(),
    }))
}

async fn get_ride(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<RideView>, AppError> {
    let ride = state.ride_service.get_ride(ride_id, user.user_id).await?;
    Ok(Json(RideView::from(&ride)))
}

async fn list_rides(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<ListRidesQuery>,
) -> Result<Json<Vec<RideView>>, AppError> {
    let rides = state
        .ride_service
        .list_rides(user.user_id, query.status.as_deref())
        .await?;

    Ok(Json(rides.iter().map(RideView::from).collect()))
}
