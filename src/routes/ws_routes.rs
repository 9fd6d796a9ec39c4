//! Rutas WebSocket
//!
//! `GET /ws/passengers/{id}` y `GET /ws/drivers/{id}`. El primer frame
//! tiene que ser `{type:"auth", token:"Bearer <JWT>"}` dentro de los 5
//! segundos; hasta entonces sólo se aceptan auth y ping.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::StreamExt;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::location::LocationUpdateCommand;
use crate::models::user::UserRole;
use crate::services::matching_service::OfferAnswer;
use crate::state::AppState;
use crate::ws::client::{run_write_pump, verify_ws_auth, AUTH_TIMEOUT, PONG_WAIT};
use crate::ws::messages::{InboundFrame, OutboundFrame};
use crate::ws::Hub;

pub fn create_ws_router() -> Router<AppState> {
    Router::new()
        .route("/passengers/:passenger_id", get(passenger_ws_handler))
        .route("/drivers/:driver_id", get(driver_ws_handler))
}

async fn passenger_ws_handler(
    ws: WebSocketUpgrade,
    Path(passenger_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_passenger_socket(socket, state, passenger_id))
}

async fn driver_ws_handler(
    ws: WebSocketUpgrade,
    Path(driver_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_driver_socket(socket, state, driver_id))
}

async fn handle_passenger_socket(socket: WebSocket, state: AppState, passenger_id: Uuid) {
    let hub = state.passenger_hub.clone();
    let user_id = passenger_id.to_string();
    let secret = state.config.jwt_secret.clone();

    let (sink, mut stream) = socket.split();
    let (conn_id, outbound_rx) = hub.register(&user_id).await;
    let writer = tokio::spawn(run_write_pump(sink, outbound_rx));

    info!(%passenger_id, "passenger connected");

    let mut authenticated = false;
    let auth_deadline = Instant::now() + AUTH_TIMEOUT;

    loop {
        let limit = if authenticated {
            PONG_WAIT
        } else {
            auth_deadline.saturating_duration_since(Instant::now())
        };

        let frame = match tokio::time::timeout(limit, stream.next()).await {
            Err(_) => {
                if !authenticated {
                    send(&hub, &user_id, &OutboundFrame::AuthError {
                        message: "Authentication timeout".to_string(),
                    })
                    .await;
                }
                break;
            }
            Ok(None) | Ok(Some(Err(_))) => break,
            Ok(Some(Ok(frame))) => frame,
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            // Ping/pong cuentan como tráfico y resetean el deadline
            _ => continue,
        };

        let inbound = match serde_json::from_str::<InboundFrame>(&text) {
            Ok(inbound) => inbound,
            Err(_) => {
                send(&hub, &user_id, &OutboundFrame::Error {
                    message: "Invalid message".to_string(),
                })
                .await;
                continue;
            }
        };

        match inbound {
            InboundFrame::Auth { token } => {
                match verify_ws_auth(&token, &user_id, UserRole::Passenger.as_str(), secret.as_bytes()) {
                    Ok(_) => {
                        authenticated = true;
                        send(&hub, &user_id, &OutboundFrame::AuthSuccess {
                            message: "Successfully authenticated".to_string(),
                        })
                        .await;
                    }
                    Err(message) => {
                        send(&hub, &user_id, &OutboundFrame::AuthError { message }).await;
                        break;
                    }
                }
            }
            InboundFrame::Ping => {
                send(&hub, &user_id, &OutboundFrame::Pong).await;
            }
            _ if !authenticated => {
                send(&hub, &user_id, &OutboundFrame::Error {
                    message: "Not authenticated".to_string(),
                })
                .await;
            }
            other => {
                debug!(%passenger_id, frame = ?other, "unsupported passenger frame");
                send(&hub, &user_id, &OutboundFrame::Error {
                    message: "Unsupported message type".to_string(),
                })
                .await;
            }
        }
    }

    hub.unregister(&user_id, conn_id).await;
    let _ = writer.await;
    info!(%passenger_id, "passenger disconnected");
}

async fn handle_driver_socket(socket: WebSocket, state: AppState, driver_id: Uuid) {
    let hub = state.driver_hub.clone();
    let user_id = driver_id.to_string();
    let secret = state.config.jwt_secret.clone();

    let (sink, mut stream) = socket.split();
    let (conn_id, outbound_rx) = hub.register(&user_id).await;
    let writer = tokio::spawn(run_write_pump(sink, outbound_rx));

    info!(%driver_id, "driver connected");

    let mut authenticated = false;
    let auth_deadline = Instant::now() + AUTH_TIMEOUT;

    loop {
        let limit = if authenticated {
            PONG_WAIT
        } else {
            auth_deadline.saturating_duration_since(Instant::now())
        };

        let frame = match tokio::time::timeout(limit, stream.next()).await {
            Err(_) => {
                if !authenticated {
                    send(&hub, &user_id, &OutboundFrame::AuthError {
                        message: "Authentication timeout".to_string(),
                    })
                    .await;
                }
                break;
            }
            Ok(None) | Ok(Some(Err(_))) => break,
            Ok(Some(Ok(frame))) => frame,
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let inbound = match serde_json::from_str::<InboundFrame>(&text) {
            Ok(inbound) => inbound,
            Err(_) => {
                send(&hub, &user_id, &OutboundFrame::Error {
                    message: "Invalid message".to_string(),
                })
                .await;
                continue;
            }
        };

        match inbound {
            InboundFrame::Auth { token } => {
                match verify_ws_auth(&token, &user_id, UserRole::Driver.as_str(), secret.as_bytes()) {
                    Ok(_) => {
                        authenticated = true;
                        send(&hub, &user_id, &OutboundFrame::AuthSuccess {
                            message: "Successfully authenticated".to_string(),
                        })
                        .await;
                    }
                    Err(message) => {
                        send(&hub, &user_id, &OutboundFrame::AuthError { message }).await;
                        break;
                    }
                }
            }
            InboundFrame::Ping => {
                send(&hub, &user_id, &OutboundFrame::Pong).await;
            }
            _ if !authenticated => {
                send(&hub, &user_id, &OutboundFrame::Error {
                    message: "Not authenticated".to_string(),
                })
                .await;
            }
            InboundFrame::RideResponse {
                offer_id,
                ride_id: _,
                accepted,
                current_location,
            } => {
                let answer = OfferAnswer {
                    accepted,
                    current_location,
                };
                if state
                    .matching_service
                    .offers()
                    .resolve(&offer_id, answer)
                    .is_err()
                {
                    // Aceptación tardía: la oferta ya venció
                    send(&hub, &user_id, &OutboundFrame::Error {
                        message: "offer_expired".to_string(),
                    })
                    .await;
                }
            }
            InboundFrame::LocationUpdate {
                latitude,
                longitude,
                address,
                accuracy_meters,
                speed_kmh,
                heading_degrees,
                ride_id,
            } => {
                let result = state
                    .driver_service
                    .update_location(
                        driver_id,
                        LocationUpdateCommand {
                            latitude,
                            longitude,
                            address,
                            accuracy_meters,
                            speed_kmh,
                            heading_degrees,
                            ride_id,
                        },
                    )
                    .await;

                if let Err(e) = result {
                    send(&hub, &user_id, &OutboundFrame::Error {
                        message: e.to_string(),
                    })
                    .await;
                }
            }
        }
    }

    hub.unregister(&user_id, conn_id).await;
    let _ = writer.await;
    info!(%driver_id, "driver disconnected");
}

async fn send(hub: &Hub, user_id: &str, frame: &OutboundFrame) {
    let _ = hub.send_json_to_user(user_id, frame).await;
}
