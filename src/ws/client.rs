//! Pumps por conexión
//!
//! Cada conexión tiene dos tareas: la read pump (decodifica frames y los
//! despacha) vive en el handler de la ruta; acá está la write pump (drena
//! la cola de salida y manda pings) y la verificación del handshake.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use tokio::sync::mpsc;

use crate::utils::jwt::{self, Claims};

/// Período de ping del servidor
pub const PING_PERIOD: Duration = Duration::from_secs(30);
/// Sin tráfico (incluido el pong) durante este tiempo, se cierra
pub const PONG_WAIT: Duration = Duration::from_secs(60);
/// Plazo para el frame de auth tras conectar
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Drenar la cola de salida hacia el socket, con ping cada 30s.
/// Termina cuando la cola se cierra (unregister o desplazamiento) o
/// cuando el socket falla.
pub async fn run_write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<String>,
) {
    let mut ping_interval = tokio::time::interval(PING_PERIOD);
    // El primer tick es inmediato; lo consumimos
    ping_interval.tick().await;

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        // Cola cerrada: el hub nos quitó del registro
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Verificar el token del handshake: firma HS256, user_id igual al de la
/// ruta y rol igual al del hub.
pub fn verify_ws_auth(
    token: &str,
    expected_user_id: &str,
    expected_role: &str,
    secret: &[u8],
) -> Result<Claims, String> {
    let token = jwt::strip_bearer(token);

    let claims = jwt::verify_token(token, secret).map_err(|_| "Invalid token".to_string())?;

    if claims.user_id != expected_user_id {
        return Err(format!(
            "Token does not match {} ID",
            expected_role.to_lowercase()
        ));
    }

    if claims.role != expected_role {
        return Err(format!(
            "Invalid role for {} connection",
            expected_role.to_lowercase()
        ));
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::jwt::generate_token_pair;
    use uuid::Uuid;

    const SECRET: &[u8] = b"supersecretkey";

    #[test]
    fn test_verify_ws_auth_ok() {
        let user_id = Uuid::new_v4();
        let pair = generate_token_pair(user_id, "DRIVER", SECRET).unwrap();
        let token = format!("Bearer {}", pair.access_token);

        let claims = verify_ws_auth(&token, &user_id.to_string(), "DRIVER", SECRET).unwrap();
        assert_eq!(claims.role, "DRIVER");
    }

    #[test]
    fn test_verify_ws_auth_user_mismatch() {
        let pair = generate_token_pair(Uuid::new_v4(), "PASSENGER", SECRET).unwrap();
        let err = verify_ws_auth(
            &pair.access_token,
            &Uuid::new_v4().to_string(),
            "PASSENGER",
            SECRET,
        )
        .unwrap_err();
        assert!(err.contains("does not match"));
    }

    #[test]
    fn test_verify_ws_auth_role_mismatch() {
        let user_id = Uuid::new_v4();
        let pair = generate_token_pair(user_id, "PASSENGER", SECRET).unwrap();
        let err = verify_ws_auth(&pair.access_token, &user_id.to_string(), "DRIVER", SECRET)
            .unwrap_err();
        assert!(err.contains("Invalid role"));
    }

    #[test]
    fn test_verify_ws_auth_garbage_token() {
        let err = verify_ws_auth("Bearer garbage", "x", "DRIVER", SECRET).unwrap_err();
        assert_eq!(err, "Invalid token");
    }
}
