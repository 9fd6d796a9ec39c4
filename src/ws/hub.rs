//! Hub de conexiones realtime
//!
//! Registro por user_id para un rol (pasajeros o conductores). Las
//! mutaciones del mapa pasan todas por la tarea controladora, que lee de
//! cuatro colas (register, unregister, broadcast, send-to-user): el mapa
//! tiene un único escritor. Las lecturas (count, is_connected) toman el
//! RwLock de lectura.
//!
//! Un register para un user_id ya conectado desplaza a la conexión vieja
//! (last-writer-wins). Un cliente con la cola de salida llena se expulsa
//! en el mismo intento de envío.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::utils::errors::AppError;

/// Capacidad de la cola de salida por cliente
pub const OUTBOUND_BUFFER: usize = 256;

const COMMAND_BUFFER: usize = 256;

/// Errores de envío dirigido
#[derive(Debug, PartialEq, Eq)]
pub enum HubSendError {
    /// El usuario no está conectado
    NotFound,
    /// Cola de salida llena: el cliente fue expulsado
    BufferFull,
    /// El hub está apagándose
    Closed,
}

impl std::fmt::Display for HubSendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HubSendError::NotFound => f.write_str("client not found"),
            HubSendError::BufferFull => f.write_str("client send buffer full"),
            HubSendError::Closed => f.write_str("hub closed"),
        }
    }
}

/// Handle de un cliente registrado
struct ClientEntry {
    conn_id: u64,
    sender: mpsc::Sender<String>,
}

struct RegisterCmd {
    user_id: String,
    conn_id: u64,
    sender: mpsc::Sender<String>,
    done: oneshot::Sender<()>,
}

struct UnregisterCmd {
    user_id: String,
    conn_id: u64,
    done: oneshot::Sender<()>,
}

struct SendCmd {
    user_id: String,
    frame: String,
    reply: oneshot::Sender<Result<(), HubSendError>>,
}

#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    name: &'static str,
    clients: Arc<RwLock<HashMap<String, ClientEntry>>>,
    next_conn_id: AtomicU64,
    register_tx: mpsc::Sender<RegisterCmd>,
    unregister_tx: mpsc::Sender<UnregisterCmd>,
    broadcast_tx: mpsc::Sender<String>,
    send_tx: mpsc::Sender<SendCmd>,
}

impl Hub {
    /// Crear el hub y arrancar su tarea controladora
    pub fn start(name: &'static str) -> Self {
        let clients: Arc<RwLock<HashMap<String, ClientEntry>>> = Arc::new(RwLock::new(HashMap::new()));

        let (register_tx, register_rx) = mpsc::channel(COMMAND_BUFFER);
        let (unregister_tx, unregister_rx) = mpsc::channel(COMMAND_BUFFER);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(COMMAND_BUFFER);
        let (send_tx, send_rx) = mpsc::channel(COMMAND_BUFFER);

        tokio::spawn(controller_loop(
            name,
            clients.clone(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            send_rx,
        ));

        Self {
            inner: Arc::new(HubInner {
                name,
                clients,
                next_conn_id: AtomicU64::new(1),
                register_tx,
                unregister_tx,
                broadcast_tx,
                send_tx,
            }),
        }
    }

    /// Registrar una conexión nueva. Devuelve (conn_id, cola de salida
    /// para la write pump) recién cuando el controlador ya insertó la
    /// entrada: un envío posterior siempre la encuentra.
    pub async fn register(&self, user_id: &str) -> (u64, mpsc::Receiver<String>) {
        let conn_id = self.inner.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(OUTBOUND_BUFFER);
        let (done_tx, done_rx) = oneshot::channel();

        let _ = self
            .inner
            .register_tx
            .send(RegisterCmd {
                user_id: user_id.to_string(),
                conn_id,
                sender,
                done: done_tx,
            })
            .await;
        let _ = done_rx.await;

        (conn_id, receiver)
    }

    /// Quitar una conexión. El conn_id evita que un unregister tardío
    /// borre a una conexión más nueva que la desplazó.
    pub async fn unregister(&self, user_id: &str, conn_id: u64) {
        let (done_tx, done_rx) = oneshot::channel();
        let _ = self
            .inner
            .unregister_tx
            .send(UnregisterCmd {
                user_id: user_id.to_string(),
                conn_id,
                done: done_tx,
            })
            .await;
        let _ = done_rx.await;
    }

    /// Envío dirigido O(1). Cola llena -> el cliente se desconecta.
    pub async fn send_to_user(&self, user_id: &str, frame: String) -> Result<(), HubSendError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .send_tx
            .send(SendCmd {
                user_id: user_id.to_string(),
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| HubSendError::Closed)?;

        reply_rx.await.map_err(|_| HubSendError::Closed)?
    }

    pub async fn send_json_to_user<T: Serialize>(
        &self,
        user_id: &str,
        message: &T,
    ) -> Result<(), HubSendError> {
        let frame = serde_json::to_string(message).map_err(|_| HubSendError::Closed)?;
        self.send_to_user(user_id, frame).await
    }

    /// Broadcast a todos los clientes conectados
    pub async fn broadcast_json<T: Serialize>(&self, message: &T) -> Result<(), AppError> {
        let frame = serde_json::to_string(message)
            .map_err(|e| AppError::Internal(format!("failed to serialize frame: {}", e)))?;
        self.inner
            .broadcast_tx
            .send(frame)
            .await
            .map_err(|_| AppError::Internal("hub closed".to_string()))
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.inner
            .clients
            .read()
            .map(|clients| clients.contains_key(user_id))
            .unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.inner
            .clients
            .read()
            .map(|clients| clients.len())
            .unwrap_or(0)
    }

    pub fn connected_users(&self) -> Vec<String> {
        self.inner
            .clients
            .read()
            .map(|clients| clients.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }
}

async fn controller_loop(
    name: &'static str,
    clients: Arc<RwLock<HashMap<String, ClientEntry>>>,
    mut register_rx: mpsc::Receiver<RegisterCmd>,
    mut unregister_rx: mpsc::Receiver<UnregisterCmd>,
    mut broadcast_rx: mpsc::Receiver<String>,
    mut send_rx: mpsc::Receiver<SendCmd>,
) {
    loop {
        tokio::select! {
            cmd = register_rx.recv() => {
                let Some(cmd) = cmd else { break };
                {
                    let mut guard = match clients.write() {
                        Ok(guard) => guard,
                        Err(_) => break,
                    };
                    // Desplazamiento: la conexión vieja pierde su cola de
                    // salida y su write pump termina
                    if guard.insert(cmd.user_id.clone(), ClientEntry { conn_id: cmd.conn_id, sender: cmd.sender }).is_some() {
                        debug!(hub = name, user_id = %cmd.user_id, "displaced existing connection");
                    }
                }
                let _ = cmd.done.send(());
            }
            cmd = unregister_rx.recv() => {
                let Some(cmd) = cmd else { break };
                {
                    let mut guard = match clients.write() {
                        Ok(guard) => guard,
                        Err(_) => break,
                    };
                    if guard.get(&cmd.user_id).map(|c| c.conn_id) == Some(cmd.conn_id) {
                        guard.remove(&cmd.user_id);
                    }
                }
                let _ = cmd.done.send(());
            }
            frame = broadcast_rx.recv() => {
                let Some(frame) = frame else { break };
                let mut guard = match clients.write() {
                    Ok(guard) => guard,
                    Err(_) => break,
                };
                let mut slow: Vec<String> = Vec::new();
                for (user_id, entry) in guard.iter() {
                    if let Err(mpsc::error::TrySendError::Full(_)) = entry.sender.try_send(frame.clone()) {
                        slow.push(user_id.clone());
                    }
                }
                for user_id in slow {
                    warn!(hub = name, %user_id, "dropping slow client");
                    guard.remove(&user_id);
                }
            }
            cmd = send_rx.recv() => {
                let Some(cmd) = cmd else { break };
                let result = {
                    let mut guard = match clients.write() {
                        Ok(guard) => guard,
                        Err(_) => break,
                    };
                    match guard.get(&cmd.user_id) {
                        None => Err(HubSendError::NotFound),
                        Some(entry) => match entry.sender.try_send(cmd.frame) {
                            Ok(()) => Ok(()),
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                warn!(hub = name, user_id = %cmd.user_id, "send buffer full, dropping client");
                                guard.remove(&cmd.user_id);
                                Err(HubSendError::BufferFull)
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                guard.remove(&cmd.user_id);
                                Err(HubSendError::NotFound)
                            }
                        },
                    }
                };
                let _ = cmd.reply.send(result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_send() {
        let hub = Hub::start("test");
        let (_conn_id, mut rx) = hub.register("user-1").await;

        hub.send_to_user("user-1", "hola".to_string()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hola");
        assert!(hub.is_connected("user-1"));
        assert_eq!(hub.count(), 1);
    }

    #[tokio::test]
    async fn test_send_to_unknown_user() {
        let hub = Hub::start("test");
        let result = hub.send_to_user("ghost", "x".to_string()).await;
        assert_eq!(result, Err(HubSendError::NotFound));
    }

    #[tokio::test]
    async fn test_register_displaces_previous_connection() {
        let hub = Hub::start("test");
        let (_old_conn, mut old_rx) = hub.register("user-1").await;
        let (_new_conn, mut new_rx) = hub.register("user-1").await;

        hub.send_to_user("user-1", "para el nuevo".to_string())
            .await
            .unwrap();

        // La conexión nueva recibe; la vieja ve su cola cerrada
        assert_eq!(new_rx.recv().await.unwrap(), "para el nuevo");
        assert!(old_rx.recv().await.is_none());
        assert_eq!(hub.count(), 1);
    }

    #[tokio::test]
    async fn test_stale_unregister_does_not_remove_newcomer() {
        let hub = Hub::start("test");
        let (old_conn, _old_rx) = hub.register("user-1").await;
        let (_new_conn, _new_rx) = hub.register("user-1").await;

        hub.unregister("user-1", old_conn).await;
        assert!(hub.is_connected("user-1"));
    }

    #[tokio::test]
    async fn test_slow_consumer_evicted_on_saturation() {
        let hub = Hub::start("test");
        // No drenamos rx: la cola se llena en OUTBOUND_BUFFER frames
        let (_conn_id, _rx) = hub.register("slow").await;

        for i in 0..OUTBOUND_BUFFER {
            hub.send_to_user("slow", format!("frame-{}", i)).await.unwrap();
        }

        // El frame que desborda la cola expulsa al cliente en el mismo envío
        let result = hub.send_to_user("slow", "overflow".to_string()).await;
        assert_eq!(result, Err(HubSendError::BufferFull));
        assert!(!hub.is_connected("slow"));
    }

    #[tokio::test]
    async fn test_unregister_removes_client() {
        let hub = Hub::start("test");
        let (conn_id, _rx) = hub.register("user-1").await;
        hub.unregister("user-1", conn_id).await;
        assert!(!hub.is_connected("user-1"));
        assert_eq!(hub.count(), 0);
    }
}
