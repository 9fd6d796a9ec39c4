//! Cliente RabbitMQ
//!
//! Conexión y canal viven bajo un Mutex para poder reemplazarlos en un
//! reconnect. El publish lleva un deadline de 3 segundos.

use std::sync::Arc;
use std::time::Duration;

use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::broker::config::BrokerConfig;
use crate::broker::{EXCHANGES, QUEUE_BINDINGS};
use crate::utils::errors::AppError;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(3);
const PREFETCH_COUNT: u16 = 10;

#[derive(Clone)]
pub struct Rmq {
    inner: Arc<RmqInner>,
}

struct RmqInner {
    config: BrokerConfig,
    state: Mutex<Option<RmqState>>,
}

struct RmqState {
    connection: Connection,
    channel: Channel,
}

impl Rmq {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            inner: Arc::new(RmqInner {
                config,
                state: Mutex::new(None),
            }),
        }
    }

    pub async fn connect(&self) -> Result<(), AppError> {
        let uri = self.inner.config.connection_uri();
        let connection = Connection::connect(&uri, ConnectionProperties::default())
            .await
            .map_err(|e| AppError::Broker(format!("failed to connect to rabbitmq: {}", e)))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| AppError::Broker(format!("failed to open channel: {}", e)))?;

        let mut guard = self.inner.state.lock().await;
        *guard = Some(RmqState {
            connection,
            channel,
        });

        info!("📨 RabbitMQ conectado");
        Ok(())
    }

    async fn channel(&self) -> Result<Channel, AppError> {
        let guard = self.inner.state.lock().await;
        match guard.as_ref() {
            Some(state) => Ok(state.channel.clone()),
            None => Err(AppError::Broker(
                "rabbitmq channel is not initialized".to_string(),
            )),
        }
    }

    /// Declarar exchanges y colas durables con sus bindings
    pub async fn declare_topology(&self) -> Result<(), AppError> {
        let channel = self.channel().await?;

        for (name, kind) in EXCHANGES {
            let exchange_kind = match *kind {
                "fanout" => ExchangeKind::Fanout,
                _ => ExchangeKind::Topic,
            };
            channel
                .exchange_declare(
                    name,
                    exchange_kind,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| AppError::Broker(format!("failed to declare exchange {}: {}", name, e)))?;
        }

        for (queue, exchange, routing_key) in QUEUE_BINDINGS {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| AppError::Broker(format!("failed to declare queue {}: {}", queue, e)))?;

            channel
                .queue_bind(
                    queue,
                    exchange,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| AppError::Broker(format!("failed to bind queue {}: {}", queue, e)))?;
        }

        Ok(())
    }

    /// Publicar un payload JSON ya serializado. Propiedades: persistente,
    /// content-type application/json, timestamp actual.
    pub async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> Result<(), AppError> {
        let channel = self.channel().await?;

        debug!(exchange, routing_key, "publishing message");

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2)
            .with_timestamp(chrono::Utc::now().timestamp() as u64);

        let publish = channel.basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions::default(),
            body,
            properties,
        );

        let _confirm = tokio::time::timeout(PUBLISH_TIMEOUT, publish)
            .await
            .map_err(|_| AppError::Broker("publish timed out after 3s".to_string()))?
            .map_err(|e| AppError::Broker(format!("failed to publish message: {}", e)))?;

        Ok(())
    }

    pub async fn publish_json<T: Serialize>(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &T,
    ) -> Result<(), AppError> {
        let body = serde_json::to_vec(message)
            .map_err(|e| AppError::Broker(format!("failed to serialize message: {}", e)))?;
        self.publish(exchange, routing_key, &body).await
    }

    /// Abrir un consumidor con ack manual y prefetch 10. El stream es
    /// infinito; los mensajes sin ack se reentregan tras un crash.
    pub async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<lapin::Consumer, AppError> {
        let channel = self.channel().await?;

        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
            .map_err(|e| AppError::Broker(format!("failed to set qos: {}", e)))?;

        channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| AppError::Broker(format!("failed to consume {}: {}", queue, e)))
    }

    pub async fn is_healthy(&self) -> bool {
        let guard = self.inner.state.lock().await;
        match guard.as_ref() {
            Some(state) => state.connection.status().connected(),
            None => false,
        }
    }

    pub async fn reconnect(&self) -> Result<(), AppError> {
        self.close().await;
        self.connect().await
    }

    pub async fn close(&self) {
        let mut guard = self.inner.state.lock().await;
        if let Some(state) = guard.take() {
            let _ = state.channel.close(0, "closing").await;
            let _ = state.connection.close(0, "closing").await;
        }
    }
}

/// Mensaje entregado por el broker, con ack/nack explícitos
pub struct BrokerMessage {
    delivery: Delivery,
}

impl BrokerMessage {
    pub fn new(delivery: Delivery) -> Self {
        Self { delivery }
    }

    pub fn body(&self) -> &[u8] {
        &self.delivery.data
    }

    pub async fn ack(self) -> Result<(), AppError> {
        self.delivery
            .acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| AppError::Broker(format!("failed to ack: {}", e)))
    }

    pub async fn nack(self, requeue: bool) -> Result<(), AppError> {
        self.delivery
            .acker
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await
            .map_err(|e| AppError::Broker(format!("failed to nack: {}", e)))
    }
}
