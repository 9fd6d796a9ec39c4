//! Broker de mensajes
//!
//! Tres exchanges lógicos: `ride_topic` y `driver_topic` (topic) y
//! `location_fanout` (fanout). Todas las colas son durables con ack manual.

pub mod config;
pub mod messages;
pub mod rabbitmq;

pub use config::BrokerConfig;
pub use rabbitmq::{BrokerMessage, Rmq};

// Exchanges
pub const EXCHANGE_RIDE_TOPIC: &str = "ride_topic";
pub const EXCHANGE_DRIVER_TOPIC: &str = "driver_topic";
pub const EXCHANGE_LOCATION_FANOUT: &str = "location_fanout";

// Colas
pub const QUEUE_RIDE_REQUESTS: &str = "ride_requests";
pub const QUEUE_RIDE_STATUS: &str = "ride_status";
pub const QUEUE_DRIVER_MATCHING: &str = "driver_matching";
pub const QUEUE_DRIVER_RESPONSES: &str = "driver_responses";
pub const QUEUE_DRIVER_STATUS: &str = "driver_status";
pub const QUEUE_LOCATION_UPDATES: &str = "location_updates";

/// (exchange, tipo)
pub const EXCHANGES: &[(&str, &str)] = &[
    (EXCHANGE_RIDE_TOPIC, "topic"),
    (EXCHANGE_DRIVER_TOPIC, "topic"),
    (EXCHANGE_LOCATION_FANOUT, "fanout"),
];

/// (cola, exchange, routing key)
pub const QUEUE_BINDINGS: &[(&str, &str, &str)] = &[
    (QUEUE_RIDE_REQUESTS, EXCHANGE_RIDE_TOPIC, "ride.request.*"),
    (QUEUE_RIDE_STATUS, EXCHANGE_RIDE_TOPIC, "ride.status.*"),
    (QUEUE_DRIVER_MATCHING, EXCHANGE_DRIVER_TOPIC, "driver.matching"),
    (QUEUE_DRIVER_RESPONSES, EXCHANGE_DRIVER_TOPIC, "driver.response.*"),
    (QUEUE_DRIVER_STATUS, EXCHANGE_DRIVER_TOPIC, "driver.status.*"),
    (QUEUE_LOCATION_UPDATES, EXCHANGE_LOCATION_FANOUT, ""),
];

// Helpers de routing keys
pub fn ride_request_routing_key(ride_type: &str) -> String {
    format!("ride.request.{}", ride_type)
}

pub fn ride_status_routing_key(status: &str) -> String {
    format!("ride.status.{}", status)
}

pub fn driver_response_routing_key(ride_id: &uuid::Uuid) -> String {
    format!("driver.response.{}", ride_id)
}

pub fn driver_status_routing_key(driver_id: &uuid::Uuid) -> String {
    format!("driver.status.{}", driver_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_routing_keys() {
        assert_eq!(ride_request_routing_key("ECONOMY"), "ride.request.ECONOMY");
        assert_eq!(ride_status_routing_key("CANCELLED"), "ride.status.CANCELLED");

        let id = Uuid::nil();
        assert_eq!(
            driver_response_routing_key(&id),
            format!("driver.response.{}", id)
        );
        assert_eq!(
            driver_status_routing_key(&id),
            format!("driver.status.{}", id)
        );
    }

    #[test]
    fn test_topology_covers_all_queues() {
        let queues: Vec<&str> = QUEUE_BINDINGS.iter().map(|(q, _, _)| *q).collect();
        for expected in [
            QUEUE_RIDE_REQUESTS,
            QUEUE_RIDE_STATUS,
            QUEUE_DRIVER_MATCHING,
            QUEUE_DRIVER_RESPONSES,
            QUEUE_DRIVER_STATUS,
            QUEUE_LOCATION_UPDATES,
        ] {
            assert!(queues.contains(&expected));
        }
    }
}
