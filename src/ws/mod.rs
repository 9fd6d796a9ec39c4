pub mod client;
pub mod hub;
pub mod messages;

pub use hub::{Hub, HubSendError};
