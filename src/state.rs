//! Estado compartido de la aplicación
//!
//! Se construye una sola vez en el composition root (main) y viaja por el
//! router de Axum. Los servicios no guardan referencias hacia atrás.

use std::sync::Arc;

use crate::broker::Rmq;
use crate::config::environment::EnvironmentConfig;
use crate::database::Database;
use crate::services::driver_service::DriverService;
use crate::services::matching_service::MatchingService;
use crate::services::ride_service::RideService;
use crate::ws::Hub;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: EnvironmentConfig,
    pub broker: Rmq,
    pub passenger_hub: Hub,
    pub driver_hub: Hub,
    pub ride_service: Arc<RideService>,
    pub driver_service: Arc<DriverService>,
    pub matching_service: Arc<MatchingService>,
}
