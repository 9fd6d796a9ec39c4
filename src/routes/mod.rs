pub mod driver_routes;
pub mod ride_routes;
pub mod ws_routes;
