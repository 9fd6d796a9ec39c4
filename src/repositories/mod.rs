pub mod coordinate_repository;
pub mod driver_repository;
pub mod location_repository;
pub mod ride_repository;
pub mod session_repository;
