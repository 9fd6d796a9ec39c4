pub mod driver_service;
pub mod fare;
pub mod matching_service;
pub mod rate_limiter;
pub mod ride_service;
