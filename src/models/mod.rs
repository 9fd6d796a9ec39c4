pub mod coordinate;
pub mod driver;
pub mod location;
pub mod ride;
pub mod user;
