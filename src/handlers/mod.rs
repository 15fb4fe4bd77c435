pub mod bookings;
pub mod facilities;
pub mod health;
