pub mod lifecycle;
pub mod payments;
pub mod pricing;
pub mod reservation;
pub mod users;
