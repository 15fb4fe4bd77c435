pub mod booking;
pub mod facility;

pub use booking::{Booking, BookingStatus, PaymentMethod, PaymentStatus, VehicleDetails};
pub use facility::{Facility, OccupiedSlot};
