use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facility {
    pub id: String,
    pub name: String,
    pub address: String,
    pub total_slots: i64,
    pub price_per_hour: f64,
    pub open_time: String,
    pub close_time: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// One row of a facility's occupancy set. The booking id is a
/// non-owning back-reference used for lookup only; lifecycle control
/// stays with the booking itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupiedSlot {
    pub slot_number: i64,
    pub booking_id: String,
    pub booked_at: NaiveDateTime,
}
