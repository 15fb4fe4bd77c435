//! The only code allowed to flip a slot between free and occupied.
//!
//! The occupancy set is keyed by `(facility_id, slot_number)`, so both
//! operations are single conditional statements: the primary key makes
//! check-and-insert one atomic unit, and concurrent reservations of
//! the same slot produce exactly one winner.

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::db::queries;
use crate::errors::AppError;

/// Atomically reserve `slot_number` at `facility_id` on behalf of
/// `booking_id`. Fails if the slot is occupied, even by the same
/// booking: a second reserve is always a bug worth surfacing.
pub fn reserve(
    conn: &Connection,
    facility_id: &str,
    slot_number: i64,
    booking_id: &str,
) -> Result<(), AppError> {
    let total_slots: i64 = match conn.query_row(
        "SELECT total_slots FROM facilities WHERE id = ?1",
        params![facility_id],
        |row| row.get(0),
    ) {
        Ok(total) => total,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(AppError::NotFound(format!("facility {facility_id}")))
        }
        Err(e) => return Err(e.into()),
    };

    if slot_number < 1 || slot_number > total_slots {
        return Err(AppError::SlotOutOfRange {
            slot_number,
            total_slots,
        });
    }

    let booked_at = queries::fmt_dt(&Utc::now().naive_utc());
    let inserted = conn.execute(
        "INSERT INTO occupied_slots (facility_id, slot_number, booking_id, booked_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(facility_id, slot_number) DO NOTHING",
        params![facility_id, slot_number, booking_id, booked_at],
    )?;

    if inserted == 0 {
        return Err(AppError::SlotAlreadyBooked { slot_number });
    }

    Ok(())
}

/// Atomically release `slot_number` at `facility_id`. A missing
/// reservation record means the caller released a slot it never held,
/// which the error path reports as a consistency violation.
pub fn release(conn: &Connection, facility_id: &str, slot_number: i64) -> Result<(), AppError> {
    let facility_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM facilities WHERE id = ?1",
        params![facility_id],
        |row| row.get(0),
    )?;
    if !facility_exists {
        return Err(AppError::NotFound(format!("facility {facility_id}")));
    }

    let removed = conn.execute(
        "DELETE FROM occupied_slots WHERE facility_id = ?1 AND slot_number = ?2",
        params![facility_id, slot_number],
    )?;

    if removed == 0 {
        return Err(AppError::SlotNotReserved {
            facility_id: facility_id.to_string(),
            slot_number,
        });
    }

    Ok(())
}
