//! Booking state machine and the orchestration around it.
//!
//! ```text
//!   [none]  ── create ────► pending
//!   pending ── check_in ──► active
//!   pending ── cancel ────► cancelled   (slot released)
//!   active  ── check_out ─► completed   (slot released, price recomputed)
//!   active  ── cancel ────► cancelled   (slot released)
//! ```
//!
//! Every transition runs inside one rusqlite transaction: the
//! conditional `UPDATE ... WHERE status = ...` is the single
//! synchronization point, and the slot release commits or rolls back
//! together with the status change. Out of concurrent transition calls
//! on one booking exactly one update matches; the rest observe the new
//! status and get `InvalidTransition`.

use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, PaymentMethod, PaymentStatus, VehicleDetails};
use crate::services::{pricing, reservation};

pub struct NewBooking {
    pub user_id: String,
    pub facility_id: String,
    pub slot_number: i64,
    pub start_time: chrono::NaiveDateTime,
    pub end_time: chrono::NaiveDateTime,
    pub duration_hours: i64,
    pub payment_method: PaymentMethod,
    pub vehicle: VehicleDetails,
}

/// Reserve the slot and persist a `pending` booking as one atomic
/// step. If the slot is taken the transaction rolls back and no
/// booking record survives.
///
/// User existence is the caller's concern (checked against the
/// directory before taking the connection lock).
pub fn create_booking(conn: &mut Connection, req: NewBooking) -> Result<Booking, AppError> {
    if req.duration_hours <= 0 {
        return Err(AppError::Validation(format!(
            "duration must be positive, got {} hours",
            req.duration_hours
        )));
    }
    if req.end_time <= req.start_time {
        return Err(AppError::Validation(
            "end time must be after start time".to_string(),
        ));
    }
    if req.vehicle.vehicle_type.trim().is_empty() || req.vehicle.number.trim().is_empty() {
        return Err(AppError::Validation(
            "vehicle type and number are required".to_string(),
        ));
    }

    let tx = conn.transaction()?;

    let facility = queries::get_facility(&tx, &req.facility_id)?
        .ok_or_else(|| AppError::NotFound(format!("facility {}", req.facility_id)))?;
    if !facility.is_active {
        return Err(AppError::Conflict(format!(
            "facility {} is not accepting bookings",
            facility.id
        )));
    }

    let total_price = pricing::total_price(req.duration_hours, facility.price_per_hour)?;

    let now = Utc::now().naive_utc();
    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        user_id: req.user_id,
        facility_id: req.facility_id,
        slot_number: req.slot_number,
        start_time: req.start_time,
        end_time: req.end_time,
        duration_hours: req.duration_hours,
        total_price,
        status: BookingStatus::Pending,
        payment_status: PaymentStatus::Pending,
        payment_method: req.payment_method,
        payment_id: None,
        vehicle: req.vehicle,
        check_in_time: None,
        check_out_time: None,
        cancellation_reason: None,
        refund_amount: 0.0,
        created_at: now,
        updated_at: now,
    };

    // Reserve before the booking row exists; both land in one commit.
    reservation::reserve(&tx, &booking.facility_id, booking.slot_number, &booking.id)?;
    queries::insert_booking(&tx, &booking)?;

    tx.commit()?;

    Ok(booking)
}

/// pending → active.
pub fn check_in(conn: &mut Connection, booking_id: &str) -> Result<Booking, AppError> {
    let tx = conn.transaction()?;
    let now = queries::fmt_dt(&Utc::now().naive_utc());

    let updated = tx.execute(
        "UPDATE bookings SET status = 'active', check_in_time = ?1, updated_at = ?1
         WHERE id = ?2 AND status = 'pending'",
        params![now, booking_id],
    )?;

    if updated == 0 {
        return match queries::get_booking(&tx, booking_id)? {
            None => Err(AppError::NotFound(format!("booking {booking_id}"))),
            Some(b) => Err(AppError::InvalidTransition {
                status: b.status.as_str(),
            }),
        };
    }

    let booking = fetch_updated(&tx, booking_id)?;
    tx.commit()?;
    Ok(booking)
}

/// active → completed. The final charge is recomputed from the actual
/// stay, rounded up to whole hours at the facility's current rate, and
/// the slot is released in the same transaction.
pub fn check_out(conn: &mut Connection, booking_id: &str) -> Result<Booking, AppError> {
    let tx = conn.transaction()?;

    let booking = queries::get_booking(&tx, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
    if booking.status != BookingStatus::Active {
        return Err(AppError::InvalidTransition {
            status: booking.status.as_str(),
        });
    }

    let facility = queries::get_facility(&tx, &booking.facility_id)?
        .ok_or_else(|| AppError::NotFound(format!("facility {}", booking.facility_id)))?;

    let now = Utc::now().naive_utc();
    let check_in_time = booking.check_in_time.unwrap_or(booking.start_time);
    let actual_hours = pricing::ceil_hours(check_in_time, now);
    let total_price = pricing::total_price(actual_hours, facility.price_per_hour)?;
    let now_str = queries::fmt_dt(&now);

    let updated = tx.execute(
        "UPDATE bookings SET status = 'completed', check_out_time = ?1, duration_hours = ?2,
                total_price = ?3, updated_at = ?1
         WHERE id = ?4 AND status = 'active'",
        params![now_str, actual_hours, total_price, booking_id],
    )?;
    if updated == 0 {
        let b = fetch_updated(&tx, booking_id)?;
        return Err(AppError::InvalidTransition {
            status: b.status.as_str(),
        });
    }

    reservation::release(&tx, &booking.facility_id, booking.slot_number)?;

    let booking = fetch_updated(&tx, booking_id)?;
    tx.commit()?;
    Ok(booking)
}

/// pending|active → cancelled. A paid booking flips to `refund_owed`
/// with the full charge as the refund amount; notifying the payment
/// gateway is the caller's follow-up and must not block the
/// cancellation.
pub fn cancel(conn: &mut Connection, booking_id: &str, reason: &str) -> Result<Booking, AppError> {
    let tx = conn.transaction()?;

    let booking = queries::get_booking(&tx, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
    if booking.status.is_terminal() {
        return Err(AppError::InvalidTransition {
            status: booking.status.as_str(),
        });
    }

    let now = queries::fmt_dt(&Utc::now().naive_utc());
    let updated = tx.execute(
        "UPDATE bookings SET status = 'cancelled', cancellation_reason = ?1, updated_at = ?2,
                payment_status = CASE WHEN payment_status = 'paid' THEN 'refund_owed' ELSE payment_status END,
                refund_amount = CASE WHEN payment_status = 'paid' THEN total_price ELSE refund_amount END
         WHERE id = ?3 AND status IN ('pending', 'active')",
        params![reason, now, booking_id],
    )?;
    if updated == 0 {
        let b = fetch_updated(&tx, booking_id)?;
        return Err(AppError::InvalidTransition {
            status: b.status.as_str(),
        });
    }

    reservation::release(&tx, &booking.facility_id, booking.slot_number)?;

    let booking = fetch_updated(&tx, booking_id)?;
    tx.commit()?;
    Ok(booking)
}

/// Record a (simulated) successful payment against a live booking.
pub fn record_payment(
    conn: &Connection,
    booking_id: &str,
    payment_id: &str,
) -> Result<Booking, AppError> {
    let booking = queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
    if booking.status.is_terminal() {
        return Err(AppError::InvalidTransition {
            status: booking.status.as_str(),
        });
    }
    if booking.payment_status != PaymentStatus::Pending {
        return Err(AppError::Conflict(format!(
            "payment already {}",
            booking.payment_status.as_str()
        )));
    }

    let now = queries::fmt_dt(&Utc::now().naive_utc());
    conn.execute(
        "UPDATE bookings SET payment_status = 'paid', payment_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![payment_id, now, booking_id],
    )?;

    queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("booking vanished during payment")))
}

fn fetch_updated(conn: &Connection, booking_id: &str) -> Result<Booking, AppError> {
    queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("booking vanished mid-transition")))
}
