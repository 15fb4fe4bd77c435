use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{
    Booking, BookingStatus, Facility, OccupiedSlot, PaymentMethod, PaymentStatus, VehicleDetails,
};

pub const DT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn fmt_dt(dt: &NaiveDateTime) -> String {
    dt.format(DT_FORMAT).to_string()
}

fn parse_dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, DT_FORMAT).unwrap_or_else(|_| Utc::now().naive_utc())
}

// ── Facilities ──

pub fn create_facility(conn: &Connection, facility: &Facility) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO facilities (id, name, address, total_slots, price_per_hour, open_time, close_time, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            facility.id,
            facility.name,
            facility.address,
            facility.total_slots,
            facility.price_per_hour,
            facility.open_time,
            facility.close_time,
            facility.is_active as i32,
            fmt_dt(&facility.created_at),
            fmt_dt(&facility.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_facility(conn: &Connection, id: &str) -> anyhow::Result<Option<Facility>> {
    let result = conn.query_row(
        "SELECT id, name, address, total_slots, price_per_hour, open_time, close_time, is_active, created_at, updated_at
         FROM facilities WHERE id = ?1",
        params![id],
        |row| Ok(parse_facility_row(row)),
    );

    match result {
        Ok(facility) => Ok(Some(facility?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_facilities(conn: &Connection) -> anyhow::Result<Vec<Facility>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, address, total_slots, price_per_hour, open_time, close_time, is_active, created_at, updated_at
         FROM facilities ORDER BY name ASC",
    )?;

    let rows = stmt.query_map([], |row| Ok(parse_facility_row(row)))?;

    let mut facilities = vec![];
    for row in rows {
        facilities.push(row??);
    }
    Ok(facilities)
}

/// Partial update of a facility's static configuration. Derived
/// occupancy and the slot count are deliberately not updatable here.
pub struct FacilityUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub price_per_hour: Option<f64>,
    pub open_time: Option<String>,
    pub close_time: Option<String>,
    pub is_active: Option<bool>,
}

pub fn update_facility(
    conn: &Connection,
    id: &str,
    update: &FacilityUpdate,
) -> anyhow::Result<bool> {
    let now = fmt_dt(&Utc::now().naive_utc());
    let count = conn.execute(
        "UPDATE facilities SET
            name = COALESCE(?1, name),
            address = COALESCE(?2, address),
            price_per_hour = COALESCE(?3, price_per_hour),
            open_time = COALESCE(?4, open_time),
            close_time = COALESCE(?5, close_time),
            is_active = COALESCE(?6, is_active),
            updated_at = ?7
         WHERE id = ?8",
        params![
            update.name,
            update.address,
            update.price_per_hour,
            update.open_time,
            update.close_time,
            update.is_active.map(|b| b as i32),
            now,
            id,
        ],
    )?;
    Ok(count > 0)
}

pub fn delete_facility(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM facilities WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

// ── Occupancy ──

pub fn count_occupied_slots(conn: &Connection, facility_id: &str) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM occupied_slots WHERE facility_id = ?1",
        params![facility_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn list_occupied_slots(
    conn: &Connection,
    facility_id: &str,
) -> anyhow::Result<Vec<OccupiedSlot>> {
    let mut stmt = conn.prepare(
        "SELECT slot_number, booking_id, booked_at
         FROM occupied_slots WHERE facility_id = ?1 ORDER BY slot_number ASC",
    )?;

    let rows = stmt.query_map(params![facility_id], |row| {
        let booked_at_str: String = row.get(2)?;
        Ok(OccupiedSlot {
            slot_number: row.get(0)?,
            booking_id: row.get(1)?,
            booked_at: parse_dt(&booked_at_str),
        })
    })?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row?);
    }
    Ok(slots)
}

pub fn count_non_terminal_bookings(conn: &Connection, facility_id: &str) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE facility_id = ?1 AND status IN ('pending', 'active')",
        params![facility_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, user_id, facility_id, slot_number, start_time, end_time, duration_hours, total_price, status, payment_status, payment_method, payment_id, vehicle_type, vehicle_number, vehicle_model, vehicle_color, check_in_time, check_out_time, cancellation_reason, refund_amount, created_at, updated_at";

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, user_id, facility_id, slot_number, start_time, end_time, duration_hours, total_price, status, payment_status, payment_method, payment_id, vehicle_type, vehicle_number, vehicle_model, vehicle_color, check_in_time, check_out_time, cancellation_reason, refund_amount, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
        params![
            booking.id,
            booking.user_id,
            booking.facility_id,
            booking.slot_number,
            fmt_dt(&booking.start_time),
            fmt_dt(&booking.end_time),
            booking.duration_hours,
            booking.total_price,
            booking.status.as_str(),
            booking.payment_status.as_str(),
            booking.payment_method.as_str(),
            booking.payment_id,
            booking.vehicle.vehicle_type,
            booking.vehicle.number,
            booking.vehicle.model,
            booking.vehicle.color,
            booking.check_in_time.as_ref().map(fmt_dt),
            booking.check_out_time.as_ref().map(fmt_dt),
            booking.cancellation_reason,
            booking.refund_amount,
            fmt_dt(&booking.created_at),
            fmt_dt(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1");
    let result = conn.query_row(&sql, params![id], |row| Ok(parse_booking_row(row)));

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_user_bookings(
    conn: &Connection,
    user_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt.query_map(params![user_id, limit], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let start_time_str: String = row.get(4)?;
    let end_time_str: String = row.get(5)?;
    let status_str: String = row.get(8)?;
    let payment_status_str: String = row.get(9)?;
    let payment_method_str: String = row.get(10)?;
    let check_in_str: Option<String> = row.get(16)?;
    let check_out_str: Option<String> = row.get(17)?;
    let created_at_str: String = row.get(20)?;
    let updated_at_str: String = row.get(21)?;

    Ok(Booking {
        id: row.get(0)?,
        user_id: row.get(1)?,
        facility_id: row.get(2)?,
        slot_number: row.get(3)?,
        start_time: parse_dt(&start_time_str),
        end_time: parse_dt(&end_time_str),
        duration_hours: row.get(6)?,
        total_price: row.get(7)?,
        status: BookingStatus::parse(&status_str),
        payment_status: PaymentStatus::parse(&payment_status_str),
        payment_method: PaymentMethod::parse(&payment_method_str)
            .unwrap_or(PaymentMethod::Cash),
        payment_id: row.get(11)?,
        vehicle: VehicleDetails {
            vehicle_type: row.get(12)?,
            number: row.get(13)?,
            model: row.get(14)?,
            color: row.get(15)?,
        },
        check_in_time: check_in_str.as_deref().map(parse_dt),
        check_out_time: check_out_str.as_deref().map(parse_dt),
        cancellation_reason: row.get(18)?,
        refund_amount: row.get(19)?,
        created_at: parse_dt(&created_at_str),
        updated_at: parse_dt(&updated_at_str),
    })
}

fn parse_facility_row(row: &rusqlite::Row) -> anyhow::Result<Facility> {
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;

    Ok(Facility {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        total_slots: row.get(3)?,
        price_per_hour: row.get(4)?,
        open_time: row.get(5)?,
        close_time: row.get(6)?,
        is_active: row.get::<_, i32>(7)? != 0,
        created_at: parse_dt(&created_at_str),
        updated_at: parse_dt(&updated_at_str),
    })
}

// ── Users ──

pub fn insert_user(
    conn: &Connection,
    id: &str,
    name: &str,
    email: Option<&str>,
    phone: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users (id, name, email, phone) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, email = excluded.email, phone = excluded.phone",
        params![id, name, email, phone],
    )?;
    Ok(())
}

pub fn user_exists(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
