use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, PaymentMethod, PaymentStatus, VehicleDetails};
use crate::services::lifecycle::{self, NewBooking};
use crate::state::AppState;

// POST /api/bookings
#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub user_id: String,
    pub facility_id: String,
    pub slot_number: i64,
    pub start_time: String,
    pub end_time: String,
    pub duration_hours: i64,
    pub payment_method: String,
    pub vehicle: VehicleRequest,
}

#[derive(Deserialize)]
pub struct VehicleRequest {
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub number: String,
    pub model: Option<String>,
    pub color: Option<String>,
}

#[derive(Serialize)]
pub struct BookingResponse {
    id: String,
    user_id: String,
    facility_id: String,
    slot_number: i64,
    start_time: String,
    end_time: String,
    duration_hours: i64,
    total_price: f64,
    status: String,
    payment_status: String,
    payment_method: String,
    payment_id: Option<String>,
    vehicle: VehicleDetails,
    check_in_time: Option<String>,
    check_out_time: Option<String>,
    cancellation_reason: Option<String>,
    refund_amount: f64,
    created_at: String,
    updated_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            user_id: b.user_id,
            facility_id: b.facility_id,
            slot_number: b.slot_number,
            start_time: queries::fmt_dt(&b.start_time),
            end_time: queries::fmt_dt(&b.end_time),
            duration_hours: b.duration_hours,
            total_price: b.total_price,
            status: b.status.as_str().to_string(),
            payment_status: b.payment_status.as_str().to_string(),
            payment_method: b.payment_method.as_str().to_string(),
            payment_id: b.payment_id,
            vehicle: b.vehicle,
            check_in_time: b.check_in_time.as_ref().map(queries::fmt_dt),
            check_out_time: b.check_out_time.as_ref().map(queries::fmt_dt),
            cancellation_reason: b.cancellation_reason,
            refund_amount: b.refund_amount,
            created_at: queries::fmt_dt(&b.created_at),
            updated_at: queries::fmt_dt(&b.updated_at),
        }
    }
}

fn parse_request_dt(field: &str, value: &str) -> Result<NaiveDateTime, AppError> {
    NaiveDateTime::parse_from_str(value, queries::DT_FORMAT)
        .map_err(|_| AppError::Validation(format!("invalid {field}: {value}")))
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    if req.user_id.trim().is_empty() || req.facility_id.trim().is_empty() {
        return Err(AppError::Validation(
            "user_id and facility_id are required".to_string(),
        ));
    }

    let payment_method = PaymentMethod::parse(&req.payment_method).ok_or_else(|| {
        AppError::Validation(format!("unknown payment method: {}", req.payment_method))
    })?;
    let start_time = parse_request_dt("start_time", &req.start_time)?;
    let end_time = parse_request_dt("end_time", &req.end_time)?;

    // Existence check happens against the directory before the
    // connection lock is taken; only the reserve-and-insert below
    // needs exclusive access.
    let exists = state.users.exists(&req.user_id).await?;
    if !exists {
        return Err(AppError::NotFound(format!("user {}", req.user_id)));
    }

    let new = NewBooking {
        user_id: req.user_id,
        facility_id: req.facility_id,
        slot_number: req.slot_number,
        start_time,
        end_time,
        duration_hours: req.duration_hours,
        payment_method,
        vehicle: VehicleDetails {
            vehicle_type: req.vehicle.vehicle_type,
            number: req.vehicle.number,
            model: req.vehicle.model,
            color: req.vehicle.color,
        },
    };

    let booking = {
        let mut db = state.db.lock().unwrap();
        lifecycle::create_booking(&mut db, new)?
    };

    tracing::info!(
        booking_id = %booking.id,
        facility_id = %booking.facility_id,
        slot_number = booking.slot_number,
        "booking created"
    );

    Ok((StatusCode::CREATED, Json(booking.into())))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let db = state.db.lock().unwrap();
    let booking = queries::get_booking(&db, &id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
    Ok(Json(booking.into()))
}

// GET /api/bookings/user/:user_id
#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub async fn get_user_bookings(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let limit = query.limit.unwrap_or(state.config.history_limit);

    let db = state.db.lock().unwrap();
    let bookings = queries::get_user_bookings(&db, &user_id, limit)?
        .into_iter()
        .map(BookingResponse::from)
        .collect();
    Ok(Json(bookings))
}

// POST /api/bookings/:id/check-in
pub async fn check_in(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = {
        let mut db = state.db.lock().unwrap();
        lifecycle::check_in(&mut db, &id)?
    };
    tracing::info!(booking_id = %id, "checked in");
    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/check-out
pub async fn check_out(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = {
        let mut db = state.db.lock().unwrap();
        lifecycle::check_out(&mut db, &id)?
    };
    tracing::info!(
        booking_id = %id,
        total_price = booking.total_price,
        duration_hours = booking.duration_hours,
        "checked out"
    );
    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/cancel
#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = {
        let mut db = state.db.lock().unwrap();
        lifecycle::cancel(&mut db, &id, &req.reason)?
    };
    tracing::info!(booking_id = %id, reason = %req.reason, "booking cancelled");

    // Fire-and-forget: a gateway failure must not undo the cancellation.
    if booking.payment_status == PaymentStatus::RefundOwed && booking.refund_amount > 0.0 {
        if let Err(e) = state
            .payments
            .mark_refund_owed(&booking.id, booking.refund_amount)
            .await
        {
            tracing::warn!(booking_id = %booking.id, error = %e, "failed to notify payment gateway of refund");
        }
    }

    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/payment
#[derive(Deserialize)]
pub struct RecordPaymentRequest {
    pub payment_id: Option<String>,
}

pub async fn record_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RecordPaymentRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let payment_id = req
        .payment_id
        .unwrap_or_else(|| format!("sim-{}", Uuid::new_v4()));

    let booking = {
        let db = state.db.lock().unwrap();
        lifecycle::record_payment(&db, &id, &payment_id)?
    };
    tracing::info!(booking_id = %id, payment_id = %payment_id, "payment recorded");
    Ok(Json(booking.into()))
}
