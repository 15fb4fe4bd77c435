use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Facility;
use crate::state::AppState;

// POST /api/facilities
#[derive(Deserialize)]
pub struct CreateFacilityRequest {
    pub name: String,
    pub address: String,
    pub total_slots: i64,
    pub price_per_hour: f64,
    pub open_time: Option<String>,
    pub close_time: Option<String>,
}

#[derive(Serialize)]
pub struct FacilityResponse {
    id: String,
    name: String,
    address: String,
    total_slots: i64,
    booked_slots: i64,
    available_slots: i64,
    price_per_hour: f64,
    open_time: String,
    close_time: String,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

impl FacilityResponse {
    fn new(facility: Facility, booked_slots: i64) -> Self {
        Self {
            available_slots: facility.total_slots - booked_slots,
            booked_slots,
            id: facility.id,
            name: facility.name,
            address: facility.address,
            total_slots: facility.total_slots,
            price_per_hour: facility.price_per_hour,
            open_time: facility.open_time,
            close_time: facility.close_time,
            is_active: facility.is_active,
            created_at: queries::fmt_dt(&facility.created_at),
            updated_at: queries::fmt_dt(&facility.updated_at),
        }
    }
}

pub async fn create_facility(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateFacilityRequest>,
) -> Result<(StatusCode, Json<FacilityResponse>), AppError> {
    if req.name.trim().is_empty() || req.address.trim().is_empty() {
        return Err(AppError::Validation(
            "name and address are required".to_string(),
        ));
    }
    if req.total_slots < 1 {
        return Err(AppError::Validation(format!(
            "total slots must be positive, got {}",
            req.total_slots
        )));
    }
    if req.price_per_hour < 0.0 {
        return Err(AppError::Validation(format!(
            "price per hour must not be negative, got {}",
            req.price_per_hour
        )));
    }

    let now = Utc::now().naive_utc();
    let facility = Facility {
        id: Uuid::new_v4().to_string(),
        name: req.name,
        address: req.address,
        total_slots: req.total_slots,
        price_per_hour: req.price_per_hour,
        open_time: req.open_time.unwrap_or_else(|| "00:00".to_string()),
        close_time: req.close_time.unwrap_or_else(|| "23:59".to_string()),
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    {
        let db = state.db.lock().unwrap();
        queries::create_facility(&db, &facility)?;
    }

    tracing::info!(facility_id = %facility.id, total_slots = facility.total_slots, "facility created");

    Ok((
        StatusCode::CREATED,
        Json(FacilityResponse::new(facility, 0)),
    ))
}

// GET /api/facilities
pub async fn list_facilities(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<FacilityResponse>>, AppError> {
    let db = state.db.lock().unwrap();
    let facilities = queries::list_facilities(&db)?;

    let mut response = Vec::with_capacity(facilities.len());
    for facility in facilities {
        let booked = queries::count_occupied_slots(&db, &facility.id)?;
        response.push(FacilityResponse::new(facility, booked));
    }
    Ok(Json(response))
}

// GET /api/facilities/:id
pub async fn get_facility(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FacilityResponse>, AppError> {
    let db = state.db.lock().unwrap();
    let facility = queries::get_facility(&db, &id)?
        .ok_or_else(|| AppError::NotFound(format!("facility {id}")))?;
    let booked = queries::count_occupied_slots(&db, &id)?;
    Ok(Json(FacilityResponse::new(facility, booked)))
}

// PUT /api/facilities/:id
#[derive(Deserialize)]
pub struct UpdateFacilityRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub price_per_hour: Option<f64>,
    pub open_time: Option<String>,
    pub close_time: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn update_facility(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateFacilityRequest>,
) -> Result<Json<FacilityResponse>, AppError> {
    if let Some(price) = req.price_per_hour {
        if price < 0.0 {
            return Err(AppError::Validation(format!(
                "price per hour must not be negative, got {price}"
            )));
        }
    }

    let db = state.db.lock().unwrap();
    let update = queries::FacilityUpdate {
        name: req.name,
        address: req.address,
        price_per_hour: req.price_per_hour,
        open_time: req.open_time,
        close_time: req.close_time,
        is_active: req.is_active,
    };
    if !queries::update_facility(&db, &id, &update)? {
        return Err(AppError::NotFound(format!("facility {id}")));
    }

    let facility = queries::get_facility(&db, &id)?
        .ok_or_else(|| AppError::NotFound(format!("facility {id}")))?;
    let booked = queries::count_occupied_slots(&db, &id)?;
    Ok(Json(FacilityResponse::new(facility, booked)))
}

// DELETE /api/facilities/:id
pub async fn delete_facility(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let db = state.db.lock().unwrap();

    let live = queries::count_non_terminal_bookings(&db, &id)?;
    if live > 0 {
        return Err(AppError::Conflict(format!(
            "facility {id} has {live} active bookings"
        )));
    }

    if !queries::delete_facility(&db, &id)? {
        return Err(AppError::NotFound(format!("facility {id}")));
    }

    tracing::info!(facility_id = %id, "facility deleted");
    Ok(Json(serde_json::json!({ "deleted": true })))
}

// GET /api/facilities/:id/slots
#[derive(Serialize)]
pub struct OccupiedSlotResponse {
    slot_number: i64,
    booking_id: String,
    booked_at: String,
}

pub async fn list_occupied_slots(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<OccupiedSlotResponse>>, AppError> {
    let db = state.db.lock().unwrap();
    if queries::get_facility(&db, &id)?.is_none() {
        return Err(AppError::NotFound(format!("facility {id}")));
    }

    let slots = queries::list_occupied_slots(&db, &id)?
        .into_iter()
        .map(|s| OccupiedSlotResponse {
            slot_number: s.slot_number,
            booking_id: s.booking_id,
            booked_at: queries::fmt_dt(&s.booked_at),
        })
        .collect();
    Ok(Json(slots))
}
