use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("slot {slot_number} is already booked")]
    SlotAlreadyBooked { slot_number: i64 },

    #[error("slot {slot_number} is out of range (facility has {total_slots} slots)")]
    SlotOutOfRange { slot_number: i64, total_slots: i64 },

    #[error("invalid transition: booking is {status}")]
    InvalidTransition { status: &'static str },

    #[error("slot {slot_number} at facility {facility_id} was not reserved")]
    SlotNotReserved {
        facility_id: String,
        slot_number: i64,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "database failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SlotAlreadyBooked { .. } => StatusCode::CONFLICT,
            AppError::SlotOutOfRange { .. } => StatusCode::BAD_REQUEST,
            AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::SlotNotReserved {
                facility_id,
                slot_number,
            } => {
                // Releasing a slot the engine itself reserved must never fail.
                tracing::error!(
                    facility_id = %facility_id,
                    slot_number,
                    "consistency violation: release found no reservation record"
                );
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
