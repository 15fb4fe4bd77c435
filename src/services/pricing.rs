use chrono::NaiveDateTime;

use crate::errors::AppError;

/// Price for `hours` of parking at `rate_per_hour`. Pure; the only
/// failure mode is a negative input.
pub fn total_price(hours: i64, rate_per_hour: f64) -> Result<f64, AppError> {
    if hours < 0 {
        return Err(AppError::Validation(format!(
            "duration must not be negative, got {hours}"
        )));
    }
    if rate_per_hour < 0.0 {
        return Err(AppError::Validation(format!(
            "rate must not be negative, got {rate_per_hour}"
        )));
    }
    Ok(hours as f64 * rate_per_hour)
}

/// Elapsed time between check-in and check-out, rounded up to whole
/// hours. A stay of 2h15m bills as 3 hours.
pub fn ceil_hours(check_in: NaiveDateTime, check_out: NaiveDateTime) -> i64 {
    let secs = (check_out - check_in).num_seconds().max(0);
    (secs + 3599) / 3600
}
