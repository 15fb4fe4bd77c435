use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceExt;

use parkside::config::AppConfig;
use parkside::db::{self, queries};
use parkside::handlers;
use parkside::models::Facility;
use parkside::services::lifecycle::{self, NewBooking};
use parkside::services::payments::PaymentGateway;
use parkside::services::reservation;
use parkside::services::users::{DbUserDirectory, UserDirectory};
use parkside::state::AppState;

// ── Mock Collaborators ──

struct MockUsers {
    known: HashSet<String>,
}

impl MockUsers {
    fn with(ids: &[&str]) -> Self {
        Self {
            known: ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl UserDirectory for MockUsers {
    async fn exists(&self, user_id: &str) -> anyhow::Result<bool> {
        Ok(self.known.contains(user_id))
    }
}

struct MockPaymentGateway {
    refunds: Arc<Mutex<Vec<(String, f64)>>>,
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn mark_refund_owed(&self, booking_id: &str, amount: f64) -> anyhow::Result<()> {
        self.refunds
            .lock()
            .unwrap()
            .push((booking_id.to_string(), amount));
        Ok(())
    }
}

// ── Helpers ──

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        history_limit: 10,
    }
}

fn test_state() -> (Arc<AppState>, Arc<Mutex<Vec<(String, f64)>>>) {
    let conn = db::init_db(":memory:").unwrap();
    let refunds = Arc::new(Mutex::new(vec![]));
    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: test_config(),
        users: Box::new(MockUsers::with(&["u1", "u2"])),
        payments: Box::new(MockPaymentGateway {
            refunds: Arc::clone(&refunds),
        }),
    });
    (state, refunds)
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/facilities",
            post(handlers::facilities::create_facility).get(handlers::facilities::list_facilities),
        )
        .route(
            "/api/facilities/:id",
            get(handlers::facilities::get_facility)
                .put(handlers::facilities::update_facility)
                .delete(handlers::facilities::delete_facility),
        )
        .route(
            "/api/facilities/:id/slots",
            get(handlers::facilities::list_occupied_slots),
        )
        .route("/api/bookings", post(handlers::bookings::create_booking))
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/user/:user_id",
            get(handlers::bookings::get_user_bookings),
        )
        .route(
            "/api/bookings/:id/check-in",
            post(handlers::bookings::check_in),
        )
        .route(
            "/api/bookings/:id/check-out",
            post(handlers::bookings::check_out),
        )
        .route(
            "/api/bookings/:id/cancel",
            post(handlers::bookings::cancel_booking),
        )
        .route(
            "/api/bookings/:id/payment",
            post(handlers::bookings::record_payment),
        )
        .with_state(state)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(res: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn seed_facility(state: &Arc<AppState>, id: &str, total_slots: i64, price_per_hour: f64) {
    let now = chrono::Utc::now().naive_utc();
    let db = state.db.lock().unwrap();
    queries::create_facility(
        &db,
        &Facility {
            id: id.to_string(),
            name: "Central Lot".to_string(),
            address: "1 Main St".to_string(),
            total_slots,
            price_per_hour,
            open_time: "06:00".to_string(),
            close_time: "23:00".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        },
    )
    .unwrap();
}

fn booking_body(user_id: &str, facility_id: &str, slot_number: i64, hours: i64) -> serde_json::Value {
    serde_json::json!({
        "user_id": user_id,
        "facility_id": facility_id,
        "slot_number": slot_number,
        "start_time": "2025-07-01 10:00:00",
        "end_time": "2025-07-01 13:00:00",
        "duration_hours": hours,
        "payment_method": "credit_card",
        "vehicle": { "type": "car", "number": "KA-01-0001" }
    })
}

async fn create_booking_via_api(
    state: &Arc<AppState>,
    facility_id: &str,
    slot_number: i64,
    hours: i64,
) -> serde_json::Value {
    let app = test_app(state.clone());
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/bookings",
            booking_body("u1", facility_id, slot_number, hours),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    body_json(res).await
}

async fn available_slots(state: &Arc<AppState>, facility_id: &str) -> i64 {
    let app = test_app(state.clone());
    let res = app
        .oneshot(empty_request("GET", &format!("/api/facilities/{facility_id}")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await["available_slots"].as_i64().unwrap()
}

fn make_new_booking(facility_id: &str, slot_number: i64) -> NewBooking {
    let start = chrono::Utc::now().naive_utc();
    NewBooking {
        user_id: "u1".to_string(),
        facility_id: facility_id.to_string(),
        slot_number,
        start_time: start,
        end_time: start + chrono::Duration::hours(3),
        duration_hours: 3,
        payment_method: parkside::models::PaymentMethod::CreditCard,
        vehicle: parkside::models::VehicleDetails {
            vehicle_type: "car".to_string(),
            number: "KA-01-0001".to_string(),
            model: None,
            color: None,
        },
    }
}

// ── Health ──

#[tokio::test]
async fn test_health() {
    let (state, _) = test_state();
    let app = test_app(state);

    let res = app.oneshot(empty_request("GET", "/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

// ── Facility API ──

#[tokio::test]
async fn test_create_and_get_facility() {
    let (state, _) = test_state();

    let app = test_app(state.clone());
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/facilities",
            serde_json::json!({
                "name": "Airport Lot",
                "address": "42 Runway Rd",
                "total_slots": 20,
                "price_per_hour": 45.0
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created = body_json(res).await;
    assert_eq!(created["available_slots"], 20);
    assert_eq!(created["booked_slots"], 0);

    let id = created["id"].as_str().unwrap();
    let app = test_app(state);
    let res = app
        .oneshot(empty_request("GET", &format!("/api/facilities/{id}")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let fetched = body_json(res).await;
    assert_eq!(fetched["name"], "Airport Lot");
    assert_eq!(fetched["total_slots"], 20);
}

#[tokio::test]
async fn test_create_facility_rejects_zero_slots() {
    let (state, _) = test_state();
    let app = test_app(state);

    let res = app
        .oneshot(json_request(
            "POST",
            "/api/facilities",
            serde_json::json!({
                "name": "Empty Lot",
                "address": "nowhere",
                "total_slots": 0,
                "price_per_hour": 10.0
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_facility_static_fields() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 5, 60.0);

    let app = test_app(state.clone());
    let res = app
        .oneshot(json_request(
            "PUT",
            "/api/facilities/f1",
            serde_json::json!({ "price_per_hour": 75.0, "name": "Renamed Lot" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let updated = body_json(res).await;
    assert_eq!(updated["price_per_hour"], 75.0);
    assert_eq!(updated["name"], "Renamed Lot");
    assert_eq!(updated["total_slots"], 5);
}

#[tokio::test]
async fn test_facility_not_found() {
    let (state, _) = test_state();
    let app = test_app(state);

    let res = app
        .oneshot(empty_request("GET", "/api/facilities/missing"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

// ── Booking creation ──

#[tokio::test]
async fn test_create_booking_happy_path() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 5, 60.0);

    let booking = create_booking_via_api(&state, "f1", 1, 3).await;
    assert_eq!(booking["status"], "pending");
    assert_eq!(booking["total_price"], 180.0);
    assert_eq!(booking["slot_number"], 1);
    assert_eq!(booking["payment_status"], "pending");

    assert_eq!(available_slots(&state, "f1").await, 4);
}

#[tokio::test]
async fn test_create_booking_unknown_user() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 5, 60.0);

    let app = test_app(state);
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/bookings",
            booking_body("ghost", "f1", 1, 3),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_booking_unknown_facility() {
    let (state, _) = test_state();

    let app = test_app(state);
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/bookings",
            booking_body("u1", "missing", 1, 3),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_booking_slot_out_of_range() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 5, 60.0);

    let app = test_app(state.clone());
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/bookings",
            booking_body("u1", "f1", 6, 3),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Nothing was reserved
    assert_eq!(available_slots(&state, "f1").await, 5);
}

#[tokio::test]
async fn test_double_booking_conflict() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 1, 60.0);

    create_booking_via_api(&state, "f1", 1, 3).await;

    let app = test_app(state.clone());
    let res = app
        .oneshot(json_request(
            "POST",
            "/api/bookings",
            booking_body("u2", "f1", 1, 2),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    assert_eq!(available_slots(&state, "f1").await, 0);
}

#[tokio::test]
async fn test_create_booking_rejects_bad_duration() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 5, 60.0);

    let app = test_app(state);
    let mut body = booking_body("u1", "f1", 1, 3);
    body["duration_hours"] = serde_json::json!(0);
    let res = app
        .oneshot(json_request("POST", "/api/bookings", body))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

// ── Lifecycle over the API ──

#[tokio::test]
async fn test_check_in_check_out_flow() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 5, 60.0);
    let booking = create_booking_via_api(&state, "f1", 1, 2).await;
    let id = booking["id"].as_str().unwrap().to_string();

    let app = test_app(state.clone());
    let res = app
        .oneshot(empty_request(
            "POST",
            &format!("/api/bookings/{id}/check-in"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let active = body_json(res).await;
    assert_eq!(active["status"], "active");
    assert!(active["check_in_time"].is_string());

    let app = test_app(state.clone());
    let res = app
        .oneshot(empty_request(
            "POST",
            &format!("/api/bookings/{id}/check-out"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let completed = body_json(res).await;
    assert_eq!(completed["status"], "completed");
    assert!(completed["check_out_time"].is_string());

    // Slot released
    assert_eq!(available_slots(&state, "f1").await, 5);
}

#[tokio::test]
async fn test_check_out_pending_is_invalid_transition() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 5, 60.0);
    let booking = create_booking_via_api(&state, "f1", 1, 2).await;
    let id = booking["id"].as_str().unwrap().to_string();

    let app = test_app(state.clone());
    let res = app
        .oneshot(empty_request(
            "POST",
            &format!("/api/bookings/{id}/check-out"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Status unchanged
    let app = test_app(state);
    let res = app
        .oneshot(empty_request("GET", &format!("/api/bookings/{id}")))
        .await
        .unwrap();
    let fetched = body_json(res).await;
    assert_eq!(fetched["status"], "pending");
}

#[tokio::test]
async fn test_double_check_in_conflicts() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 5, 60.0);
    let booking = create_booking_via_api(&state, "f1", 1, 2).await;
    let id = booking["id"].as_str().unwrap().to_string();

    let app = test_app(state.clone());
    let res = app
        .oneshot(empty_request(
            "POST",
            &format!("/api/bookings/{id}/check-in"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let app = test_app(state);
    let res = app
        .oneshot(empty_request(
            "POST",
            &format!("/api/bookings/{id}/check-in"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_releases_slot_and_allows_rebooking() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 5, 60.0);

    let booking = create_booking_via_api(&state, "f1", 2, 3).await;
    let id = booking["id"].as_str().unwrap().to_string();
    assert_eq!(available_slots(&state, "f1").await, 4);

    let app = test_app(state.clone());
    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/api/bookings/{id}/cancel"),
            serde_json::json!({ "reason": "change of plans" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cancelled = body_json(res).await;
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["cancellation_reason"], "change of plans");

    assert_eq!(available_slots(&state, "f1").await, 5);

    // Slot 2 can be booked again
    create_booking_via_api(&state, "f1", 2, 1).await;
}

#[tokio::test]
async fn test_cancel_paid_booking_notifies_gateway() {
    let (state, refunds) = test_state();
    seed_facility(&state, "f1", 5, 60.0);
    let booking = create_booking_via_api(&state, "f1", 1, 3).await;
    let id = booking["id"].as_str().unwrap().to_string();

    let app = test_app(state.clone());
    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/api/bookings/{id}/payment"),
            serde_json::json!({ "payment_id": "pay-42" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["payment_status"], "paid");

    let app = test_app(state);
    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/api/bookings/{id}/cancel"),
            serde_json::json!({ "reason": "no longer needed" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cancelled = body_json(res).await;
    assert_eq!(cancelled["payment_status"], "refund_owed");
    assert_eq!(cancelled["refund_amount"], 180.0);

    let recorded = refunds.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0], (id, 180.0));
}

#[tokio::test]
async fn test_cancel_unpaid_booking_skips_gateway() {
    let (state, refunds) = test_state();
    seed_facility(&state, "f1", 5, 60.0);
    let booking = create_booking_via_api(&state, "f1", 1, 3).await;
    let id = booking["id"].as_str().unwrap().to_string();

    let app = test_app(state);
    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/api/bookings/{id}/cancel"),
            serde_json::json!({ "reason": "never paid" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    assert!(refunds.lock().unwrap().is_empty());
}

// ── Query surface ──

#[tokio::test]
async fn test_user_booking_history() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 5, 60.0);
    create_booking_via_api(&state, "f1", 1, 2).await;
    create_booking_via_api(&state, "f1", 2, 2).await;

    let app = test_app(state.clone());
    let res = app
        .oneshot(empty_request("GET", "/api/bookings/user/u1"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bookings = body_json(res).await;
    assert_eq!(bookings.as_array().unwrap().len(), 2);

    let app = test_app(state);
    let res = app
        .oneshot(empty_request("GET", "/api/bookings/user/u1?limit=1"))
        .await
        .unwrap();
    let bookings = body_json(res).await;
    assert_eq!(bookings.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_occupied_slots_snapshot() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 5, 60.0);
    let booking = create_booking_via_api(&state, "f1", 3, 2).await;

    let app = test_app(state);
    let res = app
        .oneshot(empty_request("GET", "/api/facilities/f1/slots"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let slots = body_json(res).await;
    let slots = slots.as_array().unwrap();
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0]["slot_number"], 3);
    assert_eq!(slots[0]["booking_id"], booking["id"]);
}

#[tokio::test]
async fn test_db_user_directory_reads_users_table() {
    let conn = db::init_db(":memory:").unwrap();
    queries::insert_user(&conn, "u9", "Priya", Some("priya@example.com"), None).unwrap();
    // Upsert keeps the id stable
    queries::insert_user(&conn, "u9", "Priya S", None, Some("555-0101")).unwrap();

    let directory = DbUserDirectory::new(Arc::new(Mutex::new(conn)));
    assert!(directory.exists("u9").await.unwrap());
    assert!(!directory.exists("ghost").await.unwrap());
}

#[tokio::test]
async fn test_booking_not_found() {
    let (state, _) = test_state();
    let app = test_app(state);

    let res = app
        .oneshot(empty_request("GET", "/api/bookings/missing"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

// ── Facility deletion guard ──

#[tokio::test]
async fn test_delete_facility_refused_with_live_bookings() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 5, 60.0);
    let booking = create_booking_via_api(&state, "f1", 1, 2).await;
    let id = booking["id"].as_str().unwrap().to_string();

    let app = test_app(state.clone());
    let res = app
        .oneshot(empty_request("DELETE", "/api/facilities/f1"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // After cancelling the booking the facility can go
    let app = test_app(state.clone());
    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/api/bookings/{id}/cancel"),
            serde_json::json!({ "reason": "closing down" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let app = test_app(state.clone());
    let res = app
        .oneshot(empty_request("DELETE", "/api/facilities/f1"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let app = test_app(state.clone());
    let res = app
        .oneshot(empty_request("GET", "/api/facilities/f1"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // Booking history outlives the facility
    let app = test_app(state);
    let res = app
        .oneshot(empty_request("GET", &format!("/api/bookings/{id}")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "cancelled");
}

// ── Races ──

#[tokio::test]
async fn test_concurrent_create_booking_one_winner() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 1, 60.0);

    let mut handles = vec![];
    for _ in 0..2 {
        let state = state.clone();
        handles.push(std::thread::spawn(move || {
            let mut db = state.db.lock().unwrap();
            lifecycle::create_booking(&mut db, make_new_booking("f1", 1)).is_ok()
        }));
    }

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(successes, 1);

    assert_eq!(available_slots(&state, "f1").await, 0);
}

#[tokio::test]
async fn test_concurrent_reserve_exactly_one_winner() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 5, 60.0);

    let mut handles = vec![];
    for i in 0..8 {
        let state = state.clone();
        handles.push(std::thread::spawn(move || {
            let db = state.db.lock().unwrap();
            reservation::reserve(&db, "f1", 3, &format!("b{i}")).is_ok()
        }));
    }

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(successes, 1);

    let db = state.db.lock().unwrap();
    assert_eq!(queries::count_occupied_slots(&db, "f1").unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_check_ins_one_winner() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 5, 60.0);

    let booking = {
        let mut db = state.db.lock().unwrap();
        lifecycle::create_booking(&mut db, make_new_booking("f1", 1)).unwrap()
    };

    let mut handles = vec![];
    for _ in 0..4 {
        let state = state.clone();
        let id = booking.id.clone();
        handles.push(std::thread::spawn(move || {
            let mut db = state.db.lock().unwrap();
            lifecycle::check_in(&mut db, &id).is_ok()
        }));
    }

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn test_concurrent_cancels_one_winner() {
    let (state, _) = test_state();
    seed_facility(&state, "f1", 5, 60.0);

    let booking = {
        let mut db = state.db.lock().unwrap();
        let b = lifecycle::create_booking(&mut db, make_new_booking("f1", 1)).unwrap();
        lifecycle::check_in(&mut db, &b.id).unwrap();
        b
    };

    let mut handles = vec![];
    for i in 0..3 {
        let state = state.clone();
        let id = booking.id.clone();
        handles.push(std::thread::spawn(move || {
            let mut db = state.db.lock().unwrap();
            lifecycle::cancel(&mut db, &id, &format!("racer {i}")).is_ok()
        }));
    }

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(successes, 1);

    // Slot was released exactly once
    assert_eq!(available_slots(&state, "f1").await, 5);
}

#[tokio::test]
async fn test_concurrent_mixed_transitions_serialize() {
    // check_in, check_out and cancel racing on one pending booking.
    // Transitions serialize on the status column, so the legal
    // outcomes are: cancel runs first (one success), or check_in runs
    // first and exactly one of check_out/cancel follows it (two
    // successes). Either way the booking ends terminal and the slot
    // is released exactly once.
    let (state, _) = test_state();
    seed_facility(&state, "f1", 5, 60.0);

    let booking = {
        let mut db = state.db.lock().unwrap();
        lifecycle::create_booking(&mut db, make_new_booking("f1", 1)).unwrap()
    };

    let check_in = {
        let state = state.clone();
        let id = booking.id.clone();
        std::thread::spawn(move || {
            let mut db = state.db.lock().unwrap();
            lifecycle::check_in(&mut db, &id).is_ok()
        })
    };
    let check_out = {
        let state = state.clone();
        let id = booking.id.clone();
        std::thread::spawn(move || {
            let mut db = state.db.lock().unwrap();
            lifecycle::check_out(&mut db, &id).is_ok()
        })
    };
    let cancel = {
        let state = state.clone();
        let id = booking.id.clone();
        std::thread::spawn(move || {
            let mut db = state.db.lock().unwrap();
            lifecycle::cancel(&mut db, &id, "racer").is_ok()
        })
    };

    let check_in_ok = check_in.join().unwrap();
    let check_out_ok = check_out.join().unwrap();
    let cancel_ok = cancel.join().unwrap();

    if check_in_ok {
        // Exactly one of the terminal transitions follows the check-in
        assert!(check_out_ok != cancel_ok);
    } else {
        assert!(cancel_ok);
        assert!(!check_out_ok);
    }

    let final_status = {
        let db = state.db.lock().unwrap();
        queries::get_booking(&db, &booking.id).unwrap().unwrap().status
    };
    assert!(final_status.is_terminal());
    assert_eq!(available_slots(&state, "f1").await, 5);
}
