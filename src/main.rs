use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use parkside::config::AppConfig;
use parkside::db;
use parkside::handlers;
use parkside::services::payments::LogPaymentGateway;
use parkside::services::users::DbUserDirectory;
use parkside::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    let db = Arc::new(Mutex::new(conn));

    let state = Arc::new(AppState {
        db: Arc::clone(&db),
        config: config.clone(),
        users: Box::new(DbUserDirectory::new(db)),
        payments: Box::new(LogPaymentGateway),
    });

    let app = Router::new()
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
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
