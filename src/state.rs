use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::payments::PaymentGateway;
use crate::services::users::UserDirectory;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub users: Box<dyn UserDirectory>,
    pub payments: Box<dyn PaymentGateway>,
}
