use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;

use crate::db::queries;

/// External collaborator answering "does this user exist?". Account
/// management itself lives outside the booking core.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, user_id: &str) -> anyhow::Result<bool>;
}

pub struct DbUserDirectory {
    db: Arc<Mutex<Connection>>,
}

impl DbUserDirectory {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for DbUserDirectory {
    async fn exists(&self, user_id: &str) -> anyhow::Result<bool> {
        let conn = self.db.lock().unwrap();
        queries::user_exists(&conn, user_id)
    }
}
