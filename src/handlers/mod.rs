pub mod health;

use crate::db::Database;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
}
