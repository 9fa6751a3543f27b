//! Application state shared across all request handlers.

use crate::config::ServiceRole;
use ecom_core::framework::DatabaseProcessor;

/// Cheap to clone; the pool is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseProcessor,
    pub role: ServiceRole,
}

impl AppState {
    pub fn new(pool: sqlx::PgPool, role: ServiceRole) -> Self {
        Self {
            db: DatabaseProcessor { pool },
            role,
        }
    }
}
