use std::sync::Arc;

use netfleet_events::LogFanout;

use crate::config::ApiConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`. Cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: netfleet_db::DbPool,
    /// Server configuration.
    pub config: Arc<ApiConfig>,
    /// Log fan-out hub feeding live subscribers.
    pub fanout: Arc<LogFanout>,
}
