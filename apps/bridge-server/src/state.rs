//! Shared application state.

use std::sync::Arc;

use fiscal_db::Database;
use fiscal_sync::EventProcessor;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub processor: EventProcessor,
    /// App secret the commerce platform signs webhooks with.
    pub webhook_secret: Arc<str>,
    /// Bearer token for `/api/*`; `None` rejects every admin request.
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        db: Database,
        processor: EventProcessor,
        webhook_secret: &str,
        admin_token: Option<&str>,
    ) -> Self {
        AppState {
            db,
            processor,
            webhook_secret: Arc::from(webhook_secret),
            admin_token: admin_token.filter(|t| !t.is_empty()).map(Arc::from),
        }
    }
}
