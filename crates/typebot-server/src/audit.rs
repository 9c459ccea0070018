use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use typebot_contracts::{LogRecord, LogStatus};

use crate::store::StoreBackend;

#[derive(Clone)]
pub(crate) struct AuditLog {
    store: Arc<Mutex<StoreBackend>>,
}

impl AuditLog {
    pub(crate) fn new(store: Arc<Mutex<StoreBackend>>) -> Self {
        Self { store }
    }

    pub(crate) async fn record(
        &self,
        result_id: Option<&str>,
        status: LogStatus,
        description: &str,
        details: Value,
    ) {
        let Some(result_id) = result_id else {
            return;
        };
        let record = LogRecord {
            id: format!("log_{}", uuid::Uuid::new_v4().as_simple()),
            result_id: result_id.to_string(),
            status,
            description: description.to_string(),
            details,
            created_at: Utc::now().to_rfc3339(),
        };
        let mut store = self.store.lock().await;
        if let Err(e) = store.append_log(&record) {
            tracing::error!(result_id, error = %e, "failed to persist webhook log");
        }
    }
}
