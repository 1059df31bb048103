//! Client table lookups

use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::ClientCode;
use crate::observability::metrics::metrics;
use crate::store::RecordStore;

pub const FIELD_CLIENT_CODE: &str = "Client code";
pub const FIELD_CLIENT_NAME: &str = "Client";

#[derive(Clone)]
pub struct ClientDirectory {
    store: Arc<dyn RecordStore>,
    table: String,
}

impl ClientDirectory {
    pub fn new(store: Arc<dyn RecordStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// Display name for a client code; `None` when missing or unreachable
    pub async fn client_name(&self, code: &ClientCode) -> Option<String> {
        let records = match self
            .store
            .find_by_field(&self.table, FIELD_CLIENT_CODE, code.as_str())
            .await
        {
            Ok(records) => records,
            Err(e) => {
                metrics().store_failure();
                warn!(client_code = %code, error = %e, "Client lookup failed");
                return None;
            }
        };

        let name = records
            .into_iter()
            .next()
            .and_then(|record| record.text(FIELD_CLIENT_NAME))
            .filter(|name| !name.trim().is_empty());
        if name.is_none() {
            debug!(client_code = %code, "Client not found in client table");
        }
        name
    }
}
