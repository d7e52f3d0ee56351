//! Push webhook handler
//!
//! Merges inbound payloads into the vehicle coordinator's snapshot and
//! publishes the result without another round-trip to the backend. The
//! coordinator is handed in at construction; there is no global lookup.

use crate::api::Snapshot;
use crate::coordinator::Coordinator;
use crate::error::{EvlinkError, Result};
use crate::logging::{LogContext, get_logger_with_context};
use crate::merge::merge_two_level;
use serde_json::Value;
use std::sync::Arc;

pub struct WebhookHandler {
    webhook_id: String,
    vehicle: Arc<Coordinator>,
    logger: crate::logging::StructuredLogger,
}

impl WebhookHandler {
    pub fn new(webhook_id: &str, vehicle: Arc<Coordinator>) -> Self {
        Self {
            webhook_id: webhook_id.to_string(),
            vehicle,
            logger: get_logger_with_context(
                LogContext::new("webhook").with_field("webhook_id", webhook_id.to_string()),
            ),
        }
    }

    pub fn webhook_id(&self) -> &str {
        &self.webhook_id
    }

    /// Parse a raw request body and merge it. On error the cached snapshot
    /// is left as it was.
    pub fn handle(&self, body: &[u8]) -> Result<Snapshot> {
        let result = serde_json::from_slice::<Value>(body)
            .map_err(EvlinkError::from)
            .and_then(|payload| self.apply(payload));
        if let Err(e) = &result {
            self.logger
                .error(&format!("Error in push webhook handler: {}", e));
        }
        result
    }

    /// Merge an already parsed payload and publish the merged snapshot
    pub fn apply(&self, payload: Value) -> Result<Snapshot> {
        let Value::Object(data) = payload else {
            return Err(EvlinkError::validation(
                "payload",
                "push payload must be a JSON object",
            ));
        };
        self.logger
            .debug(&format!("Push payload: {}", Value::Object(data.clone())));

        Ok(self.vehicle.publish_with(|old| merge_two_level(old, &data)))
    }
}
