//! Feishu webhook delivery.

use crate::report::{Report, WebhookPayload};
use serde_json::Value;
use stablecoin_core::ReportError;
use stablecoin_feeds::{HttpRequest, RetryingClient};
use tracing::{info, warn};

/// How a report ended up being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Card,
    PlainTextFallback,
}

/// Posts report payloads to a Feishu bot webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: RetryingClient,
    webhook_url: String,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URL carries the bot token
        f.debug_struct("WebhookNotifier")
            .field("webhook_url", &"***")
            .finish()
    }
}

impl WebhookNotifier {
    pub fn new(client: RetryingClient, webhook_url: impl Into<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }

    /// POST one payload and check the application-level response code.
    pub async fn deliver(&self, payload: &WebhookPayload) -> Result<(), ReportError> {
        let body = serde_json::to_value(payload)?;
        let request = HttpRequest::post_json("feishu.webhook", self.webhook_url.as_str(), body);
        let response = self.client.send(&request).await?;

        let data: Value = serde_json::from_str(&response.body).map_err(|_| {
            ReportError::data_unavailable("Feishu webhook returned non-JSON response")
        })?;
        check_webhook_response(&data)
    }

    /// Deliver the card; if that fails for any reason, deliver the plain-text
    /// version once. A fallback failure is returned.
    pub async fn send_report<R: Report + ?Sized>(&self, report: &R) -> Result<Delivery, ReportError> {
        match self.deliver(&report.card()).await {
            Ok(()) => {
                info!("Report card delivered");
                Ok(Delivery::Card)
            }
            Err(e) => {
                warn!(error = %e, "Card delivery failed, retrying as plain text");
                self.deliver(&report.text_payload()).await?;
                info!("Report delivered as plain text");
                Ok(Delivery::PlainTextFallback)
            }
        }
    }
}

/// Accept a webhook response whose `code` (or `StatusCode` when `code` is
/// absent) is 0, "0" or null.
pub fn check_webhook_response(data: &Value) -> Result<(), ReportError> {
    let Some(object) = data.as_object() else {
        return Err(ReportError::data_unavailable(
            "Feishu webhook returned an unexpected response",
        ));
    };

    let code = object.get("code").or_else(|| object.get("StatusCode"));
    let accepted = match code {
        None | Some(Value::Null) => true,
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(Value::String(s)) => s == "0",
        Some(_) => false,
    };
    if accepted {
        return Ok(());
    }

    let message = ["msg", "StatusMessage"]
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Null | Value::String(_) | Value::Bool(false) => None,
            other => Some(other.to_string()),
        })
        .unwrap_or_else(|| "unknown error".to_string());

    Err(ReportError::data_unavailable(format!(
        "Feishu webhook rejected request: {}",
        message
    )))
}
