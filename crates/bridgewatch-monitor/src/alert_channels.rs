//! Webhook alert delivery.

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::alerts::{Alert, AlertLevel, AlertListener};
use crate::error::{MonitorError, Result};

/// Payload shape posted to the webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookFormat {
    /// The alert serialized as-is.
    Json,
    /// Slack incoming-webhook attachment.
    Slack,
}

/// Posts alerts at or above a minimum level to an HTTP endpoint.
///
/// Delivery runs on the tokio runtime so the publishing thread never waits
/// on the network.
#[derive(Clone)]
pub struct WebhookListener {
    url: String,
    min_level: AlertLevel,
    format: WebhookFormat,
    client: reqwest::Client,
}

impl WebhookListener {
    /// Create a JSON webhook listener.
    pub fn new(url: impl Into<String>, min_level: AlertLevel) -> Self {
        Self {
            url: url.into(),
            min_level,
            format: WebhookFormat::Json,
            client: reqwest::Client::new(),
        }
    }

    /// Switch the payload format.
    pub fn with_format(mut self, format: WebhookFormat) -> Self {
        self.format = format;
        self
    }

    pub fn min_level(&self) -> AlertLevel {
        self.min_level
    }

    fn payload(&self, alert: &Alert) -> serde_json::Value {
        match self.format {
            WebhookFormat::Json => serde_json::to_value(alert).unwrap_or_default(),
            WebhookFormat::Slack => serde_json::json!({
                "attachments": [{
                    "color": alert.level.color(),
                    "title": format!("{} {}", alert.level.emoji(), alert.level),
                    "text": alert.message,
                    "footer": "bridgewatch",
                    "ts": alert.timestamp.timestamp(),
                    "fields": context_fields(alert),
                }]
            }),
        }
    }

    /// Post one alert and wait for the response.
    pub async fn send(&self, alert: &Alert) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.payload(alert))
            .send()
            .await
            .map_err(|e| MonitorError::AlertDelivery(format!("Webhook request failed: {}", e)))?;

        if response.status().is_success() {
            debug!("Webhook alert sent successfully");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(MonitorError::AlertDelivery(format!(
                "Webhook returned {}: {}",
                status, body
            )))
        }
    }
}

fn context_fields(alert: &Alert) -> Vec<serde_json::Value> {
    let mut fields = Vec::new();
    if let Some(chain_id) = alert.context.chain_id {
        fields.push(serde_json::json!({ "title": "chain", "value": chain_id.to_string(), "short": true }));
    }
    if let Some(tx_id) = alert.context.tx_id {
        fields.push(serde_json::json!({ "title": "transaction", "value": tx_id.to_string(), "short": false }));
    }
    fields
}

impl AlertListener for WebhookListener {
    fn name(&self) -> &str {
        "webhook"
    }

    fn on_alert(&self, alert: &Alert) -> Result<()> {
        if alert.level < self.min_level {
            return Ok(());
        }

        let handle = Handle::try_current().map_err(|_| {
            MonitorError::AlertDelivery("no tokio runtime available for webhook delivery".to_string())
        })?;

        let listener = self.clone();
        let alert = alert.clone();
        handle.spawn(async move {
            if let Err(e) = listener.send(&alert).await {
                warn!("{}", e);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxId;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

    #[test]
    fn test_webhook_listener_new() {
        let listener = WebhookListener::new("https://hooks.example.com/x", AlertLevel::Warning);
        assert_eq!(listener.name(), "webhook");
        assert_eq!(listener.min_level(), AlertLevel::Warning);
    }

    #[test]
    fn test_slack_payload_fields() {
        let listener = WebhookListener::new("https://hooks.slack.com/test", AlertLevel::Info)
            .with_format(WebhookFormat::Slack);
        let tx = TxId::from_label("slow_tx");
        let payload = listener.payload(&Alert::warning("High latency").with_chain(1).with_tx(tx));

        let attachment = &payload["attachments"][0];
        assert_eq!(attachment["color"], "#f0ad4e");
        assert_eq!(attachment["text"], "High latency");
        assert_eq!(attachment["fields"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_below_min_level_is_skipped_without_runtime() {
        let listener = WebhookListener::new("http://127.0.0.1:1/hook", AlertLevel::Critical);
        assert!(listener.on_alert(&Alert::info("ignored")).is_ok());
        // Above the threshold and no runtime: reported, not panicking.
        assert!(listener.on_alert(&Alert::critical("boom")).is_err());
    }

    #[tokio::test]
    async fn test_send_posts_alert_json() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/hook"))
            .and(matchers::body_partial_json(serde_json::json!({
                "level": "CRITICAL",
                "message": "Chain unresponsive"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let listener = WebhookListener::new(format!("{}/hook", server.uri()), AlertLevel::Info);
        listener
            .send(&Alert::critical("Chain unresponsive").with_chain(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_reports_http_error() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let listener = WebhookListener::new(server.uri(), AlertLevel::Info);
        let err = listener.send(&Alert::info("x")).await.unwrap_err();
        assert!(matches!(err, MonitorError::AlertDelivery(ref m) if m.contains("500")));
    }
}
