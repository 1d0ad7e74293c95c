//! Notification delivery for alerts

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{Alert, AlertKind, NotificationChannel};

const PAGERDUTY_EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";

/// Result of sending a notification
#[derive(Debug, Clone)]
pub struct NotificationResult {
    /// Channel type
    pub channel_type: String,
    /// Whether delivery succeeded
    pub success: bool,
    /// Error message if delivery failed
    pub error: Option<String>,
    /// When the attempt was made
    pub sent_at: DateTime<Utc>,
}

/// Sends alert batches to the configured channels
pub struct NotificationSender {
    client: Client,
    channels: Vec<NotificationChannel>,
}

impl NotificationSender {
    /// Create a new notification sender
    pub fn new(channels: Vec<NotificationChannel>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Notification(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, channels })
    }

    /// Configured channels
    pub fn channels(&self) -> &[NotificationChannel] {
        &self.channels
    }

    /// Deliver `alerts` and a one-line `summary` to every channel, in order
    pub async fn send_all(&self, alerts: &[Alert], summary: &str) -> Vec<NotificationResult> {
        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            results.push(self.send(channel, alerts, summary).await);
        }

        results
    }

    /// Send to a single channel
    pub async fn send(
        &self,
        channel: &NotificationChannel,
        alerts: &[Alert],
        summary: &str,
    ) -> NotificationResult {
        let sent_at = Utc::now();

        let result = match channel {
            NotificationChannel::Slack {
                webhook_url,
                channel: slack_channel,
            } => {
                self.send_slack(webhook_url, slack_channel.as_deref(), alerts, summary, sent_at)
                    .await
            }
            NotificationChannel::Webhook { url, headers } => {
                self.send_webhook(url, headers.as_ref(), alerts, summary, sent_at)
                    .await
            }
            NotificationChannel::PagerDuty {
                routing_key,
                events_url,
            } => {
                let url = events_url.as_deref().unwrap_or(PAGERDUTY_EVENTS_URL);
                self.send_pagerduty(url, routing_key, alerts, summary, sent_at)
                    .await
            }
        };

        if let Err(e) = &result {
            warn!(channel = channel.channel_type(), error = %e, "Notification failed");
        }

        NotificationResult {
            channel_type: channel.channel_type().to_string(),
            success: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
            sent_at,
        }
    }

    /// Send Slack notification
    async fn send_slack(
        &self,
        webhook_url: &str,
        channel: Option<&str>,
        alerts: &[Alert],
        summary: &str,
        sent_at: DateTime<Utc>,
    ) -> std::result::Result<(), NotificationError> {
        let payload = SlackPayload {
            channel: channel.map(String::from),
            username: Some("Tracemeter".to_string()),
            text: summary.to_string(),
            attachments: alerts
                .iter()
                .map(|alert| SlackAttachment {
                    color: slack_color(alert.kind).to_string(),
                    title: format!("Alert: {}", alert.kind),
                    text: alert.message.clone(),
                    fields: vec![
                        SlackField {
                            title: "Observed".to_string(),
                            value: format!("{:.4}", alert.observed),
                            short: true,
                        },
                        SlackField {
                            title: "Threshold".to_string(),
                            value: format!("{:.4}", alert.threshold),
                            short: true,
                        },
                    ],
                    footer: Some("Tracemeter Alerting".to_string()),
                    ts: Some(sent_at.timestamp()),
                })
                .collect(),
        };

        self.post("Slack", webhook_url, &payload, None).await?;

        info!(alerts = alerts.len(), "Slack notification sent");
        Ok(())
    }

    /// Send generic webhook notification
    async fn send_webhook(
        &self,
        url: &str,
        headers: Option<&serde_json::Value>,
        alerts: &[Alert],
        summary: &str,
        sent_at: DateTime<Utc>,
    ) -> std::result::Result<(), NotificationError> {
        let payload = WebhookPayload {
            summary,
            alerts,
            sent_at,
        };

        self.post("Webhook", url, &payload, headers).await?;

        info!(url = %url, alerts = alerts.len(), "Webhook notification sent");
        Ok(())
    }

    /// Send PagerDuty notification
    async fn send_pagerduty(
        &self,
        url: &str,
        routing_key: &str,
        alerts: &[Alert],
        summary: &str,
        sent_at: DateTime<Utc>,
    ) -> std::result::Result<(), NotificationError> {
        let kinds: Vec<String> = alerts.iter().map(|a| a.kind.to_string()).collect();

        let payload = PagerDutyPayload {
            routing_key: routing_key.to_string(),
            event_action: "trigger".to_string(),
            dedup_key: Some(format!("tracemeter:{}", kinds.join(","))),
            payload: PagerDutyEventPayload {
                summary: summary.to_string(),
                source: "Tracemeter".to_string(),
                severity: pagerduty_severity(alerts).to_string(),
                timestamp: Some(sent_at.to_rfc3339()),
                custom_details: Some(serde_json::json!({ "alerts": alerts })),
            },
        };

        self.post("PagerDuty", url, &payload, None).await?;

        info!(alerts = alerts.len(), "PagerDuty notification sent");
        Ok(())
    }

    async fn post<P: Serialize + ?Sized>(
        &self,
        target: &str,
        url: &str,
        payload: &P,
        headers: Option<&serde_json::Value>,
    ) -> std::result::Result<(), NotificationError> {
        let mut request = self.client.post(url).json(payload);

        // Add custom headers if provided
        if let Some(headers_map) = headers.and_then(serde_json::Value::as_object) {
            for (key, value) in headers_map {
                if let Some(value_str) = value.as_str() {
                    request = request.header(key, value_str);
                }
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotificationError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::HttpError(format!(
                "{target} returned {status}: {body}"
            )));
        }

        Ok(())
    }
}

fn slack_color(kind: AlertKind) -> &'static str {
    match kind {
        AlertKind::ErrorRate | AlertKind::Latency => "#dc3545",
        AlertKind::Cost => "#ffc107",
        AlertKind::Quality => "#17a2b8",
    }
}

fn pagerduty_severity(alerts: &[Alert]) -> &'static str {
    if alerts
        .iter()
        .any(|a| matches!(a.kind, AlertKind::ErrorRate | AlertKind::Latency))
    {
        "critical"
    } else {
        "warning"
    }
}

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// Request failed or was rejected
    #[error("HTTP error: {0}")]
    HttpError(String),
}

// Slack payload types
#[derive(Debug, Serialize)]
struct SlackPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    text: String,
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    color: String,
    title: String,
    text: String,
    fields: Vec<SlackField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SlackField {
    title: String,
    value: String,
    short: bool,
}

// Generic webhook payload
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    summary: &'a str,
    alerts: &'a [Alert],
    sent_at: DateTime<Utc>,
}

// PagerDuty payload types
#[derive(Debug, Serialize)]
struct PagerDutyPayload {
    routing_key: String,
    event_action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dedup_key: Option<String>,
    payload: PagerDutyEventPayload,
}

#[derive(Debug, Serialize)]
struct PagerDutyEventPayload {
    summary: String,
    source: String,
    severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(kind: AlertKind) -> Alert {
        Alert {
            kind,
            observed: 1.0,
            threshold: 0.5,
            message: "test".to_string(),
        }
    }

    #[test]
    fn test_pagerduty_severity() {
        assert_eq!(pagerduty_severity(&[alert(AlertKind::Cost)]), "warning");
        assert_eq!(
            pagerduty_severity(&[alert(AlertKind::Quality), alert(AlertKind::Latency)]),
            "critical"
        );
    }
}
