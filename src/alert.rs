//! Delivery of risk alerts to an outside notifier.
//!
//! The engine only composes alert text. Whether and where it is delivered is
//! decided here, and delivery failures are logged and reported as a status,
//! never returned as errors.

use crate::risk::RiskReport;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Subject line of risk alert notifications.
pub const ALERT_SUBJECT: &str = "Crypto Risk Alert";

/// Outbound mail settings. Credentials are never part of the engine; only
/// the fact that a transport is configured matters here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailSettings {
    pub sender: String,
    pub smtp_server: String,
    pub smtp_port: u16,
}

/// Where alerts go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Recipient address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<MailSettings>,
}

impl AlertConfig {
    /// Destination to notify, when both a recipient and a transport are set.
    pub fn deliverable_to(&self) -> Option<&str> {
        match (&self.destination, &self.mail) {
            (Some(dest), Some(_)) if !dest.trim().is_empty() => Some(dest.as_str()),
            _ => None,
        }
    }
}

/// Failure reported by a notifier.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("destination rejected: {0}")]
    Rejected(String),
}

/// Something that can deliver a message.
pub trait AlertNotifier {
    fn notify(&self, destination: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Notifier that writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl AlertNotifier for LogNotifier {
    fn notify(&self, destination: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        warn!("[{}] to {}: {}", subject, destination, body);
        Ok(())
    }
}

/// What happened to an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum DispatchStatus {
    /// No violations, nothing to send.
    NoAlert,
    /// Violations exist but no destination or transport is configured.
    NotConfigured,
    Sent,
    Failed(String),
}

/// Send the report's alert when there is one and delivery is configured.
pub fn dispatch_alert(
    report: &RiskReport,
    config: &AlertConfig,
    notifier: &dyn AlertNotifier,
) -> DispatchStatus {
    let Some(body) = report.alert.as_deref() else {
        return DispatchStatus::NoAlert;
    };
    let Some(destination) = config.deliverable_to() else {
        info!("Risk alert not delivered: no destination or mail settings");
        return DispatchStatus::NotConfigured;
    };

    match notifier.notify(destination, ALERT_SUBJECT, body) {
        Ok(()) => DispatchStatus::Sent,
        Err(e) => {
            warn!("Failed to send risk alert to {}: {}", destination, e);
            DispatchStatus::Failed(e.to_string())
        }
    }
}
