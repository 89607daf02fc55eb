//! Outcome notifications.

use serde_json::json;
use tracing::{debug, info};

use casebook_recon::Reconciliation;

use crate::exit_codes::EXIT_NOTIFY;
use crate::CliError;

/// Delivers one human-readable message per run.
pub trait Notifier {
    fn notify(&self, message: &str) -> Result<(), CliError>;
}

/// Writes the message to the log. Used when no webhook is configured.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) -> Result<(), CliError> {
        for line in message.lines() {
            info!("{line}");
        }
        Ok(())
    }
}

/// POSTs `{"text": message}` to a chat webhook.
pub struct WebhookNotifier {
    http: reqwest::blocking::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, CliError> {
        let http = crate::http::client()
            .map_err(|e| notify_error(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, message: &str) -> Result<(), CliError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&json!({ "text": message }))
            .send()
            .map_err(|e| notify_error(format!("webhook request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(notify_error(format!("webhook returned HTTP {}", status.as_u16())));
        }
        debug!(status = status.as_u16(), "webhook delivered");
        Ok(())
    }
}

fn notify_error(message: String) -> CliError {
    CliError {
        code: EXIT_NOTIFY,
        message,
        hint: Some("artifacts were already published; only the notification is missing".into()),
    }
}

/// Outcome line followed by every finding that is still open.
pub fn render(config_name: &str, reconciliation: &Reconciliation) -> String {
    let mut out = format!("[{config_name}] {}", reconciliation.outcome.message());
    for finding in reconciliation.findings.iter().filter(|f| !f.fixed) {
        out.push_str("\n- ");
        out.push_str(&finding.message);
    }
    out
}
