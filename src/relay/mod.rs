//! Mail relay
//!
//! The server-side half of the messaging terminal. A submission is a JSON
//! object `{"subject": ..., "message": ...}`; the relay adds the fixed
//! sender and recipient and hands the result to a [`Mailer`].
//!
//! - **server**: HTTP endpoint on top of `tiny_http`
//! - [`DirectTransport`]: the same handler called in-process, for running
//!   the terminal without a separate relay

pub mod server;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::mail::{self, Delivery, Envelope, MailError, MailTransport, Mailer, OutgoingMessage};

pub use server::RelayServer;

pub const MSG_MISSING_FIELDS: &str = "Unable to send email. Subject and message are required.";
pub const MSG_SENT: &str = "Email sent successfully.";
pub const MSG_FAILED: &str = "Email could not be sent.";

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to bind relay on {0}")]
    Bind(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request body accepted by the relay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitRequest {
    pub subject: Option<String>,
    pub message: Option<String>,
}

/// Response body returned by the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub message: String,
}

/// HTTP status plus JSON response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReply {
    pub status: u16,
    pub body: SubmitResponse,
}

impl RelayReply {
    fn new(status: u16, message: &str) -> Self {
        Self {
            status,
            body: SubmitResponse {
                message: message.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.body)
            .unwrap_or_else(|_| format!("{{\"message\":\"{}\"}}", MSG_FAILED))
    }
}

/// Fixed addressing applied to every submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    pub from: String,
    pub to: String,
    pub reply_to: Option<String>,
    pub subject_prefix: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            from: "dashboard@repairlift.com".to_string(),
            to: "alex@repairlift.com".to_string(),
            reply_to: Some("noreply@repairlift.com".to_string()),
            subject_prefix: "Message from Dashboard: ".to_string(),
        }
    }
}

impl RelaySettings {
    pub fn envelope(&self, subject: &str, body: &str) -> Envelope {
        Envelope {
            from: self.from.clone(),
            to: self.to.clone(),
            reply_to: self.reply_to.clone(),
            subject: format!("{}{}", self.subject_prefix, subject),
            body: body.to_string(),
        }
    }
}

/// Validate a raw request body and deliver it.
///
/// Malformed JSON and blank fields both answer 400; a mailer failure
/// answers 500 without exposing the underlying error.
pub fn handle_submission(settings: &RelaySettings, mailer: &dyn Mailer, body: &[u8]) -> RelayReply {
    let request: SubmitRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => {
            warn!("Rejecting malformed submission: {}", e);
            return RelayReply::new(400, MSG_MISSING_FIELDS);
        }
    };

    let subject = request.subject.as_deref().unwrap_or("");
    let message = request.message.as_deref().unwrap_or("");
    if subject.trim().is_empty() || message.trim().is_empty() {
        warn!("Rejecting submission with missing subject or message");
        return RelayReply::new(400, MSG_MISSING_FIELDS);
    }

    let envelope = settings.envelope(subject, message);
    match mailer.send(&envelope) {
        Ok(()) => {
            info!(mailer = mailer.name(), to = %envelope.to, "Relayed message");
            RelayReply::new(200, MSG_SENT)
        }
        Err(e) => {
            error!(mailer = mailer.name(), "Relay delivery failed: {}", e);
            RelayReply::new(500, MSG_FAILED)
        }
    }
}

/// Transport that runs the relay handler in-process
pub struct DirectTransport {
    settings: RelaySettings,
    mailer: Arc<dyn Mailer>,
}

impl DirectTransport {
    pub fn new(settings: RelaySettings, mailer: Arc<dyn Mailer>) -> Self {
        Self { settings, mailer }
    }
}

impl MailTransport for DirectTransport {
    fn name(&self) -> &str {
        "direct"
    }

    fn deliver(&self, message: &OutgoingMessage) -> mail::Result<Delivery> {
        let request = SubmitRequest {
            subject: Some(message.subject.clone()),
            message: Some(message.body.clone()),
        };
        let body = serde_json::to_vec(&request).map_err(|e| MailError::Invalid(e.to_string()))?;

        let reply = handle_submission(&self.settings, self.mailer.as_ref(), &body);
        if reply.is_success() {
            Ok(Delivery {
                message: reply.body.message,
            })
        } else {
            Err(MailError::Rejected {
                status: reply.status,
                message: reply.body.message,
            })
        }
    }
}
