//! HTTP transport
//!
//! Posts `{subject, message}` to the relay endpoint. The recipient is a
//! server-side constant, so `to` never leaves the process.

use std::time::Duration;

use tracing::debug;

use super::{Delivery, MailError, MailTransport, OutgoingMessage, Result};
use crate::relay::{SubmitRequest, SubmitResponse};

/// Client for the relay's JSON endpoint
pub struct HttpTransport {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            endpoint: endpoint.to_string(),
            agent,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Pull the `message` field out of a relay response body.
fn response_message(body: &str) -> String {
    serde_json::from_str::<SubmitResponse>(body)
        .map(|r| r.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

impl MailTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    fn deliver(&self, message: &OutgoingMessage) -> Result<Delivery> {
        let payload = SubmitRequest {
            subject: Some(message.subject.clone()),
            message: Some(message.body.clone()),
        };
        let body = serde_json::to_string(&payload)
            .map_err(|e| MailError::Invalid(e.to_string()))?;
        debug!(endpoint = %self.endpoint, bytes = body.len(), "Posting message to relay");

        match self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .send_string(&body)
        {
            Ok(response) => {
                let text = response.into_string()?;
                Ok(Delivery {
                    message: response_message(&text),
                })
            }
            Err(ureq::Error::Status(status, response)) => {
                let text = response.into_string().unwrap_or_default();
                Err(MailError::Rejected {
                    status,
                    message: response_message(&text),
                })
            }
            Err(ureq::Error::Transport(e)) => Err(MailError::Transport(e.to_string())),
        }
    }
}
