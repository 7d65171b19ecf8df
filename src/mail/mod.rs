//! Mail delivery
//!
//! This module contains everything that actually moves a message:
//!
//! - **http**: client transport posting to the relay endpoint
//! - **smtp**: minimal SMTP submission client used by the relay
//! - **sendmail**: local `sendmail` binary backend used by the relay
//!
//! # Layers
//!
//! ```text
//! TerminalController ──MailTransport──▶ HttpTransport ──HTTP──▶ relay
//!                                   └─▶ DirectTransport ─────▶ relay handler
//! relay handler ──Mailer──▶ SmtpMailer | SendmailMailer
//! ```

pub mod http;
pub mod sendmail;
pub mod smtp;

use std::io;

use serde::Serialize;
use thiserror::Error;

pub use http::HttpTransport;
pub use sendmail::SendmailMailer;
pub use smtp::SmtpMailer;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Relay rejected message with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Invalid message: {0}")]
    Invalid(String),

    #[error("SMTP server replied {code}: {text}")]
    Smtp { code: u16, text: String },

    #[error("Refusing to send SMTP credentials: {0}")]
    Insecure(String),

    #[error("Mailer failed: {0}")]
    Mailer(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, MailError>;

/// Message handed to a transport by the terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Acknowledgment returned on successful delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message: String,
}

/// Capability that delivers a composed message.
///
/// `deliver` blocks; the controller only ever calls it from a worker
/// thread and never lets it panic across the channel.
pub trait MailTransport: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    fn deliver(&self, message: &OutgoingMessage) -> Result<Delivery>;
}

/// A fully addressed email, as handed to a relay backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub body: String,
}

impl Envelope {
    /// RFC 5322 message text with CRLF line endings
    pub fn to_rfc5322(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("From: {}\r\n", self.from));
        out.push_str(&format!("To: {}\r\n", self.to));
        if let Some(ref reply_to) = self.reply_to {
            out.push_str(&format!("Reply-To: {}\r\n", reply_to));
        }
        out.push_str(&format!("Subject: {}\r\n", sanitize_header(&self.subject)));
        out.push_str(&format!(
            "X-Mailer: liftterm/{}\r\n",
            env!("CARGO_PKG_VERSION")
        ));
        out.push_str("MIME-Version: 1.0\r\n");
        out.push_str("Content-Type: text/plain; charset=UTF-8\r\n");
        out.push_str(&format!(
            "Content-Transfer-Encoding: {}\r\n",
            if self.is_8bit() { "8bit" } else { "7bit" }
        ));
        out.push_str("\r\n");
        // bare CR and LF both become CRLF
        let body = self.body.replace("\r\n", "\n").replace('\r', "\n");
        for line in body.lines() {
            out.push_str(line);
            out.push_str("\r\n");
        }
        out
    }

    /// Whether any header or body text falls outside US-ASCII
    pub fn is_8bit(&self) -> bool {
        !(self.body.is_ascii() && self.subject.is_ascii())
    }
}

/// Relay backend that hands an envelope to a mail system
pub trait Mailer: Send + Sync {
    fn name(&self) -> &str;

    fn send(&self, envelope: &Envelope) -> Result<()>;
}

/// Header values must not smuggle extra headers.
fn sanitize_header(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
