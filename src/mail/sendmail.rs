//! Local sendmail backend
//!
//! Pipes the message to `sendmail -t -i`, the same mechanism PHP's
//! `mail()` relies on.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::info;

use super::{Envelope, MailError, Mailer, Result};

pub struct SendmailMailer {
    program: PathBuf,
}

impl SendmailMailer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Mailer for SendmailMailer {
    fn name(&self) -> &str {
        "sendmail"
    }

    fn send(&self, envelope: &Envelope) -> Result<()> {
        let mut child = Command::new(&self.program)
            .arg("-t")
            .arg("-i")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(envelope.to_rfc5322().as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(MailError::Mailer(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr
            )));
        }

        info!(program = %self.program.display(), to = %envelope.to, "sendmail accepted message");
        Ok(())
    }
}
