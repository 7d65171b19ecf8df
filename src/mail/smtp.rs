//! Minimal SMTP submission client
//!
//! Speaks just enough SMTP to hand one message to a relay: greeting,
//! `EHLO`, optional `AUTH PLAIN`, `MAIL FROM`, `RCPT TO`, `DATA` and
//! `QUIT`. The connection is plain TCP, so credentials are only ever sent
//! to a loopback host that advertises `AUTH PLAIN`. Remote submission
//! servers that require STARTTLS should be reached through a local MTA or
//! the sendmail backend.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{Envelope, MailError, Mailer, Result};

/// Username and password for `AUTH PLAIN`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// SMTP relay backend
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    host: String,
    port: u16,
    helo: String,
    credentials: Option<Credentials>,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(host: &str, port: u16, helo: &str, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            port,
            helo: helo.to_string(),
            credentials: None,
            timeout,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port).to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(MailError::Transport(format!("{} did not resolve", self.host)));
        }
        Ok(addrs)
    }

    fn connect(&self, addrs: &[SocketAddr]) -> Result<TcpStream> {
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(addr, self.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout))?;
                    stream.set_write_timeout(Some(self.timeout))?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(match last_err {
            Some(e) => MailError::Io(e),
            None => MailError::Transport(format!("{} did not resolve", self.host)),
        })
    }
}

impl Mailer for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    fn send(&self, envelope: &Envelope) -> Result<()> {
        let addrs = self.resolve()?;
        if self.credentials.is_some() && !addrs.iter().all(|a| a.ip().is_loopback()) {
            return Err(MailError::Insecure(format!(
                "{} is not a loopback host and the connection is unencrypted",
                self.host
            )));
        }

        let stream = self.connect(&addrs)?;
        let mut session = Session::new(stream)?;

        session.expect(220)?;
        let ehlo = session.command(&format!("EHLO {}", self.helo), &[250])?;
        let caps = Capabilities::parse(&ehlo);

        if let Some(ref creds) = self.credentials {
            if !caps.auth_plain {
                let _ = session.command("QUIT", &[221]);
                let reason = if caps.starttls {
                    "server requires STARTTLS before AUTH"
                } else {
                    "server does not offer AUTH PLAIN"
                };
                return Err(MailError::Insecure(format!("{} ({})", reason, self.host)));
            }
            let token = base64_encode(&format!("\0{}\0{}", creds.username, creds.password));
            session.command(&format!("AUTH PLAIN {}", token), &[235])?;
        }

        let mut mail_from = format!("MAIL FROM:<{}>", envelope.from);
        if envelope.is_8bit() {
            if caps.eight_bit_mime {
                mail_from.push_str(" BODY=8BITMIME");
            } else {
                warn!(host = %self.host, "SMTP server does not advertise 8BITMIME");
            }
        }
        session.command(&mail_from, &[250])?;
        session.command(&format!("RCPT TO:<{}>", envelope.to), &[250, 251])?;
        session.command("DATA", &[354])?;
        session.data(&envelope.to_rfc5322())?;
        // the message is accepted at this point; a failed QUIT changes nothing
        let _ = session.command("QUIT", &[221]);

        info!(host = %self.host, port = self.port, to = %envelope.to, "SMTP relay accepted message");
        Ok(())
    }
}

/// Extensions advertised in the `EHLO` reply
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Capabilities {
    auth_plain: bool,
    starttls: bool,
    eight_bit_mime: bool,
}

impl Capabilities {
    /// The first reply line is the greeting; each later line names one
    /// extension followed by its parameters.
    fn parse(lines: &[String]) -> Self {
        let mut caps = Self::default();
        for line in lines.iter().skip(1) {
            let mut words = line.split_whitespace().map(|w| w.to_ascii_uppercase());
            match words.next().as_deref() {
                Some("AUTH") => caps.auth_plain = words.any(|m| m == "PLAIN"),
                Some("STARTTLS") => caps.starttls = true,
                Some("8BITMIME") => caps.eight_bit_mime = true,
                _ => {}
            }
        }
        caps
    }
}

/// One SMTP conversation
struct Session {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Session {
    fn new(stream: TcpStream) -> Result<Self> {
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Read a possibly multi-line reply and return its code and lines.
    fn read_reply(&mut self) -> Result<(u16, Vec<String>)> {
        let mut text = Vec::new();
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(MailError::Transport("connection closed by SMTP server".to_string()));
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.len() < 3 {
                return Err(MailError::Transport(format!("malformed SMTP reply: {:?}", line)));
            }
            let code: u16 = line
                .get(..3)
                .and_then(|c| c.parse().ok())
                .ok_or_else(|| MailError::Transport(format!("malformed SMTP reply: {:?}", line)))?;
            text.push(line.get(4..).unwrap_or("").to_string());
            // "250-" continues, "250 " ends
            if line.as_bytes().get(3) != Some(&b'-') {
                return Ok((code, text));
            }
        }
    }

    fn expect(&mut self, code: u16) -> Result<()> {
        self.expect_any(&[code]).map(|_| ())
    }

    fn expect_any(&mut self, codes: &[u16]) -> Result<Vec<String>> {
        let (code, lines) = self.read_reply()?;
        if codes.contains(&code) {
            Ok(lines)
        } else {
            Err(MailError::Smtp {
                code,
                text: lines.join(" "),
            })
        }
    }

    fn command(&mut self, line: &str, codes: &[u16]) -> Result<Vec<String>> {
        if line.starts_with("AUTH") {
            debug!("C: AUTH PLAIN ****");
        } else {
            debug!("C: {}", line);
        }
        write!(self.writer, "{}\r\n", line)?;
        self.writer.flush()?;
        self.expect_any(codes)
    }

    /// Send the message body with dot-stuffing and the terminating dot.
    fn data(&mut self, text: &str) -> Result<()> {
        let text = text.strip_suffix("\r\n").unwrap_or(text);
        for line in text.split("\r\n") {
            if line.starts_with('.') {
                self.writer.write_all(b".")?;
            }
            self.writer.write_all(line.as_bytes())?;
            self.writer.write_all(b"\r\n")?;
        }
        self.writer.write_all(b".\r\n")?;
        self.writer.flush()?;
        self.expect(250)
    }
}

/// Standard base64 with padding
fn base64_encode(input: &str) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    let bytes = input.as_bytes();
    let mut result = String::with_capacity((bytes.len() + 2) / 3 * 4);

    for chunk in bytes.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).map(|&b| b as u32).unwrap_or(0);
        let b2 = chunk.get(2).map(|&b| b as u32).unwrap_or(0);
        let n = (b0 << 16) | (b1 << 8) | b2;

        result.push(ALPHABET[(n >> 18) as usize & 0x3F] as char);
        result.push(ALPHABET[(n >> 12) as usize & 0x3F] as char);
        result.push(if chunk.len() > 1 {
            ALPHABET[(n >> 6) as usize & 0x3F] as char
        } else {
            '='
        });
        result.push(if chunk.len() > 2 {
            ALPHABET[n as usize & 0x3F] as char
        } else {
            '='
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    const EHLO_FULL: &str = "250-fake.smtp greets you\r\n250-AUTH LOGIN PLAIN\r\n250 8BITMIME\r\n";

    /// Fake SMTP server answering `EHLO` with `ehlo_reply` and `RCPT TO`
    /// with `rcpt_reply`. Every line the client sends is reported on the
    /// channel.
    fn fake_server(
        ehlo_reply: &'static str,
        rcpt_reply: &'static str,
    ) -> (u16, mpsc::Receiver<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;
            let mut seen = Vec::new();
            let mut in_data = false;

            writer.write_all(b"220 fake.smtp ESMTP ready\r\n").unwrap();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    break;
                }
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                seen.push(line.clone());

                if in_data {
                    if line == "." {
                        in_data = false;
                        writer.write_all(b"250 2.0.0 queued\r\n").unwrap();
                    }
                    continue;
                }

                let reply: &[u8] = if line.starts_with("EHLO") {
                    ehlo_reply.as_bytes()
                } else if line.starts_with("AUTH PLAIN") {
                    b"235 2.7.0 authenticated\r\n"
                } else if line.starts_with("MAIL FROM") {
                    b"250 ok\r\n"
                } else if line.starts_with("RCPT TO") {
                    rcpt_reply.as_bytes()
                } else if line == "DATA" {
                    in_data = true;
                    b"354 go ahead\r\n"
                } else if line == "QUIT" {
                    writer.write_all(b"221 bye\r\n").unwrap();
                    break;
                } else {
                    b"500 unrecognized\r\n"
                };
                writer.write_all(reply).unwrap();
            }
            let _ = tx.send(seen);
        });

        (port, rx)
    }

    fn credentials(password: &str) -> Credentials {
        Credentials {
            username: "user".to_string(),
            password: password.to_string(),
        }
    }

    fn envelope(body: &str) -> Envelope {
        Envelope {
            from: "dashboard@repairlift.com".to_string(),
            to: "alex@repairlift.com".to_string(),
            reply_to: Some("noreply@repairlift.com".to_string()),
            subject: "Message from Dashboard: hello".to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_full_dialogue_with_auth() {
        let (port, rx) = fake_server(EHLO_FULL, "250 ok\r\n");
        let mailer = SmtpMailer::new("127.0.0.1", port, "liftterm.test", Duration::from_secs(5))
            .with_credentials(Some(credentials("pass")));

        mailer.send(&envelope("hi\n.hidden dot\nbye")).unwrap();
        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(seen[0], "EHLO liftterm.test");
        assert_eq!(seen[1], format!("AUTH PLAIN {}", base64_encode("\0user\0pass")));
        assert_eq!(seen[2], "MAIL FROM:<dashboard@repairlift.com>");
        assert_eq!(seen[3], "RCPT TO:<alex@repairlift.com>");
        assert_eq!(seen[4], "DATA");
        assert!(seen.contains(&"Subject: Message from Dashboard: hello".to_string()));
        assert!(seen.contains(&"..hidden dot".to_string()));
        assert_eq!(seen.last().unwrap(), "QUIT");
    }

    #[test]
    fn test_rejected_recipient() {
        let (port, _rx) = fake_server(EHLO_FULL, "550 5.1.1 no such user\r\n");
        let mailer = SmtpMailer::new("127.0.0.1", port, "liftterm.test", Duration::from_secs(5));

        match mailer.send(&envelope("hi")) {
            Err(MailError::Smtp { code, text }) => {
                assert_eq!(code, 550);
                assert_eq!(text, "5.1.1 no such user");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_credentials_never_sent_to_remote_host() {
        let mailer = SmtpMailer::new("192.0.2.10", 587, "liftterm.test", Duration::from_secs(5))
            .with_credentials(Some(credentials("hunter2")));

        match mailer.send(&envelope("hi")) {
            Err(MailError::Insecure(reason)) => assert!(reason.contains("192.0.2.10")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_no_auth_when_server_wants_starttls() {
        let (port, rx) = fake_server("250-fake.smtp greets you\r\n250 STARTTLS\r\n", "250 ok\r\n");
        let mailer = SmtpMailer::new("127.0.0.1", port, "liftterm.test", Duration::from_secs(5))
            .with_credentials(Some(credentials("hunter2")));

        match mailer.send(&envelope("hi")) {
            Err(MailError::Insecure(reason)) => assert!(reason.contains("STARTTLS")),
            other => panic!("unexpected result: {:?}", other),
        }
        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(seen, vec!["EHLO liftterm.test".to_string(), "QUIT".to_string()]);
        assert!(seen.iter().all(|l| !l.contains("hunter2") && !l.starts_with("AUTH")));
    }

    #[test]
    fn test_8bit_body_requests_8bitmime() {
        let (port, rx) = fake_server(EHLO_FULL, "250 ok\r\n");
        let mailer = SmtpMailer::new("127.0.0.1", port, "liftterm.test", Duration::from_secs(5));

        mailer.send(&envelope("Aufzug klemmt, grüße")).unwrap();
        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(seen[1], "MAIL FROM:<dashboard@repairlift.com> BODY=8BITMIME");
        assert!(seen.contains(&"Content-Transfer-Encoding: 8bit".to_string()));
    }

    #[test]
    fn test_capabilities_parse() {
        let lines: Vec<String> = ["fake.smtp greets you", "auth login plain", "8BITMIME", "STARTTLS"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            Capabilities::parse(&lines),
            Capabilities {
                auth_plain: true,
                starttls: true,
                eight_bit_mime: true,
            }
        );

        // the greeting line never counts as an extension
        let lines = vec!["AUTH PLAIN".to_string(), "AUTH LOGIN".to_string()];
        assert_eq!(Capabilities::parse(&lines), Capabilities::default());
    }

    #[test]
    fn test_base64_encode() {
        assert_eq!(base64_encode(""), "");
        assert_eq!(base64_encode("f"), "Zg==");
        assert_eq!(base64_encode("fo"), "Zm8=");
        assert_eq!(base64_encode("foo"), "Zm9v");
        assert_eq!(base64_encode("\0user\0pass"), "AHVzZXIAcGFzcw==");
    }
}
