//! HTTP front end for the relay

use std::io::Read;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, info, warn};

use super::{handle_submission, RelayError, RelayReply, RelaySettings, MSG_MISSING_FIELDS};
use crate::mail::Mailer;

/// Largest request body the relay will read
pub const MAX_BODY_BYTES: u64 = 64 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

const CORS_HEADERS: &[(&str, &str)] = &[
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "POST"),
    ("Access-Control-Max-Age", "3600"),
    (
        "Access-Control-Allow-Headers",
        "Content-Type, Access-Control-Allow-Headers, Authorization, X-Requested-With",
    ),
];

pub struct RelayServer {
    server: Server,
    path: String,
    settings: RelaySettings,
    mailer: Arc<dyn Mailer>,
}

impl RelayServer {
    pub fn bind(
        listen: &str,
        path: &str,
        settings: RelaySettings,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, RelayError> {
        let server = Server::http(listen)
            .map_err(|e| RelayError::Bind(format!("{}: {}", listen, e)))?;
        Ok(Self {
            server,
            path: path.to_string(),
            settings,
            mailer,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Serve requests until `running` is cleared.
    pub fn serve(&self, running: &AtomicBool) -> Result<(), RelayError> {
        info!(
            addr = ?self.local_addr(),
            path = %self.path,
            mailer = self.mailer.name(),
            "Relay listening"
        );
        while running.load(Ordering::SeqCst) {
            match self.server.recv_timeout(POLL_INTERVAL)? {
                Some(request) => self.handle(request),
                None => continue,
            }
        }
        info!("Relay stopped");
        Ok(())
    }

    fn handle(&self, mut request: Request) {
        let method = request.method().clone();
        // ignore any query string
        let path = request.url().split('?').next().unwrap_or("").to_string();
        debug!(%method, %path, "Relay request");

        let (status, body) = if path != self.path {
            (404, None)
        } else {
            match method {
                Method::Options => (200, None),
                Method::Post => {
                    let reply = self.submit(&mut request);
                    (reply.status, Some(reply.to_json()))
                }
                _ => (405, None),
            }
        };

        let mut response = Response::from_string(body.unwrap_or_default()).with_status_code(status);
        for (name, value) in CORS_HEADERS
            .iter()
            .copied()
            .chain(std::iter::once(("Content-Type", "application/json; charset=UTF-8")))
        {
            if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                response.add_header(header);
            }
        }

        if let Err(e) = request.respond(response) {
            warn!("Failed to write relay response: {}", e);
        }
    }

    fn submit(&self, request: &mut Request) -> RelayReply {
        let mut body = Vec::new();
        let read = request
            .as_reader()
            .take(MAX_BODY_BYTES + 1)
            .read_to_end(&mut body);

        match read {
            Ok(n) if n as u64 > MAX_BODY_BYTES => {
                warn!(bytes = n, "Relay request body too large");
                RelayReply::new(400, MSG_MISSING_FIELDS)
            }
            Ok(_) => handle_submission(&self.settings, self.mailer.as_ref(), &body),
            Err(e) => {
                warn!("Failed to read relay request body: {}", e);
                RelayReply::new(400, MSG_MISSING_FIELDS)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::tests::RecordingMailer;
    use crate::relay::{MSG_FAILED, MSG_SENT};
    use std::thread;

    struct Running {
        url: String,
        flag: Arc<AtomicBool>,
        handle: Option<thread::JoinHandle<()>>,
    }

    impl Drop for Running {
        fn drop(&mut self) {
            self.flag.store(false, Ordering::SeqCst);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    fn start(mailer: Arc<dyn Mailer>) -> Running {
        let server = RelayServer::bind(
            "127.0.0.1:0",
            "/send-email",
            RelaySettings::default(),
            mailer,
        )
        .unwrap();
        let port = server.local_addr().unwrap().port();
        let flag = Arc::new(AtomicBool::new(true));
        let running = flag.clone();
        let handle = thread::spawn(move || {
            server.serve(&running).unwrap();
        });
        Running {
            url: format!("http://127.0.0.1:{}", port),
            flag,
            handle: Some(handle),
        }
    }

    fn status_of(result: Result<ureq::Response, ureq::Error>) -> (u16, ureq::Response) {
        match result {
            Ok(response) => (response.status(), response),
            Err(ureq::Error::Status(code, response)) => (code, response),
            Err(e) => panic!("transport error: {}", e),
        }
    }

    #[test]
    fn test_post_relays_message() {
        let mailer = Arc::new(RecordingMailer::default());
        let relay = start(mailer.clone());

        let (status, response) = status_of(
            ureq::post(&format!("{}/send-email", relay.url))
                .set("Content-Type", "application/json")
                .send_string(r#"{"subject":"hello","message":"world"}"#),
        );
        assert_eq!(status, 200);
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
        let body: serde_json::Value = serde_json::from_str(&response.into_string().unwrap()).unwrap();
        assert_eq!(body["message"], MSG_SENT);

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent[0].subject, "Message from Dashboard: hello");
    }

    #[test]
    fn test_validation_and_failure_statuses() {
        let relay = start(Arc::new(RecordingMailer::default()));
        let (status, _) = status_of(
            ureq::post(&format!("{}/send-email", relay.url)).send_string(r#"{"subject":"only"}"#),
        );
        assert_eq!(status, 400);

        let failing = start(Arc::new(RecordingMailer::failing()));
        let (status, response) = status_of(
            ureq::post(&format!("{}/send-email", failing.url))
                .send_string(r#"{"subject":"s","message":"m"}"#),
        );
        assert_eq!(status, 500);
        assert!(response.into_string().unwrap().contains(MSG_FAILED));
    }

    #[test]
    fn test_method_and_path_routing() {
        let relay = start(Arc::new(RecordingMailer::default()));

        let (status, _) = status_of(ureq::get(&format!("{}/send-email", relay.url)).call());
        assert_eq!(status, 405);

        let (status, response) =
            status_of(ureq::request("OPTIONS", &format!("{}/send-email", relay.url)).call());
        assert_eq!(status, 200);
        assert_eq!(response.header("Access-Control-Allow-Methods"), Some("POST"));

        let (status, _) =
            status_of(ureq::post(&format!("{}/elsewhere", relay.url)).send_string("{}"));
        assert_eq!(status, 404);
    }

    #[test]
    fn test_oversized_body_is_rejected() {
        let mailer = Arc::new(RecordingMailer::default());
        let relay = start(mailer.clone());
        let huge = format!(
            r#"{{"subject":"s","message":"{}"}}"#,
            "x".repeat(MAX_BODY_BYTES as usize)
        );

        let (status, _) =
            status_of(ureq::post(&format!("{}/send-email", relay.url)).send_string(&huge));
        assert_eq!(status, 400);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }
}
