//! Terminal session controller
//!
//! Drives the messaging terminal: visibility changes, command
//! interpretation, the scripted email flow and the hand-off to the mail
//! transport.
//!
//! # Timing
//!
//! ```text
//! open ──800ms──▶ email narration (0..3000ms) ──3000ms──▶ subject
//!                                               ──3600ms──▶ composer
//! send ──800ms──▶ transmission narration (0..1200ms) ──1200ms──▶ transport
//! reply ──600ms──▶ result ──1200ms──▶ details ──1800ms──▶ back to Command
//! ```
//!
//! All delays are cosmetic pacing. The transport runs on a worker thread
//! and its reply is collected by `tick()`; narration never waits for it.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Datelike;
use tracing::{debug, error, info, warn};

use super::clock::SharedClock;
use super::command::Command;
use super::line::{preview, Line, Span, Tone};
use super::narration::{Cue, Fired, Scheduler};
use super::state::{
    Composer, Controls, Draft, Mode, TerminalState, Visibility, SENDING_LABEL,
};
use crate::mail::{Delivery, MailError, MailTransport, OutgoingMessage};

/// Delay between opening and starting the email flow
const OPEN_TO_EMAIL_MS: u64 = 800;
/// Delay before a maximize requested while closed is applied
const DEFERRED_MAXIMIZE_MS: u64 = 600;
/// Pacing delay between clicking Send and starting transmission
const SEND_PACING_MS: u64 = 800;
/// Characters of the body echoed after delivery
const BODY_PREVIEW_CHARS: usize = 50;

/// Fixed identity of the terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub prompt: String,
    pub recipient: String,
    pub recipient_name: String,
    pub product: String,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            prompt: "USER@REPAIR_LIFT:~$".to_string(),
            recipient: "alex@repairlift.com".to_string(),
            recipient_name: "Alex".to_string(),
            product: "Repair Lift".to_string(),
        }
    }
}

/// Result of pressing Send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    /// Body accepted, transmission scheduled
    Queued,
    /// Body was empty, nothing changed
    Rejected,
    /// Not composing or Send disabled
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    Failed,
}

/// Scheduled work. `Say` is cosmetic and always applies; every other
/// step is dropped when the session epoch has moved on.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Say(Line),
    StartEmail,
    AnnounceSubject,
    ShowComposer,
    ToggleSize,
    Transmit,
    Invoke,
    Conclude(Outcome),
}

struct Reply {
    epoch: u64,
    result: Result<Delivery, MailError>,
}

/// Owner of the single terminal session
pub struct TerminalController {
    state: TerminalState,
    profile: Profile,
    scheduler: Scheduler<Step>,
    clock: SharedClock,
    transport: Arc<dyn MailTransport>,
    reply_tx: Sender<Reply>,
    reply_rx: Receiver<Reply>,
    /// Bumped on every close so late steps can be recognized
    epoch: u64,
    maximize_pending: bool,
}

impl TerminalController {
    pub fn new(profile: Profile, transport: Arc<dyn MailTransport>, clock: SharedClock) -> Self {
        let (reply_tx, reply_rx) = mpsc::channel();
        Self {
            state: TerminalState::new(),
            profile,
            scheduler: Scheduler::new(),
            clock,
            transport,
            reply_tx,
            reply_rx,
            epoch: 0,
            maximize_pending: false,
        }
    }

    pub fn state(&self) -> &TerminalState {
        &self.state
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Open when hidden, close when visible.
    pub fn toggle(&mut self) {
        if self.state.visibility.is_hidden() {
            self.open();
        } else {
            self.close();
        }
    }

    /// Open the panel and start the email flow after a short delay.
    pub fn open(&mut self) {
        if !self.state.visibility.is_hidden() {
            return;
        }
        info!("Terminal opened");

        self.state.reset(Visibility::Open);
        self.state.controls = Controls::empty();
        self.state.push(Line::system(
            "Initializing messaging terminal...",
            Tone::Loading,
        ));
        let now = self.clock.now();
        self.scheduler.schedule(
            now,
            Duration::from_millis(OPEN_TO_EMAIL_MS),
            self.epoch,
            Step::StartEmail,
        );
    }

    pub fn close(&mut self) {
        self.hide(Visibility::Closed);
    }

    /// Behaves like `close()` but is remembered as minimized.
    pub fn minimize(&mut self) {
        self.hide(Visibility::Minimized);
    }

    fn hide(&mut self, visibility: Visibility) {
        if self.state.mode != Mode::Command || self.state.draft.is_some() {
            debug!(mode = ?self.state.mode, "Discarding in-progress draft");
        }
        self.epoch += 1;
        self.maximize_pending = false;
        self.state.reset(visibility);
        info!(?visibility, "Terminal hidden");
    }

    /// Toggle between normal and maximized size, opening first if needed.
    pub fn maximize(&mut self) {
        if self.maximize_pending {
            return;
        }
        if self.state.visibility.is_hidden() {
            self.open();
            self.maximize_pending = true;
            let now = self.clock.now();
            self.scheduler.schedule(
                now,
                Duration::from_millis(DEFERRED_MAXIMIZE_MS),
                self.epoch,
                Step::ToggleSize,
            );
        } else {
            self.toggle_size();
        }
    }

    fn toggle_size(&mut self) {
        self.state.visibility = match self.state.visibility {
            Visibility::Open => Visibility::Maximized,
            Visibility::Maximized => Visibility::Open,
            hidden => hidden,
        };
    }

    /// Handle a line entered at the prompt.
    pub fn submit(&mut self, input: &str) {
        if self.state.visibility.is_hidden() {
            return;
        }
        if !self.state.input_enabled() {
            debug!("Input ignored while disabled");
            return;
        }

        match self.state.mode {
            Mode::Command => {
                if let Some(command) = Command::parse(input) {
                    self.run_command(input.trim(), command);
                }
            }
            // the composer owns the keyboard until Send or Cancel
            Mode::EmailComposing | Mode::EmailSubjectPending | Mode::Sending => {
                debug!(mode = ?self.state.mode, "Prompt line ignored outside command mode");
            }
        }
    }

    fn run_command(&mut self, input: &str, command: Command) {
        self.state.push(Line::echo(&self.profile.prompt, input));
        debug!(?command, "Running command");

        let implicit = command.is_implicit_message();
        match command {
            Command::Help => self.show_help(),
            Command::Clear => self.state.transcript.clear(),
            Command::About => self.show_about(),
            Command::Exit => self.close(),
            Command::Email => self.start_email(None),
            Command::Text(text) => {
                self.state.push(Line::labeled_spans(
                    "SYSTEM",
                    vec![
                        Span::plain(format!(
                            "To send a message to {}, type ",
                            self.profile.recipient_name
                        )),
                        Span::command("email"),
                        Span::plain(" or just start typing your message."),
                    ],
                ));
                if implicit {
                    self.start_email(Some(text));
                }
            }
        }
    }

    fn show_help(&mut self) {
        self.state.push(Line::system("Available commands:", Tone::Plain));
        self.state.push(Line::new(vec![
            Span::command("email"),
            Span::plain(" or "),
            Span::command("message"),
            Span::plain(" or "),
            Span::command("contact"),
            Span::plain(format!(" - Send a message to {}", self.profile.recipient_name)),
        ]));
        for (name, text) in [
            ("help", "Show available commands".to_string()),
            ("clear", "Clear terminal output".to_string()),
            ("about", format!("Show information about {}", self.profile.product)),
            ("exit", "Close the terminal".to_string()),
        ] {
            self.state.push(Line::new(vec![
                Span::command(name),
                Span::plain(format!(" - {}", text)),
            ]));
        }
        self.state.push(Line::labeled(
            "TIP",
            "You can also just start typing your message directly!",
            Tone::Plain,
        ));
    }

    fn show_about(&mut self) {
        let year = self.clock.local_now().year();
        let product = self.profile.product.clone();
        self.state
            .push(Line::system(format!("{} Dashboard", product), Tone::Success));
        self.state.push(Line::system(
            format!("Version: {}", env!("CARGO_PKG_VERSION")),
            Tone::Plain,
        ));
        self.state.push(Line::system(
            "A futuristic dashboard for tracking repair and maintenance tasks.",
            Tone::Plain,
        ));
        self.state
            .push(Line::system(format!("© {} {}", year, product), Tone::Plain));
    }

    /// Begin a fresh draft and play the connection narration.
    fn start_email(&mut self, prefill: Option<String>) {
        let mut draft = Draft::new(&self.profile.recipient);
        if let Some(text) = prefill {
            draft.body = text;
        }
        self.state.draft = Some(draft);
        self.state.composer = None;
        self.state.mode = Mode::EmailSubjectPending;
        self.state.controls = Controls::empty();

        self.state.push(Line::system(
            "Initializing communication protocol...",
            Tone::Loading,
        ));
        let recipient = self.profile.recipient.clone();
        let script = vec![
            Cue::at(
                600,
                Step::Say(Line::system("Establishing secure connection...", Tone::Loading)),
            ),
            Cue::at(
                1200,
                Step::Say(Line::system("Configuring messaging service...", Tone::Loading)),
            ),
            Cue::at(
                1800,
                Step::Say(Line::system(
                    format!("Verifying recipient address: {}...", recipient),
                    Tone::Loading,
                )),
            ),
            Cue::at(
                2400,
                Step::Say(Line::system(
                    "Direct communication channel established!",
                    Tone::Success,
                )),
            ),
            Cue::at(3000, Step::AnnounceSubject),
            Cue::at(3600, Step::ShowComposer),
        ];
        let now = self.clock.now();
        self.scheduler.play(now, self.epoch, script);
    }

    fn announce_subject(&mut self) {
        let timestamp = self.clock.local_now().format("%b %-d, %-I:%M %p");
        let subject = format!("Message from Dashboard ({})", timestamp);

        self.state
            .push(Line::system("Message mode activated", Tone::Success));
        self.state.push(Line::labeled_spans(
            "EMAIL",
            vec![
                Span::plain("Your message will be sent to "),
                Span::new(self.profile.recipient.clone(), Tone::Success),
            ],
        ));
        self.state.push(Line::labeled_spans(
            "EMAIL",
            vec![
                Span::plain("Subject: "),
                Span::new(subject.clone(), Tone::Success),
            ],
        ));

        match self.state.draft.as_mut() {
            Some(draft) => draft.subject = subject,
            None => warn!("Subject generated without a draft"),
        }
    }

    fn show_composer(&mut self) {
        let body = self
            .state
            .draft
            .as_ref()
            .map(|d| d.body.clone())
            .unwrap_or_default();
        self.state.push(Line::separator("MESSAGE COMPOSITION"));
        self.state.composer = Some(Composer::new(&body));
        self.state.mode = Mode::EmailComposing;
        self.state.controls = Controls::all();
    }

    /// Editable composition surface, while composing.
    pub fn composer_mut(&mut self) -> Option<&mut Composer> {
        if self.state.mode != Mode::EmailComposing {
            return None;
        }
        self.state.composer.as_mut()
    }

    /// Send the composed body.
    pub fn send(&mut self) -> SendResult {
        if self.state.mode != Mode::EmailComposing
            || !self.state.controls.contains(Controls::SEND)
        {
            return SendResult::Ignored;
        }

        let body = self
            .state
            .composer
            .as_ref()
            .map(|c| c.body.trim().to_string())
            .unwrap_or_default();
        if body.is_empty() {
            self.state.push(Line::error("Error: Message cannot be empty"));
            return SendResult::Rejected;
        }

        if let Some(draft) = self.state.draft.as_mut() {
            draft.body = body;
        }
        if let Some(composer) = self.state.composer.as_mut() {
            composer.send_label = SENDING_LABEL;
        }
        self.state.controls = Controls::empty();
        self.state.mode = Mode::Sending;

        let now = self.clock.now();
        self.scheduler.schedule(
            now,
            Duration::from_millis(SEND_PACING_MS),
            self.epoch,
            Step::Transmit,
        );
        SendResult::Queued
    }

    /// Discard the draft and return to the prompt.
    pub fn cancel(&mut self) -> bool {
        if self.state.mode != Mode::EmailComposing
            || !self.state.controls.contains(Controls::CANCEL)
        {
            return false;
        }
        self.state.composer = None;
        self.state.draft = None;
        self.state.mode = Mode::Command;
        self.state.controls = Controls::INPUT;
        self.state
            .push(Line::system("Message composition cancelled.", Tone::Plain));
        self.state.push(Line::labeled_spans(
            "SYSTEM",
            vec![
                Span::plain("Returning to command mode. Type "),
                Span::command("help"),
                Span::plain(" for available commands."),
            ],
        ));
        true
    }

    fn transmit(&mut self, base: Instant) {
        self.state.composer = None;
        let script = vec![
            Cue::at(0, Step::Say(Line::separator("TRANSMISSION IN PROGRESS"))),
            Cue::at(
                0,
                Step::Say(Line::system("Preparing message payload...", Tone::Loading)),
            ),
            Cue::at(
                400,
                Step::Say(Line::system(
                    "Encrypting communication channel...",
                    Tone::Loading,
                )),
            ),
            Cue::at(
                800,
                Step::Say(Line::system(
                    "Establishing connection to messaging server...",
                    Tone::Loading,
                )),
            ),
            Cue::at(
                1200,
                Step::Say(Line::system("Transmitting message data...", Tone::Loading)),
            ),
            Cue::at(1200, Step::Invoke),
        ];
        self.scheduler.play(base, self.epoch, script);
    }

    /// Hand the draft to the transport on a worker thread.
    fn invoke_transport(&mut self) {
        let Some(draft) = self.state.draft.as_ref() else {
            warn!("Transport step fired without a draft");
            return;
        };
        let message = OutgoingMessage {
            to: draft.to().to_string(),
            subject: draft.subject.clone(),
            body: draft.body.clone(),
        };
        info!(transport = self.transport.name(), subject = %message.subject, "Dispatching message");

        let transport = Arc::clone(&self.transport);
        let tx = self.reply_tx.clone();
        let epoch = self.epoch;
        let spawned = thread::Builder::new()
            .name("mail-transport".to_string())
            .spawn(move || {
                let result = transport.deliver(&message);
                let _ = tx.send(Reply { epoch, result });
            });

        if let Err(e) = spawned {
            self.handle_reply(Reply {
                epoch,
                result: Err(MailError::Transport(format!(
                    "could not start transport thread: {}",
                    e
                ))),
            });
        }
    }

    fn handle_reply(&mut self, reply: Reply) {
        if reply.epoch != self.epoch {
            match reply.result {
                Ok(_) => info!("Late delivery confirmation for a closed session"),
                Err(e) => error!(error = %e, "Late delivery failure for a closed session"),
            }
            return;
        }

        let now = self.clock.now();
        let script = match reply.result {
            Ok(delivery) => {
                info!(ack = %delivery.message, "Message delivered");
                self.success_script()
            }
            Err(e) => {
                error!(error = %e, "Message delivery failed");
                self.failure_script()
            }
        };
        self.scheduler.play(now, self.epoch, script);
    }

    fn success_script(&self) -> Vec<Cue<Step>> {
        let (subject, body) = self
            .state
            .draft
            .as_ref()
            .map(|d| (d.subject.clone(), d.body.clone()))
            .unwrap_or_default();
        let recipient = self.profile.recipient.clone();

        vec![
            Cue::at(
                600,
                Step::Say(Line::system("Transmission complete!", Tone::Success)),
            ),
            Cue::at(1200, Step::Say(Line::separator("MESSAGE DETAILS"))),
            Cue::at(
                1200,
                Step::Say(Line::labeled("RECIPIENT", recipient, Tone::Success)),
            ),
            Cue::at(
                1200,
                Step::Say(Line::labeled("SUBJECT", subject, Tone::Success)),
            ),
            Cue::at(
                1200,
                Step::Say(Line::labeled(
                    "MESSAGE",
                    preview(&body, BODY_PREVIEW_CHARS),
                    Tone::Success,
                )),
            ),
            Cue::at(
                1200,
                Step::Say(Line::labeled("STATUS", "DELIVERED", Tone::Success)),
            ),
            Cue::at(
                1800,
                Step::Say(Line::system(
                    format!(
                        "Thank you for your message. {} will respond as soon as possible.",
                        self.profile.recipient_name
                    ),
                    Tone::Success,
                )),
            ),
            Cue::at(1800, Step::Say(self.again_hint("to send another message"))),
            Cue::at(1800, Step::Conclude(Outcome::Delivered)),
        ]
    }

    fn failure_script(&self) -> Vec<Cue<Step>> {
        vec![
            Cue::at(
                600,
                Step::Say(Line::system("Transmission failed!", Tone::Error)),
            ),
            Cue::at(
                1200,
                Step::Say(Line::labeled(
                    "ERROR",
                    "Unable to deliver message to recipient.",
                    Tone::Error,
                )),
            ),
            Cue::at(
                1200,
                Step::Say(Line::system(
                    "Please check your internet connection and try again.",
                    Tone::Error,
                )),
            ),
            Cue::at(1800, Step::Say(self.again_hint("to try again"))),
            Cue::at(1800, Step::Conclude(Outcome::Failed)),
        ]
    }

    fn again_hint(&self, purpose: &str) -> Line {
        Line::labeled_spans(
            "SYSTEM",
            vec![
                Span::plain("Type "),
                Span::command("email"),
                Span::plain(format!(" {} or ", purpose)),
                Span::command("exit"),
                Span::plain(" to close the terminal."),
            ],
        )
    }

    fn conclude(&mut self, outcome: Outcome) {
        debug!(?outcome, "Send flow finished");
        self.state.draft = None;
        self.state.composer = None;
        self.state.mode = Mode::Command;
        self.state.controls = Controls::INPUT;
    }

    /// Collect transport replies and fire due timers.
    /// Returns true when the state may have changed.
    pub fn tick(&mut self) -> bool {
        let mut changed = false;

        while let Ok(reply) = self.reply_rx.try_recv() {
            self.handle_reply(reply);
            changed = true;
        }

        let now = self.clock.now();
        loop {
            let fired = self.scheduler.due(now);
            if fired.is_empty() {
                break;
            }
            for step in fired {
                self.apply(step);
            }
            changed = true;
        }
        changed
    }

    fn apply(&mut self, fired: Fired<Step>) {
        let Fired { epoch, due, step } = fired;
        match step {
            Step::Say(line) => self.state.push(line),
            step if epoch != self.epoch => {
                debug!(?step, "Dropping step from a closed session");
            }
            Step::StartEmail => {
                if self.state.mode == Mode::Command && !self.state.visibility.is_hidden() {
                    self.start_email(None);
                }
            }
            Step::AnnounceSubject => self.announce_subject(),
            Step::ShowComposer => self.show_composer(),
            Step::ToggleSize => {
                self.maximize_pending = false;
                self.toggle_size();
            }
            Step::Transmit => self.transmit(due),
            Step::Invoke => self.invoke_transport(),
            Step::Conclude(outcome) => self.conclude(outcome),
        }
    }

    /// Time until the next scheduled step.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.scheduler.next_deadline(self.clock.now())
    }

    /// Block up to `timeout` for one transport reply and handle it.
    #[cfg(test)]
    fn wait_for_reply(&mut self, timeout: Duration) -> bool {
        match self.reply_rx.recv_timeout(timeout) {
            Ok(reply) => {
                self.handle_reply(reply);
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use std::sync::Mutex;

    const RAW_FAILURE: &str = "relay 10.0.0.3 refused: 554 spam score 9.1";

    struct RecordingTransport {
        sent: Mutex<Vec<OutgoingMessage>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn sent(&self) -> Vec<OutgoingMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl MailTransport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        fn deliver(&self, message: &OutgoingMessage) -> crate::mail::Result<Delivery> {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail {
                Err(MailError::Rejected {
                    status: 500,
                    message: RAW_FAILURE.to_string(),
                })
            } else {
                Ok(Delivery {
                    message: "Email sent successfully.".to_string(),
                })
            }
        }
    }

    struct Harness {
        ctrl: TerminalController,
        clock: Arc<ManualClock>,
        transport: Arc<RecordingTransport>,
    }

    impl Harness {
        fn new(fail: bool) -> Self {
            let clock = ManualClock::shared_at(2024, 1, 5, 14, 30);
            let transport = RecordingTransport::new(fail);
            let ctrl = TerminalController::new(
                Profile::default(),
                transport.clone(),
                clock.clone(),
            );
            Self {
                ctrl,
                clock,
                transport,
            }
        }

        fn advance(&mut self, millis: u64) {
            self.clock.advance(Duration::from_millis(millis));
            self.ctrl.tick();
        }

        /// Open and run the bootstrap narration to the composer.
        fn open_to_composer(&mut self) {
            self.ctrl.toggle();
            self.advance(OPEN_TO_EMAIL_MS);
            self.advance(3600);
        }

        /// From composing to a concluded send.
        fn send_and_settle(&mut self, body: &str) {
            self.ctrl.composer_mut().unwrap().body = body.to_string();
            assert_eq!(self.ctrl.send(), SendResult::Queued);
            self.advance(SEND_PACING_MS);
            self.advance(1200);
            assert!(self.ctrl.wait_for_reply(Duration::from_secs(5)));
            self.advance(1800);
        }

        fn text(&self) -> Vec<String> {
            self.ctrl.state().transcript_text()
        }

        fn last_line(&self) -> String {
            self.text().last().cloned().unwrap_or_default()
        }
    }

    #[test]
    fn test_open_ends_in_composing_with_generated_subject() {
        let mut h = Harness::new(false);
        h.ctrl.toggle();
        assert_eq!(h.ctrl.state().visibility, Visibility::Open);
        assert!(!h.ctrl.state().input_enabled());

        h.advance(OPEN_TO_EMAIL_MS);
        assert_eq!(h.ctrl.state().mode, Mode::EmailSubjectPending);

        h.advance(3000);
        assert_eq!(h.ctrl.state().mode, Mode::EmailSubjectPending);
        h.advance(600);

        let state = h.ctrl.state();
        assert_eq!(state.mode, Mode::EmailComposing);
        assert!(state.input_enabled());
        let draft = state.draft.as_ref().unwrap();
        assert_eq!(draft.to(), "alex@repairlift.com");
        assert_eq!(draft.subject, "Message from Dashboard (Jan 5, 2:30 PM)");
        assert_eq!(state.composer.as_ref().unwrap().body, "");
        assert!(h
            .text()
            .contains(&"EMAIL: Subject: Message from Dashboard (Jan 5, 2:30 PM)".to_string()));
    }

    #[test]
    fn test_bootstrap_narration_order() {
        let mut h = Harness::new(false);
        h.open_to_composer();
        let text = h.text();
        let expected = [
            "SYSTEM: Initializing messaging terminal...",
            "SYSTEM: Initializing communication protocol...",
            "SYSTEM: Establishing secure connection...",
            "SYSTEM: Configuring messaging service...",
            "SYSTEM: Verifying recipient address: alex@repairlift.com...",
            "SYSTEM: Direct communication channel established!",
            "SYSTEM: Message mode activated",
        ];
        assert_eq!(&text[..expected.len()], &expected);
        assert_eq!(text.last().unwrap(), "-----[ MESSAGE COMPOSITION ]-----");
    }

    #[test]
    fn test_close_always_resets() {
        let mut h = Harness::new(false);

        // closed already
        h.ctrl.close();
        assert_eq!(h.ctrl.state().visibility, Visibility::Closed);

        // mid-bootstrap
        h.ctrl.toggle();
        h.advance(1500);
        h.ctrl.close();
        let state = h.ctrl.state();
        assert_eq!(state.visibility, Visibility::Closed);
        assert_eq!(state.mode, Mode::Command);
        assert!(state.draft.is_none());

        // late steps from the closed session must not revive the draft
        h.advance(5000);
        let state = h.ctrl.state();
        assert_eq!(state.mode, Mode::Command);
        assert!(state.draft.is_none());
        assert!(state.composer.is_none());

        // maximized and composing
        h.open_to_composer();
        h.ctrl.maximize();
        assert_eq!(h.ctrl.state().visibility, Visibility::Maximized);
        h.ctrl.close();
        let state = h.ctrl.state();
        assert_eq!(state.visibility, Visibility::Closed);
        assert_eq!(state.mode, Mode::Command);
        assert!(state.draft.is_none());
        assert!(state.transcript.is_empty());
    }

    #[test]
    fn test_minimize_hides_and_toggle_reopens() {
        let mut h = Harness::new(false);
        h.open_to_composer();
        h.ctrl.minimize();
        assert_eq!(h.ctrl.state().visibility, Visibility::Minimized);
        assert_eq!(h.ctrl.state().mode, Mode::Command);
        assert!(h.ctrl.state().draft.is_none());

        h.ctrl.toggle();
        assert_eq!(h.ctrl.state().visibility, Visibility::Open);
        assert_eq!(h.text(), vec!["SYSTEM: Initializing messaging terminal..."]);
    }

    #[test]
    fn test_open_is_noop_when_visible() {
        let mut h = Harness::new(false);
        h.open_to_composer();
        let before = h.text();
        h.ctrl.open();
        assert_eq!(h.text(), before);
        assert_eq!(h.ctrl.state().mode, Mode::EmailComposing);
    }

    #[test]
    fn test_maximize_from_closed_is_deferred() {
        let mut h = Harness::new(false);
        h.ctrl.maximize();
        assert_eq!(h.ctrl.state().visibility, Visibility::Open);

        // repeated request while pending is ignored
        h.ctrl.maximize();
        assert_eq!(h.ctrl.state().visibility, Visibility::Open);

        h.advance(DEFERRED_MAXIMIZE_MS);
        assert_eq!(h.ctrl.state().visibility, Visibility::Maximized);

        h.ctrl.maximize();
        assert_eq!(h.ctrl.state().visibility, Visibility::Open);
    }

    #[test]
    fn test_send_success_scenario() {
        let mut h = Harness::new(false);
        h.open_to_composer();
        h.send_and_settle("hello there");

        let text = h.text();
        assert!(text.contains(&"SYSTEM: Transmission complete!".to_string()));
        assert!(text.contains(&"RECIPIENT: alex@repairlift.com".to_string()));
        assert!(text.contains(&"MESSAGE: hello there".to_string()));
        assert!(text.contains(&"STATUS: DELIVERED".to_string()));

        let state = h.ctrl.state();
        assert_eq!(state.mode, Mode::Command);
        assert!(state.draft.is_none());
        assert!(state.input_enabled());

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alex@repairlift.com");
        assert_eq!(sent[0].subject, "Message from Dashboard (Jan 5, 2:30 PM)");
        assert_eq!(sent[0].body, "hello there");
    }

    #[test]
    fn test_send_failure_hides_raw_error() {
        let mut h = Harness::new(true);
        h.open_to_composer();
        h.send_and_settle("hello there");

        let text = h.text();
        assert!(text.contains(&"SYSTEM: Transmission failed!".to_string()));
        assert!(text.contains(&"ERROR: Unable to deliver message to recipient.".to_string()));
        assert!(text.iter().all(|l| !l.contains(RAW_FAILURE)));
        assert!(text.iter().all(|l| !l.contains("10.0.0.3")));
        assert!(!text.contains(&"STATUS: DELIVERED".to_string()));

        let state = h.ctrl.state();
        assert_eq!(state.mode, Mode::Command);
        assert!(state.draft.is_none());
        assert!(state.input_enabled());
        assert_eq!(h.transport.sent().len(), 1);
    }

    #[test]
    fn test_empty_body_never_sends() {
        let mut h = Harness::new(false);
        h.open_to_composer();

        for body in ["", "   \n\t "] {
            h.ctrl.composer_mut().unwrap().body = body.to_string();
            assert_eq!(h.ctrl.send(), SendResult::Rejected);
            assert_eq!(h.ctrl.state().mode, Mode::EmailComposing);
            assert_eq!(h.last_line(), "Error: Message cannot be empty");
        }

        h.advance(10_000);
        assert!(h.transport.sent().is_empty());
        assert_eq!(h.ctrl.state().mode, Mode::EmailComposing);
    }

    #[test]
    fn test_repeated_send_clicks_invoke_once() {
        let mut h = Harness::new(false);
        h.open_to_composer();
        h.ctrl.composer_mut().unwrap().body = "hello there".to_string();

        assert_eq!(h.ctrl.send(), SendResult::Queued);
        let composer = h.ctrl.state().composer.as_ref().unwrap();
        assert_eq!(composer.send_label, SENDING_LABEL);
        assert!(!h.ctrl.state().controls.contains(Controls::SEND));
        assert_eq!(h.ctrl.send(), SendResult::Ignored);
        assert_eq!(h.ctrl.send(), SendResult::Ignored);
        assert!(h.ctrl.composer_mut().is_none());

        h.advance(SEND_PACING_MS);
        h.advance(1200);
        assert!(h.ctrl.wait_for_reply(Duration::from_secs(5)));
        h.advance(1800);
        assert_eq!(h.transport.sent().len(), 1);
    }

    #[test]
    fn test_transport_invoked_after_pacing_and_floor() {
        let mut h = Harness::new(false);
        h.open_to_composer();
        h.ctrl.composer_mut().unwrap().body = "ping".to_string();
        h.ctrl.send();

        h.advance(SEND_PACING_MS);
        assert!(h.ctrl.state().composer.is_none());
        assert_eq!(h.last_line(), "SYSTEM: Preparing message payload...");
        h.advance(1199);
        assert!(!h.ctrl.wait_for_reply(Duration::from_millis(50)));

        h.advance(1);
        assert_eq!(h.last_line(), "SYSTEM: Transmitting message data...");
        assert!(h.ctrl.wait_for_reply(Duration::from_secs(5)));
    }

    #[test]
    fn test_long_body_preview_is_truncated() {
        let mut h = Harness::new(false);
        h.open_to_composer();
        let body = "a".repeat(80);
        h.send_and_settle(&body);

        let line = h
            .text()
            .into_iter()
            .find(|l| l.starts_with("MESSAGE: "))
            .unwrap();
        let shown = line.trim_start_matches("MESSAGE: ");
        assert_eq!(shown, format!("{}...", "a".repeat(50)));
        assert_eq!(shown.chars().count(), 53);
        assert_eq!(h.transport.sent()[0].body, body);
    }

    #[test]
    fn test_close_during_send_drops_reply() {
        let mut h = Harness::new(false);
        h.open_to_composer();
        h.ctrl.composer_mut().unwrap().body = "hello there".to_string();
        h.ctrl.send();
        h.advance(SEND_PACING_MS);
        h.advance(1200);

        h.ctrl.close();
        assert!(h.ctrl.wait_for_reply(Duration::from_secs(5)));
        h.advance(2000);

        let state = h.ctrl.state();
        assert_eq!(state.visibility, Visibility::Closed);
        assert_eq!(state.mode, Mode::Command);
        assert!(state.draft.is_none());
        assert!(!h.text().contains(&"STATUS: DELIVERED".to_string()));
        assert_eq!(h.transport.sent().len(), 1);
    }

    #[test]
    fn test_cancel_returns_to_command() {
        let mut h = Harness::new(false);
        h.open_to_composer();
        h.ctrl.composer_mut().unwrap().body = "draft text".to_string();

        assert!(h.ctrl.cancel());
        let state = h.ctrl.state();
        assert_eq!(state.mode, Mode::Command);
        assert!(state.draft.is_none());
        assert!(state.composer.is_none());
        assert_eq!(
            h.last_line(),
            "SYSTEM: Returning to command mode. Type help for available commands."
        );
        assert!(!h.ctrl.cancel());
    }

    #[test]
    fn test_implicit_message_prefills_body() {
        let mut h = Harness::new(false);
        h.open_to_composer();
        h.ctrl.cancel();

        h.ctrl.submit("just checking in on project status");
        assert_eq!(h.ctrl.state().mode, Mode::EmailSubjectPending);
        assert!(h.text().contains(
            &"SYSTEM: To send a message to Alex, type email or just start typing your message."
                .to_string()
        ));

        h.advance(3600);
        let state = h.ctrl.state();
        assert_eq!(state.mode, Mode::EmailComposing);
        assert_eq!(
            state.composer.as_ref().unwrap().body,
            "just checking in on project status"
        );
        assert_eq!(
            state.draft.as_ref().unwrap().body,
            "just checking in on project status"
        );
    }

    #[test]
    fn test_short_unknown_input_only_hints() {
        let mut h = Harness::new(false);
        h.open_to_composer();
        h.ctrl.cancel();

        h.ctrl.submit("hi");
        assert_eq!(h.ctrl.state().mode, Mode::Command);
        assert!(h.ctrl.state().draft.is_none());
        assert_eq!(
            h.last_line(),
            "SYSTEM: To send a message to Alex, type email or just start typing your message."
        );
        let text = h.text();
        assert_eq!(text[text.len() - 2], "USER@REPAIR_LIFT:~$ hi");

        h.advance(10_000);
        assert_eq!(h.ctrl.state().mode, Mode::Command);
    }

    #[test]
    fn test_help_about_clear_exit() {
        let mut h = Harness::new(false);
        h.open_to_composer();
        h.ctrl.cancel();

        h.ctrl.submit("HELP");
        assert!(h.text().contains(&"clear - Clear terminal output".to_string()));
        assert_eq!(
            h.last_line(),
            "TIP: You can also just start typing your message directly!"
        );

        h.ctrl.submit("about");
        assert!(h.text().contains(&"SYSTEM: Repair Lift Dashboard".to_string()));
        assert_eq!(h.last_line(), "SYSTEM: © 2024 Repair Lift");

        h.ctrl.submit("clear");
        assert!(h.ctrl.state().transcript.is_empty());

        h.ctrl.submit("exit");
        assert_eq!(h.ctrl.state().visibility, Visibility::Closed);
    }

    #[test]
    fn test_email_command_discards_previous_draft() {
        let mut h = Harness::new(false);
        h.open_to_composer();
        h.ctrl.cancel();
        h.ctrl.submit("this message will be replaced");
        h.advance(3600);
        h.ctrl.cancel();

        h.ctrl.submit("contact");
        h.advance(3600);
        let state = h.ctrl.state();
        assert_eq!(state.mode, Mode::EmailComposing);
        assert_eq!(state.draft.as_ref().unwrap().body, "");
    }

    #[test]
    fn test_input_ignored_during_narration() {
        let mut h = Harness::new(false);
        h.ctrl.toggle();
        h.ctrl.submit("help");
        h.advance(OPEN_TO_EMAIL_MS + 1000);
        h.ctrl.submit("help");

        assert!(h.text().iter().all(|l| !l.contains("Available commands")));
    }

    #[test]
    fn test_prompt_line_while_composing_is_ignored() {
        let mut h = Harness::new(false);
        h.open_to_composer();
        let before = h.text().len();

        h.ctrl.submit("help");
        assert_eq!(h.ctrl.state().mode, Mode::EmailComposing);
        assert_eq!(h.ctrl.state().composer.as_ref().unwrap().body, "");
        assert_eq!(h.text().len(), before);
        h.advance(SEND_PACING_MS + 1200);
        assert!(h.transport.sent().is_empty());
    }

    #[test]
    fn test_submit_ignored_when_hidden() {
        let mut h = Harness::new(false);
        h.ctrl.submit("help");
        assert!(h.ctrl.state().transcript.is_empty());
    }
}
