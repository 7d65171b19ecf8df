//! Application state for terminal mode
//!
//! Owns the (lazily created) session controller plus the bits of UI
//! state that are not part of the session: the prompt input buffer,
//! transcript scroll and the quit flag.

use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::debug;

use crate::core::{Mode, Profile, SharedClock, TerminalController, TerminalState};
use crate::ui::{Action, Focus};

/// Rows moved per PageUp/PageDown or wheel step
const SCROLL_STEP: usize = 3;

/// Builds the controller the first time the panel is toggled
pub type ControllerFactory = Box<dyn FnMut() -> TerminalController>;

pub struct App {
    controller: Option<TerminalController>,
    factory: ControllerFactory,
    /// Stand-in state shown before the first toggle
    idle: TerminalState,
    profile: Profile,
    clock: SharedClock,
    /// Prompt line being typed
    pub input: String,
    /// Rows scrolled up from the bottom of the transcript
    pub scroll: usize,
    pub should_quit: bool,
}

impl App {
    pub fn new(profile: Profile, clock: SharedClock, factory: ControllerFactory) -> Self {
        Self {
            controller: None,
            factory,
            idle: TerminalState::new(),
            profile,
            clock,
            input: String::new(),
            scroll: 0,
            should_quit: false,
        }
    }

    pub fn state(&self) -> &TerminalState {
        match self.controller {
            Some(ref c) => c.state(),
            None => &self.idle,
        }
    }

    pub fn profile(&self) -> &Profile {
        match self.controller {
            Some(ref c) => c.profile(),
            None => &self.profile,
        }
    }

    pub fn local_now(&self) -> DateTime<Local> {
        self.clock.local_now()
    }

    fn controller_mut(&mut self) -> &mut TerminalController {
        let factory = &mut self.factory;
        self.controller.get_or_insert_with(|| {
            debug!("Creating terminal session");
            factory()
        })
    }

    /// Where keystrokes go right now
    pub fn focus(&self) -> Focus {
        let state = self.state();
        if state.visibility.is_hidden() {
            Focus::Hidden
        } else if state.mode == Mode::EmailComposing && state.composer.is_some() {
            Focus::Composer
        } else if state.mode == Mode::Command && state.input_enabled() {
            Focus::Prompt
        } else {
            Focus::Busy
        }
    }

    /// Apply a user action. Returns true when a redraw is needed.
    pub fn dispatch(&mut self, action: Action) -> bool {
        let focus = self.focus();
        match action {
            Action::Quit => {
                self.should_quit = true;
                return false;
            }
            Action::Toggle => self.controller_mut().toggle(),
            Action::Maximize => self.controller_mut().maximize(),
            Action::Close => match self.controller.as_mut() {
                Some(c) => c.close(),
                None => return false,
            },
            Action::Minimize => match self.controller.as_mut() {
                Some(c) => c.minimize(),
                None => return false,
            },
            Action::Submit => {
                if focus != Focus::Prompt {
                    return false;
                }
                let line = std::mem::take(&mut self.input);
                self.scroll = 0;
                if let Some(c) = self.controller.as_mut() {
                    c.submit(&line);
                }
            }
            Action::InsertChar(ch) => match focus {
                Focus::Prompt => self.input.push(ch),
                Focus::Composer => self.edit_composer(|body| body.insert(ch)),
                _ => return false,
            },
            Action::Newline => {
                if focus != Focus::Composer {
                    return false;
                }
                self.edit_composer(|body| body.insert('\n'));
            }
            Action::Backspace => match focus {
                Focus::Prompt => {
                    self.input.pop();
                }
                Focus::Composer => self.edit_composer(|body| body.backspace()),
                _ => return false,
            },
            Action::Send => match self.controller.as_mut() {
                Some(c) => {
                    let result = c.send();
                    debug!(?result, "Send pressed");
                    self.scroll = 0;
                }
                None => return false,
            },
            Action::Cancel => match self.controller.as_mut() {
                Some(c) => {
                    if !c.cancel() {
                        return false;
                    }
                }
                None => return false,
            },
            Action::ScrollUp => self.scroll = self.scroll.saturating_add(SCROLL_STEP),
            Action::ScrollDown => self.scroll = self.scroll.saturating_sub(SCROLL_STEP),
        }

        if self.state().visibility.is_hidden() {
            self.input.clear();
            self.scroll = 0;
        }
        true
    }

    fn edit_composer(&mut self, edit: impl FnOnce(&mut crate::core::state::Composer)) {
        if let Some(composer) = self.controller.as_mut().and_then(|c| c.composer_mut()) {
            edit(composer);
        }
    }

    /// Advance the session. Returns true when the state may have changed.
    pub fn tick(&mut self) -> bool {
        let changed = match self.controller.as_mut() {
            Some(c) => c.tick(),
            None => false,
        };
        if changed {
            // new output snaps back to the bottom
            self.scroll = 0;
        }
        changed
    }

    /// Time until the controller next needs a tick
    pub fn next_deadline(&self) -> Option<Duration> {
        self.controller.as_ref().and_then(|c| c.next_deadline())
    }

    /// Whether a transmission is awaiting its reply
    pub fn is_busy(&self) -> bool {
        self.state().mode == Mode::Sending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::Visibility;
    use crate::mail::{Delivery, MailTransport, OutgoingMessage};
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<OutgoingMessage>>,
    }

    impl MailTransport for Outbox {
        fn name(&self) -> &str {
            "outbox"
        }

        fn deliver(&self, message: &OutgoingMessage) -> crate::mail::Result<Delivery> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(Delivery {
                message: "Email sent successfully.".to_string(),
            })
        }
    }

    struct Fixture {
        app: App,
        clock: Arc<ManualClock>,
        outbox: Arc<Outbox>,
        created: Rc<Cell<usize>>,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = ManualClock::shared_at(2024, 1, 5, 14, 30);
            let outbox = Arc::new(Outbox::default());
            let created = Rc::new(Cell::new(0));

            let factory_clock: SharedClock = clock.clone();
            let factory_outbox = outbox.clone();
            let counter = created.clone();
            let factory: ControllerFactory = Box::new(move || {
                counter.set(counter.get() + 1);
                TerminalController::new(
                    Profile::default(),
                    factory_outbox.clone(),
                    factory_clock.clone(),
                )
            });

            let app = App::new(Profile::default(), clock.clone(), factory);
            Self {
                app,
                clock,
                outbox,
                created,
            }
        }

        fn advance(&mut self, millis: u64) {
            self.clock.advance(Duration::from_millis(millis));
            self.app.tick();
        }

        fn type_text(&mut self, text: &str) {
            for ch in text.chars() {
                self.app.dispatch(Action::InsertChar(ch));
            }
        }

        /// Open and play the bootstrap narration through to the composer.
        fn open_to_composer(&mut self) {
            self.app.dispatch(Action::Toggle);
            self.advance(800);
            for _ in 0..6 {
                self.advance(600);
            }
        }
    }

    #[test]
    fn test_controller_created_lazily() {
        let mut f = Fixture::new();
        assert_eq!(f.created.get(), 0);
        assert_eq!(f.app.focus(), Focus::Hidden);
        assert!(!f.app.dispatch(Action::Close));
        assert_eq!(f.created.get(), 0);

        f.app.dispatch(Action::Toggle);
        assert_eq!(f.created.get(), 1);
        assert_eq!(f.app.state().visibility, Visibility::Open);

        f.app.dispatch(Action::Toggle);
        f.app.dispatch(Action::Toggle);
        assert_eq!(f.created.get(), 1);
    }

    #[test]
    fn test_focus_follows_session() {
        let mut f = Fixture::new();
        f.app.dispatch(Action::Toggle);
        assert_eq!(f.app.focus(), Focus::Busy);

        f.advance(800);
        for _ in 0..6 {
            f.advance(600);
        }
        assert_eq!(f.app.focus(), Focus::Composer);

        f.app.dispatch(Action::Cancel);
        assert_eq!(f.app.focus(), Focus::Prompt);

        f.app.dispatch(Action::Close);
        assert_eq!(f.app.focus(), Focus::Hidden);
    }

    #[test]
    fn test_compose_and_send() {
        let mut f = Fixture::new();
        f.open_to_composer();
        assert_eq!(f.app.focus(), Focus::Composer);

        f.type_text("Lift 3");
        f.app.dispatch(Action::Newline);
        f.type_text("is stuck!x");
        f.app.dispatch(Action::Backspace);
        assert_eq!(
            f.app.state().composer.as_ref().unwrap().body,
            "Lift 3\nis stuck!"
        );

        assert!(f.app.dispatch(Action::Send));
        assert!(f.app.is_busy());
        assert_eq!(f.app.focus(), Focus::Busy);

        // pacing, then the transport is invoked at the fourth cue
        f.advance(800);
        f.advance(1200);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while f.outbox.sent.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let sent = f.outbox.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "Lift 3\nis stuck!");
        assert_eq!(sent[0].subject, "Message from Dashboard (Jan 5, 2:30 PM)");
    }

    #[test]
    fn test_prompt_input_and_submit() {
        let mut f = Fixture::new();
        f.open_to_composer();
        f.app.dispatch(Action::Cancel);

        f.type_text("helpx");
        f.app.dispatch(Action::Backspace);
        assert_eq!(f.app.input, "help");
        f.app.dispatch(Action::Submit);

        assert!(f.app.input.is_empty());
        let text = f.app.state().transcript_text();
        assert!(text.iter().any(|l| l == "USER@REPAIR_LIFT:~$ help"));
        assert!(text.iter().any(|l| l.contains("Available commands:")));
    }

    #[test]
    fn test_typing_ignored_while_busy() {
        let mut f = Fixture::new();
        f.app.dispatch(Action::Toggle);
        assert!(!f.app.dispatch(Action::InsertChar('a')));
        assert!(!f.app.dispatch(Action::Submit));
        assert!(f.app.input.is_empty());
    }

    #[test]
    fn test_hiding_clears_input_and_scroll() {
        let mut f = Fixture::new();
        f.open_to_composer();
        f.app.dispatch(Action::Cancel);
        f.type_text("draft");
        f.app.dispatch(Action::ScrollUp);
        assert_eq!(f.app.scroll, SCROLL_STEP);

        f.app.dispatch(Action::Minimize);
        assert_eq!(f.app.state().visibility, Visibility::Minimized);
        assert!(f.app.input.is_empty());
        assert_eq!(f.app.scroll, 0);
    }

    #[test]
    fn test_maximize_from_hidden_and_quit() {
        let mut f = Fixture::new();
        f.app.dispatch(Action::Maximize);
        assert_eq!(f.app.state().visibility, Visibility::Open);
        f.advance(600);
        assert_eq!(f.app.state().visibility, Visibility::Maximized);

        assert!(!f.app.dispatch(Action::Quit));
        assert!(f.app.should_quit);
    }

    #[test]
    fn test_next_deadline() {
        let mut f = Fixture::new();
        assert_eq!(f.app.next_deadline(), None);
        f.app.dispatch(Action::Toggle);
        assert_eq!(f.app.next_deadline(), Some(Duration::from_millis(800)));
    }
}
