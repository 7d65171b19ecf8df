//! Messaging terminal core.
//!
//! This module contains the session logic of the terminal, independent of
//! any rendering:
//!
//! - **state**: visibility, input mode, transcript, draft and composer
//! - **controller**: the state machine driving the session
//! - **command**: prompt line parsing
//! - **narration**: timed cue scheduler
//! - **line**: structured transcript lines
//! - **clock**: time source abstraction
//!
//! # Architecture
//!
//! ```text
//! TerminalController
//! ├── TerminalState (what the view renders)
//! ├── Scheduler<Step> (narration timers)
//! ├── MailTransport (worker thread + reply channel)
//! └── Clock
//! ```

pub mod clock;
pub mod command;
pub mod controller;
pub mod line;
pub mod narration;
pub mod state;

pub use clock::{SharedClock, SystemClock};
pub use controller::{Profile, TerminalController};
pub use state::{Mode, TerminalState, Visibility};
