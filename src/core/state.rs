//! Terminal session state
//!
//! Everything the view layer needs to draw the messaging terminal lives
//! here. Only the controller mutates it.

use bitflags::bitflags;

use super::line::Line;

/// Panel visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Closed,
    Open,
    Minimized,
    Maximized,
}

impl Visibility {
    /// Closed and Minimized both hide the body.
    pub fn is_hidden(self) -> bool {
        matches!(self, Visibility::Closed | Visibility::Minimized)
    }
}

/// How the next input is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Command,
    /// Email bootstrap narration is playing; input is disabled
    EmailSubjectPending,
    /// Composition surface is shown
    EmailComposing,
    /// A send is paced or in flight
    Sending,
}

bitflags! {
    /// Enabled state of the interactive controls
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Controls: u8 {
        const INPUT  = 0b001;
        const SEND   = 0b010;
        const CANCEL = 0b100;
    }
}

impl Default for Controls {
    fn default() -> Self {
        Controls::INPUT
    }
}

/// The email being composed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    to: String,
    pub subject: String,
    pub body: String,
}

impl Draft {
    pub fn new(to: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: String::new(),
            body: String::new(),
        }
    }

    /// Fixed recipient
    pub fn to(&self) -> &str {
        &self.to
    }
}

pub const SEND_LABEL: &str = "SEND MESSAGE";
pub const SENDING_LABEL: &str = "SENDING...";
pub const CANCEL_LABEL: &str = "CANCEL";

/// Message composition surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composer {
    pub body: String,
    pub send_label: &'static str,
}

impl Composer {
    pub fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
            send_label: SEND_LABEL,
        }
    }

    pub fn insert(&mut self, ch: char) {
        self.body.push(ch);
    }

    pub fn backspace(&mut self) {
        self.body.pop();
    }
}

/// Full session state
#[derive(Debug, Clone, Default)]
pub struct TerminalState {
    pub visibility: Visibility,
    pub mode: Mode,
    pub transcript: Vec<Line>,
    pub draft: Option<Draft>,
    pub composer: Option<Composer>,
    pub controls: Controls,
}

impl TerminalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: Line) {
        self.transcript.push(line);
    }

    pub fn input_enabled(&self) -> bool {
        self.controls.contains(Controls::INPUT)
    }

    /// Back to defaults, keeping the given visibility.
    pub fn reset(&mut self, visibility: Visibility) {
        *self = Self {
            visibility,
            ..Self::default()
        };
    }

    /// Plain-text view of the transcript
    #[cfg(test)]
    pub fn transcript_text(&self) -> Vec<String> {
        self.transcript.iter().map(Line::plain_text).collect()
    }
}
