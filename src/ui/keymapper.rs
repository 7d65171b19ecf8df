//! Key mapping for the messaging terminal
//!
//! Converts key events to panel actions. What a key does depends on
//! where input is focused: the prompt line, the composer, or nowhere
//! (panel hidden or narration playing).

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// Where keystrokes currently go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    /// Panel closed or minimized
    Hidden,
    /// Command prompt accepts input
    Prompt,
    /// Composition surface accepts input
    Composer,
    /// Panel visible but input disabled
    Busy,
}

/// Something the user asked the terminal to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Toggle,
    Close,
    Minimize,
    Maximize,
    Submit,
    InsertChar(char),
    Backspace,
    Newline,
    Send,
    Cancel,
    ScrollUp,
    ScrollDown,
    Quit,
}

/// Key mapper for converting key events to actions
pub struct KeyMapper;

impl KeyMapper {
    /// Map a crossterm KeyEvent to an action
    pub fn map(event: &KeyEvent, focus: Focus) -> Option<Action> {
        if event.kind == KeyEventKind::Release {
            return None;
        }
        let mods = Modifiers::from(event.modifiers);

        if let Some(action) = Self::map_global(event.code, mods, focus) {
            return Some(action);
        }

        match focus {
            Focus::Hidden | Focus::Busy => None,
            Focus::Prompt => Self::map_prompt(event.code, mods),
            Focus::Composer => Self::map_composer(event.code, mods),
        }
    }

    /// Bindings that work regardless of focus
    fn map_global(code: KeyCode, mods: Modifiers, focus: Focus) -> Option<Action> {
        if mods.contains(Modifiers::CTRL) {
            match code {
                KeyCode::Char('q') | KeyCode::Char('c') => return Some(Action::Quit),
                KeyCode::Char('t') => return Some(Action::Toggle),
                _ => {}
            }
        }

        match code {
            KeyCode::F(2) => Some(Action::Toggle),
            KeyCode::F(3) => Some(Action::Maximize),
            KeyCode::F(4) => Some(Action::Minimize),
            // hidden panel: plain q quits, like a pager
            KeyCode::Char('q') if focus == Focus::Hidden && mods.is_empty() => Some(Action::Quit),
            KeyCode::Enter if focus == Focus::Hidden => Some(Action::Toggle),
            KeyCode::PageUp if focus != Focus::Hidden => Some(Action::ScrollUp),
            KeyCode::PageDown if focus != Focus::Hidden => Some(Action::ScrollDown),
            KeyCode::Esc if focus == Focus::Busy => Some(Action::Close),
            _ => None,
        }
    }

    fn map_prompt(code: KeyCode, mods: Modifiers) -> Option<Action> {
        match code {
            KeyCode::Enter => Some(Action::Submit),
            KeyCode::Backspace => Some(Action::Backspace),
            KeyCode::Esc => Some(Action::Close),
            KeyCode::Char(ch) if !mods.intersects(Modifiers::CTRL | Modifiers::ALT) => {
                Some(Action::InsertChar(ch))
            }
            _ => None,
        }
    }

    fn map_composer(code: KeyCode, mods: Modifiers) -> Option<Action> {
        match code {
            KeyCode::Char('s') if mods.contains(Modifiers::CTRL) => Some(Action::Send),
            KeyCode::Enter if mods.intersects(Modifiers::CTRL | Modifiers::ALT) => {
                Some(Action::Send)
            }
            KeyCode::Enter => Some(Action::Newline),
            KeyCode::Backspace => Some(Action::Backspace),
            KeyCode::Esc => Some(Action::Cancel),
            KeyCode::Tab => Some(Action::InsertChar('\t')),
            KeyCode::Char(ch) if !mods.intersects(Modifiers::CTRL | Modifiers::ALT) => {
                Some(Action::InsertChar(ch))
            }
            _ => None,
        }
    }
}
