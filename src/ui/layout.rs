//! Screen layout for the dashboard and the terminal panel
//!
//! Everything here is pure: it turns sizes and session state into
//! rectangles and rows, and the renderer only paints what it is given.
//!
//! ```text
//! row 0        dashboard header                  [ TERMINAL ]
//!              (dashboard area)
//! panel.y      title bar  REPAIR LIFT TERMINAL        [_][□][×]
//!              body: transcript, composer, prompt
//! last row     status bar  MODE  recipient             HH:MM:SS
//! ```

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::core::line::{Line, Span, Tone};
use crate::core::state::{Controls, CANCEL_LABEL};
use crate::core::{Mode, Profile, TerminalState, Visibility};
use crate::ui::keymapper::{Action, Focus};

pub const TOGGLE_LABEL: &str = "[ TERMINAL ]";
const BUTTON_WIDTH: u16 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub const fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, col: u16, row: u16) -> bool {
        col >= self.x
            && row >= self.y
            && col < self.x.saturating_add(self.width)
            && row < self.y.saturating_add(self.height)
    }
}

/// Title bar window controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowButtons {
    pub minimize: Rect,
    pub maximize: Rect,
    pub close: Rect,
}

/// Where everything goes for a given screen size and visibility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelLayout {
    pub cols: u16,
    pub rows: u16,
    pub header: Rect,
    pub toggle_button: Rect,
    /// Whole panel; `None` when closed
    pub panel: Option<Rect>,
    pub title: Option<Rect>,
    pub buttons: Option<WindowButtons>,
    /// Transcript area; `None` when minimized or too small
    pub body: Option<Rect>,
    pub status: Option<Rect>,
}

impl PanelLayout {
    pub fn compute(cols: u16, rows: u16, visibility: Visibility, panel_height: u16) -> Self {
        let header = Rect::new(0, 0, cols, rows.min(1));
        let toggle_width = (TOGGLE_LABEL.len() as u16).min(cols);
        let toggle_button = Rect::new(cols - toggle_width, 0, toggle_width, header.height);

        let available = rows.saturating_sub(header.height);
        let height = match visibility {
            Visibility::Closed => 0,
            Visibility::Minimized => available.min(1),
            Visibility::Open => panel_height.clamp(1, available.max(1)).min(available),
            Visibility::Maximized => available,
        };

        let mut layout = Self {
            cols,
            rows,
            header,
            toggle_button,
            panel: None,
            title: None,
            buttons: None,
            body: None,
            status: None,
        };
        if height == 0 {
            return layout;
        }

        let panel = Rect::new(0, rows - height, cols, height);
        let title = Rect::new(0, panel.y, cols, 1);
        layout.panel = Some(panel);
        layout.title = Some(title);
        layout.buttons = Self::window_buttons(title);

        if height >= 3 {
            layout.body = Some(Rect::new(0, panel.y + 1, cols, height - 2));
            layout.status = Some(Rect::new(0, panel.y + height - 1, cols, 1));
        }
        layout
    }

    fn window_buttons(title: Rect) -> Option<WindowButtons> {
        // three buttons plus a trailing space
        if title.width < BUTTON_WIDTH * 3 + 1 {
            return None;
        }
        let close_x = title.width - BUTTON_WIDTH - 1;
        Some(WindowButtons {
            minimize: Rect::new(close_x - 2 * BUTTON_WIDTH, title.y, BUTTON_WIDTH, 1),
            maximize: Rect::new(close_x - BUTTON_WIDTH, title.y, BUTTON_WIDTH, 1),
            close: Rect::new(close_x, title.y, BUTTON_WIDTH, 1),
        })
    }

    /// Action for a left click on the chrome (header button, title bar).
    pub fn hit(&self, col: u16, row: u16) -> Option<Action> {
        if self.toggle_button.contains(col, row) {
            return Some(Action::Toggle);
        }
        if let Some(buttons) = self.buttons {
            if buttons.minimize.contains(col, row) {
                return Some(Action::Minimize);
            }
            if buttons.maximize.contains(col, row) {
                return Some(Action::Maximize);
            }
            if buttons.close.contains(col, row) {
                return Some(Action::Close);
            }
        }
        match self.title {
            Some(title) if title.contains(col, row) => Some(Action::Toggle),
            _ => None,
        }
    }
}

/// Rendered contents of the panel body
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BodyView {
    /// Rows to paint, top to bottom, each at most `width` columns
    pub rows: Vec<Line>,
    /// Send and Cancel buttons, relative to the body origin
    pub send_button: Option<Rect>,
    pub cancel_button: Option<Rect>,
    pub send_enabled: bool,
    /// Cursor position relative to the body origin
    pub cursor: Option<(u16, u16)>,
    /// Effective scroll after clamping
    pub scroll: usize,
}

impl BodyView {
    /// Action for a click at body-relative coordinates
    pub fn hit(&self, col: u16, row: u16) -> Option<Action> {
        match (self.send_button, self.cancel_button) {
            (Some(send), _) if self.send_enabled && send.contains(col, row) => Some(Action::Send),
            (_, Some(cancel)) if self.send_enabled && cancel.contains(col, row) => {
                Some(Action::Cancel)
            }
            _ => None,
        }
    }
}

/// What the panel body shows
pub struct BodyInput<'a> {
    pub state: &'a TerminalState,
    pub profile: &'a Profile,
    pub input: &'a str,
    pub focus: Focus,
    pub scroll: usize,
}

/// Logical rows before wrapping, with markers for the rows that need
/// a cursor or hold the buttons.
struct Logical {
    lines: Vec<Line>,
    buttons: Option<usize>,
    cursor_line: Option<usize>,
}

/// Lay the transcript, composer and prompt out into `width` x `height`.
pub fn compose_body(view: &BodyInput<'_>, width: u16, height: u16) -> BodyView {
    if width == 0 || height == 0 {
        return BodyView::default();
    }

    let logical = logical_lines(view);

    // wrap, remembering where each logical line ended up
    let mut rows = Vec::new();
    let mut buttons_row = None;
    let mut cursor_row = None;
    for (i, line) in logical.lines.iter().enumerate() {
        let wrapped = wrap(line, width as usize);
        if logical.buttons == Some(i) {
            buttons_row = Some(rows.len());
        }
        rows.extend(wrapped);
        if logical.cursor_line == Some(i) {
            cursor_row = Some(rows.len() - 1);
        }
    }

    let height = height as usize;
    let max_scroll = rows.len().saturating_sub(height);
    let scroll = view.scroll.min(max_scroll);
    let end = rows.len() - scroll;
    let start = end.saturating_sub(height);
    let visible: Vec<Line> = rows[start..end].to_vec();

    let to_visible = |row: usize| -> Option<u16> {
        (row >= start && row < end).then(|| (row - start) as u16)
    };

    let mut result = BodyView {
        send_enabled: view.state.controls.contains(Controls::SEND),
        scroll,
        ..BodyView::default()
    };

    if let (Some(row), Some(composer)) = (buttons_row.and_then(to_visible), view.state.composer.as_ref()) {
        let send_width = button_text(composer.send_label).width() as u16;
        let cancel_width = button_text(CANCEL_LABEL).width() as u16;
        result.send_button = Some(Rect::new(0, row, send_width, 1));
        result.cancel_button = Some(Rect::new(send_width + 2, row, cancel_width, 1));
    }

    if let Some(row) = cursor_row.and_then(to_visible) {
        let col = visible[row as usize].plain_text().width() as u16;
        result.cursor = Some((row, col.min(width - 1)));
    }

    result.rows = visible;
    result
}

fn logical_lines(view: &BodyInput<'_>) -> Logical {
    let state = view.state;
    let mut lines = state.transcript.clone();
    let mut buttons = None;
    let mut cursor_line = None;

    if let Some(ref composer) = state.composer {
        let (subject, to) = match state.draft {
            Some(ref draft) => (draft.subject.clone(), draft.to().to_string()),
            None => (String::new(), view.profile.recipient.clone()),
        };
        let status = if state.mode == Mode::Sending { "SENDING" } else { "DRAFT" };

        lines.push(Line::labeled(
            "TO",
            format!("{} <{}>", view.profile.recipient_name, to),
            Tone::Plain,
        ));
        lines.push(Line::labeled("SUBJECT", subject, Tone::Plain));
        lines.push(Line::labeled("STATUS", status, Tone::Warning));
        lines.push(Line::new(vec![Span::new("MESSAGE:", Tone::Prompt)]));
        for text in composer.body.split('\n') {
            lines.push(Line::new(vec![
                Span::new("> ", Tone::Prompt),
                Span::plain(text),
            ]));
        }
        if view.focus == Focus::Composer {
            cursor_line = Some(lines.len() - 1);
        }

        let send_tone = if state.controls.contains(Controls::SEND) {
            Tone::Success
        } else {
            Tone::Loading
        };
        buttons = Some(lines.len());
        lines.push(Line::new(vec![
            Span::new(button_text(composer.send_label), send_tone),
            Span::plain("  "),
            Span::new(button_text(CANCEL_LABEL), Tone::Warning),
        ]));
    }

    if state.mode == Mode::Command {
        let input = if view.focus == Focus::Prompt { view.input } else { "" };
        lines.push(Line::new(vec![
            Span::new(view.profile.prompt.clone(), Tone::Prompt),
            Span::plain(" "),
            Span::new(input, Tone::Command),
        ]));
        if view.focus == Focus::Prompt {
            cursor_line = Some(lines.len() - 1);
        }
    }

    Logical {
        lines,
        buttons,
        cursor_line,
    }
}

fn button_text(label: &str) -> String {
    format!("[ {} ]", label)
}

/// Split a line into rows of at most `width` display columns.
/// Always returns at least one row.
pub fn wrap(line: &Line, width: usize) -> Vec<Line> {
    let mut rows = Vec::new();
    let mut current: Vec<Span> = Vec::new();
    let mut used = 0;

    for span in &line.spans {
        let mut text = String::new();
        for ch in span.text.chars() {
            let w = ch.width().unwrap_or(0);
            if used + w > width && used > 0 {
                if !text.is_empty() {
                    current.push(Span::new(std::mem::take(&mut text), span.tone));
                }
                rows.push(Line::new(std::mem::take(&mut current)));
                used = 0;
            }
            text.push(ch);
            used += w;
        }
        if !text.is_empty() {
            current.push(Span::new(text, span.tone));
        }
    }

    if !current.is_empty() || rows.is_empty() {
        rows.push(Line::new(current));
    }
    rows
}

/// Status bar label for the current mode
pub fn mode_label(mode: Mode) -> &'static str {
    match mode {
        Mode::Command => "COMMAND",
        Mode::EmailSubjectPending => "CONNECTING",
        Mode::EmailComposing => "COMPOSING",
        Mode::Sending => "SENDING",
    }
}
