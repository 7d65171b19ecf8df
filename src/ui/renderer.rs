//! Dashboard renderer using crossterm
//!
//! Paints the dashboard header, the terminal panel and its status bar.
//! Layout decisions live in [`super::layout`]; this module only turns
//! them into escape sequences.
//!
//! # Rendering
//!
//! ```text
//! begin_frame()  → Hide cursor, disable autowrap, start sync
//!     ↓
//! render content → header, panel title, body, status bar
//!     ↓
//! end_frame()    → Show cursor (if any), enable autowrap, end sync, flush
//! ```

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Attribute, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};
use unicode_width::UnicodeWidthStr;

use super::keymapper::Action;
use super::layout::{compose_body, mode_label, BodyInput, BodyView, PanelLayout, Rect, TOGGLE_LABEL};
use crate::app::App;
use crate::config::{Color, ColorScheme};
use crate::core::line::Line;
use crate::core::Visibility;

/// Begin a render frame (synchronized update, hide cursor, disable autowrap)
fn begin_frame<W: Write>(out: &mut W) -> io::Result<()> {
    write!(out, "\x1b[?2026h")?; // Begin synchronized update
    write!(out, "\x1b[?7l")?; // Disable autowrap
    queue!(out, Hide)?;
    Ok(())
}

/// End a render frame (enable autowrap, end synchronized update, flush)
fn end_frame<W: Write>(out: &mut W) -> io::Result<()> {
    write!(out, "\x1b[?7h")?;
    write!(out, "\x1b[?2026l")?;
    out.flush()?;
    Ok(())
}

/// Execute a render operation with frame guards, ensuring cleanup on error
fn with_frame<W: Write, F, R>(out: &mut W, f: F) -> io::Result<R>
where
    F: FnOnce(&mut W) -> io::Result<R>,
{
    begin_frame(out)?;
    let result = f(out);
    // Always end frame, even on error
    let _ = end_frame(out);
    result
}

/// Pad or cut `text` to exactly `width` display columns.
fn fit(text: &str, width: usize) -> String {
    let mut out = String::with_capacity(width);
    let mut used = 0;
    for ch in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.extend(std::iter::repeat(' ').take(width - used));
    out
}

/// Dashboard renderer
pub struct Renderer {
    initialized: bool,
    pub color_scheme: ColorScheme,
    show_time: bool,
    panel_height: u16,
    /// Layout of the last frame, for mouse hit testing
    layout: Option<PanelLayout>,
    /// Body of the last frame and its screen origin
    body: Option<(Rect, BodyView)>,
}

impl Renderer {
    pub fn new(color_scheme: ColorScheme, panel_height: u16, show_time: bool) -> Self {
        Self {
            initialized: false,
            color_scheme,
            show_time,
            panel_height,
            layout: None,
            body: None,
        }
    }

    /// Initialize the terminal
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;

        let mut stdout = io::stdout();
        execute!(
            stdout,
            terminal::EnterAlternateScreen,
            crossterm::event::EnableMouseCapture,
            Clear(ClearType::All)
        )?;
        stdout.flush()?;

        self.initialized = true;
        Ok(())
    }

    /// Cleanup
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }

        let mut stdout = io::stdout();

        // Restore terminal state (in case of abnormal exit)
        write!(stdout, "\x1b[?7h")?;
        write!(stdout, "\x1b[?2026l")?;
        stdout.flush()?;

        execute!(
            stdout,
            ResetColor,
            SetAttribute(Attribute::Reset),
            Show,
            crossterm::event::DisableMouseCapture,
            terminal::LeaveAlternateScreen
        )?;
        terminal::disable_raw_mode()?;
        self.initialized = false;
        Ok(())
    }

    /// Get terminal size
    pub fn size() -> io::Result<(u16, u16)> {
        terminal::size()
    }

    /// Action for a left click at screen coordinates, based on the last frame
    pub fn hit(&self, col: u16, row: u16) -> Option<Action> {
        if let Some((origin, ref body)) = self.body {
            if origin.contains(col, row) {
                return body.hit(col - origin.x, row - origin.y);
            }
        }
        self.layout.as_ref().and_then(|l| l.hit(col, row))
    }

    /// Draw a full frame for the application state
    pub fn render(&mut self, app: &App) -> io::Result<()> {
        let (cols, rows) = Self::size()?;
        let state = app.state();
        let layout = PanelLayout::compute(cols, rows, state.visibility, self.panel_height);

        let body = layout.body.map(|area| {
            let input = BodyInput {
                state,
                profile: app.profile(),
                input: &app.input,
                focus: app.focus(),
                scroll: app.scroll,
            };
            (area, compose_body(&input, area.width, area.height))
        });

        let stdout = io::stdout();
        let mut out = io::BufWriter::with_capacity(65536, stdout.lock());
        with_frame(&mut out, |out| {
            self.render_header(out, &layout, state.visibility)?;
            self.render_dashboard(out, &layout)?;
            if let Some(title) = layout.title {
                self.render_title(out, &layout, title)?;
            }
            if let Some((area, ref view)) = body {
                self.render_body(out, area, view)?;
            }
            if let Some(status) = layout.status {
                self.render_status_bar(out, app, status)?;
            }
            queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;

            if let Some((area, ref view)) = body {
                if let Some((row, col)) = view.cursor {
                    queue!(out, MoveTo(area.x + col, area.y + row), Show)?;
                }
            }
            Ok(())
        })?;

        self.layout = Some(layout);
        self.body = body;
        Ok(())
    }

    fn colors<W: Write>(&self, out: &mut W, fg: Color, bg: Color) -> io::Result<()> {
        queue!(
            out,
            SetForegroundColor(fg.to_crossterm()),
            SetBackgroundColor(bg.to_crossterm())
        )
    }

    /// Render the dashboard header with the terminal toggle button
    fn render_header<W: Write>(
        &self,
        out: &mut W,
        layout: &PanelLayout,
        visibility: Visibility,
    ) -> io::Result<()> {
        if layout.header.height == 0 {
            return Ok(());
        }
        let cs = &self.color_scheme;
        queue!(out, MoveTo(0, 0))?;
        self.colors(out, cs.header_fg, cs.header_bg)?;
        queue!(out, SetAttribute(Attribute::Bold))?;
        let title = " REPAIR LIFT // DASHBOARD";
        let left_width = layout.cols.saturating_sub(layout.toggle_button.width) as usize;
        write!(out, "{}", fit(title, left_width))?;
        queue!(out, SetAttribute(Attribute::Reset))?;

        // active button looks pressed
        if visibility.is_hidden() {
            self.colors(out, cs.header_fg, cs.header_bg)?;
        } else {
            self.colors(out, cs.button_fg, cs.button_bg)?;
        }
        queue!(out, MoveTo(layout.toggle_button.x, 0))?;
        write!(out, "{}", fit(TOGGLE_LABEL, layout.toggle_button.width as usize))?;
        queue!(out, ResetColor)?;
        Ok(())
    }

    /// Fill the space between the header and the panel
    fn render_dashboard<W: Write>(&self, out: &mut W, layout: &PanelLayout) -> io::Result<()> {
        let top = layout.header.height;
        let bottom = layout.panel.map(|p| p.y).unwrap_or(layout.rows);
        queue!(out, ResetColor)?;
        for row in top..bottom {
            queue!(out, MoveTo(0, row), Clear(ClearType::CurrentLine))?;
        }
        if bottom > top {
            let hint = "Press F2 or click [ TERMINAL ] to message the team";
            let row = top + (bottom - top) / 2;
            let col = (layout.cols as usize).saturating_sub(hint.width()) / 2;
            queue!(
                out,
                MoveTo(col as u16, row),
                SetForegroundColor(self.color_scheme.header_fg.to_crossterm())
            )?;
            write!(out, "{}", fit(hint, layout.cols as usize - col))?;
            queue!(out, ResetColor)?;
        }
        Ok(())
    }

    /// Render the panel title bar and window buttons
    fn render_title<W: Write>(&self, out: &mut W, layout: &PanelLayout, title: Rect) -> io::Result<()> {
        let cs = &self.color_scheme;
        queue!(out, MoveTo(title.x, title.y))?;
        self.colors(out, cs.title_fg, cs.title_bg)?;
        write!(out, "{}", fit(" REPAIR LIFT TERMINAL", title.width as usize))?;

        if let Some(buttons) = layout.buttons {
            for (rect, label) in [
                (buttons.minimize, "[_]"),
                (buttons.maximize, "[□]"),
                (buttons.close, "[×]"),
            ] {
                queue!(out, MoveTo(rect.x, rect.y))?;
                write!(out, "{}", label)?;
            }
        }
        queue!(out, ResetColor)?;
        Ok(())
    }

    /// Render the transcript/composer rows
    fn render_body<W: Write>(&self, out: &mut W, area: Rect, view: &BodyView) -> io::Result<()> {
        let cs = &self.color_scheme;
        for i in 0..area.height {
            queue!(out, MoveTo(area.x, area.y + i))?;
            match view.rows.get(i as usize) {
                Some(line) => self.render_line(out, line, area.width as usize)?,
                None => {
                    self.colors(out, cs.panel_fg, cs.panel_bg)?;
                    write!(out, "{:width$}", "", width = area.width as usize)?;
                }
            }
        }

        if view.scroll > 0 {
            let indicator = format!("[↑ {} lines]", view.scroll);
            let col = area.width.saturating_sub(indicator.width() as u16 + 1);
            queue!(out, MoveTo(area.x + col, area.y))?;
            self.colors(out, cs.status_mode_fg, cs.status_mode_bg)?;
            write!(out, "{}", indicator)?;
        }
        queue!(out, ResetColor)?;
        Ok(())
    }

    fn render_line<W: Write>(&self, out: &mut W, line: &Line, width: usize) -> io::Result<()> {
        let cs = &self.color_scheme;
        let mut used = 0;
        for span in &line.spans {
            if used >= width {
                break;
            }
            let text = fit(&span.text, span.text.width().min(width - used));
            self.colors(out, cs.tone(span.tone), cs.panel_bg)?;
            write!(out, "{}", text)?;
            used += text.width();
        }
        if used < width {
            self.colors(out, cs.panel_fg, cs.panel_bg)?;
            write!(out, "{:width$}", "", width = width - used)?;
        }
        Ok(())
    }

    /// Render the status bar: mode, recipient and the clock
    fn render_status_bar<W: Write>(&self, out: &mut W, app: &App, status: Rect) -> io::Result<()> {
        let cs = &self.color_scheme;
        let state = app.state();
        queue!(out, MoveTo(status.x, status.y))?;

        let mode = format!(" {} ", mode_label(state.mode));
        self.colors(out, cs.status_mode_fg, cs.status_mode_bg)?;
        write!(out, "{}", fit(&mode, status.width as usize))?;

        let rest = (status.width as usize).saturating_sub(mode.width());
        let left = format!(" TO: {}", app.profile().recipient);
        let right = if self.show_time {
            format!("{} ", app.local_now().format("%H:%M:%S"))
        } else {
            String::new()
        };
        let padding = rest.saturating_sub(left.width() + right.width());
        self.colors(out, cs.status_bar_fg, cs.status_bar_bg)?;
        let line = format!("{}{:padding$}{}", left, "", right, padding = padding);
        write!(out, "{}", fit(&line, rest))?;
        queue!(out, ResetColor)?;
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}
