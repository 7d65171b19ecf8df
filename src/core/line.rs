//! Structured transcript lines
//!
//! A line is a list of styled spans. The controller only decides what a
//! line says and which tone each part carries; colors are chosen by the
//! renderer from the active color scheme.

/// Visual tone of a span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    /// Line label such as `SYSTEM:` or the user prompt
    Prompt,
    /// In-progress narration
    Loading,
    Success,
    Warning,
    Error,
    /// Command names inside hints
    Command,
    Separator,
}

/// A run of text with a single tone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub tone: Tone,
}

impl Span {
    pub fn new(text: impl Into<String>, tone: Tone) -> Self {
        Self { text: text.into(), tone }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, Tone::Plain)
    }

    pub fn command(text: impl Into<String>) -> Self {
        Self::new(text, Tone::Command)
    }
}

/// One transcript line
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Line {
    pub spans: Vec<Span>,
}

impl Line {
    pub fn new(spans: Vec<Span>) -> Self {
        Self { spans }
    }

    /// `LABEL: text` with the text in the given tone
    pub fn labeled(label: &str, text: impl Into<String>, tone: Tone) -> Self {
        Self::new(vec![
            Span::new(format!("{}:", label), Tone::Prompt),
            Span::plain(" "),
            Span::new(text, tone),
        ])
    }

    /// `LABEL: ` followed by arbitrary spans
    pub fn labeled_spans(label: &str, rest: Vec<Span>) -> Self {
        let mut spans = vec![Span::new(format!("{}:", label), Tone::Prompt), Span::plain(" ")];
        spans.extend(rest);
        Self::new(spans)
    }

    pub fn system(text: impl Into<String>, tone: Tone) -> Self {
        Self::labeled("SYSTEM", text, tone)
    }

    /// `-----[ TITLE ]-----`
    pub fn separator(title: &str) -> Self {
        Self::new(vec![Span::new(format!("-----[ {} ]-----", title), Tone::Separator)])
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(vec![Span::new(text, Tone::Error)])
    }

    /// Echo of user input behind the prompt
    pub fn echo(prompt: &str, input: &str) -> Self {
        Self::new(vec![
            Span::new(prompt, Tone::Prompt),
            Span::plain(" "),
            Span::plain(input),
        ])
    }

    /// Text content without styling
    pub fn plain_text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }
}

/// Shorten `text` to `limit` characters, appending `...` when cut.
pub fn preview(text: &str, limit: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
