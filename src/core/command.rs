//! Command-line parsing for the messaging terminal

/// Free text longer than this many characters is taken as a message.
pub const IMPLICIT_MESSAGE_MIN_LEN: usize = 5;

/// A parsed prompt line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Clear,
    About,
    Exit,
    /// `email`, `message` or `contact`
    Email,
    /// Unrecognized input, kept verbatim (trimmed)
    Text(String),
}

impl Command {
    /// Parse a raw input line. Returns `None` for blank input.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }

        let command = match trimmed.to_lowercase().as_str() {
            "help" => Self::Help,
            "clear" => Self::Clear,
            "about" => Self::About,
            "exit" => Self::Exit,
            "email" | "message" | "contact" => Self::Email,
            _ => Self::Text(trimmed.to_string()),
        };
        Some(command)
    }

    /// Whether unrecognized text is long enough to start a message.
    pub fn is_implicit_message(&self) -> bool {
        match self {
            Self::Text(text) => text.chars().count() > IMPLICIT_MESSAGE_MIN_LEN,
            _ => false,
        }
    }
}
