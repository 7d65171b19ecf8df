//! Configuration and color scheme management for liftterm.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.liftterm/config.toml`
//! - Environment overrides for SMTP credentials
//! - Built-in color schemes for the terminal panel
//!
//! # Configuration File
//!
//! ```toml
//! # Color scheme: default, dracula, tokyo-night, solarized-light
//! color_scheme = "tokyo-night"
//!
//! [terminal]
//! prompt = "USER@REPAIR_LIFT:~$"
//! panel_height = 12
//!
//! [transport]
//! kind = "http"            # or "direct"
//! endpoint = "http://127.0.0.1:8025/send-email"
//!
//! [relay]
//! listen = "127.0.0.1:8025"
//! backend = "smtp"         # or "sendmail"
//!
//! [relay.smtp]
//! host = "localhost"
//! port = 25
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::core::line::Tone;
use crate::core::Profile;
use crate::mail::smtp::Credentials;
use crate::mail::{Mailer, SendmailMailer, SmtpMailer};
use crate::relay::RelaySettings;

pub const USERNAME_ENV: &str = "LIFTTERM_SMTP_USERNAME";
pub const PASSWORD_ENV: &str = "LIFTTERM_SMTP_PASSWORD";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Color scheme name
    pub color_scheme: String,
    pub terminal: TerminalConfig,
    pub transport: TransportConfig,
    pub relay: RelayConfig,
}

/// Terminal panel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub prompt: String,
    pub recipient: String,
    pub recipient_name: String,
    pub product: String,
    /// Rows used by the panel when open (not maximized)
    pub panel_height: u16,
    pub show_time: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        let profile = Profile::default();
        Self {
            prompt: profile.prompt,
            recipient: profile.recipient,
            recipient_name: profile.recipient_name,
            product: profile.product,
            panel_height: 12,
            show_time: true,
        }
    }
}

impl TerminalConfig {
    pub fn profile(&self) -> Profile {
        Profile {
            prompt: self.prompt.clone(),
            recipient: self.recipient.clone(),
            recipient_name: self.recipient_name.clone(),
            product: self.product.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// POST to a relay endpoint
    #[default]
    Http,
    /// Run the relay handler in-process
    Direct,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Http,
            endpoint: "http://127.0.0.1:8025/send-email".to_string(),
            timeout_secs: 10,
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailBackend {
    #[default]
    Smtp,
    Sendmail,
}

/// Relay settings, shared by `--relay` and the direct transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub listen: String,
    pub path: String,
    pub from: String,
    pub to: String,
    pub reply_to: Option<String>,
    pub subject_prefix: String,
    pub backend: MailBackend,
    pub smtp: SmtpConfig,
    pub sendmail: SendmailConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let settings = RelaySettings::default();
        Self {
            listen: "127.0.0.1:8025".to_string(),
            path: "/send-email".to_string(),
            from: settings.from,
            to: settings.to,
            reply_to: settings.reply_to,
            subject_prefix: settings.subject_prefix,
            backend: MailBackend::Smtp,
            smtp: SmtpConfig::default(),
            sendmail: SendmailConfig::default(),
        }
    }
}

impl RelayConfig {
    pub fn settings(&self) -> RelaySettings {
        RelaySettings {
            from: self.from.clone(),
            to: self.to.clone(),
            reply_to: self.reply_to.clone().filter(|r| !r.trim().is_empty()),
            subject_prefix: self.subject_prefix.clone(),
        }
    }

    /// Build the configured mail backend
    pub fn mailer(&self) -> Arc<dyn Mailer> {
        match self.backend {
            MailBackend::Smtp => Arc::new(
                SmtpMailer::new(
                    &self.smtp.host,
                    self.smtp.port,
                    &self.smtp.helo,
                    Duration::from_secs(self.smtp.timeout_secs.max(1)),
                )
                .with_credentials(self.smtp.credentials()),
            ),
            MailBackend::Sendmail => Arc::new(SendmailMailer::new(&self.sendmail.path)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub helo: String,
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            username: None,
            password: None,
            helo: "localhost".to_string(),
            timeout_secs: 10,
        }
    }
}

impl SmtpConfig {
    /// Credentials are used only when both halves are present.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) if !username.is_empty() => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SendmailConfig {
    pub path: PathBuf,
}

impl Default for SendmailConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/usr/sbin/sendmail"),
        }
    }
}

impl Config {
    /// Load `~/.liftterm/config.toml`, falling back to defaults when absent.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match config_dir().map(|d| d.join("config.toml")) {
            Some(path) if path.exists() => Self::read(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load an explicitly named file; a missing file is an error here.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read(path)?;
        config.apply_env();
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Override SMTP credentials from the environment
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(username) = lookup(USERNAME_ENV) {
            self.relay.smtp.username = Some(username);
        }
        if let Some(password) = lookup(PASSWORD_ENV) {
            self.relay.smtp.password = Some(password);
        }
    }

    /// Get the color scheme
    pub fn get_color_scheme(&self) -> ColorScheme {
        let known = ColorScheme::list();
        if !known.iter().any(|n| n.eq_ignore_ascii_case(&self.color_scheme)) {
            warn!(
                "Unknown color scheme '{}', using default (available: {})",
                self.color_scheme,
                known.join(", ")
            );
        }
        ColorScheme::by_name(&self.color_scheme)
    }
}

/// `~/.liftterm`, created on first use
pub fn config_dir() -> Option<PathBuf> {
    let dir = home_dir()?.join(".liftterm");
    if !dir.exists() {
        let _ = fs::create_dir_all(&dir);
    }
    Some(dir)
}

/// Color definition (RGB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to crossterm Color
    pub fn to_crossterm(&self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Color scheme definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorScheme {
    pub name: String,

    // Dashboard header
    pub header_bg: Color,
    pub header_fg: Color,

    // Terminal panel
    pub panel_bg: Color,
    pub panel_fg: Color,
    pub border: Color,
    pub title_bg: Color,
    pub title_fg: Color,

    // Status bar
    pub status_bar_bg: Color,
    pub status_bar_fg: Color,
    pub status_mode_bg: Color,
    pub status_mode_fg: Color,

    // Transcript tones
    pub prompt: Color,
    pub loading: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub command: Color,
    pub separator: Color,

    // Composer buttons
    pub button_bg: Color,
    pub button_fg: Color,
    pub button_disabled_fg: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self::default_scheme()
    }
}

impl ColorScheme {
    /// Green-on-black console look
    pub fn default_scheme() -> Self {
        Self {
            name: "default".to_string(),

            header_bg: Color::new(30, 41, 59),
            header_fg: Color::new(226, 232, 240),

            panel_bg: Color::new(10, 10, 10),
            panel_fg: Color::new(0, 255, 65),
            border: Color::new(0, 160, 40),
            title_bg: Color::new(20, 20, 20),
            title_fg: Color::new(0, 255, 65),

            status_bar_bg: Color::new(0, 100, 0),
            status_bar_fg: Color::new(255, 255, 255),
            status_mode_bg: Color::new(200, 200, 0),
            status_mode_fg: Color::new(0, 0, 0),

            prompt: Color::new(0, 255, 65),
            loading: Color::new(120, 200, 255),
            success: Color::new(0, 255, 65),
            warning: Color::new(255, 200, 0),
            error: Color::new(255, 80, 80),
            command: Color::new(255, 255, 255),
            separator: Color::new(0, 160, 40),

            button_bg: Color::new(0, 100, 0),
            button_fg: Color::new(255, 255, 255),
            button_disabled_fg: Color::new(120, 120, 120),
        }
    }

    /// Dracula scheme
    pub fn dracula() -> Self {
        Self {
            name: "dracula".to_string(),

            header_bg: Color::new(68, 71, 90),
            header_fg: Color::new(248, 248, 242),

            panel_bg: Color::new(40, 42, 54),
            panel_fg: Color::new(248, 248, 242),
            border: Color::new(189, 147, 249),
            title_bg: Color::new(68, 71, 90),
            title_fg: Color::new(248, 248, 242),

            status_bar_bg: Color::new(68, 71, 90),
            status_bar_fg: Color::new(248, 248, 242),
            status_mode_bg: Color::new(80, 250, 123),
            status_mode_fg: Color::new(40, 42, 54),

            prompt: Color::new(80, 250, 123),
            loading: Color::new(139, 233, 253),
            success: Color::new(80, 250, 123),
            warning: Color::new(241, 250, 140),
            error: Color::new(255, 85, 85),
            command: Color::new(248, 248, 242),
            separator: Color::new(98, 114, 164),

            button_bg: Color::new(189, 147, 249),
            button_fg: Color::new(40, 42, 54),
            button_disabled_fg: Color::new(98, 114, 164),
        }
    }

    /// Tokyo Night scheme
    pub fn tokyo_night() -> Self {
        Self {
            name: "tokyo-night".to_string(),

            header_bg: Color::new(36, 40, 59),
            header_fg: Color::new(169, 177, 214),

            panel_bg: Color::new(26, 27, 38),
            panel_fg: Color::new(192, 202, 245),
            border: Color::new(122, 162, 247),
            title_bg: Color::new(36, 40, 59),
            title_fg: Color::new(192, 202, 245),

            status_bar_bg: Color::new(36, 40, 59),
            status_bar_fg: Color::new(169, 177, 214),
            status_mode_bg: Color::new(158, 206, 106),
            status_mode_fg: Color::new(26, 27, 38),

            prompt: Color::new(158, 206, 106),
            loading: Color::new(125, 207, 255),
            success: Color::new(158, 206, 106),
            warning: Color::new(224, 175, 104),
            error: Color::new(247, 118, 142),
            command: Color::new(192, 202, 245),
            separator: Color::new(86, 95, 137),

            button_bg: Color::new(122, 162, 247),
            button_fg: Color::new(26, 27, 38),
            button_disabled_fg: Color::new(86, 95, 137),
        }
    }

    /// Solarized Light scheme
    pub fn solarized_light() -> Self {
        Self {
            name: "solarized-light".to_string(),

            header_bg: Color::new(238, 232, 213),
            header_fg: Color::new(88, 110, 117),

            panel_bg: Color::new(253, 246, 227),
            panel_fg: Color::new(101, 123, 131),
            border: Color::new(38, 139, 210),
            title_bg: Color::new(238, 232, 213),
            title_fg: Color::new(88, 110, 117),

            status_bar_bg: Color::new(238, 232, 213),
            status_bar_fg: Color::new(101, 123, 131),
            status_mode_bg: Color::new(181, 137, 0),
            status_mode_fg: Color::new(253, 246, 227),

            prompt: Color::new(133, 153, 0),
            loading: Color::new(38, 139, 210),
            success: Color::new(133, 153, 0),
            warning: Color::new(181, 137, 0),
            error: Color::new(220, 50, 47),
            command: Color::new(7, 54, 66),
            separator: Color::new(147, 161, 161),

            button_bg: Color::new(38, 139, 210),
            button_fg: Color::new(253, 246, 227),
            button_disabled_fg: Color::new(147, 161, 161),
        }
    }

    /// Get scheme by name
    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "dracula" => Self::dracula(),
            "tokyo-night" | "tokyo_night" | "tokyonight" => Self::tokyo_night(),
            "solarized-light" | "solarized_light" => Self::solarized_light(),
            _ => Self::default_scheme(),
        }
    }

    /// List available schemes
    pub fn list() -> Vec<&'static str> {
        vec!["default", "dracula", "tokyo-night", "solarized-light"]
    }

    /// Foreground color for a transcript tone
    pub fn tone(&self, tone: Tone) -> Color {
        match tone {
            Tone::Plain => self.panel_fg,
            Tone::Prompt => self.prompt,
            Tone::Loading => self.loading,
            Tone::Success => self.success,
            Tone::Warning => self.warning,
            Tone::Error => self.error,
            Tone::Command => self.command,
            Tone::Separator => self.separator,
        }
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
