//! liftterm - the Repair Lift messaging terminal
//!
//! A full-screen dashboard with a drop-down messaging terminal. Opening the
//! terminal plays a short connection sequence and drops straight into an
//! email composer addressed to the support contact. Messages go out through
//! a small HTTP mail relay, which this binary can also run.
//!
//! # Quick Start
//!
//! ```text
//! liftterm --relay            # start the relay on 127.0.0.1:8025
//! liftterm                    # start the dashboard, talking to that relay
//! liftterm --direct           # dashboard with the relay built in
//! ```
//!
//! # Keybindings
//!
//! | Key | Action |
//! |-----|--------|
//! | F2 / Ctrl+T | Open or close the terminal |
//! | F3 | Maximize / restore |
//! | F4 | Minimize |
//! | Ctrl+S | Send the message |
//! | Esc | Cancel the message (composer) or close (prompt) |
//! | Ctrl+Q | Quit |

mod app;
mod config;
mod core;
mod mail;
mod relay;
mod ui;

use std::env;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, MouseButton, MouseEventKind};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::app::App;
use crate::config::{Config, TransportKind};
use crate::core::{SystemClock, TerminalController};
use crate::mail::{HttpTransport, MailTransport};
use crate::relay::{DirectTransport, RelayServer};
use crate::ui::{Action, KeyMapper, Renderer};

/// Command line options
#[derive(Debug, Default)]
struct Options {
    /// Explicit config file
    config_path: Option<PathBuf>,
    /// Relay endpoint override (implies the HTTP transport)
    endpoint: Option<String>,
    /// Run the relay handler in-process
    direct: bool,
    /// Run the relay server instead of the dashboard
    relay: bool,
    /// Relay listen address override
    listen: Option<String>,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Longest the event loop sleeps when nothing is scheduled; keeps the
/// status bar clock ticking.
const IDLE_POLL: Duration = Duration::from_millis(250);

fn print_version() {
    eprintln!("liftterm {}", VERSION);
}

fn print_help() {
    eprintln!("liftterm {} - Repair Lift messaging terminal", VERSION);
    eprintln!();
    eprintln!("Usage: liftterm [OPTIONS]");
    eprintln!();
    eprintln!("Mode options:");
    eprintln!("  (default)             Dashboard with messaging terminal");
    eprintln!("  -r, --relay           Run the HTTP mail relay");
    eprintln!();
    eprintln!("Dashboard options:");
    eprintln!("  -e, --endpoint <URL>  Relay endpoint (default from config.toml)");
    eprintln!("      --direct          Deliver through the built-in relay handler");
    eprintln!();
    eprintln!("Relay options:");
    eprintln!("  -l, --listen <ADDR>   Listen address (default 127.0.0.1:8025)");
    eprintln!();
    eprintln!("Other options:");
    eprintln!("  -c, --config <PATH>   Configuration file (default ~/.liftterm/config.toml)");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Keybindings:");
    eprintln!("  F2, Ctrl+T            Open / close the terminal");
    eprintln!("  F3                    Maximize / restore");
    eprintln!("  F4                    Minimize");
    eprintln!("  Enter                 Run command (prompt) / new line (composer)");
    eprintln!("  Ctrl+S, Ctrl+Enter    Send message");
    eprintln!("  Esc                   Cancel message / close terminal");
    eprintln!("  PageUp, PageDown      Scroll transcript");
    eprintln!("  Ctrl+Q                Quit");
    eprintln!();
    eprintln!("Terminal commands: help, clear, about, exit, email (message, contact)");
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();
    let mut options = Options::default();
    let mut i = 1;

    // value for an option that takes one
    fn value(args: &[String], i: &mut usize, name: &str) -> Result<String, String> {
        *i += 1;
        args.get(*i)
            .cloned()
            .ok_or_else(|| format!("Missing argument for {}", name))
    }

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-c" | "--config" => {
                options.config_path = Some(PathBuf::from(value(&args, &mut i, "--config")?));
            }
            "-e" | "--endpoint" => {
                options.endpoint = Some(value(&args, &mut i, "--endpoint")?);
            }
            "--direct" => {
                options.direct = true;
            }
            "-r" | "--relay" => {
                options.relay = true;
            }
            "-l" | "--listen" => {
                options.listen = Some(value(&args, &mut i, "--listen")?);
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    if options.direct && options.endpoint.is_some() {
        return Err("--direct and --endpoint cannot be combined".to_string());
    }
    Ok(options)
}

/// Log to ~/.liftterm/liftterm.log; stdout belongs to the TUI.
fn init_file_logging() {
    let log_path = config::config_dir()
        .map(|d| d.join("liftterm.log"))
        .unwrap_or_else(|| PathBuf::from("liftterm.log"));

    // Open log file (append mode)
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::INFO)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// Relay logs go to stderr, filtered by RUST_LOG.
fn init_stderr_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let options = match parse_args() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    if options.relay {
        init_stderr_logging();
    } else {
        init_file_logging();
    }
    info!("liftterm {} starting...", VERSION);

    let mut config = match options.config_path {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(ref endpoint) = options.endpoint {
        config.transport.kind = TransportKind::Http;
        config.transport.endpoint = endpoint.clone();
    }
    if options.direct {
        config.transport.kind = TransportKind::Direct;
    }
    if let Some(ref listen) = options.listen {
        config.relay.listen = listen.clone();
    }

    if options.relay {
        run_relay(&config)
    } else {
        run_terminal(&config)
    }
}

/// Run the HTTP mail relay until the process is stopped
fn run_relay(config: &Config) -> anyhow::Result<()> {
    let relay = &config.relay;
    let mailer = relay.mailer();
    info!(backend = ?relay.backend, "Relay mail backend: {}", mailer.name());

    let server = RelayServer::bind(&relay.listen, &relay.path, relay.settings(), mailer)?;
    eprintln!(
        "liftterm relay listening on http://{}{}",
        relay.listen, relay.path
    );
    let running = AtomicBool::new(true);
    server.serve(&running)?;
    Ok(())
}

fn build_transport(config: &Config) -> Arc<dyn MailTransport> {
    match config.transport.kind {
        TransportKind::Http => {
            let http = HttpTransport::new(&config.transport.endpoint, config.transport.timeout());
            info!("Transport: http -> {}", http.endpoint());
            Arc::new(http)
        }
        TransportKind::Direct => {
            let mailer = config.relay.mailer();
            info!("Transport: direct via {}", mailer.name());
            Arc::new(DirectTransport::new(config.relay.settings(), mailer))
        }
    }
}

/// Run the dashboard
fn run_terminal(config: &Config) -> anyhow::Result<()> {
    let clock = SystemClock::shared();
    let profile = config.terminal.profile();

    let transport = build_transport(config);
    let factory_clock = clock.clone();
    let factory_profile = profile.clone();
    let factory = Box::new(move || {
        TerminalController::new(
            factory_profile.clone(),
            transport.clone(),
            factory_clock.clone(),
        )
    });
    let mut app = App::new(profile, clock, factory);

    let (cols, rows) = Renderer::size()?;
    info!("Terminal size: {}x{}", cols, rows);

    let mut renderer = Renderer::new(
        config.get_color_scheme(),
        config.terminal.panel_height,
        config.terminal.show_time,
    );
    renderer.init()?;

    let result = run_main_loop(&mut app, &mut renderer);

    if let Err(ref e) = result {
        error!("Main loop failed: {}", e);
    }
    let _ = renderer.cleanup();
    info!("liftterm exiting");
    result
}

fn run_main_loop(app: &mut App, renderer: &mut Renderer) -> anyhow::Result<()> {
    renderer.render(app)?;

    loop {
        if app.should_quit {
            break;
        }

        // wake for the next narration step, or at least often enough for
        // the clock; poll quickly while a reply is outstanding
        let mut timeout = app.next_deadline().unwrap_or(IDLE_POLL).min(IDLE_POLL);
        if app.is_busy() {
            timeout = timeout.min(Duration::from_millis(50));
        }

        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) => {
                    if let Some(action) = KeyMapper::map(&key, app.focus()) {
                        app.dispatch(action);
                    }
                }
                Event::Mouse(mouse) => {
                    let action = match mouse.kind {
                        MouseEventKind::Down(MouseButton::Left) => {
                            renderer.hit(mouse.column, mouse.row)
                        }
                        MouseEventKind::ScrollUp => Some(Action::ScrollUp),
                        MouseEventKind::ScrollDown => Some(Action::ScrollDown),
                        _ => None,
                    };
                    if let Some(action) = action {
                        app.dispatch(action);
                    }
                }
                Event::Resize(cols, rows) => {
                    info!("Resized to {}x{}", cols, rows);
                }
                _ => {}
            }
        }

        app.tick();
        if app.should_quit {
            break;
        }
        // redraw every pass: the status bar clock moves on its own
        renderer.render(app)?;
    }

    Ok(())
}
