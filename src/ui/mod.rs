//! User interface rendering and input handling.
//!
//! - **renderer**: crossterm renderer for the dashboard and terminal panel
//! - **layout**: pure layout of the panel, transcript and composer
//! - **keymapper**: keyboard input to panel action mapping

pub mod keymapper;
pub mod layout;
pub mod renderer;

pub use keymapper::{Action, Focus, KeyMapper};
pub use renderer::Renderer;
