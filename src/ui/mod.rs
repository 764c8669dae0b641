pub mod app;
pub mod state;
pub mod components;

pub use app::run_tui;
pub use state::{AppState, ConsoleCommand};
