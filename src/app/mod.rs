//! App module - shared application state and commands
//!
//! Provides common state and command processing used by the REPL and
//! one-shot mode.

mod commands;
mod state;

pub use commands::*;
pub use state::*;
