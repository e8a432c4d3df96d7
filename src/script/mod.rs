//! Script module - runtime surface for class-parsing scripts
//!
//! Scripts report progress through a tagged console and may raise a
//! single modal popup.

pub mod console;

pub use console::{BufferConsole, ScriptConsole, ScriptLog, TerminalConsole};
