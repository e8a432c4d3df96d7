//! Script console - where a script's output goes
//!
//! A running script writes tagged lines to a [`ScriptConsole`] and can
//! raise a modal popup. Every line is mirrored to the `log` facade.

use colored::Colorize;

/// Output surface of a script run
pub trait ScriptConsole {
    /// Append one line to the script log
    fn println(&mut self, line: &str);

    /// Show a modal message to the analyst
    fn popup(&mut self, message: &str);
}

/// Tagged writer over a console
pub struct ScriptLog<'a> {
    console: &'a mut dyn ScriptConsole,
    tag: String,
}

impl<'a> ScriptLog<'a> {
    pub fn new(console: &'a mut dyn ScriptConsole, tag: impl Into<String>) -> Self {
        Self {
            console,
            tag: tag.into(),
        }
    }

    fn line(&self, message: &str) -> String {
        format!("[{}] {}", self.tag, message)
    }

    pub fn log(&mut self, message: impl AsRef<str>) {
        let line = self.line(message.as_ref());
        log::info!("{}", line);
        self.console.println(&line);
    }

    pub fn warn(&mut self, message: impl AsRef<str>) {
        let line = self.line(message.as_ref());
        log::warn!("{}", line);
        self.console.println(&line);
    }

    pub fn popup(&mut self, message: &str) {
        log::warn!("[{}] popup: {}", self.tag, message);
        self.console.popup(message);
    }
}

/// Console that keeps everything in memory
#[derive(Debug, Clone, Default)]
pub struct BufferConsole {
    pub lines: Vec<String>,
    pub popups: Vec<String>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }
}

impl ScriptConsole for BufferConsole {
    fn println(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn popup(&mut self, message: &str) {
        self.popups.push(message.to_string());
    }
}

/// Console printing straight to the terminal
#[derive(Debug, Default)]
pub struct TerminalConsole;

impl ScriptConsole for TerminalConsole {
    fn println(&mut self, line: &str) {
        println!("{}", line);
    }

    fn popup(&mut self, message: &str) {
        println!("{}", "┌─ Dhrake ─────────────────────────────".red());
        for chunk in wrap(message, 60) {
            println!("{} {}", "│".red(), chunk);
        }
        println!("{}", "└──────────────────────────────────────".red());
    }
}

/// Greedy word wrap for popup text
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
