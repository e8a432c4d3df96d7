//! Command processing
//!
//! Command definitions and parsing for the REPL.

use crate::core::memory::Address;

/// Application commands that can be executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    /// Load a binary file: o <path>
    Open(String),
    /// Move the cursor: s <addr>
    Seek(Address),
    /// Hexdump N bytes at the cursor: x [n]
    Hexdump(usize),
    /// Parse the class whose metadata is at the cursor: pc [addr]
    ParseClass(Option<Address>),
    /// List class namespaces: ns
    Classes,
    /// List functions, optionally of one class: fns [class]
    Functions(Option<String>),
    /// List registered data types: types
    Types,
    /// Print one data type: pt <name>
    PrintType(String),
    /// Summary of the loaded binary: i
    Info,
    /// Show help
    Help,
    /// Quit application
    Quit,
    /// Unknown command
    Unknown(String),
}

/// Parse a command string into AppCommand
pub fn parse_command(input: &str) -> AppCommand {
    let input = input.trim();
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts.first().unwrap_or(&"");
    let arg = parts.get(1).map(|s| s.trim()).filter(|s| !s.is_empty());

    match *cmd {
        "o" | "open" | "load" => match arg {
            Some(path) => AppCommand::Open(path.to_string()),
            None => AppCommand::Unknown("open requires a path".into()),
        },
        "s" | "seek" => match arg.map(parse_address) {
            Some(Some(addr)) => AppCommand::Seek(addr),
            Some(None) => AppCommand::Unknown("Invalid address".into()),
            None => AppCommand::Unknown("seek requires an address".into()),
        },
        "x" => AppCommand::Hexdump(arg.and_then(|s| s.parse().ok()).unwrap_or(64)),
        "pc" | "class" => match arg.map(parse_address) {
            Some(Some(addr)) => AppCommand::ParseClass(Some(addr)),
            Some(None) => AppCommand::Unknown("Invalid address".into()),
            None => AppCommand::ParseClass(None),
        },
        "ns" | "classes" => AppCommand::Classes,
        "fns" | "functions" => AppCommand::Functions(arg.map(str::to_string)),
        "types" => AppCommand::Types,
        "pt" => match arg {
            Some(name) => AppCommand::PrintType(name.to_string()),
            None => AppCommand::Unknown("pt requires a type name".into()),
        },
        "i" | "info" => AppCommand::Info,
        "help" | "?" => AppCommand::Help,
        "quit" | "exit" | "q" => AppCommand::Quit,
        _ => AppCommand::Unknown(input.to_string()),
    }
}

/// Parse an address from hex or decimal string
pub fn parse_address(s: &str) -> Option<Address> {
    let s = s.trim();
    let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if s.chars().all(|c| c.is_ascii_hexdigit()) && s.len() > 4 {
        u32::from_str_radix(s, 16).ok()
    } else {
        s.parse().ok()
    };
    value.map(Address::new)
}
