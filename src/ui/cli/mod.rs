//! CLI - reedline-based REPL interface
//!
//! Open a binary, move the cursor onto class metadata and rebuild classes
//! from the command line.

use anyhow::Result;
use colored::Colorize;
use reedline::{
    Prompt, PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus, Reedline, Signal,
};
use std::borrow::Cow;

use crate::app::{parse_command, AppCommand, AppState};
use crate::core::memory::Address;
use crate::program::{NamespaceId, NamespaceKind, ProjectDb};
use crate::rtti::{self, ParsedClass, WalkEnd};
use crate::script::TerminalConsole;

/// Custom prompt for the Dhrake CLI
pub struct DhrakePrompt {
    /// Current cursor address
    current_address: Address,
    /// Name of the loaded binary
    binary: Option<String>,
}

impl DhrakePrompt {
    pub fn new() -> Self {
        Self {
            current_address: Address::default(),
            binary: None,
        }
    }

    pub fn sync(&mut self, state: &AppState) {
        self.current_address = state.current_address;
        self.binary = state.binary_name().map(str::to_string);
    }
}

impl Default for DhrakePrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompt for DhrakePrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        let binary = self.binary.as_deref().unwrap_or("---");
        Cow::Owned(format!("[{}:0x{}]", binary, self.current_address))
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("> ")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "(failed) ",
        };
        Cow::Owned(format!("(search: {}{}) ", prefix, history_search.term))
    }
}

/// Print the help message
fn print_help() {
    println!("{}", "Dhrake CLI Commands".bold().cyan());
    println!("{}", "═".repeat(50).cyan());

    println!("\n{}", "Files:".bold().yellow());
    println!("  {}      Open a PE32 binary", "o <path>".green());
    println!("  {}             Binary summary", "i".green());

    println!("\n{}", "Navigation:".bold().yellow());
    println!("  {}      Seek to address", "s <addr>".green());
    println!("  {}         Hexdump at cursor", "x [n]".green());

    println!("\n{}", "Classes:".bold().yellow());
    println!(
        "  {}     Rebuild class from metadata at cursor",
        "pc [addr]".green()
    );
    println!("  {}            List classes", "ns".green());
    println!("  {}   List functions", "fns [class]".green());
    println!("  {}         List data types", "types".green());
    println!("  {}     Print a data type", "pt <name>".green());

    println!("\n{}", "Other:".bold().yellow());
    println!("  {}             Show this help", "?".green());
    println!("  {}             Quit Dhrake", "q".green());
}

/// Hexdump lines: address, bytes in groups of four
pub fn hexdump(base: Address, bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(i, line)| {
            let groups: Vec<String> = line.chunks(4).map(hex::encode).collect();
            let ascii: String = line
                .iter()
                .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
                .collect();
            format!("{}  {:<35}  {}", base + (i as u32) * 16, groups.join(" "), ascii)
        })
        .collect()
}

/// Print the outcome of a class parse
pub fn print_class(db: &ProjectDb, parsed: &ParsedClass) {
    println!(
        "{} {} ({} VT slots from 0x{})",
        "[+]".green(),
        parsed.name.as_str().bold(),
        parsed.slots.len(),
        parsed.metadata.vt_base
    );
    match &parsed.end {
        WalkEnd::SlotCap => println!("    walk stopped at the slot limit"),
        WalkEnd::NoFunction { target, .. } => {
            println!("    VT ends before 0x{} (no function there)", target)
        }
        WalkEnd::Failed { error, .. } => println!("    {} {}", "walk failed:".red(), error),
    }
    println!("{}", parsed.vtable_type.to_c());
    println!("{}", parsed.instance_type.to_c());
    log::debug!(
        "{} functions now in {}",
        db.functions_in(parsed.namespace).len(),
        db.qualified_name(parsed.namespace)
    );
}

fn require_project(state: &mut AppState) -> Option<&mut ProjectDb> {
    if state.project.is_none() {
        println!("{} No binary loaded (use 'o <path>')", "[!]".red());
    }
    state.project.as_mut()
}

/// Execute a parsed command. Returns `false` when the REPL should exit.
fn execute_command(state: &mut AppState, cmd: AppCommand) -> bool {
    match cmd {
        AppCommand::Open(path) => {
            println!("[*] Loading binary: {}", path);
            match state.open(&path) {
                Ok(summary) => println!("{}", summary),
                Err(e) => println!("{} {:#}", "[!]".red(), e),
            }
        }
        AppCommand::Seek(addr) => {
            state.current_address = addr;
            println!("[*] Seeking to 0x{}", addr);
        }
        AppCommand::Hexdump(count) => {
            let addr = state.current_address;
            if let Some(db) = require_project(state) {
                match db.memory().read(addr, count) {
                    Ok(bytes) => hexdump(addr, &bytes).iter().for_each(|l| println!("{}", l)),
                    Err(e) => println!("{} {}", "[!]".red(), e),
                }
            }
        }
        AppCommand::ParseClass(at) => {
            if let Some(addr) = at {
                state.current_address = addr;
            }
            let addr = state.current_address;
            let config = state.config.clone();
            if let Some(db) = require_project(state) {
                let mut console = TerminalConsole;
                if let Ok(parsed) = rtti::parse_class(db, &mut console, addr, &config) {
                    print_class(db, &parsed);
                }
            }
        }
        AppCommand::Classes => {
            if let Some(db) = require_project(state) {
                for (id, ns) in db.namespaces().filter(|(_, ns)| ns.kind == NamespaceKind::Class) {
                    println!("  {:<32} {} functions", ns.name, db.functions_in(id).len());
                }
            }
        }
        AppCommand::Functions(class) => {
            if let Some(db) = require_project(state) {
                let filter = match &class {
                    Some(name) => match db.find_namespace(NamespaceId::GLOBAL, name) {
                        Some(id) => Some(id),
                        None => {
                            println!("{} No namespace named {}", "[!]".red(), name);
                            return true;
                        }
                    },
                    None => None,
                };
                for (_, f) in db.functions() {
                    if filter.map_or(true, |ns| f.namespace == ns) {
                        println!("  0x{}  {}::{}", f.entry, db.qualified_name(f.namespace), f.name);
                    }
                }
                // Library namespaces hold import labels rather than functions
                if let Some(ns) = filter {
                    for (address, name) in db.labels_in(ns) {
                        println!(
                            "  0x{}  {}::{} {}",
                            address,
                            db.qualified_name(ns),
                            name,
                            "(label)".dimmed()
                        );
                    }
                }
            }
        }
        AppCommand::Types => {
            if let Some(db) = require_project(state) {
                for ty in db.data_types() {
                    println!("  {}", ty.name());
                }
            }
        }
        AppCommand::PrintType(name) => {
            if let Some(db) = require_project(state) {
                match db.data_type(&name) {
                    Some(ty) => println!("{}", ty.to_c()),
                    None => println!("{} No data type named {}", "[!]".red(), name),
                }
            }
        }
        AppCommand::Info => match &state.binary_path {
            Some(path) => println!("[*] {} @ 0x{}", path, state.current_address),
            None => println!("[*] No binary loaded"),
        },
        AppCommand::Help => print_help(),
        AppCommand::Quit => {
            println!("[*] Shutting down...");
            return false;
        }
        AppCommand::Unknown(input) => {
            println!("{} Unknown command: '{}'", "[!]".red(), input);
            println!("    Type '?' for help");
        }
    }
    true
}

/// Run the CLI REPL
pub fn run_cli(mut state: AppState) -> Result<()> {
    let mut line_editor = Reedline::create();
    let mut prompt = DhrakePrompt::new();

    println!(
        "{}",
        "╔══════════════════════════════════════════════════════════════╗".cyan()
    );
    println!(
        "{}",
        "║  Dhrake CLI - Type '?' for help, 'q' to quit                 ║".cyan()
    );
    println!(
        "{}",
        "╚══════════════════════════════════════════════════════════════╝".cyan()
    );

    loop {
        prompt.sync(&state);
        let sig = line_editor.read_line(&prompt)?;
        match sig {
            Signal::Success(buffer) => {
                let input = buffer.trim();
                if input.is_empty() {
                    continue;
                }

                let cmd = parse_command(input);
                if !execute_command(&mut state, cmd) {
                    break;
                }
            }
            Signal::CtrlD | Signal::CtrlC => {
                println!("\n[*] Interrupted");
                break;
            }
        }
    }

    Ok(())
}
