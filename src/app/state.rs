//! Shared application state
//!
//! Contains state shared between the REPL and one-shot mode.

use anyhow::Result;

use crate::analysis::loader::LoadedBinary;
use crate::core::memory::Address;
use crate::program::ProjectDb;
use crate::rtti::DialectConfig;

/// Shared application state
#[derive(Default)]
pub struct AppState {
    /// Path of the loaded binary
    pub binary_path: Option<String>,
    /// Project built from the loaded binary
    pub project: Option<ProjectDb>,
    /// Cursor used by `pc` and `x`
    pub current_address: Address,
    /// Class metadata dialect
    pub config: DialectConfig,
}

impl AppState {
    pub fn new(config: DialectConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Load a binary, replacing the current project. Returns its summary.
    pub fn open(&mut self, path: &str) -> Result<String> {
        let binary = LoadedBinary::from_file(path)?;
        let summary = binary.summary();
        let entry = Address::new(binary.entry_point);

        self.project = Some(binary.into_project()?);
        self.binary_path = Some(path.to_string());
        self.current_address = entry;
        Ok(summary)
    }

    /// File name of the loaded binary, for the prompt
    pub fn binary_name(&self) -> Option<&str> {
        self.binary_path
            .as_deref()
            .map(|p| p.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_name() {
        let mut state = AppState::default();
        assert_eq!(state.binary_name(), None);
        state.binary_path = Some("C:\\samples\\project1.exe".into());
        assert_eq!(state.binary_name(), Some("project1.exe"));
        state.binary_path = Some("/tmp/app.exe".into());
        assert_eq!(state.binary_name(), Some("app.exe"));
    }

    #[test]
    fn test_open_missing_file() {
        let mut state = AppState::default();
        assert!(state.open("/nonexistent/definitely-missing.exe").is_err());
        assert!(state.project.is_none());
    }
}
