//! Analysis Module - Binary loading
//!
//! Turns executables on disk into project databases.

pub mod loader;

pub use loader::{FunctionInfo, ImportInfo, LoadedBinary, SectionInfo};
