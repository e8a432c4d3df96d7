//! Core module - low-level image access
//!
//! Addresses and the mapped memory image of a loaded program.

pub mod memory;

pub use memory::{Address, MemoryError, MemoryImage, MemoryProtection, MemoryRegion};
