//! Dhrake - Delphi class reconstruction
//!
//! Rebuilds Delphi classes in a project database from their RTTI class
//! metadata: class namespace, VT methods, and the `<Class>VT` and
//! `<Class>` structures.

pub mod analysis;
pub mod app;
pub mod core;
pub mod program;
pub mod rtti;
pub mod script;
pub mod ui;
