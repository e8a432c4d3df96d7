//! Dialect constants for Delphi class metadata in 32-bit images.
//!
//! The name-pointer displacement and the slot ceiling are empirical
//! values for this compiler's RTTI layout.

/// Displacement of the class-name pointer inside the metadata record
pub const NAME_POINTER_OFFSET: u32 = 32;

/// Upper bound on VT slots inspected per class
pub const MAX_VT_SLOTS: u32 = 100;

/// Width of one VT slot and of every pointer the parser reads
pub const SLOT_SIZE: u32 = 4;

/// First letters of class names: `T` for ordinary types, `E` for exceptions
pub const CLASS_PREFIXES: [char; 2] = ['T', 'E'];

/// Tag prefixed to every console line
pub const LOG_TAG: &str = "Dhrake";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialectConfig {
    pub name_offset: u32,
    pub max_slots: u32,
    pub class_prefixes: Vec<char>,
    pub log_tag: String,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self {
            name_offset: NAME_POINTER_OFFSET,
            max_slots: MAX_VT_SLOTS,
            class_prefixes: CLASS_PREFIXES.to_vec(),
            log_tag: LOG_TAG.to_string(),
        }
    }
}

impl DialectConfig {
    /// "T or E" style listing of the accepted prefixes
    pub fn prefix_list(&self) -> String {
        let names: Vec<String> = self.class_prefixes.iter().map(|c| c.to_string()).collect();
        match names.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{} or {}", rest.join(", "), last),
            Some((last, _)) => last.clone(),
            None => String::new(),
        }
    }
}
