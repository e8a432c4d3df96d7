//! RTTI module - Delphi class reconstruction
//!
//! Given the address of a class metadata record, rebuilds the class in the
//! program database:
//! 1. read the VT base and name pointer from the record
//! 2. re-annotate and decode the class name
//! 3. check the name against the dialect prefixes
//! 4. create the class namespace
//! 5. walk the VT, then register `<Class>VT` and `<Class>`

pub mod dialect;
pub mod metadata;
pub mod namespace;
pub mod vtable;

#[cfg(test)]
mod tests;

pub use dialect::DialectConfig;
pub use metadata::{ClassMetadata, ClassName};
pub use vtable::{VtSlot, WalkEnd};

use thiserror::Error;

use crate::core::memory::{Address, MemoryError};
use crate::program::{DataType, HostError, NamespaceId, Program};
use crate::script::{ScriptConsole, ScriptLog};

const UNREADABLE_MESSAGE: &str = "Could not read the class name from the metadata record. \
    Either the cursor is not on a class metadata record or this compiler's class \
    metadata layout is not recognised. Place the cursor on the start of the record \
    and run again.";

/// Why a class was not (fully) created
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Class metadata unreadable: {0}")]
    MetadataUnreadable(#[source] MemoryError),

    #[error("Expected class to be prefixed with {expected}, class name given was {name}.")]
    BadClassName { name: String, expected: String },

    #[error("Class {0} already exists, stopping")]
    AlreadyDefined(String),

    #[error("No class namespace could be created for {0}")]
    NamespaceNull(String),

    #[error("Host error: {0}")]
    Host(#[from] HostError),
}

impl ParseError {
    /// Whether the run should be reported as failed to the caller
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ParseError::MetadataUnreadable(_) | ParseError::BadClassName { .. }
        )
    }
}

/// Result of a completed class parse
#[derive(Debug, Clone)]
pub struct ParsedClass {
    pub name: ClassName,
    pub namespace: NamespaceId,
    pub metadata: ClassMetadata,
    pub slots: Vec<VtSlot>,
    pub end: WalkEnd,
    pub vtable_type: DataType,
    pub instance_type: DataType,
}

/// Rebuild the class whose metadata record starts at `address`.
///
/// Every outcome is reported to `console` before returning; the error
/// value only tells the caller which path was taken.
pub fn parse_class<P: Program + ?Sized>(
    program: &mut P,
    console: &mut dyn ScriptConsole,
    address: Address,
    config: &DialectConfig,
) -> Result<ParsedClass, ParseError> {
    let mut log = ScriptLog::new(console, config.log_tag.as_str());

    let result = run(program, &mut log, address, config);
    if let Err(err) = &result {
        match err {
            ParseError::MetadataUnreadable(e) => {
                log::warn!("Metadata at {} unreadable: {}", address, e);
                log.popup(UNREADABLE_MESSAGE);
            }
            ParseError::NamespaceNull(name) => {
                log::debug!("Host returned no class namespace for {}", name);
            }
            ParseError::BadClassName { .. } | ParseError::AlreadyDefined(_) => {
                log.log(err.to_string());
            }
            ParseError::Host(_) => log.warn(err.to_string()),
        }
    }
    result
}

fn run<P: Program + ?Sized>(
    program: &mut P,
    log: &mut ScriptLog<'_>,
    address: Address,
    config: &DialectConfig,
) -> Result<ParsedClass, ParseError> {
    let metadata =
        metadata::locate(&*program, address, config).map_err(ParseError::MetadataUnreadable)?;
    let name = metadata::decode_name(program, metadata.name_address)?;
    metadata::validate(&name, config)?;

    log.log(format!("Creating class {}", name));
    let namespace = namespace::materialise(program, &name)?;

    let walk = vtable::walk(
        program,
        log,
        name.as_str(),
        namespace,
        metadata.vt_base,
        config.max_slots,
    );
    let (vtable_type, instance_type) = vtable::register_types(program, name.as_str(), walk.vtable)?;

    log::info!(
        "Class {}: {} VT slots, walk ended with {:?}",
        name,
        walk.slots.len(),
        walk.end
    );
    Ok(ParsedClass {
        name,
        namespace,
        metadata,
        slots: walk.slots,
        end: walk.end,
        vtable_type,
        instance_type,
    })
}
