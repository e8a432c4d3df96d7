//! VT walker
//!
//! Walks the virtual method table slot by slot, makes sure every target
//! is a function inside the class namespace, and collects one pointer
//! field per slot into the `<Class>VT` structure.

use std::error::Error as _;

use thiserror::Error;

use super::dialect::SLOT_SIZE;
use crate::core::memory::Address;
use crate::program::{
    ConflictPolicy, DataType, FunctionId, HostError, NamespaceId, Program, Structure,
};
use crate::script::ScriptLog;

/// Failure inside one slot; ends the walk
#[derive(Error, Debug)]
#[error("VT slot {index} at {slot}")]
pub struct SlotError {
    pub index: u32,
    pub slot: Address,
    #[source]
    pub source: HostError,
}

/// One resolved VT entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VtSlot {
    pub index: u32,
    pub slot: Address,
    pub target: Address,
    pub function: FunctionId,
    pub field_name: String,
    /// Whether the function was created by the walk
    pub created: bool,
}

/// Why the walk stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEnd {
    /// The slot ceiling was reached
    SlotCap,
    /// No function could be defined at `target`; taken as the end of the VT
    NoFunction { slot: Address, target: Address },
    /// A slot failed; `error` carries the rendered error chain
    Failed { slot: Address, error: String },
}

impl WalkEnd {
    pub fn is_clean(&self) -> bool {
        !matches!(self, WalkEnd::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct VtWalk {
    pub slots: Vec<VtSlot>,
    pub end: WalkEnd,
    pub vtable: Structure,
}

enum SlotStep {
    Added(VtSlot),
    NoFunction(Address),
}

struct Walker<'p, 'l, 'a, P: Program + ?Sized> {
    program: &'p mut P,
    log: &'l mut ScriptLog<'a>,
    class_name: &'p str,
    namespace: NamespaceId,
    vtable: Structure,
}

impl<P: Program + ?Sized> Walker<'_, '_, '_, P> {
    fn visit(&mut self, index: u32, slot: Address) -> Result<SlotStep, HostError> {
        let target = Address::from_i32(self.program.read_i32_le(slot)?);

        let mut created = false;
        let function = match self.program.get_function_at(target) {
            Some(f) => f,
            None => {
                let name = match self.program.get_symbol_at(target) {
                    Some(symbol) => symbol.display_name(),
                    None => format!("FUN_{:08X}", target.value()),
                };
                self.log.log(format!(
                    "defining function at 0x{:08X}, name {}",
                    target.value(),
                    name
                ));
                match self.program.create_function(target, &name)? {
                    Some(f) => {
                        created = true;
                        f
                    }
                    None => return Ok(SlotStep::NoFunction(target)),
                }
            }
        };

        self.program.set_parent_namespace(function, self.namespace)?;
        let name = self.program.function_name(function)?;
        self.log
            .log(format!("adding function {}::{}", self.class_name, name));

        let definition = self.program.make_function_definition(function)?;
        let definition = self
            .program
            .add_data_type(definition, ConflictPolicy::Keep)?;
        let field = self.program.pointer_to(definition);
        self.vtable.add(field, name.clone(), "")?;

        Ok(SlotStep::Added(VtSlot {
            index,
            slot,
            target,
            function,
            field_name: name,
            created,
        }))
    }

    fn report(&mut self, err: &SlotError) {
        self.log.warn(format!("Failed to add function: {}", err));
        let mut cause = err.source();
        while let Some(e) = cause {
            self.log.warn(format!("\t{}", e));
            cause = e.source();
        }
    }
}

/// Walk at most `max_slots` slots starting at `vt_base`
pub fn walk<P: Program + ?Sized>(
    program: &mut P,
    log: &mut ScriptLog<'_>,
    class_name: &str,
    namespace: NamespaceId,
    vt_base: Address,
    max_slots: u32,
) -> VtWalk {
    let mut walker = Walker {
        program,
        log,
        class_name,
        namespace,
        vtable: Structure::new(format!("{}VT", class_name)),
    };
    let mut slots = Vec::new();

    let mut end = WalkEnd::SlotCap;
    for index in 0..max_slots {
        let slot = vt_base + index * SLOT_SIZE;
        match walker.visit(index, slot) {
            Ok(SlotStep::Added(entry)) => slots.push(entry),
            Ok(SlotStep::NoFunction(target)) => {
                log::debug!("No function at {} (slot {}), VT ends", target, index);
                end = WalkEnd::NoFunction { slot, target };
                break;
            }
            Err(source) => {
                let err = SlotError {
                    index,
                    slot,
                    source,
                };
                walker.report(&err);
                end = WalkEnd::Failed {
                    slot,
                    error: format!("{}: {}", err, err.source),
                };
                break;
            }
        }
    }

    VtWalk {
        slots,
        end,
        vtable: walker.vtable,
    }
}

/// Register `<Class>VT` and `<Class>`, replacing earlier versions.
/// Returns the registered (vtable, instance) types.
pub fn register_types<P: Program + ?Sized>(
    program: &mut P,
    class_name: &str,
    vtable: Structure,
) -> Result<(DataType, DataType), HostError> {
    let vtable = program.add_data_type(DataType::Structure(vtable), ConflictPolicy::Replace)?;

    let mut base = Structure::new(class_name);
    base.add(program.pointer_to(vtable.clone()), "vt", "Virtual Function Table")?;
    let base = program.add_data_type(DataType::Structure(base), ConflictPolicy::Replace)?;

    Ok((vtable, base))
}
