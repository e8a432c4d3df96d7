//! Program module - the analysis host's project database
//!
//! The class parser never touches a concrete database. It talks to the
//! [`Program`] trait, which covers memory reads, listing annotations,
//! symbols, namespaces, functions and the type manager.

pub mod db;
pub mod types;

pub use db::{FunctionRecord, NamespaceRecord, ProjectDb};
pub use types::{DataType, FunctionDefinition, Signature, Structure, POINTER_SIZE};

use crate::core::memory::{Address, MemoryError};
use thiserror::Error;
use types::TypeError;

/// Handle to a namespace in the project
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NamespaceId(pub(crate) u32);

impl NamespaceId {
    pub const GLOBAL: NamespaceId = NamespaceId(0);
}

/// Handle to a function in the project
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionId(pub(crate) u32);

/// Who produced a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Default,
    Analysis,
    Imported,
    UserDefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceKind {
    Global,
    Namespace,
    Class,
    Library,
}

/// How the type manager resolves a name clash when a type is added
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// The new type overwrites the existing one
    Replace,
    /// The existing type wins and is returned unchanged
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Label,
    Function,
    Import,
}

/// A named address in the program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: Address,
    pub kind: SymbolKind,
    pub source: SourceType,
    /// Qualified name of the parent namespace, `None` when global
    pub parent: Option<String>,
}

impl Symbol {
    pub fn display_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}::{}", parent, self.name),
            None => self.name.clone(),
        }
    }
}

/// Host-side failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("{name} already exists in {namespace}")]
    DuplicateName { name: String, namespace: String },

    #[error("Unknown namespace {0:?}")]
    UnknownNamespace(NamespaceId),

    #[error("Unknown function {0:?}")]
    UnknownFunction(FunctionId),

    #[error("Invalid operation: {0}")]
    Invalid(String),
}

/// Capabilities the class parser requires of its host.
///
/// `&mut self` is the session handle; implementations own all persisted
/// state and the parser only holds ids between calls.
pub trait Program {
    fn read_u8(&self, address: Address) -> Result<u8, MemoryError>;

    fn read_i32_le(&self, address: Address) -> Result<i32, MemoryError>;

    fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>, MemoryError>;

    /// Remove every data annotation intersecting `[start, end)`
    fn clear_data(&mut self, start: Address, end: Address);

    /// Annotate `address` with `data_type`
    fn create_data(&mut self, address: Address, data_type: &DataType) -> Result<(), HostError>;

    fn global_namespace(&self) -> NamespaceId {
        NamespaceId::GLOBAL
    }

    fn get_or_create_namespace(
        &mut self,
        parent: NamespaceId,
        name: &str,
        source: SourceType,
    ) -> Result<NamespaceId, HostError>;

    /// Turn `namespace` into a class namespace. `Ok(None)` means the host
    /// cannot make a class out of it.
    fn convert_namespace_to_class(
        &mut self,
        namespace: NamespaceId,
    ) -> Result<Option<NamespaceId>, HostError>;

    fn get_symbol_at(&self, address: Address) -> Option<Symbol>;

    fn get_function_at(&self, address: Address) -> Option<FunctionId>;

    /// `Ok(None)` when no function can be defined at `address`
    fn create_function(
        &mut self,
        address: Address,
        name: &str,
    ) -> Result<Option<FunctionId>, HostError>;

    fn set_parent_namespace(
        &mut self,
        function: FunctionId,
        namespace: NamespaceId,
    ) -> Result<(), HostError>;

    fn function_name(&self, function: FunctionId) -> Result<String, HostError>;

    /// Function-definition type built from the function's current signature
    fn make_function_definition(&self, function: FunctionId) -> Result<DataType, HostError>;

    /// Register a type, returning the instance the type manager now holds
    fn add_data_type(
        &mut self,
        data_type: DataType,
        policy: ConflictPolicy,
    ) -> Result<DataType, HostError>;

    fn pointer_to(&self, data_type: DataType) -> DataType {
        types::pointer_to(data_type, POINTER_SIZE)
    }
}
