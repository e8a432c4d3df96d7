//! In-memory project database
//!
//! `ProjectDb` is the host the CLI runs against once a binary is loaded,
//! and the fixture the tests drive the class parser with. It is `Clone`
//! and `PartialEq` so whole-project snapshots can be compared.

use std::collections::BTreeMap;

use super::types::{DataType, FunctionDefinition, Signature};
use super::{
    ConflictPolicy, FunctionId, HostError, NamespaceId, NamespaceKind, Program, SourceType,
    Symbol, SymbolKind,
};
use crate::core::memory::{Address, MemoryError, MemoryImage, MemoryRegion};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceRecord {
    pub name: String,
    pub parent: NamespaceId,
    pub kind: NamespaceKind,
    pub source: SourceType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRecord {
    pub entry: Address,
    pub name: String,
    pub namespace: NamespaceId,
    pub signature: Signature,
    pub source: SourceType,
}

/// A typed data annotation in the listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataAnnotation {
    pub address: Address,
    pub length: u32,
    pub data_type: DataType,
}

impl DataAnnotation {
    fn intersects(&self, start: Address, end: Address) -> bool {
        let a = self.address.value() as u64;
        a < end.value() as u64 && a + self.length as u64 > start.value() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LabelRecord {
    name: String,
    namespace: NamespaceId,
    kind: SymbolKind,
    source: SourceType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDb {
    memory: MemoryImage,
    data: BTreeMap<Address, DataAnnotation>,
    /// Indexed by `NamespaceId`; slot 0 is the global namespace
    namespaces: Vec<NamespaceRecord>,
    /// Indexed by `FunctionId`
    functions: Vec<FunctionRecord>,
    function_entries: BTreeMap<Address, FunctionId>,
    labels: BTreeMap<Address, Vec<LabelRecord>>,
    types: BTreeMap<String, DataType>,
}

impl Default for ProjectDb {
    fn default() -> Self {
        Self::new(MemoryImage::new())
    }
}

impl ProjectDb {
    pub fn new(memory: MemoryImage) -> Self {
        Self {
            memory,
            data: BTreeMap::new(),
            namespaces: vec![NamespaceRecord {
                name: "Global".to_string(),
                parent: NamespaceId::GLOBAL,
                kind: NamespaceKind::Global,
                source: SourceType::Default,
            }],
            functions: Vec::new(),
            function_entries: BTreeMap::new(),
            labels: BTreeMap::new(),
            types: BTreeMap::new(),
        }
    }

    pub fn memory(&self) -> &MemoryImage {
        &self.memory
    }

    pub fn map(&mut self, region: MemoryRegion) -> Result<(), MemoryError> {
        self.memory.map(region)
    }

    /// Add a label or import symbol at `address`, filed under `namespace`
    pub fn add_label(
        &mut self,
        address: Address,
        name: impl Into<String>,
        namespace: NamespaceId,
        kind: SymbolKind,
        source: SourceType,
    ) {
        self.labels.entry(address).or_default().push(LabelRecord {
            name: name.into(),
            namespace,
            kind,
            source,
        });
    }

    /// Define a function found by analysis or import
    pub fn add_function(
        &mut self,
        entry: Address,
        name: impl Into<String>,
        signature: Signature,
        source: SourceType,
    ) -> Result<FunctionId, HostError> {
        let name = name.into();
        if self.function_entries.contains_key(&entry) {
            return Err(HostError::Invalid(format!(
                "function already defined at {}",
                entry
            )));
        }

        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(FunctionRecord {
            entry,
            name,
            namespace: NamespaceId::GLOBAL,
            signature,
            source,
        });
        self.function_entries.insert(entry, id);
        Ok(id)
    }

    /// Namespace for an imported library, e.g. `KERNEL32.DLL`
    pub fn add_library(&mut self, name: impl Into<String>) -> NamespaceId {
        let name = name.into();
        if let Some(existing) = self.find_namespace(NamespaceId::GLOBAL, &name) {
            return existing;
        }
        let id = NamespaceId(self.namespaces.len() as u32);
        self.namespaces.push(NamespaceRecord {
            name,
            parent: NamespaceId::GLOBAL,
            kind: NamespaceKind::Library,
            source: SourceType::Imported,
        });
        id
    }

    pub fn namespace(&self, id: NamespaceId) -> Option<&NamespaceRecord> {
        self.namespaces.get(id.0 as usize)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = (NamespaceId, &NamespaceRecord)> {
        self.namespaces
            .iter()
            .enumerate()
            .map(|(i, ns)| (NamespaceId(i as u32), ns))
    }

    pub fn find_namespace(&self, parent: NamespaceId, name: &str) -> Option<NamespaceId> {
        self.namespaces()
            .skip(1)
            .find(|(_, ns)| ns.parent == parent && ns.name == name)
            .map(|(id, _)| id)
    }

    /// `Outer::Inner` style name; the global namespace is `Global`
    pub fn qualified_name(&self, id: NamespaceId) -> String {
        let mut parts = Vec::new();
        let mut current = id;
        while current != NamespaceId::GLOBAL {
            match self.namespace(current) {
                Some(ns) => {
                    parts.push(ns.name.as_str());
                    current = ns.parent;
                }
                None => break,
            }
        }
        if parts.is_empty() {
            return "Global".to_string();
        }
        parts.reverse();
        parts.join("::")
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionRecord> {
        self.functions.get(id.0 as usize)
    }

    pub fn function_mut(&mut self, id: FunctionId) -> Option<&mut FunctionRecord> {
        self.functions.get_mut(id.0 as usize)
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &FunctionRecord)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FunctionId(i as u32), f))
    }

    pub fn functions_in(&self, namespace: NamespaceId) -> Vec<(FunctionId, &FunctionRecord)> {
        self.functions()
            .filter(|(_, f)| f.namespace == namespace)
            .collect()
    }

    /// Labels and imports filed directly under `namespace`, by address
    pub fn labels_in(&self, namespace: NamespaceId) -> Vec<(Address, &str)> {
        self.labels
            .iter()
            .flat_map(|(&address, labels)| labels.iter().map(move |l| (address, l)))
            .filter(|(_, l)| l.namespace == namespace)
            .map(|(address, l)| (address, l.name.as_str()))
            .collect()
    }

    pub fn data_at(&self, address: Address) -> Option<&DataAnnotation> {
        self.data.get(&address)
    }

    pub fn data_type(&self, name: &str) -> Option<&DataType> {
        self.types.get(name)
    }

    pub fn data_types(&self) -> impl Iterator<Item = &DataType> {
        self.types.values()
    }

    fn check_namespace(&self, id: NamespaceId) -> Result<&NamespaceRecord, HostError> {
        self.namespace(id).ok_or(HostError::UnknownNamespace(id))
    }

    fn check_function(&self, id: FunctionId) -> Result<&FunctionRecord, HostError> {
        self.function(id).ok_or(HostError::UnknownFunction(id))
    }

    fn parent_display(&self, namespace: NamespaceId) -> Option<String> {
        (namespace != NamespaceId::GLOBAL).then(|| self.qualified_name(namespace))
    }

    /// Whether a non-namespace symbol called `name` lives directly in `parent`
    fn has_plain_symbol(&self, parent: NamespaceId, name: &str) -> bool {
        let function_clash = self
            .functions
            .iter()
            .any(|f| f.namespace == parent && f.name == name);
        let label_clash = self
            .labels
            .values()
            .flatten()
            .any(|l| l.namespace == parent && l.name == name);
        function_clash || label_clash
    }
}

impl Program for ProjectDb {
    fn read_u8(&self, address: Address) -> Result<u8, MemoryError> {
        self.memory.read_u8(address)
    }

    fn read_i32_le(&self, address: Address) -> Result<i32, MemoryError> {
        self.memory.read_i32_le(address)
    }

    fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>, MemoryError> {
        self.memory.read(address, len)
    }

    fn clear_data(&mut self, start: Address, end: Address) {
        self.data.retain(|_, d| !d.intersects(start, end));
    }

    fn create_data(&mut self, address: Address, data_type: &DataType) -> Result<(), HostError> {
        let length = match data_type.length() {
            Some(len) => len,
            None if *data_type == DataType::PascalString255 => {
                1 + self.memory.read_u8(address)? as u32
            }
            None => return Err(HostError::Invalid(format!(
                "cannot place dynamically sized {} at {}",
                data_type.name(),
                address
            ))),
        };

        // Every covered byte must be mapped
        self.memory.read(address, length as usize)?;

        let end = address + length;
        if let Some(existing) = self.data.values().find(|d| d.intersects(address, end)) {
            return Err(HostError::Invalid(format!(
                "conflicting data {} at {}",
                existing.data_type.name(),
                existing.address
            )));
        }

        self.data.insert(
            address,
            DataAnnotation {
                address,
                length,
                data_type: data_type.clone(),
            },
        );
        Ok(())
    }

    fn get_or_create_namespace(
        &mut self,
        parent: NamespaceId,
        name: &str,
        source: SourceType,
    ) -> Result<NamespaceId, HostError> {
        self.check_namespace(parent)?;

        if let Some(existing) = self.find_namespace(parent, name) {
            return Ok(existing);
        }

        if self.has_plain_symbol(parent, name) {
            return Err(HostError::DuplicateName {
                name: name.to_string(),
                namespace: self.qualified_name(parent),
            });
        }

        let id = NamespaceId(self.namespaces.len() as u32);
        self.namespaces.push(NamespaceRecord {
            name: name.to_string(),
            parent,
            kind: NamespaceKind::Namespace,
            source,
        });
        log::debug!("Created namespace {}", self.qualified_name(id));
        Ok(id)
    }

    fn convert_namespace_to_class(
        &mut self,
        namespace: NamespaceId,
    ) -> Result<Option<NamespaceId>, HostError> {
        let kind = self.check_namespace(namespace)?.kind;
        match kind {
            NamespaceKind::Namespace => {
                self.namespaces[namespace.0 as usize].kind = NamespaceKind::Class;
                Ok(Some(namespace))
            }
            NamespaceKind::Class => {
                let ns = &self.namespaces[namespace.0 as usize];
                Err(HostError::DuplicateName {
                    name: ns.name.clone(),
                    namespace: self.qualified_name(ns.parent),
                })
            }
            NamespaceKind::Global | NamespaceKind::Library => Ok(None),
        }
    }

    fn get_symbol_at(&self, address: Address) -> Option<Symbol> {
        if let Some(id) = self.function_entries.get(&address) {
            let f = &self.functions[id.0 as usize];
            return Some(Symbol {
                name: f.name.clone(),
                address,
                kind: SymbolKind::Function,
                source: f.source,
                parent: self.parent_display(f.namespace),
            });
        }

        self.labels
            .get(&address)
            .and_then(|labels| labels.first())
            .map(|l| Symbol {
                name: l.name.clone(),
                address,
                kind: l.kind,
                source: l.source,
                parent: self.parent_display(l.namespace),
            })
    }

    fn get_function_at(&self, address: Address) -> Option<FunctionId> {
        self.function_entries.get(&address).copied()
    }

    fn create_function(
        &mut self,
        address: Address,
        name: &str,
    ) -> Result<Option<FunctionId>, HostError> {
        if self.function_entries.contains_key(&address) || !self.memory.is_executable(address) {
            return Ok(None);
        }
        self.add_function(address, name, Signature::default(), SourceType::UserDefined)
            .map(Some)
    }

    fn set_parent_namespace(
        &mut self,
        function: FunctionId,
        namespace: NamespaceId,
    ) -> Result<(), HostError> {
        self.check_namespace(namespace)?;
        self.check_function(function)?;
        self.functions[function.0 as usize].namespace = namespace;
        Ok(())
    }

    fn function_name(&self, function: FunctionId) -> Result<String, HostError> {
        Ok(self.check_function(function)?.name.clone())
    }

    fn make_function_definition(&self, function: FunctionId) -> Result<DataType, HostError> {
        let f = self.check_function(function)?;
        Ok(DataType::FunctionDefinition(FunctionDefinition {
            name: f.name.clone(),
            signature: f.signature.clone(),
        }))
    }

    fn add_data_type(
        &mut self,
        data_type: DataType,
        policy: ConflictPolicy,
    ) -> Result<DataType, HostError> {
        let name = data_type.name();
        match policy {
            ConflictPolicy::Replace => {
                self.types.insert(name, data_type.clone());
                Ok(data_type)
            }
            ConflictPolicy::Keep => Ok(self.types.entry(name).or_insert(data_type).clone()),
        }
    }
}
