//! Data types held by the program's type manager
//!
//! Only the shapes the class parser produces are modelled: the
//! length-prefixed name string, pointers, function definitions and
//! structures.

use std::fmt;
use thiserror::Error;

/// Pointer width of the 32-bit images this crate handles
pub const POINTER_SIZE: u32 = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("Data type {0} has no fixed length and cannot be a structure component")]
    Unsized(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    /// One unsigned length byte followed by up to 255 content bytes
    PascalString255,
    Pointer(Pointer),
    FunctionDefinition(FunctionDefinition),
    Structure(Structure),
}

impl DataType {
    pub fn name(&self) -> String {
        match self {
            DataType::PascalString255 => "PascalString255".to_string(),
            DataType::Pointer(p) => format!("{} *", p.target.name()),
            DataType::FunctionDefinition(f) => f.name.clone(),
            DataType::Structure(s) => s.name.clone(),
        }
    }

    /// Fixed length in bytes, `None` for dynamically sized types
    pub fn length(&self) -> Option<u32> {
        match self {
            DataType::PascalString255 | DataType::FunctionDefinition(_) => None,
            DataType::Pointer(p) => Some(p.size),
            DataType::Structure(s) => Some(s.length()),
        }
    }

    pub fn as_structure(&self) -> Option<&Structure> {
        match self {
            DataType::Structure(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&Pointer> {
        match self {
            DataType::Pointer(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_function_definition(&self) -> Option<&FunctionDefinition> {
        match self {
            DataType::FunctionDefinition(f) => Some(f),
            _ => None,
        }
    }

    /// C-like rendering used by the CLI
    pub fn to_c(&self) -> String {
        match self {
            DataType::Structure(s) => s.to_c(),
            DataType::FunctionDefinition(f) => format!("typedef {};", f.declaration(&f.name)),
            other => other.name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    pub target: Box<DataType>,
    pub size: u32,
}

/// Build a pointer of `size` bytes to `target`
pub fn pointer_to(target: DataType, size: u32) -> DataType {
    DataType::Pointer(Pointer {
        target: Box::new(target),
        size,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub type_name: String,
}

/// A function's prototype as known to the program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub return_type: String,
    pub calling_convention: String,
    pub parameters: Vec<Parameter>,
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            return_type: "undefined".to_string(),
            calling_convention: "unknown".to_string(),
            parameters: Vec::new(),
        }
    }
}

impl Signature {
    fn parameter_list(&self) -> String {
        if self.parameters.is_empty() {
            return "void".to_string();
        }
        self.parameters
            .iter()
            .map(|p| format!("{} {}", p.type_name, p.name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDefinition {
    pub name: String,
    pub signature: Signature,
}

impl FunctionDefinition {
    /// Declaration of `declarator` with this prototype
    pub fn declaration(&self, declarator: &str) -> String {
        let sig = &self.signature;
        if sig.calling_convention == "unknown" {
            format!("{} {}({})", sig.return_type, declarator, sig.parameter_list())
        } else {
            format!(
                "{} {} {}({})",
                sig.return_type,
                sig.calling_convention,
                declarator,
                sig.parameter_list()
            )
        }
    }
}

impl fmt::Display for FunctionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.declaration(&self.name))
    }
}

/// A structure member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub offset: u32,
    pub data_type: DataType,
    pub name: String,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    name: String,
    components: Vec<Component>,
}

impl Structure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a component at the current end of the structure.
    /// Names are not deduplicated.
    pub fn add(
        &mut self,
        data_type: DataType,
        name: impl Into<String>,
        comment: impl Into<String>,
    ) -> Result<&Component, TypeError> {
        if data_type.length().is_none() {
            return Err(TypeError::Unsized(data_type.name()));
        }

        let offset = self.length();
        self.components.push(Component {
            offset,
            data_type,
            name: name.into(),
            comment: comment.into(),
        });
        Ok(&self.components[self.components.len() - 1])
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn length(&self) -> u32 {
        self.components
            .iter()
            .map(|c| c.data_type.length().unwrap_or(0))
            .sum()
    }

    pub fn to_c(&self) -> String {
        let mut out = format!("struct {} {{\n", self.name);
        for c in &self.components {
            let decl = match c.data_type.as_pointer().map(|p| p.target.as_ref()) {
                Some(DataType::FunctionDefinition(f)) => f.declaration(&format!("(* {})", c.name)),
                _ => format!("{} {}", c.data_type.name(), c.name),
            };
            if c.comment.is_empty() {
                out.push_str(&format!("    {};\n", decl));
            } else {
                out.push_str(&format!("    {}; // {}\n", decl, c.comment));
            }
        }
        out.push_str("};");
        out
    }
}
