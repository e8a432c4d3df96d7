//! Class metadata record: locating the VT and decoding the class name

use std::fmt;

use super::dialect::DialectConfig;
use super::ParseError;
use crate::core::memory::{Address, MemoryError};
use crate::program::{DataType, HostError, Program};

/// Pointers pulled from the metadata record at the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassMetadata {
    pub address: Address,
    pub vt_base: Address,
    pub name_address: Address,
}

/// Read the VT base (displacement 0) and the name pointer
pub fn locate<P: Program + ?Sized>(
    program: &P,
    address: Address,
    config: &DialectConfig,
) -> Result<ClassMetadata, MemoryError> {
    let vt_base = Address::from_i32(program.read_i32_le(address)?);
    let name_address = Address::from_i32(program.read_i32_le(address + config.name_offset)?);

    log::debug!(
        "Metadata at {}: vt={} name={}",
        address,
        vt_base,
        name_address
    );
    Ok(ClassMetadata {
        address,
        vt_base,
        name_address,
    })
}

/// Class name exactly as stored: the bytes of a length-prefixed string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassName {
    bytes: Vec<u8>,
    text: String,
}

impl ClassName {
    /// Bytes map one-to-one onto U+0000..U+00FF, so nothing is lost
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let text = bytes.iter().map(|&b| b as char).collect();
        Self { bytes, text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn unreadable(err: HostError) -> ParseError {
    match err {
        HostError::Memory(e) => ParseError::MetadataUnreadable(e),
        other => ParseError::Host(other),
    }
}

/// Re-annotate the name bytes as a PascalString255 and decode them
pub fn decode_name<P: Program + ?Sized>(
    program: &mut P,
    name_address: Address,
) -> Result<ClassName, ParseError> {
    program.clear_data(name_address, name_address + 1);
    program
        .create_data(name_address, &DataType::PascalString255)
        .map_err(unreadable)?;

    let len = program
        .read_u8(name_address)
        .map_err(ParseError::MetadataUnreadable)?;
    let bytes = program
        .read_bytes(name_address + 1, len as usize)
        .map_err(ParseError::MetadataUnreadable)?;

    log::debug!("Class name bytes at {}: {}", name_address, hex::encode(&bytes));
    Ok(ClassName::from_bytes(bytes))
}

/// The upper-cased first character must be one of the dialect prefixes
pub fn validate(name: &ClassName, config: &DialectConfig) -> Result<(), ParseError> {
    let accepted = name
        .as_str()
        .chars()
        .next()
        .map(|c| c.to_uppercase().any(|u| config.class_prefixes.contains(&u)))
        .unwrap_or(false);

    if accepted {
        Ok(())
    } else {
        Err(ParseError::BadClassName {
            name: name.to_string(),
            expected: config.prefix_list(),
        })
    }
}
