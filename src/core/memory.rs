//! Memory - Program image memory
//!
//! Provides the 32-bit address type and the mapped memory image that
//! backs every read the class parser performs.

use std::fmt;
use std::ops::Add;
use thiserror::Error;

/// Memory operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Unmapped memory at {address}")]
    Unmapped { address: Address },

    #[error("Read of {size} bytes at {address} runs past the end of its region")]
    Truncated { address: Address, size: usize },

    #[error("Region {name} at {base} overlaps an existing region")]
    Overlap { name: String, base: Address },
}

/// A location in a 32-bit image.
///
/// Arithmetic wraps at 2^32, matching how the target itself computes
/// pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u32);

impl Address {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Reinterpret a signed 32-bit value read from memory as an address
    pub const fn from_i32(value: i32) -> Self {
        Self(value as u32)
    }

    pub const fn value(self) -> u32 {
        self.0
    }
}

impl Add<u32> for Address {
    type Output = Address;

    fn add(self, bytes: u32) -> Address {
        Address(self.0.wrapping_add(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::UpperHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

/// Memory protection flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryProtection {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl MemoryProtection {
    pub const R: Self = Self {
        read: true,
        write: false,
        execute: false,
    };
    pub const RX: Self = Self {
        read: true,
        write: false,
        execute: true,
    };
    pub const RW: Self = Self {
        read: true,
        write: true,
        execute: false,
    };
}

/// Represents a mapped block of the image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Block name (e.g. the PE section name)
    pub name: String,

    /// Start address of the region
    pub base: Address,

    /// Initialized contents; the region size is `bytes.len()`
    pub bytes: Vec<u8>,

    /// Memory protection flags
    pub protection: MemoryProtection,
}

impl MemoryRegion {
    pub fn new(
        name: impl Into<String>,
        base: Address,
        bytes: Vec<u8>,
        protection: MemoryProtection,
    ) -> Self {
        Self {
            name: name.into(),
            base,
            bytes,
            protection,
        }
    }

    /// One past the last byte, widened so regions ending at 2^32 still work
    pub fn end(&self) -> u64 {
        self.base.value() as u64 + self.bytes.len() as u64
    }

    pub fn contains(&self, address: Address) -> bool {
        let a = address.value() as u64;
        a >= self.base.value() as u64 && a < self.end()
    }
}

/// The mapped memory of one program
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryImage {
    regions: Vec<MemoryRegion>,
}

impl MemoryImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a region, keeping regions sorted by base address
    pub fn map(&mut self, region: MemoryRegion) -> Result<(), MemoryError> {
        let overlaps = self.regions.iter().any(|r| {
            (region.base.value() as u64) < r.end() && (r.base.value() as u64) < region.end()
        });
        if overlaps {
            return Err(MemoryError::Overlap {
                name: region.name,
                base: region.base,
            });
        }

        log::debug!(
            "Mapped {} at {} ({} bytes)",
            region.name,
            region.base,
            region.bytes.len()
        );
        let pos = self.regions.partition_point(|r| r.base < region.base);
        self.regions.insert(pos, region);
        Ok(())
    }

    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    pub fn region_at(&self, address: Address) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.contains(address))
    }

    pub fn is_executable(&self, address: Address) -> bool {
        self.region_at(address)
            .map(|r| r.protection.execute)
            .unwrap_or(false)
    }

    /// Borrow `size` mapped bytes at `address`. Reads never span regions.
    fn slice(&self, address: Address, size: usize) -> Result<&[u8], MemoryError> {
        if size == 0 {
            return Ok(&[]);
        }

        let region = self
            .region_at(address)
            .ok_or(MemoryError::Unmapped { address })?;
        let start = (address.value() - region.base.value()) as usize;

        start
            .checked_add(size)
            .and_then(|end| region.bytes.get(start..end))
            .ok_or(MemoryError::Truncated { address, size })
    }

    /// Read memory from the image
    pub fn read(&self, address: Address, size: usize) -> Result<Vec<u8>, MemoryError> {
        self.slice(address, size).map(<[u8]>::to_vec)
    }

    /// Read memory into an existing buffer
    pub fn read_into(&self, address: Address, buffer: &mut [u8]) -> Result<(), MemoryError> {
        buffer.copy_from_slice(self.slice(address, buffer.len())?);
        Ok(())
    }

    pub fn read_u8(&self, address: Address) -> Result<u8, MemoryError> {
        let mut buf = [0u8; 1];
        self.read_into(address, &mut buf)?;
        Ok(buf[0])
    }

    pub fn read_i32_le(&self, address: Address) -> Result<i32, MemoryError> {
        let mut buf = [0u8; 4];
        self.read_into(address, &mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

}
