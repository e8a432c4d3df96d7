//! Binary Loader Module
//!
//! Parses 32-bit PE executables using goblin and builds a project from:
//! - Sections (mapped as memory regions)
//! - Exported functions and the entry point
//! - Imports (as symbols in per-DLL library namespaces)

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

use crate::core::memory::{Address, MemoryProtection, MemoryRegion};
use crate::program::{ProjectDb, Signature, SourceType, SymbolKind};

const IMAGE_SCN_MEM_EXECUTE: u32 = 0x2000_0000;
const IMAGE_SCN_MEM_READ: u32 = 0x4000_0000;
const IMAGE_SCN_MEM_WRITE: u32 = 0x8000_0000;

/// Information about a function found in the binary
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub address: u32,
    /// Whether this is an exported function
    pub is_export: bool,
}

/// An imported symbol and the IAT slot it is bound through
#[derive(Debug, Clone)]
pub struct ImportInfo {
    pub dll: String,
    pub name: String,
    pub address: u32,
}

/// Information about a section in the binary
#[derive(Debug, Clone)]
pub struct SectionInfo {
    pub name: String,
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub file_offset: u32,
    pub file_size: u32,
    pub is_executable: bool,
    pub is_readable: bool,
    pub is_writable: bool,
}

impl SectionInfo {
    fn protection(&self) -> MemoryProtection {
        MemoryProtection {
            read: self.is_readable,
            write: self.is_writable,
            execute: self.is_executable,
        }
    }

    /// Section contents as mapped: file bytes, zero-filled up to the
    /// virtual size
    fn mapped_bytes(&self, data: &[u8]) -> Vec<u8> {
        let size = if self.virtual_size != 0 {
            self.virtual_size
        } else {
            self.file_size
        } as usize;

        let start = self.file_offset as usize;
        let take = (self.file_size as usize).min(size);
        let end = start.saturating_add(take).min(data.len());

        let mut bytes = data.get(start..end).map(<[u8]>::to_vec).unwrap_or_default();
        bytes.resize(size, 0);
        bytes
    }
}

/// Parsed binary information
#[derive(Debug)]
pub struct LoadedBinary {
    pub path: String,
    pub data: Vec<u8>,
    pub entry_point: u32,
    pub image_base: u32,
    pub functions: Vec<FunctionInfo>,
    pub imports: Vec<ImportInfo>,
    pub sections: Vec<SectionInfo>,
}

impl LoadedBinary {
    /// Load and parse a binary file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let data = fs::read(&path).with_context(|| format!("Failed to read {}", path_str))?;
        Self::from_bytes(data, path_str)
    }

    /// Parse binary from bytes
    pub fn from_bytes(data: Vec<u8>, path: String) -> Result<Self> {
        if data.len() < 4 {
            return Err(anyhow!("File too small"));
        }

        // Check for PE (MZ header)
        if data[0] == 0x4D && data[1] == 0x5A {
            return Self::parse_pe(data, path);
        }

        Err(anyhow!("Unknown binary format (only PE32 images are supported)"))
    }

    /// Parse PE (Windows executable)
    fn parse_pe(data: Vec<u8>, path: String) -> Result<Self> {
        let pe = goblin::pe::PE::parse(&data).map_err(|e| anyhow!("Invalid PE: {}", e))?;
        if pe.is_64 {
            return Err(anyhow!("64-bit images are not supported"));
        }

        let image_base = u32::try_from(pe.image_base as u64)
            .map_err(|_| anyhow!("Image base {:#x} exceeds 32 bits", pe.image_base as u64))?;
        let entry_point = image_base.wrapping_add(pe.entry as u32);

        // Collect sections
        let mut sections = Vec::new();
        for section in &pe.sections {
            let name = String::from_utf8_lossy(&section.name)
                .trim_end_matches('\0')
                .to_string();

            let characteristics = section.characteristics;
            sections.push(SectionInfo {
                name,
                virtual_address: image_base.wrapping_add(section.virtual_address),
                virtual_size: section.virtual_size,
                file_offset: section.pointer_to_raw_data,
                file_size: section.size_of_raw_data,
                is_executable: (characteristics & IMAGE_SCN_MEM_EXECUTE) != 0,
                is_readable: (characteristics & IMAGE_SCN_MEM_READ) != 0,
                is_writable: (characteristics & IMAGE_SCN_MEM_WRITE) != 0,
            });
        }

        // Collect functions from exports
        let mut functions = Vec::new();
        for export in &pe.exports {
            if let Some(name) = &export.name {
                functions.push(FunctionInfo {
                    name: name.to_string(),
                    address: image_base.wrapping_add(export.rva as u32),
                    is_export: true,
                });
            }
        }

        let mut imports = Vec::new();
        for import in &pe.imports {
            imports.push(ImportInfo {
                dll: import.dll.to_string(),
                name: import.name.to_string(),
                address: image_base.wrapping_add(import.rva as u32),
            });
        }

        // Add entry point
        if !functions.iter().any(|f| f.address == entry_point) {
            functions.push(FunctionInfo {
                name: "entry".to_string(),
                address: entry_point,
                is_export: false,
            });
        }

        Ok(Self {
            path,
            data,
            entry_point,
            image_base,
            functions,
            imports,
            sections,
        })
    }

    /// Build a project database from the parsed image
    pub fn into_project(self) -> Result<ProjectDb> {
        let mut db = ProjectDb::default();

        for section in &self.sections {
            let bytes = section.mapped_bytes(&self.data);
            if bytes.is_empty() {
                continue;
            }
            db.map(MemoryRegion::new(
                section.name.clone(),
                Address::new(section.virtual_address),
                bytes,
                section.protection(),
            ))
            .with_context(|| format!("Failed to map section {}", section.name))?;
        }

        for func in &self.functions {
            let entry = Address::new(func.address);
            if db.memory().is_executable(entry) {
                let source = if func.is_export {
                    SourceType::Imported
                } else {
                    SourceType::Analysis
                };
                // Aliased exports share an entry; the first name wins
                if let Err(e) = db.add_function(entry, func.name.clone(), Signature::default(), source) {
                    log::debug!("Skipping {} at {}: {}", func.name, entry, e);
                }
            }
        }

        for import in &self.imports {
            let library = db.add_library(import.dll.clone());
            db.add_label(
                Address::new(import.address),
                import.name.clone(),
                library,
                SymbolKind::Import,
                SourceType::Imported,
            );
        }

        log::info!(
            "Loaded {}: {} regions, {} functions, {} imports",
            self.path,
            db.memory().regions().len(),
            db.functions().count(),
            self.imports.len()
        );
        Ok(db)
    }

    /// Get executable sections only
    pub fn executable_sections(&self) -> Vec<&SectionInfo> {
        self.sections.iter().filter(|s| s.is_executable).collect()
    }

    /// Get summary string
    pub fn summary(&self) -> String {
        format!(
            "32-bit PE binary\n\
             Entry: 0x{:08x}\n\
             Image Base: 0x{:08x}\n\
             Sections: {} ({} executable)\n\
             Functions: {}\n\
             Imports: {}",
            self.entry_point,
            self.image_base,
            self.sections.len(),
            self.executable_sections().len(),
            self.functions.len(),
            self.imports.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(file_offset: u32, file_size: u32, virtual_size: u32) -> SectionInfo {
        SectionInfo {
            name: ".text".into(),
            virtual_address: 0x401000,
            virtual_size,
            file_offset,
            file_size,
            is_executable: true,
            is_readable: true,
            is_writable: false,
        }
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(LoadedBinary::from_bytes(vec![0x7f, b'E', b'L', b'F', 0], "a.out".into()).is_err());
        assert!(LoadedBinary::from_bytes(vec![0x4d], "tiny".into()).is_err());
    }

    #[test]
    fn test_rejects_truncated_pe() {
        let mut data = vec![0u8; 64];
        data[0] = 0x4d;
        data[1] = 0x5a;
        assert!(LoadedBinary::from_bytes(data, "broken.exe".into()).is_err());
    }

    #[test]
    fn test_section_zero_fill() {
        let data: Vec<u8> = (0..16).collect();
        let bytes = section(4, 4, 8).mapped_bytes(&data);
        assert_eq!(bytes, vec![4, 5, 6, 7, 0, 0, 0, 0]);
    }

    #[test]
    fn test_section_clamped_to_file() {
        let data: Vec<u8> = (0..8).collect();
        // Raw size claims more than the file holds
        let bytes = section(6, 16, 0).mapped_bytes(&data);
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..2], &[6, 7]);
        assert!(section(100, 4, 4).mapped_bytes(&data).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_into_project_maps_sections() {
        let binary = LoadedBinary {
            path: "mem".into(),
            data: vec![0xc3; 0x20],
            entry_point: 0x401000,
            image_base: 0x400000,
            functions: vec![FunctionInfo {
                name: "entry".into(),
                address: 0x401000,
                is_export: false,
            }],
            imports: vec![ImportInfo {
                dll: "KERNEL32.dll".into(),
                name: "ExitProcess".into(),
                address: 0x402000,
            }],
            sections: vec![section(0, 0x20, 0x20)],
        };

        let db = binary.into_project().unwrap();
        assert!(db.memory().is_executable(Address::new(0x401010)));
        assert_eq!(db.functions().count(), 1);
        let import = crate::program::Program::get_symbol_at(&db, Address::new(0x402000)).unwrap();
        assert_eq!(import.name, "ExitProcess");
        assert_eq!(import.kind, SymbolKind::Import);
        assert_eq!(import.display_name(), "KERNEL32.dll::ExitProcess");

        let library = db
            .find_namespace(crate::program::NamespaceId::GLOBAL, "KERNEL32.dll")
            .unwrap();
        assert_eq!(
            db.labels_in(library),
            vec![(Address::new(0x402000), "ExitProcess")]
        );
    }
}
