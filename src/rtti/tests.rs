//! Class parser tests against an in-memory project

use super::*;
use crate::core::memory::{Address, MemoryProtection, MemoryRegion};
use crate::program::types::{pointer_to, Parameter};
use crate::program::{
    ConflictPolicy, DataType, FunctionDefinition, NamespaceId, NamespaceKind, ProjectDb,
    Signature, SourceType, Structure, SymbolKind,
};
use crate::script::BufferConsole;

const META: u32 = 0x10000;
const VT: u32 = 0x20000;
const NAME: u32 = 0x30000;
const CODE: u32 = 0x40000;

fn le(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Metadata at META, name at NAME, VT at VT, `code_len` bytes of code at CODE
fn project(name: &[u8], slots: &[u32], code_len: usize) -> ProjectDb {
    let mut db = ProjectDb::default();

    let mut meta = vec![0u8; 0x40];
    meta[0..4].copy_from_slice(&VT.to_le_bytes());
    meta[32..36].copy_from_slice(&NAME.to_le_bytes());
    db.map(MemoryRegion::new(".meta", Address::new(META), meta, MemoryProtection::R))
        .unwrap();

    let mut pascal = vec![name.len() as u8];
    pascal.extend_from_slice(name);
    db.map(MemoryRegion::new(".name", Address::new(NAME), pascal, MemoryProtection::R))
        .unwrap();

    db.map(MemoryRegion::new(".vt", Address::new(VT), le(slots), MemoryProtection::R))
        .unwrap();
    db.map(MemoryRegion::new(
        ".text",
        Address::new(CODE),
        vec![0x55; code_len],
        MemoryProtection::RX,
    ))
    .unwrap();
    db
}

fn parse(db: &mut ProjectDb) -> (Result<ParsedClass, ParseError>, BufferConsole) {
    parse_with(db, &DialectConfig::default())
}

fn parse_with(
    db: &mut ProjectDb,
    config: &DialectConfig,
) -> (Result<ParsedClass, ParseError>, BufferConsole) {
    let mut console = BufferConsole::new();
    let result = parse_class(db, &mut console, Address::new(META), config);
    (result, console)
}

fn field_targets(db: &ProjectDb, vt_name: &str) -> Vec<String> {
    db.data_type(vt_name)
        .and_then(|t| t.as_structure())
        .unwrap()
        .components()
        .iter()
        .map(|c| {
            c.data_type
                .as_pointer()
                .and_then(|p| p.target.as_function_definition())
                .map(|f| f.name.clone())
                .unwrap()
        })
        .collect()
}

#[test]
fn test_happy_path() {
    let mut db = project(b"THappy", &[0x40100, 0x40200, 0x40300], 0x300);
    let (result, console) = parse(&mut db);
    let parsed = result.unwrap();

    assert_eq!(parsed.name.as_str(), "THappy");
    assert_eq!(parsed.metadata.vt_base, Address::new(VT));
    assert_eq!(parsed.slots.len(), 2);
    assert_eq!(
        parsed.end,
        WalkEnd::NoFunction {
            slot: Address::new(VT + 8),
            target: Address::new(0x40300)
        }
    );

    let ns = db.namespace(parsed.namespace).unwrap();
    assert_eq!(ns.name, "THappy");
    assert_eq!(ns.kind, NamespaceKind::Class);
    assert_eq!(
        field_targets(&db, "THappyVT"),
        vec!["FUN_00040100", "FUN_00040200"]
    );

    assert_eq!(console.lines[0], "[Dhrake] Creating class THappy");
    assert!(console.contains("defining function at 0x00040100, name FUN_00040100"));
    assert!(console.contains("adding function THappy::FUN_00040200"));
    assert!(console.popups.is_empty());
}

#[test]
fn test_name_annotated_as_pascal_string() {
    let mut db = project(b"TNamed", &[], 0);
    let _ = parse(&mut db);

    let data = db.data_at(Address::new(NAME)).unwrap();
    assert_eq!(data.data_type, DataType::PascalString255);
    assert_eq!(data.length, 7);
}

#[test]
fn test_inline_name_layout() {
    // <vt:i32><48 bytes><len:u8><bytes>, name pointer at +32 -> length byte
    let name = b"TInline";
    let mut record = Vec::new();
    record.extend_from_slice(&VT.to_le_bytes());
    record.extend_from_slice(&[0u8; 48]);
    record.push(name.len() as u8);
    record.extend_from_slice(name);
    record[32..36].copy_from_slice(&(META + 52).to_le_bytes());

    let mut db = ProjectDb::default();
    db.map(MemoryRegion::new(".meta", Address::new(META), record, MemoryProtection::R))
        .unwrap();
    db.map(MemoryRegion::new(".vt", Address::new(VT), le(&[CODE]), MemoryProtection::R))
        .unwrap();

    let (result, _) = parse(&mut db);
    let parsed = result.unwrap();
    assert_eq!(parsed.name.bytes(), name);
    assert_eq!(parsed.metadata.name_address, Address::new(META + 52));
    // CODE is not mapped, so the walk ends on the first slot
    assert!(parsed.slots.is_empty());
    assert!(parsed.end.is_clean());
}

#[test]
fn test_prefix_rejection_leaves_no_class() {
    for bad in ["xBad", "IUnknown", "_TObject", "9Lives", ""] {
        let mut db = project(bad.as_bytes(), &[0x40100], 0x300);
        let (result, console) = parse(&mut db);

        assert!(
            matches!(&result, Err(ParseError::BadClassName { name, .. }) if name == bad),
            "{:?} accepted",
            bad
        );
        assert!(result.unwrap_err().is_failure());
        assert_eq!(db.namespaces().count(), 1);
        assert_eq!(db.data_types().count(), 0);
        assert_eq!(db.functions().count(), 0);
        assert_eq!(
            console.lines,
            vec![format!(
                "[Dhrake] Expected class to be prefixed with T or E, class name given was {}.",
                bad
            )]
        );
    }
}

#[test]
fn test_lowercase_prefix_accepted() {
    let mut db = project(b"eFoo", &[], 0);
    let (result, _) = parse(&mut db);
    assert_eq!(result.unwrap().name.as_str(), "eFoo");
}

#[test]
fn test_second_run_is_rejected_unchanged() {
    let mut db = project(b"TDup", &[0x40100, 0x40200], 0x300);
    parse(&mut db).0.unwrap();
    let snapshot = db.clone();

    let (result, console) = parse(&mut db);
    assert_eq!(result.unwrap_err(), ParseError::AlreadyDefined("TDup".into()));
    assert!(console.contains("Class TDup already exists, stopping"));
    assert_eq!(db, snapshot);
}

#[test]
fn test_name_taken_by_function() {
    let mut db = project(b"TClash", &[0x40100], 0x300);
    db.add_function(Address::new(0x40000), "TClash", Signature::default(), SourceType::Analysis)
        .unwrap();

    let (result, _) = parse(&mut db);
    let err = result.unwrap_err();
    assert_eq!(err, ParseError::AlreadyDefined("TClash".into()));
    assert!(!err.is_failure());
    assert_eq!(db.data_types().count(), 0);
}

#[test]
fn test_namespace_null_is_silent() {
    let mut db = project(b"TLib", &[0x40100], 0x300);
    db.add_library("TLib");

    let (result, console) = parse(&mut db);
    assert_eq!(result.unwrap_err(), ParseError::NamespaceNull("TLib".into()));
    assert_eq!(console.lines, vec!["[Dhrake] Creating class TLib"]);
    assert!(console.popups.is_empty());
    assert_eq!(db.data_types().count(), 0);
}

#[test]
fn test_field_order_matches_slots() {
    let slots = [0x40200, 0x40010, 0x40180, 0x40040];
    let mut db = project(b"TOrder", &slots, 0x300);
    let parsed = parse(&mut db).0.unwrap();

    let targets: Vec<u32> = parsed.slots.iter().map(|s| s.target.value()).collect();
    assert_eq!(targets, slots.to_vec());

    let expected: Vec<String> = slots.iter().map(|t| format!("FUN_{:08X}", t)).collect();
    assert_eq!(field_targets(&db, "TOrderVT"), expected);
    for (i, slot) in parsed.slots.iter().enumerate() {
        assert_eq!(slot.index as usize, i);
        assert_eq!(slot.slot, Address::new(VT + 4 * i as u32));
    }
}

#[test]
fn test_stub_named_after_symbol() {
    let mut db = project(b"TSym", &[0x40100, 0x40200], 0x300);
    db.add_label(
        Address::new(0x40200),
        "Sym_Free",
        NamespaceId::GLOBAL,
        SymbolKind::Label,
        SourceType::Imported,
    );

    let parsed = parse(&mut db).0.unwrap();
    assert_eq!(parsed.slots[1].field_name, "Sym_Free");
    assert!(parsed.slots.iter().all(|s| s.created));
    assert_eq!(
        db.function(parsed.slots[0].function).unwrap().name,
        "FUN_00040100"
    );
}

#[test]
fn test_existing_function_reparented() {
    let mut db = project(b"ExFoo", &[0x40100], 0x100 + 0x10);
    let existing = db
        .add_function(Address::new(0x40100), "DoIt", Signature::default(), SourceType::Analysis)
        .unwrap();

    let parsed = parse(&mut db).0.unwrap();
    assert_eq!(parsed.slots.len(), 1);
    assert_eq!(parsed.slots[0].function, existing);
    assert!(!parsed.slots[0].created);
    assert_eq!(parsed.slots[0].field_name, "DoIt");
    assert_eq!(db.function(existing).unwrap().namespace, parsed.namespace);
    assert_eq!(db.functions().count(), 1);
}

#[test]
fn test_all_functions_in_class_namespace() {
    let mut db = project(b"TParent", &[0x40100, 0x40200, 0x40100], 0x300);
    db.add_function(Address::new(0x40200), "Known", Signature::default(), SourceType::Analysis)
        .unwrap();

    let parsed = parse(&mut db).0.unwrap();
    assert_eq!(parsed.slots.len(), 3);
    for slot in &parsed.slots {
        assert_eq!(db.function(slot.function).unwrap().namespace, parsed.namespace);
    }
    assert_eq!(db.functions_in(parsed.namespace).len(), 2);
}

#[test]
fn test_duplicate_slots_not_deduplicated() {
    let mut db = project(b"TTwice", &[0x40100, 0x40100], 0x300);
    let parsed = parse(&mut db).0.unwrap();
    assert_eq!(
        field_targets(&db, "TTwiceVT"),
        vec!["FUN_00040100", "FUN_00040100"]
    );
    assert_eq!(parsed.slots[0].function, parsed.slots[1].function);
}

#[test]
fn test_instance_structure() {
    let mut db = project(b"TBase", &[0x40100], 0x300);
    let parsed = parse(&mut db).0.unwrap();

    let base = db.data_type("TBase").unwrap().as_structure().unwrap();
    assert_eq!(base.components().len(), 1);
    let vt = &base.components()[0];
    assert_eq!(vt.name, "vt");
    assert_eq!(vt.offset, 0);
    assert_eq!(vt.comment, "Virtual Function Table");

    let ptr = vt.data_type.as_pointer().unwrap();
    assert_eq!(ptr.size, 4);
    assert_eq!(ptr.target.as_structure().unwrap().name(), "TBaseVT");
    assert_eq!(*ptr.target, parsed.vtable_type);
    assert_eq!(db.data_type("TBase"), Some(&parsed.instance_type));
}

#[test]
fn test_vt_fields_have_empty_comment() {
    let mut db = project(b"TComment", &[0x40100, 0x40200], 0x300);
    parse(&mut db).0.unwrap();
    let vt = db.data_type("TCommentVT").unwrap().as_structure().unwrap();
    assert!(vt.components().iter().all(|c| c.comment.is_empty()));
    assert_eq!(vt.length(), 8);
}

#[test]
fn test_slot_cap() {
    let slots: Vec<u32> = (0..200).map(|i| CODE + i * 0x10).collect();
    let mut db = project(b"TOverCap", &slots, 0x1000);
    let parsed = parse(&mut db).0.unwrap();

    assert_eq!(parsed.end, WalkEnd::SlotCap);
    assert_eq!(parsed.slots.len(), 100);
    assert_eq!(field_targets(&db, "TOverCapVT").len(), 100);
    assert_eq!(db.functions().count(), 100);
}

#[test]
fn test_slot_cap_configurable() {
    let slots: Vec<u32> = (0..20).map(|i| CODE + i * 0x10).collect();
    let mut db = project(b"TSmall", &slots, 0x1000);
    let config = DialectConfig {
        max_slots: 5,
        ..Default::default()
    };
    let parsed = parse_with(&mut db, &config).0.unwrap();
    assert_eq!(parsed.slots.len(), 5);
}

#[test]
fn test_slot_fault_keeps_partial_vt() {
    // VT region holds two slots; the third read runs off mapped memory
    let mut db = project(b"TFault", &[0x40100, 0x40200], 0x1000);
    let (result, console) = parse(&mut db);
    let parsed = result.unwrap();

    assert!(!parsed.end.is_clean());
    assert!(matches!(&parsed.end, WalkEnd::Failed { slot, .. } if *slot == Address::new(VT + 8)));
    assert_eq!(parsed.slots.len(), 2);
    assert_eq!(field_targets(&db, "TFaultVT").len(), 2);
    assert!(db.data_type("TFault").is_some());

    assert!(console.contains("[Dhrake] Failed to add function: VT slot 2 at 00020008"));
    assert!(console.contains("[Dhrake] \tUnmapped memory at 00020008"));
}

#[test]
fn test_user_prototype_kept() {
    let mut db = project(b"TProto", &[0x40100], 0x300);
    db.add_function(
        Address::new(0x40100),
        "Run",
        Signature::default(),
        SourceType::Analysis,
    )
    .unwrap();
    let edited = DataType::FunctionDefinition(FunctionDefinition {
        name: "Run".into(),
        signature: Signature {
            return_type: "bool".into(),
            calling_convention: "__fastcall".into(),
            parameters: vec![Parameter {
                name: "Self".into(),
                type_name: "TProto *".into(),
            }],
        },
    });
    db.add_data_type(edited.clone(), ConflictPolicy::Keep).unwrap();

    parse(&mut db).0.unwrap();
    let vt = db.data_type("TProtoVT").unwrap().as_structure().unwrap();
    assert_eq!(*vt.components()[0].data_type.as_pointer().unwrap().target, edited);
    assert_eq!(db.data_type("Run"), Some(&edited));
}

#[test]
fn test_vt_replaced_on_reparse_of_renamed_class() {
    // A stale <Class>VT from an earlier session is replaced, not kept
    let mut db = project(b"TStale", &[0x40100], 0x300);
    let mut stale = Structure::new("TStaleVT");
    stale
        .add(pointer_to(DataType::PascalString255, 4), "old", "")
        .unwrap();
    db.add_data_type(DataType::Structure(stale), ConflictPolicy::Replace)
        .unwrap();

    parse(&mut db).0.unwrap();
    assert_eq!(field_targets(&db, "TStaleVT"), vec!["FUN_00040100"]);
}

#[test]
fn test_unreadable_metadata_pops_up_once() {
    let mut db = ProjectDb::default();
    db.map(MemoryRegion::new(
        ".meta",
        Address::new(META),
        le(&[VT]),
        MemoryProtection::R,
    ))
    .unwrap();
    let snapshot = db.clone();

    let (result, console) = parse(&mut db);
    let err = result.unwrap_err();
    assert!(matches!(err, ParseError::MetadataUnreadable(_)));
    assert!(err.is_failure());
    assert_eq!(console.popups.len(), 1);
    assert!(console.lines.is_empty());
    assert_eq!(db, snapshot);
}

#[test]
fn test_unmapped_cursor() {
    // Nothing mapped at the metadata address itself
    let mut db = project(b"TElsewhere", &[0x40100], 0x200);
    let snapshot = db.clone();

    let mut console = BufferConsole::new();
    let result = parse_class(
        &mut db,
        &mut console,
        Address::new(0x5000),
        &DialectConfig::default(),
    );
    assert_eq!(
        result.unwrap_err(),
        ParseError::MetadataUnreadable(crate::core::memory::MemoryError::Unmapped {
            address: Address::new(0x5000)
        })
    );
    assert_eq!(console.popups.len(), 1);
    assert!(console.lines.is_empty());
    assert_eq!(db, snapshot);
}

#[test]
fn test_unreadable_name_bytes() {
    // Name pointer leads into unmapped memory
    let mut meta = vec![0u8; 0x40];
    meta[32..36].copy_from_slice(&0x9000_0000u32.to_le_bytes());
    let mut db = ProjectDb::default();
    db.map(MemoryRegion::new(".meta", Address::new(META), meta, MemoryProtection::R))
        .unwrap();

    let (result, console) = parse(&mut db);
    assert!(matches!(result, Err(ParseError::MetadataUnreadable(_))));
    assert_eq!(console.popups.len(), 1);
    assert_eq!(db.namespaces().count(), 1);
}

#[test]
fn test_custom_tag() {
    let mut db = project(b"TTagged", &[], 0);
    let config = DialectConfig {
        log_tag: "VMT".into(),
        ..Default::default()
    };
    let (_, console) = parse_with(&mut db, &config);
    assert_eq!(console.lines[0], "[VMT] Creating class TTagged");
}
