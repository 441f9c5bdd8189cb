//! Drives the full symbol pipeline — unit scan, abbreviation resolution,
//! entry tree construction, parallel type resolution — over synthetic
//! sections.

use std::sync::Arc;

use calbin_parser::{
    build_entry_tree, resolve_symbols_with_workers, scan_units, AbbrevCache, DataType, EntryKind,
    SectionRange, Sections,
};

// Abbreviations shared by every unit below:
//   1: compile_unit, children, name:string
//   2: variable, no children, name:string type:ref4 location:exprloc
//   3: base_type, no children, name:string byte_size:data1
fn abbrev_section() -> Vec<u8> {
    vec![
        0x01, 0x11, 0x01, 0x03, 0x08, 0x00, 0x00, // compile_unit
        0x02, 0x34, 0x00, 0x03, 0x08, 0x49, 0x13, 0x02, 0x18, 0x00, 0x00, // variable
        0x03, 0x24, 0x00, 0x03, 0x08, 0x0b, 0x0b, 0x00, 0x00, // base_type
        0x00,
    ]
}

// One unit: a compile-unit entry, an `int` base type, and one variable of
// that type at `address`.
fn unit_bytes(version: u16, unit_name: &[u8], var_name: &[u8], address: u32) -> Vec<u8> {
    let mut info = vec![0, 0, 0, 0]; // length, patched below
    info.extend_from_slice(&version.to_le_bytes());
    let header_size = if version == 5 {
        info.push(0x01); // unit type
        info.push(4); // address size
        info.extend_from_slice(&0u32.to_le_bytes()); // abbrev offset
        12
    } else {
        info.extend_from_slice(&0u32.to_le_bytes()); // abbrev offset
        info.push(4); // address size
        11
    };

    info.push(0x01); // compile unit
    info.extend_from_slice(unit_name);
    info.push(0);

    let base_offset = (header_size + 1 + unit_name.len() + 1) as u32;
    info.push(0x03); // base type
    info.extend_from_slice(b"int\0");
    info.push(4); // byte size

    info.push(0x02); // variable
    info.extend_from_slice(var_name);
    info.push(0);
    info.extend_from_slice(&base_offset.to_le_bytes());
    info.push(5); // exprloc length
    info.push(0x03); // address opcode
    info.extend_from_slice(&address.to_le_bytes());

    info.push(0x00); // end of compile unit children

    let length = (info.len() - 4) as u32;
    info[0..4].copy_from_slice(&length.to_le_bytes());
    info
}

#[test]
fn synthetic_units_end_to_end() {
    let abbrev = abbrev_section();
    let mut info = unit_bytes(4, b"one.c", b"speed", 0x1000);
    info.extend_from_slice(&unit_bytes(5, b"two.c", b"limit", 0x2000));

    let mut file = abbrev.clone();
    let info_offset = file.len();
    file.extend_from_slice(&info);
    let sections = Sections {
        abbrev: SectionRange {
            offset: 0,
            size: abbrev.len(),
        },
        info: SectionRange {
            offset: info_offset,
            size: info.len(),
        },
        str_: SectionRange::default(),
    };

    let mut units = scan_units(&info).unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].version, 4);
    assert_eq!(units[0].header_size, 11);
    assert_eq!(units[1].version, 5);
    assert_eq!(units[1].header_size, 12);

    // Both units name abbreviation offset 0, so they share one table.
    let mut cache = AbbrevCache::new();
    for unit in &mut units {
        let table = cache
            .resolve(&file, sections.abbrev.offset + unit.abbrev_offset)
            .unwrap();
        unit.abbrev = Some(table);
    }
    assert!(Arc::ptr_eq(
        units[0].abbrev.as_ref().unwrap(),
        units[1].abbrev.as_ref().unwrap()
    ));

    let mut trees = Vec::new();
    for unit in &mut units {
        trees.push(build_entry_tree(&file, &sections, unit, 64).unwrap());
    }

    for (tree, name) in trees.iter().zip([&b"one.c"[..], &b"two.c"[..]].iter()) {
        let root = tree.root().unwrap();
        match &tree.node(root).kind {
            EntryKind::CompileUnit(cu) => assert_eq!(&cu.name.as_slice(), name),
            kind => panic!("unexpected root {:?}", kind),
        }
    }

    let serial = resolve_symbols_with_workers(&trees, &units, 64, 1);
    let parallel = resolve_symbols_with_workers(&trees, &units, 64, 8);
    assert_eq!(serial, parallel);

    assert_eq!(serial.len(), 2);
    let expected = [
        (&b"one.c"[..], &b"speed"[..], 0x1000u64),
        (&b"two.c"[..], &b"limit"[..], 0x2000u64),
    ];
    for (tree, (unit_name, var_name, address)) in serial.iter().zip(expected.iter()) {
        let root = tree.root().unwrap();
        assert_eq!(tree.node(root).name.as_slice(), *unit_name);
        let vars: Vec<_> = tree.children(root).collect();
        assert_eq!(vars.len(), 1);
        let var = tree.node(vars[0]);
        assert_eq!(var.name.as_slice(), *var_name);
        assert_eq!(var.address.get(), Some(*address));
        assert_eq!(var.data_type, DataType::Sint32);
        assert_eq!(var.size_chain, vec![4]);
    }
}
