use std::sync::Arc;

use fnv::FnvHashMap as HashMap;

use crate::abbrev::AbbrevTable;
use crate::entry::EntryId;
use crate::reader::Cursor;
use crate::Result;

/// A compile unit descriptor.
///
/// Offsets are relative to the start of the debug-information section. The
/// header size depends on the format version and is carried here rather than
/// in shared state, so units with mixed versions parse independently.
#[derive(Debug, Default)]
pub struct CompileUnit {
    /// Offset of the unit within the debug-information section.
    pub offset: usize,
    /// Length in bytes of the unit, excluding the length field itself.
    pub length: u32,
    pub version: u16,
    /// DWARF 5 unit type; `DW_UT_compile` for earlier versions.
    pub unit_type: u8,
    /// Offset of the unit's abbreviation table within the abbreviation
    /// section.
    pub abbrev_offset: usize,
    pub address_size: u8,
    pub header_size: u8,
    /// Shared decoded abbreviation table, attached before entry parsing.
    pub abbrev: Option<Arc<AbbrevTable>>,
    /// Type-offset to entry index, populated while building the entry tree.
    pub type_index: HashMap<u64, EntryId>,
    /// Offsets of declaration-only variables, for specification merging.
    pub declaration_index: HashMap<u64, EntryId>,
}

const DW_UT_COMPILE: u8 = 0x01;

impl CompileUnit {
    /// Section-relative offset one past the unit's last byte.
    #[inline]
    pub fn end_offset(&self) -> usize {
        self.offset + 4 + self.length as usize
    }

    /// Register a type entry under its unit-relative offset. The first
    /// registration wins.
    pub(crate) fn register_type(&mut self, offset: u64, id: EntryId) {
        self.type_index.entry(offset).or_insert(id);
    }

    pub(crate) fn register_declaration(&mut self, offset: u64, id: EntryId) {
        self.declaration_index.entry(offset).or_insert(id);
    }
}

/// Split the debug-information section into compile units, parsing each
/// unit's version-dependent header.
///
/// A zero unit length terminates the scan; a declared length past the end of
/// the section and an unknown format version are fatal.
pub fn scan_units(info: &[u8]) -> Result<Vec<CompileUnit>> {
    let mut units = Vec::new();
    let mut offset = 0usize;

    while offset < info.len() {
        let mut cur = Cursor::new(info, offset);
        let length = match cur.read_u32() {
            Ok(length) => length,
            Err(_) => break,
        };
        if length == 0 {
            break;
        }

        if offset + 4 + length as usize > info.len() {
            return Err(format!(
                "truncated compile unit at offset 0x{:x}: length {} exceeds section",
                offset, length
            )
            .into());
        }

        let version = cur.read_u16()?;
        let mut unit = CompileUnit {
            offset,
            length,
            version,
            ..Default::default()
        };

        if version <= 4 {
            unit.abbrev_offset = cur.read_u32()? as usize;
            unit.address_size = cur.read_u8()?;
            unit.unit_type = DW_UT_COMPILE;
            unit.header_size = 11;
        } else if version == 5 {
            unit.unit_type = cur.read_u8()?;
            unit.address_size = cur.read_u8()?;
            unit.abbrev_offset = cur.read_u32()? as usize;
            unit.header_size = 12;
        } else {
            return Err(format!("unsupported debug info version {}", version).into());
        }

        debug!(
            "unit [{}] offset 0x{:x} length {} version {} abbrev 0x{:x}",
            units.len(),
            unit.offset,
            unit.length,
            unit.version,
            unit.abbrev_offset
        );
        units.push(unit);
        offset += length as usize + 4;
    }

    Ok(units)
}

#[cfg(test)]
mod test {
    use super::*;

    fn v4_header(length: u32, abbrev_offset: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&length.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&abbrev_offset.to_le_bytes());
        bytes.push(4); // address size
        bytes
    }

    #[test]
    fn version_4_header() {
        let mut info = v4_header(7, 0x20);
        info.resize(11, 0);
        let units = scan_units(&info).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].version, 4);
        assert_eq!(units[0].header_size, 11);
        assert_eq!(units[0].abbrev_offset, 0x20);
        assert_eq!(units[0].address_size, 4);
        assert_eq!(units[0].end_offset(), 11);
    }

    #[test]
    fn version_5_header() {
        let mut info = Vec::new();
        info.extend_from_slice(&8u32.to_le_bytes());
        info.extend_from_slice(&5u16.to_le_bytes());
        info.push(0x01); // unit type
        info.push(8); // address size
        info.extend_from_slice(&0x40u32.to_le_bytes());
        info.resize(12, 0);
        let units = scan_units(&info).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].header_size, 12);
        assert_eq!(units[0].unit_type, 0x01);
        assert_eq!(units[0].address_size, 8);
        assert_eq!(units[0].abbrev_offset, 0x40);
    }

    #[test]
    fn multiple_units_and_terminator() {
        let mut info = v4_header(7, 0);
        info.resize(11, 0);
        let second = v4_header(7, 0x10);
        info.extend_from_slice(&second);
        info.resize(22, 0);
        info.extend_from_slice(&0u32.to_le_bytes()); // terminator
        info.extend_from_slice(&[0xff; 8]); // junk past terminator
        let units = scan_units(&info).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].offset, 0);
        assert_eq!(units[1].offset, 11);
    }

    #[test]
    fn truncated_unit() {
        let info = v4_header(1000, 0);
        assert!(scan_units(&info).is_err());
    }

    #[test]
    fn unsupported_version() {
        let mut info = Vec::new();
        info.extend_from_slice(&7u32.to_le_bytes());
        info.extend_from_slice(&9u16.to_le_bytes());
        info.resize(11, 0);
        assert!(scan_units(&info).is_err());
    }
}
