use std::sync::Arc;

use fnv::FnvHashMap as HashMap;
use gimli::constants::{DwAt, DwForm, DwTag};

use crate::reader::{read_uleb128, Cursor};
use crate::Result;

/// One attribute specification of an abbreviation declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbbrevAttribute {
    pub at: DwAt,
    pub form: DwForm,
}

/// One abbreviation declaration: the schema for all entries sharing `code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abbrev {
    pub code: u64,
    pub tag: DwTag,
    pub has_children: bool,
    pub attributes: Vec<AbbrevAttribute>,
}

/// A decoded abbreviation table, keyed by the file offset where it starts.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AbbrevTable {
    pub offset: usize,
    abbrevs: HashMap<u64, Abbrev>,
}

impl AbbrevTable {
    #[inline]
    pub fn get(&self, code: u64) -> Option<&Abbrev> {
        self.abbrevs.get(&code)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.abbrevs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.abbrevs.is_empty()
    }
}

/// Memoizes abbreviation tables by their file byte offset.
///
/// Compile units routinely share one table; the cache decodes each offset
/// once and hands out the same `Arc` afterwards, so every holder sees a
/// structurally identical table. The cache lives for exactly one parse
/// session.
#[derive(Debug, Default)]
pub struct AbbrevCache {
    tables: HashMap<usize, Arc<AbbrevTable>>,
}

impl AbbrevCache {
    pub fn new() -> AbbrevCache {
        AbbrevCache::default()
    }

    /// Return the abbreviation table starting at `offset` in `data`,
    /// decoding it on first use.
    pub fn resolve(&mut self, data: &[u8], offset: usize) -> Result<Arc<AbbrevTable>> {
        if let Some(table) = self.tables.get(&offset) {
            debug!("abbrev table at 0x{:x} already decoded", offset);
            return Ok(table.clone());
        }

        let table = Arc::new(Self::decode(data, offset)?);
        self.tables.insert(offset, table.clone());
        Ok(table)
    }

    /// Decode a sequence of abbreviation declarations terminated by a zero
    /// code. Each declaration is `code, tag, children-flag`, then
    /// attribute/form pairs terminated by `(0, 0)`.
    fn decode(data: &[u8], offset: usize) -> Result<AbbrevTable> {
        let mut cur = Cursor::new(data, offset);
        let mut table = AbbrevTable {
            offset,
            abbrevs: HashMap::default(),
        };

        loop {
            let code = read_uleb128(&mut cur)
                .map_err(|e| format!("malformed abbreviation at 0x{:x}: {}", offset, e))?;
            if code == 0 {
                break;
            }

            let tag = read_uleb128(&mut cur)
                .map_err(|e| format!("malformed abbreviation at 0x{:x}: {}", offset, e))?;
            let has_children = cur.read_u8()? != 0;

            let mut attributes = Vec::new();
            loop {
                let at = read_uleb128(&mut cur)
                    .map_err(|e| format!("malformed abbreviation at 0x{:x}: {}", offset, e))?;
                let form = read_uleb128(&mut cur)
                    .map_err(|e| format!("malformed abbreviation at 0x{:x}: {}", offset, e))?;
                if at == 0 && form == 0 {
                    break;
                }
                attributes.push(AbbrevAttribute {
                    at: DwAt(at as u16),
                    form: DwForm(form as u16),
                });
            }

            table.abbrevs.insert(
                code,
                Abbrev {
                    code,
                    tag: DwTag(tag as u16),
                    has_children,
                    attributes,
                },
            );
        }

        Ok(table)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use gimli::constants;

    // code 1: DW_TAG_base_type, no children, (DW_AT_name, DW_FORM_string),
    // (DW_AT_byte_size, DW_FORM_data1).
    fn base_type_table() -> Vec<u8> {
        vec![
            0x01, 0x24, 0x00, // code, tag, children
            0x03, 0x08, // name, string
            0x0b, 0x0b, // byte_size, data1
            0x00, 0x00, // end of attributes
            0x00, // end of table
        ]
    }

    #[test]
    fn decode_table() {
        let data = base_type_table();
        let mut cache = AbbrevCache::new();
        let table = cache.resolve(&data, 0).unwrap();
        let abbrev = table.get(1).unwrap();
        assert_eq!(abbrev.tag, constants::DW_TAG_base_type);
        assert!(!abbrev.has_children);
        assert_eq!(
            abbrev.attributes,
            vec![
                AbbrevAttribute {
                    at: constants::DW_AT_name,
                    form: constants::DW_FORM_string,
                },
                AbbrevAttribute {
                    at: constants::DW_AT_byte_size,
                    form: constants::DW_FORM_data1,
                },
            ]
        );
        assert!(table.get(2).is_none());
    }

    #[test]
    fn cache_hit_returns_same_table() {
        let data = base_type_table();
        let mut cache = AbbrevCache::new();
        let first = cache.resolve(&data, 0).unwrap();
        let second = cache.resolve(&data, 0).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn distinct_offsets_distinct_tables() {
        // Two tables back to back; resolving the second must not disturb
        // the first.
        let mut data = base_type_table();
        let second_offset = data.len();
        data.extend_from_slice(&[
            0x01, 0x34, 0x00, // code 1: DW_TAG_variable, no children
            0x03, 0x08, // name, string
            0x00, 0x00, 0x00,
        ]);

        let mut cache = AbbrevCache::new();
        let first = cache.resolve(&data, 0).unwrap();
        let second = cache.resolve(&data, second_offset).unwrap();
        assert_eq!(first.get(1).unwrap().tag, constants::DW_TAG_base_type);
        assert_eq!(second.get(1).unwrap().tag, constants::DW_TAG_variable);
        assert_eq!(
            cache.resolve(&data, 0).unwrap().get(1).unwrap().tag,
            constants::DW_TAG_base_type
        );
    }

    #[test]
    fn overflow_is_malformed() {
        let data = [0x80u8; 16];
        let mut cache = AbbrevCache::new();
        assert!(cache.resolve(&data, 0).is_err());
    }
}
