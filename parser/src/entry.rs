use gimli::constants::{self, DwAt};

use crate::abbrev::Abbrev;
use crate::file::Sections;
use crate::form::{read_form, value_u64};
use crate::reader::{read_uleb128, Cursor};
use crate::unit::CompileUnit;
use crate::{Address, Result};

/// Index of an entry within its unit's [`EntryTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u32);

impl EntryId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompileUnitEntry {
    pub name: Vec<u8>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BaseTypeEntry {
    pub name: Vec<u8>,
    pub byte_size: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TypedefEntry {
    pub type_ref: u64,
}

/// `const`/`volatile` wrapper around another type.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ModifierEntry {
    pub type_ref: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StructEntry {
    pub name: Vec<u8>,
    pub byte_size: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemberEntry {
    pub name: Vec<u8>,
    pub type_ref: u64,
    /// Byte offset of the member within its containing structure.
    pub data_offset: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArrayEntry {
    pub type_ref: u64,
}

/// One array dimension. `count` of zero means the dimension was unspecified.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubrangeEntry {
    pub type_ref: u64,
    pub count: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnumerationEntry {
    pub name: Vec<u8>,
    pub byte_size: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnumeratorEntry {
    pub name: Vec<u8>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VariableEntry {
    pub name: Vec<u8>,
    pub type_ref: u64,
    pub address: Address,
    /// Set when the entry is a forward declaration rather than a definition.
    pub declaration: bool,
}

/// The decoded payload of one debug entry, selected by its tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// A tag this parser has no use for. The node is kept so that sibling
    /// and child structure stays intact.
    Unknown,
    CompileUnit(CompileUnitEntry),
    BaseType(BaseTypeEntry),
    Typedef(TypedefEntry),
    Const(ModifierEntry),
    Volatile(ModifierEntry),
    Struct(StructEntry),
    Member(MemberEntry),
    Array(ArrayEntry),
    Subrange(SubrangeEntry),
    Enumeration(EnumerationEntry),
    Enumerator(EnumeratorEntry),
    Variable(VariableEntry),
}

/// One node of a unit's entry tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: EntryKind,
    /// Unit-relative byte offset of the entry, which is also the value that
    /// type references elsewhere in the unit use to name it.
    pub offset: u64,
    pub child: Option<EntryId>,
    pub next: Option<EntryId>,
}

/// The entry tree of one compile unit, stored as an arena.
///
/// `child`/`next` links are indices into the arena; the first node pushed is
/// the root (the compile-unit entry itself in a well-formed unit).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EntryTree {
    nodes: Vec<Entry>,
}

impl EntryTree {
    #[inline]
    pub fn root(&self) -> Option<EntryId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(EntryId(0))
        }
    }

    #[inline]
    pub fn node(&self, id: EntryId) -> &Entry {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate an entry's children in sibling order.
    pub fn children(&self, id: EntryId) -> Siblings {
        Siblings {
            tree: self,
            next: self.node(id).child,
        }
    }

    pub(crate) fn push(&mut self, kind: EntryKind, offset: u64) -> EntryId {
        let id = EntryId(self.nodes.len() as u32);
        self.nodes.push(Entry {
            kind,
            offset,
            child: None,
            next: None,
        });
        id
    }

    pub(crate) fn set_child(&mut self, parent: EntryId, child: EntryId) {
        self.nodes[parent.index()].child = Some(child);
    }

    pub(crate) fn set_next(&mut self, prev: EntryId, next: EntryId) {
        self.nodes[prev.index()].next = Some(next);
    }
}

/// Iterator over a sibling chain.
pub struct Siblings<'a> {
    tree: &'a EntryTree,
    next: Option<EntryId>,
}

impl<'a> Iterator for Siblings<'a> {
    type Item = EntryId;

    fn next(&mut self) -> Option<EntryId> {
        let id = self.next?;
        self.next = self.tree.node(id).next;
        Some(id)
    }
}

struct Frame {
    parent: Option<EntryId>,
    prev: Option<EntryId>,
}

/// Build the entry tree of one compile unit.
///
/// This is a single loop over the unit's byte range with an explicit frame
/// stack, so tree depth is bounded by `max_depth` rather than the native
/// call stack. An unknown abbreviation code ends the current sibling list
/// and keeps what was already parsed; integer overflow and an over-deep tree
/// reject the unit.
pub fn build_entry_tree(
    data: &[u8],
    sections: &Sections,
    unit: &mut CompileUnit,
    max_depth: usize,
) -> Result<EntryTree> {
    let table = match unit.abbrev.clone() {
        Some(table) => table,
        None => return Err("compile unit has no abbreviation table".into()),
    };

    let unit_end = sections.info.offset + unit.end_offset();
    let mut cur = Cursor::new(
        data,
        sections.info.offset + unit.offset + unit.header_size as usize,
    );

    let mut tree = EntryTree::default();
    let mut stack = vec![Frame {
        parent: None,
        prev: None,
    }];

    while cur.pos() < unit_end {
        let entry_pos = cur.pos();
        let code = read_uleb128(&mut cur)?;
        if code == 0 {
            // End of the current sibling list.
            if stack.len() > 1 {
                stack.pop();
                continue;
            }
            break;
        }

        let abbrev = match table.get(code) {
            Some(abbrev) => abbrev,
            None => {
                warn!(
                    "unknown abbreviation code {} at 0x{:x}, dropping sibling list",
                    code, entry_pos
                );
                if stack.len() > 1 {
                    stack.pop();
                    continue;
                }
                break;
            }
        };

        let offset = (entry_pos - sections.info.offset - unit.offset) as u64;
        let kind = decode_entry(&mut cur, abbrev, unit, &tree, sections, offset)?;
        let id = tree.push(kind, offset);

        match tree.node(id).kind {
            EntryKind::BaseType(..)
            | EntryKind::Typedef(..)
            | EntryKind::Const(..)
            | EntryKind::Volatile(..)
            | EntryKind::Struct(..)
            | EntryKind::Array(..)
            | EntryKind::Enumeration(..) => unit.register_type(offset, id),
            EntryKind::Variable(ref v) if v.declaration => unit.register_declaration(offset, id),
            _ => {}
        }

        let frame = stack.last_mut().expect("frame stack never empties");
        match (frame.prev, frame.parent) {
            (Some(prev), _) => tree.set_next(prev, id),
            (None, Some(parent)) => tree.set_child(parent, id),
            (None, None) => {}
        }
        frame.prev = Some(id);

        if abbrev.has_children {
            if stack.len() >= max_depth {
                return Err(format!(
                    "entry tree exceeds depth limit {} at 0x{:x}",
                    max_depth, entry_pos
                )
                .into());
            }
            stack.push(Frame {
                parent: Some(id),
                prev: None,
            });
        }
    }

    Ok(tree)
}

fn decode_entry(
    cur: &mut Cursor,
    abbrev: &Abbrev,
    unit: &CompileUnit,
    tree: &EntryTree,
    sections: &Sections,
    offset: u64,
) -> Result<EntryKind> {
    let mut values = Vec::with_capacity(abbrev.attributes.len());
    for spec in &abbrev.attributes {
        let data = read_form(cur, spec.form, unit.address_size, sections)?;
        values.push((spec.at, data));
    }

    let kind = match abbrev.tag {
        constants::DW_TAG_compile_unit => EntryKind::CompileUnit(parse_compile_unit(&values)),
        constants::DW_TAG_base_type => EntryKind::BaseType(parse_base_type(&values)),
        constants::DW_TAG_typedef => EntryKind::Typedef(TypedefEntry {
            type_ref: parse_type_ref(&values),
        }),
        constants::DW_TAG_const_type => EntryKind::Const(ModifierEntry {
            type_ref: parse_type_ref(&values),
        }),
        constants::DW_TAG_volatile_type => EntryKind::Volatile(ModifierEntry {
            type_ref: parse_type_ref(&values),
        }),
        constants::DW_TAG_structure_type => EntryKind::Struct(parse_struct(&values)),
        constants::DW_TAG_member => EntryKind::Member(parse_member(&values)),
        constants::DW_TAG_array_type => EntryKind::Array(ArrayEntry {
            type_ref: parse_type_ref(&values),
        }),
        constants::DW_TAG_subrange_type => EntryKind::Subrange(parse_subrange(&values)),
        constants::DW_TAG_enumeration_type => EntryKind::Enumeration(parse_enumeration(&values)),
        constants::DW_TAG_enumerator => EntryKind::Enumerator(EnumeratorEntry {
            name: parse_name(&values),
        }),
        constants::DW_TAG_variable => EntryKind::Variable(parse_variable(values, unit, tree)),
        tag => {
            debug!("ignoring entry with tag {} at 0x{:x}", tag, offset);
            EntryKind::Unknown
        }
    };
    Ok(kind)
}

type AttrValues = [(DwAt, Vec<u8>)];

fn parse_name(values: &AttrValues) -> Vec<u8> {
    for (at, data) in values {
        if *at == constants::DW_AT_name {
            return data.clone();
        }
    }
    Vec::new()
}

fn parse_type_ref(values: &AttrValues) -> u64 {
    for (at, data) in values {
        if *at == constants::DW_AT_type {
            return value_u64(data);
        }
    }
    0
}

fn parse_compile_unit(values: &AttrValues) -> CompileUnitEntry {
    CompileUnitEntry {
        name: parse_name(values),
    }
}

fn parse_base_type(values: &AttrValues) -> BaseTypeEntry {
    let mut entry = BaseTypeEntry::default();
    for (at, data) in values {
        match *at {
            constants::DW_AT_name => entry.name = data.clone(),
            constants::DW_AT_byte_size => entry.byte_size = value_u64(data) as u32,
            constants::DW_AT_encoding => {}
            _ => debug!("unknown base type attribute: {}", at),
        }
    }
    entry
}

fn parse_struct(values: &AttrValues) -> StructEntry {
    let mut entry = StructEntry::default();
    for (at, data) in values {
        match *at {
            constants::DW_AT_name => entry.name = data.clone(),
            constants::DW_AT_byte_size => entry.byte_size = value_u64(data) as u32,
            _ => {}
        }
    }
    entry
}

fn parse_member(values: &AttrValues) -> MemberEntry {
    let mut entry = MemberEntry::default();
    for (at, data) in values {
        match *at {
            constants::DW_AT_name => entry.name = data.clone(),
            constants::DW_AT_type => entry.type_ref = value_u64(data),
            constants::DW_AT_data_member_location => entry.data_offset = value_u64(data) as u32,
            _ => {}
        }
    }
    entry
}

fn parse_subrange(values: &AttrValues) -> SubrangeEntry {
    let mut entry = SubrangeEntry::default();
    for (at, data) in values {
        match *at {
            constants::DW_AT_type => entry.type_ref = value_u64(data),
            constants::DW_AT_count => entry.count = value_u64(data) as u32,
            // The upper bound is inclusive; an explicit count wins.
            constants::DW_AT_upper_bound => {
                if entry.count == 0 {
                    entry.count = value_u64(data) as u32 + 1;
                }
            }
            _ => {}
        }
    }
    entry
}

fn parse_enumeration(values: &AttrValues) -> EnumerationEntry {
    let mut entry = EnumerationEntry::default();
    for (at, data) in values {
        match *at {
            constants::DW_AT_name => entry.name = data.clone(),
            constants::DW_AT_byte_size => entry.byte_size = value_u64(data) as u32,
            _ => {}
        }
    }
    entry
}

fn parse_variable(
    values: Vec<(DwAt, Vec<u8>)>,
    unit: &CompileUnit,
    tree: &EntryTree,
) -> VariableEntry {
    let mut entry = VariableEntry::default();
    for (at, data) in values {
        match at {
            constants::DW_AT_name => entry.name = data,
            constants::DW_AT_type => entry.type_ref = value_u64(&data),
            constants::DW_AT_location => {
                // A fixed-location expression: one opcode byte, then the
                // address operand.
                if data.len() > 1 {
                    entry.address = Address::new(value_u64(&data[1..]));
                }
            }
            constants::DW_AT_declaration => entry.declaration = true,
            constants::DW_AT_specification => {
                // A definition referring back to an earlier declaration:
                // take over whatever the declaration recorded that this
                // entry has not set itself.
                let spec_offset = value_u64(&data);
                match unit.declaration_index.get(&spec_offset) {
                    Some(&decl_id) => {
                        if let EntryKind::Variable(decl) = &tree.node(decl_id).kind {
                            if entry.name.is_empty() {
                                entry.name = decl.name.clone();
                            }
                            if entry.type_ref == 0 {
                                entry.type_ref = decl.type_ref;
                            }
                            entry.address = decl.address;
                        }
                    }
                    None => {
                        debug!("no declaration at offset 0x{:x} for specification", spec_offset)
                    }
                }
            }
            constants::DW_AT_external | constants::DW_AT_decl_file | constants::DW_AT_decl_line => {
            }
            _ => debug!("unknown variable attribute: {}", at),
        }
    }
    entry
}
