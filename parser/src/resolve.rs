use crate::entry::{EntryId, EntryKind, EntryTree, ModifierEntry, TypedefEntry};
use crate::unit::CompileUnit;
use crate::Address;

/// Index of a node within a [`VarTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(u32);

impl VarId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The concrete kind of a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Unknown,
    Boolean,
    Uint8,
    Sint8,
    Uint16,
    Sint16,
    Uint32,
    Sint32,
    Uint64,
    Sint64,
    Float32,
    Float64,
    Enum,
    Struct,
}

impl Default for DataType {
    fn default() -> Self {
        DataType::Unknown
    }
}

/// One node of the resolved variable tree.
///
/// Qualifier nodes (typedef/const/volatile/struct/enum/array wrappers) carry
/// no value of their own; they mediate the type resolution of their child
/// and let consumers label the wrapper rows.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VarInfo {
    pub name: Vec<u8>,
    pub address: Address,
    pub type_ref: u64,
    pub data_type: DataType,
    pub is_qualifier: bool,
    /// Array dimensions followed by the element byte size; a single element
    /// byte size for scalars; the declared total for structs.
    pub size_chain: Vec<u32>,
    pub child: Option<VarId>,
    pub next: Option<VarId>,
}

/// The resolved variable tree of one compile unit, stored as an arena.
/// The root node represents the unit itself.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VarTree {
    nodes: Vec<VarInfo>,
}

impl VarTree {
    #[inline]
    pub fn root(&self) -> Option<VarId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(VarId(0))
        }
    }

    #[inline]
    pub fn node(&self, id: VarId) -> &VarInfo {
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

    /// Iterate a node's children in the order they were appended.
    pub fn children(&self, id: VarId) -> VarSiblings {
        VarSiblings {
            tree: self,
            next: self.node(id).child,
        }
    }

    fn node_mut(&mut self, id: VarId) -> &mut VarInfo {
        &mut self.nodes[id.index()]
    }

    fn push(&mut self, node: VarInfo) -> VarId {
        let id = VarId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Append `child` at the end of `parent`'s child list.
    fn append_child(&mut self, parent: VarId, child: VarId) {
        match self.node(parent).child {
            None => self.node_mut(parent).child = Some(child),
            Some(first) => {
                let mut last = first;
                while let Some(next) = self.node(last).next {
                    last = next;
                }
                self.node_mut(last).next = Some(child);
            }
        }
    }
}

/// Iterator over a sibling chain of a [`VarTree`].
pub struct VarSiblings<'a> {
    tree: &'a VarTree,
    next: Option<VarId>,
}

impl<'a> Iterator for VarSiblings<'a> {
    type Item = VarId;

    fn next(&mut self) -> Option<VarId> {
        let id = self.next?;
        self.next = self.tree.node(id).next;
        Some(id)
    }
}

/// Resolve one compile unit's top-level variables into a fresh variable
/// tree. Declaration-only variables are skipped; a variable whose type
/// cannot be resolved keeps `DataType::Unknown` and an empty size chain.
pub fn resolve_unit(entries: &EntryTree, unit: &CompileUnit, max_depth: usize) -> VarTree {
    let mut out = VarTree::default();

    let unit_entry = match entries.root() {
        Some(root) => root,
        None => return out,
    };

    let unit_name = match &entries.node(unit_entry).kind {
        EntryKind::CompileUnit(cu) => cu.name.clone(),
        _ => Vec::new(),
    };
    let root = out.push(VarInfo {
        name: unit_name,
        ..Default::default()
    });

    for child in entries.children(unit_entry) {
        let var = match &entries.node(child).kind {
            EntryKind::Variable(var) if !var.declaration => var,
            _ => continue,
        };

        let id = out.push(VarInfo {
            name: var.name.clone(),
            address: var.address,
            type_ref: var.type_ref,
            ..Default::default()
        });
        out.append_child(root, id);

        if var.type_ref == 0 {
            debug!(
                "variable {} has no type reference",
                String::from_utf8_lossy(&var.name)
            );
            continue;
        }
        match unit.type_index.get(&var.type_ref) {
            Some(&type_entry) => {
                resolve_type(entries, unit, type_entry, &mut out, id, 0, max_depth);
            }
            None => debug!(
                "unresolved type reference 0x{:x} for variable {}",
                var.type_ref,
                String::from_utf8_lossy(&var.name)
            ),
        }
    }

    out
}

/// Map a base type name to its concrete kind. Matching is exact and
/// case-sensitive; anything unrecognized stays `Unknown`.
fn base_data_type(name: &[u8]) -> DataType {
    match name {
        b"unsigned char" | b"char" => DataType::Uint8,
        b"signed char" => DataType::Sint8,
        b"unsigned short" | b"short unsigned int" => DataType::Uint16,
        b"short" | b"short int" => DataType::Sint16,
        b"unsigned long" | b"long unsigned int" | b"unsigned int" => DataType::Uint32,
        b"long" | b"long int" | b"int" => DataType::Sint32,
        b"unsigned long long" | b"long long unsigned int" => DataType::Uint64,
        b"long long" | b"long long int" => DataType::Sint64,
        b"float" => DataType::Float32,
        b"double" => DataType::Float64,
        b"_Bool" | b"bool" => DataType::Boolean,
        _ => {
            warn!("unknown base type {}", String::from_utf8_lossy(name));
            DataType::Unknown
        }
    }
}

/// Resolve one type entry into a new node appended under `parent`,
/// propagating the concrete kind and size chain up to `parent`. Returns the
/// resolved byte size so containing types can report totals without
/// re-walking the subtree.
pub fn resolve_type(
    entries: &EntryTree,
    unit: &CompileUnit,
    entry: EntryId,
    out: &mut VarTree,
    parent: VarId,
    depth: usize,
    max_depth: usize,
) -> u32 {
    if depth >= max_depth {
        warn!("type resolution exceeds depth limit {}", max_depth);
        return 0;
    }

    let parent_address = out.node(parent).address;

    match &entries.node(entry).kind {
        EntryKind::BaseType(base) => {
            let data_type = base_data_type(&base.name);
            let id = out.push(VarInfo {
                name: base.name.clone(),
                address: parent_address,
                data_type,
                is_qualifier: true,
                ..Default::default()
            });
            out.append_child(parent, id);

            out.node_mut(parent).data_type = data_type;
            if base.byte_size > 0 {
                out.node_mut(id).size_chain = vec![base.byte_size];
                out.node_mut(parent).size_chain = vec![base.byte_size];
            } else {
                warn!(
                    "base type {} has no size",
                    String::from_utf8_lossy(&base.name)
                );
            }
            base.byte_size
        }

        EntryKind::Typedef(TypedefEntry { type_ref })
        | EntryKind::Const(ModifierEntry { type_ref })
        | EntryKind::Volatile(ModifierEntry { type_ref }) => {
            let marker: &[u8] = match entries.node(entry).kind {
                EntryKind::Typedef(..) => b"typedef",
                EntryKind::Const(..) => b"const",
                _ => b"volatile",
            };
            let type_ref = *type_ref;
            let id = out.push(VarInfo {
                name: marker.to_vec(),
                address: parent_address,
                type_ref,
                is_qualifier: true,
                ..Default::default()
            });
            out.append_child(parent, id);

            let mut size = 0;
            if type_ref != 0 {
                if let Some(&target) = unit.type_index.get(&type_ref) {
                    size = resolve_type(entries, unit, target, out, id, depth + 1, max_depth);
                    out.node_mut(parent).data_type = out.node(id).data_type;
                    let chain = out.node(id).size_chain.clone();
                    out.node_mut(parent).size_chain = chain;
                } else {
                    debug!("unresolved type reference 0x{:x}", type_ref);
                }
            }
            size
        }

        EntryKind::Struct(st) => {
            let id = out.push(VarInfo {
                name: b"struct".to_vec(),
                address: parent_address,
                is_qualifier: true,
                size_chain: vec![st.byte_size],
                data_type: DataType::Struct,
                ..Default::default()
            });
            out.append_child(parent, id);

            for member_entry in entries.children(entry) {
                let member = match &entries.node(member_entry).kind {
                    EntryKind::Member(member) => member,
                    _ => continue,
                };
                let member_id = out.push(VarInfo {
                    name: member.name.clone(),
                    address: Address::new(parent_address.value() + u64::from(member.data_offset)),
                    type_ref: member.type_ref,
                    ..Default::default()
                });
                out.append_child(id, member_id);

                if member.type_ref != 0 {
                    if let Some(&target) = unit.type_index.get(&member.type_ref) {
                        resolve_type(entries, unit, target, out, member_id, depth + 1, max_depth);
                    } else {
                        debug!("unresolved member type reference 0x{:x}", member.type_ref);
                    }
                }
            }

            // The total is the declared size, not a sum over members.
            out.node_mut(parent).data_type = DataType::Struct;
            out.node_mut(parent).size_chain = vec![st.byte_size];
            st.byte_size
        }

        EntryKind::Enumeration(en) => {
            let id = out.push(VarInfo {
                name: b"enum".to_vec(),
                address: parent_address,
                is_qualifier: true,
                data_type: DataType::Enum,
                size_chain: vec![en.byte_size],
                ..Default::default()
            });
            out.append_child(parent, id);

            for child in entries.children(entry) {
                if let EntryKind::Enumerator(e) = &entries.node(child).kind {
                    let enumerator_id = out.push(VarInfo {
                        name: e.name.clone(),
                        is_qualifier: true,
                        ..Default::default()
                    });
                    out.append_child(id, enumerator_id);
                }
            }

            out.node_mut(parent).data_type = DataType::Enum;
            if en.byte_size > 0 {
                out.node_mut(parent).size_chain.push(en.byte_size);
            }
            en.byte_size
        }

        EntryKind::Array(arr) => {
            let type_ref = arr.type_ref;
            let id = out.push(VarInfo {
                name: b"array".to_vec(),
                address: parent_address,
                type_ref,
                is_qualifier: true,
                ..Default::default()
            });
            out.append_child(parent, id);

            let mut chain = Vec::new();
            for child in entries.children(entry) {
                if let EntryKind::Subrange(sub) = &entries.node(child).kind {
                    if sub.count > 0 {
                        chain.push(sub.count);
                    }
                }
            }

            let mut element_size = 0;
            if type_ref != 0 {
                if let Some(&target) = unit.type_index.get(&type_ref) {
                    element_size =
                        resolve_type(entries, unit, target, out, id, depth + 1, max_depth);
                    chain.push(element_size);
                    out.node_mut(parent).data_type = out.node(id).data_type;
                } else {
                    debug!("unresolved element type reference 0x{:x}", type_ref);
                }
            }

            out.node_mut(id).size_chain = chain.clone();
            out.node_mut(parent).size_chain = chain;
            element_size
        }

        EntryKind::Subrange(sub) => {
            let type_ref = sub.type_ref;
            let id = out.push(VarInfo {
                name: b"dim".to_vec(),
                address: parent_address,
                type_ref,
                is_qualifier: true,
                ..Default::default()
            });
            out.append_child(parent, id);

            let mut size = 0;
            if type_ref != 0 {
                if let Some(&target) = unit.type_index.get(&type_ref) {
                    size = resolve_type(entries, unit, target, out, id, depth + 1, max_depth);
                    out.node_mut(id).size_chain.push(size);
                }
            }
            size
        }

        kind => {
            debug!("entry kind {:?} is not a type", kind);
            0
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entry::{
        ArrayEntry, BaseTypeEntry, CompileUnitEntry, EnumerationEntry, EnumeratorEntry,
        MemberEntry, StructEntry, SubrangeEntry, VariableEntry,
    };

    const MAX_DEPTH: usize = 64;

    struct TreeBuilder {
        tree: EntryTree,
        unit: CompileUnit,
    }

    impl TreeBuilder {
        fn new() -> TreeBuilder {
            let mut tree = EntryTree::default();
            tree.push(
                EntryKind::CompileUnit(CompileUnitEntry {
                    name: b"demo.c".to_vec(),
                }),
                0,
            );
            TreeBuilder {
                tree,
                unit: CompileUnit::default(),
            }
        }

        fn push_type(&mut self, kind: EntryKind, offset: u64) -> EntryId {
            let id = self.tree.push(kind, offset);
            self.unit.type_index.insert(offset, id);
            id
        }

        fn push_top_level(&mut self, kind: EntryKind, offset: u64) -> EntryId {
            let id = self.tree.push(kind, offset);
            self.link_top_level(id);
            id
        }

        fn link_top_level(&mut self, id: EntryId) {
            let root = self.tree.root().unwrap();
            match self.tree.children(root).last() {
                None => self.tree.set_child(root, id),
                Some(last) => self.tree.set_next(last, id),
            }
        }

        fn base_int(&mut self, offset: u64) -> EntryId {
            self.push_type(
                EntryKind::BaseType(BaseTypeEntry {
                    name: b"int".to_vec(),
                    byte_size: 4,
                }),
                offset,
            )
        }

        fn variable(&mut self, name: &[u8], type_ref: u64, address: u64) -> EntryId {
            let id = self.tree.push(
                EntryKind::Variable(VariableEntry {
                    name: name.to_vec(),
                    type_ref,
                    address: Address::new(address),
                    declaration: false,
                }),
                900,
            );
            self.link_top_level(id);
            id
        }

        fn resolve(&self) -> VarTree {
            resolve_unit(&self.tree, &self.unit, MAX_DEPTH)
        }
    }

    fn only_child(tree: &VarTree, id: VarId) -> VarId {
        let children: Vec<_> = tree.children(id).collect();
        assert_eq!(children.len(), 1);
        children[0]
    }

    #[test]
    fn typedef_volatile_base_chain() {
        let mut b = TreeBuilder::new();
        b.base_int(10);
        b.push_type(EntryKind::Volatile(ModifierEntry { type_ref: 10 }), 20);
        b.push_type(EntryKind::Typedef(TypedefEntry { type_ref: 20 }), 30);
        b.variable(b"speed", 30, 0x100);

        let out = b.resolve();
        let root = out.root().unwrap();
        let var = only_child(&out, root);
        assert_eq!(out.node(var).name, b"speed");
        assert_eq!(out.node(var).data_type, DataType::Sint32);
        assert_eq!(out.node(var).size_chain, vec![4]);
        assert_eq!(out.node(var).address.get(), Some(0x100));
        assert!(!out.node(var).is_qualifier);

        let typedef = only_child(&out, var);
        assert_eq!(out.node(typedef).name, b"typedef");
        assert!(out.node(typedef).is_qualifier);
        let volatile = only_child(&out, typedef);
        assert_eq!(out.node(volatile).name, b"volatile");
        assert_eq!(out.node(volatile).data_type, DataType::Sint32);
        let base = only_child(&out, volatile);
        assert_eq!(out.node(base).name, b"int");
    }

    #[test]
    fn struct_member_addresses() {
        let mut b = TreeBuilder::new();
        b.base_int(10);
        let st = b.push_type(
            EntryKind::Struct(StructEntry {
                name: b"limits".to_vec(),
                byte_size: 8,
            }),
            40,
        );
        let m0 = b.tree.push(
            EntryKind::Member(MemberEntry {
                name: b"low".to_vec(),
                type_ref: 10,
                data_offset: 0,
            }),
            41,
        );
        let m1 = b.tree.push(
            EntryKind::Member(MemberEntry {
                name: b"high".to_vec(),
                type_ref: 10,
                data_offset: 4,
            }),
            42,
        );
        b.tree.set_child(st, m0);
        b.tree.set_next(m0, m1);
        b.variable(b"limits", 40, 0x100);

        let out = b.resolve();
        let var = only_child(&out, out.root().unwrap());
        assert_eq!(out.node(var).data_type, DataType::Struct);
        assert_eq!(out.node(var).size_chain, vec![8]);

        let wrapper = only_child(&out, var);
        assert_eq!(out.node(wrapper).name, b"struct");
        let members: Vec<_> = out.children(wrapper).collect();
        assert_eq!(members.len(), 2);
        assert_eq!(out.node(members[0]).name, b"low");
        assert_eq!(out.node(members[0]).address.get(), Some(0x100));
        assert_eq!(out.node(members[0]).data_type, DataType::Sint32);
        assert_eq!(out.node(members[1]).name, b"high");
        assert_eq!(out.node(members[1]).address.get(), Some(0x104));
    }

    #[test]
    fn array_size_chain() {
        let mut b = TreeBuilder::new();
        b.push_type(
            EntryKind::BaseType(BaseTypeEntry {
                name: b"short".to_vec(),
                byte_size: 2,
            }),
            12,
        );
        let arr = b.push_type(EntryKind::Array(ArrayEntry { type_ref: 12 }), 50);
        let d0 = b.tree.push(
            EntryKind::Subrange(SubrangeEntry {
                type_ref: 12,
                count: 3,
            }),
            51,
        );
        let d1 = b.tree.push(
            EntryKind::Subrange(SubrangeEntry {
                type_ref: 12,
                count: 4,
            }),
            52,
        );
        b.tree.set_child(arr, d0);
        b.tree.set_next(d0, d1);
        b.variable(b"map", 50, 0x200);

        let out = b.resolve();
        let var = only_child(&out, out.root().unwrap());
        assert_eq!(out.node(var).size_chain, vec![3, 4, 2]);
        assert_eq!(out.node(var).data_type, DataType::Sint16);

        let wrapper = only_child(&out, var);
        assert_eq!(out.node(wrapper).name, b"array");
        assert_eq!(out.node(wrapper).size_chain, vec![3, 4, 2]);
    }

    #[test]
    fn enumeration_clones_enumerators() {
        let mut b = TreeBuilder::new();
        let en = b.push_type(
            EntryKind::Enumeration(EnumerationEntry {
                name: b"mode".to_vec(),
                byte_size: 1,
            }),
            60,
        );
        let e0 = b.tree.push(
            EntryKind::Enumerator(EnumeratorEntry {
                name: b"OFF".to_vec(),
            }),
            61,
        );
        let e1 = b.tree.push(
            EntryKind::Enumerator(EnumeratorEntry {
                name: b"ON".to_vec(),
            }),
            62,
        );
        b.tree.set_child(en, e0);
        b.tree.set_next(e0, e1);
        b.variable(b"mode", 60, 0x300);

        let out = b.resolve();
        let var = only_child(&out, out.root().unwrap());
        assert_eq!(out.node(var).data_type, DataType::Enum);
        assert_eq!(out.node(var).size_chain, vec![1]);

        let wrapper = only_child(&out, var);
        assert_eq!(out.node(wrapper).name, b"enum");
        let names: Vec<_> = out
            .children(wrapper)
            .map(|id| out.node(id).name.clone())
            .collect();
        assert_eq!(names, vec![b"OFF".to_vec(), b"ON".to_vec()]);
    }

    #[test]
    fn declaration_only_variable_is_skipped() {
        let mut b = TreeBuilder::new();
        b.base_int(10);
        let decl = b.tree.push(
            EntryKind::Variable(VariableEntry {
                name: b"ghost".to_vec(),
                type_ref: 10,
                address: Address::none(),
                declaration: true,
            }),
            70,
        );
        b.link_top_level(decl);
        b.variable(b"real", 10, 0x400);

        let out = b.resolve();
        let vars: Vec<_> = out.children(out.root().unwrap()).collect();
        assert_eq!(vars.len(), 1);
        assert_eq!(out.node(vars[0]).name, b"real");
    }

    #[test]
    fn unresolved_type_is_unknown() {
        let mut b = TreeBuilder::new();
        b.variable(b"orphan", 0x999, 0x500);

        let out = b.resolve();
        let var = only_child(&out, out.root().unwrap());
        assert_eq!(out.node(var).data_type, DataType::Unknown);
        assert!(out.node(var).size_chain.is_empty());
        assert!(out.node(var).child.is_none());
    }

    #[test]
    fn cyclic_typedef_terminates() {
        let mut b = TreeBuilder::new();
        b.push_type(EntryKind::Typedef(TypedefEntry { type_ref: 31 }), 30);
        b.push_type(EntryKind::Typedef(TypedefEntry { type_ref: 30 }), 31);
        b.variable(b"loop", 30, 0x600);

        let out = b.resolve();
        let var = only_child(&out, out.root().unwrap());
        assert_eq!(out.node(var).data_type, DataType::Unknown);
    }
}
