use std::io::Write;

use parser::{
    DataType, EntryId, EntryKind, EntryTree, File, MemoryImage, VarId, VarTree,
};

fn type_name(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Unknown => "?",
        DataType::Boolean => "bool",
        DataType::Uint8 => "u8",
        DataType::Sint8 => "s8",
        DataType::Uint16 => "u16",
        DataType::Sint16 => "s16",
        DataType::Uint32 => "u32",
        DataType::Sint32 => "s32",
        DataType::Uint64 => "u64",
        DataType::Sint64 => "s64",
        DataType::Float32 => "f32",
        DataType::Float64 => "f64",
        DataType::Enum => "enum",
        DataType::Struct => "struct",
    }
}

fn indent<W: Write>(w: &mut W, depth: usize) -> std::io::Result<()> {
    for _ in 0..depth {
        write!(w, "\t")?;
    }
    Ok(())
}

/// Print every unit's resolved variable tree. With a calibration image,
/// scalar leaves also show their current value.
pub fn variables<W: Write>(
    w: &mut W,
    file: &File,
    image: Option<&MemoryImage>,
) -> std::io::Result<()> {
    for tree in file.symbols() {
        let root = match tree.root() {
            Some(root) => root,
            None => continue,
        };
        writeln!(w, "unit {}", String::from_utf8_lossy(&tree.node(root).name))?;
        for var in tree.children(root) {
            variable(w, tree, var, image, 1)?;
        }
    }
    Ok(())
}

fn variable<W: Write>(
    w: &mut W,
    tree: &VarTree,
    id: VarId,
    image: Option<&MemoryImage>,
    depth: usize,
) -> std::io::Result<()> {
    let node = tree.node(id);
    indent(w, depth)?;
    write!(w, "{}", String::from_utf8_lossy(&node.name))?;
    if !node.is_qualifier {
        write!(w, ": {}", type_name(node.data_type))?;
        if !node.size_chain.is_empty() {
            write!(w, " {:?}", node.size_chain)?;
        }
        if let Some(address) = node.address.get() {
            write!(w, " @ 0x{:x}", address)?;
            if let Some(image) = image {
                if let Some(value) = scalar_value(image, node.data_type, address as u32) {
                    write!(w, " = {}", value)?;
                }
            }
        }
    }
    writeln!(w)?;

    for child in tree.children(id) {
        variable(w, tree, child, image, depth + 1)?;
    }
    Ok(())
}

fn scalar_value(image: &MemoryImage, data_type: DataType, address: u32) -> Option<String> {
    let value = match data_type {
        DataType::Boolean => image.read_bool(address).to_string(),
        DataType::Uint8 => image.read_u8(address).to_string(),
        DataType::Sint8 => image.read_i8(address).to_string(),
        DataType::Uint16 => image.read_u16(address).to_string(),
        DataType::Sint16 => image.read_i16(address).to_string(),
        DataType::Uint32 | DataType::Enum => image.read_u32(address).to_string(),
        DataType::Sint32 => image.read_i32(address).to_string(),
        DataType::Float32 => image.read_f32(address).to_string(),
        _ => return None,
    };
    Some(value)
}

/// Print every unit's raw entry tree.
pub fn entries<W: Write>(w: &mut W, file: &File) -> std::io::Result<()> {
    for tree in file.entries() {
        let root = match tree.root() {
            Some(root) => root,
            None => continue,
        };
        entry(w, tree, root, 0)?;
    }
    Ok(())
}

fn entry<W: Write>(w: &mut W, tree: &EntryTree, id: EntryId, depth: usize) -> std::io::Result<()> {
    let node = tree.node(id);
    indent(w, depth)?;
    match &node.kind {
        EntryKind::CompileUnit(cu) => {
            writeln!(w, "compile unit {}", String::from_utf8_lossy(&cu.name))?
        }
        EntryKind::BaseType(base) => writeln!(
            w,
            "base type {} size {}",
            String::from_utf8_lossy(&base.name),
            base.byte_size
        )?,
        EntryKind::Typedef(t) => writeln!(w, "typedef -> 0x{:x}", t.type_ref)?,
        EntryKind::Const(m) => writeln!(w, "const -> 0x{:x}", m.type_ref)?,
        EntryKind::Volatile(m) => writeln!(w, "volatile -> 0x{:x}", m.type_ref)?,
        EntryKind::Struct(st) => writeln!(
            w,
            "struct {} size {}",
            String::from_utf8_lossy(&st.name),
            st.byte_size
        )?,
        EntryKind::Member(member) => writeln!(
            w,
            "member {} -> 0x{:x} offset {}",
            String::from_utf8_lossy(&member.name),
            member.type_ref,
            member.data_offset
        )?,
        EntryKind::Array(arr) => writeln!(w, "array -> 0x{:x}", arr.type_ref)?,
        EntryKind::Subrange(sub) => writeln!(w, "subrange count {}", sub.count)?,
        EntryKind::Enumeration(en) => writeln!(
            w,
            "enumeration {} size {}",
            String::from_utf8_lossy(&en.name),
            en.byte_size
        )?,
        EntryKind::Enumerator(e) => {
            writeln!(w, "enumerator {}", String::from_utf8_lossy(&e.name))?
        }
        EntryKind::Variable(var) => writeln!(
            w,
            "variable {} -> 0x{:x} @ 0x{:x}{}",
            String::from_utf8_lossy(&var.name),
            var.type_ref,
            var.address.value(),
            if var.declaration { " (declaration)" } else { "" }
        )?,
        EntryKind::Unknown => writeln!(w, "entry")?,
    }

    for child in tree.children(id) {
        entry(w, tree, child, depth + 1)?;
    }
    Ok(())
}
