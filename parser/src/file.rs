use std::fs;

use object::{Object, ObjectSection, ObjectSegment};

use crate::abbrev::AbbrevCache;
use crate::entry::{build_entry_tree, EntryTree};
use crate::resolve::VarTree;
use crate::unit::{scan_units, CompileUnit};
use crate::walker::resolve_symbols;
use crate::Result;

/// File range of one section.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SectionRange {
    pub offset: usize,
    pub size: usize,
}

/// File ranges of the sections the parser reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sections {
    pub abbrev: SectionRange,
    pub info: SectionRange,
    pub str_: SectionRange,
}

/// Limits applied while parsing, guarding against malformed input.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Maximum nesting of the raw entry tree.
    pub max_entry_depth: usize,
    /// Maximum qualifier/typedef chain length during type resolution.
    pub max_resolve_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            max_entry_depth: 192,
            max_resolve_depth: 64,
        }
    }
}

/// A loadable segment of the binary image.
#[derive(Debug)]
pub struct Segment<'input> {
    pub address: u64,
    pub data: &'input [u8],
}

/// A parsed binary: its compile units, the raw entry tree and the resolved
/// variable tree of each, in unit order.
///
/// Every parse builds all of this from scratch; nothing is carried over
/// from a previous parse of the same path.
pub struct File<'input> {
    path: &'input str,
    segments: Vec<Segment<'input>>,
    sections: Sections,
    units: Vec<CompileUnit>,
    entries: Vec<EntryTree>,
    symbols: Vec<VarTree>,
}

impl<'input> File<'input> {
    /// Map a binary and parse its debug information, handing the result to
    /// `cb` while the mapping is alive.
    pub fn parse<Cb>(path: &str, cb: Cb) -> Result<()>
    where
        Cb: FnOnce(&File) -> Result<()>,
    {
        File::parse_with_options(path, ParseOptions::default(), cb)
    }

    pub fn parse_with_options<Cb>(path: &str, options: ParseOptions, cb: Cb) -> Result<()>
    where
        Cb: FnOnce(&File) -> Result<()>,
    {
        let handle = match fs::File::open(path) {
            Ok(handle) => handle,
            Err(e) => {
                return Err(format!("open failed: {}", e).into());
            }
        };

        let map = match unsafe { memmap2::Mmap::map(&handle) } {
            Ok(map) => map,
            Err(e) => {
                return Err(format!("memmap failed: {}", e).into());
            }
        };

        let input = &*map;
        File::parse_object(input, path, options, cb)
    }

    fn parse_object<Cb>(input: &[u8], path: &str, options: ParseOptions, cb: Cb) -> Result<()>
    where
        Cb: FnOnce(&File) -> Result<()>,
    {
        let object = object::File::parse(input)
            .map_err(|e| format!("{}: object parse failed: {}", path, e))?;

        let mut segments = Vec::new();
        for segment in object.segments() {
            match segment.data() {
                Ok(data) if !data.is_empty() => segments.push(Segment {
                    address: segment.address(),
                    data,
                }),
                Ok(_) => {}
                Err(e) => debug!("segment at 0x{:x} unreadable: {}", segment.address(), e),
            }
        }

        let sections = Sections {
            abbrev: section_range(&object, ".debug_abbrev"),
            info: section_range(&object, ".debug_info"),
            str_: section_range(&object, ".debug_str"),
        };
        if sections.info.size == 0 {
            return Err(format!("{}: no debug information section", path).into());
        }

        let info = input
            .get(sections.info.offset..sections.info.offset + sections.info.size)
            .ok_or_else(|| format!("{}: debug information section out of bounds", path))?;
        let mut units = scan_units(info).map_err(|e| format!("{}: {}", path, e))?;

        // The cache lives for exactly this parse: units sharing an offset
        // share one decoded table.
        let mut cache = AbbrevCache::new();
        let mut entries = Vec::with_capacity(units.len());
        for unit in &mut units {
            let table = cache
                .resolve(input, sections.abbrev.offset + unit.abbrev_offset)
                .map_err(|e| format!("{}: {}", path, e))?;
            unit.abbrev = Some(table);
            let tree = build_entry_tree(input, &sections, unit, options.max_entry_depth)
                .map_err(|e| format!("{}: {}", path, e))?;
            entries.push(tree);
        }

        let symbols = resolve_symbols(&entries, &units, options.max_resolve_depth);

        let file = File {
            path,
            segments,
            sections,
            units,
            entries,
            symbols,
        };
        cb(&file)
    }

    #[inline]
    pub fn path(&self) -> &'input str {
        self.path
    }

    #[inline]
    pub fn sections(&self) -> &Sections {
        &self.sections
    }

    #[inline]
    pub fn segments(&self) -> &[Segment<'input>] {
        &self.segments
    }

    /// The compile unit descriptors, in section order.
    #[inline]
    pub fn units(&self) -> &[CompileUnit] {
        &self.units
    }

    /// The raw entry tree of each unit, in unit order.
    #[inline]
    pub fn entries(&self) -> &[EntryTree] {
        &self.entries
    }

    /// The resolved variable tree of each unit, in unit order.
    #[inline]
    pub fn symbols(&self) -> &[VarTree] {
        &self.symbols
    }

    /// Fetch a symbol's bytes straight from the binary image, e.g. its
    /// compile-time initial value. Returns `None` when no loadable segment
    /// covers the whole range.
    pub fn read_bytes(&self, address: u64, len: usize) -> Option<&'input [u8]> {
        for segment in &self.segments {
            let end = segment.address + segment.data.len() as u64;
            if address >= segment.address && address + len as u64 <= end {
                let offset = (address - segment.address) as usize;
                return Some(&segment.data[offset..offset + len]);
            }
        }
        None
    }
}

fn section_range<'data: 'file, 'file>(
    object: &'file object::File<'data>,
    name: &str,
) -> SectionRange {
    match object.section_by_name(name) {
        Some(section) => match section.file_range() {
            Some((offset, size)) => SectionRange {
                offset: offset as usize,
                size: size as usize,
            },
            None => SectionRange::default(),
        },
        None => {
            debug!("section {} not present", name);
            SectionRange::default()
        }
    }
}
