//! Best-effort DWARF extraction (spec §4.B step 7, §9): locate the single
//! compile unit's name/comp-dir, and pre-sort function PC ranges so stab
//! generation (§4.E.1) can binary-search them instead of scanning
//! `O(n_funcs)` per contained symbol.
//!
//! Missing or malformed DWARF is never fatal — callers get `None` and log a
//! warning (spec §7, "Missing DWARF is logged and skipped").

#[cfg(feature = "dwarf")]
use gimli::{EndianSlice, LittleEndian};

/// Borrowed `__DWARF,__debug_*` section contents, already rebased to
/// whole-file offsets by `object::parse` (spec §4.B step 4).
#[derive(Debug, Clone, Copy, Default)]
pub struct DwarfSections<'a> {
    pub debug_abbrev: &'a [u8],
    pub debug_info: &'a [u8],
    pub debug_str: &'a [u8],
    pub debug_line: &'a [u8],
    pub debug_ranges: &'a [u8],
    pub debug_rnglists: &'a [u8],
}

/// One function's PC range, as extracted from a `DW_TAG_subprogram` DIE.
#[derive(Debug, Clone, Copy)]
pub struct FunctionRange {
    pub low_pc: u64,
    pub high_pc: u64,
}

#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    pub name: Option<String>,
    pub comp_dir: Option<String>,
    pub mtime: u64,
    /// sorted by `low_pc`; query with `lookup_function`.
    pub functions: Vec<FunctionRange>,
}

impl DebugInfo {
    /// Binary-searches `functions` for a range covering `pc`, returning its
    /// size (`high_pc - low_pc`) for `Stab::Function`.
    pub fn lookup_function(&self, pc: u64) -> Option<u64> {
        let idx = self.functions.partition_point(|f| f.low_pc <= pc);
        if idx == 0 {
            return None;
        }
        let candidate = &self.functions[idx - 1];
        if pc >= candidate.low_pc && pc < candidate.high_pc {
            Some(candidate.high_pc - candidate.low_pc)
        } else {
            None
        }
    }
}

#[cfg(feature = "dwarf")]
pub fn parse(sections: DwarfSections, mtime: u64) -> Option<DebugInfo> {
    match try_parse(sections, mtime) {
        Ok(info) => Some(info),
        Err(err) => {
            #[cfg(feature = "log")]
            log::warn!("failed to parse DWARF debug info: {}", err);
            let _ = err;
            None
        }
    }
}

#[cfg(not(feature = "dwarf"))]
pub fn parse(_sections: DwarfSections, _mtime: u64) -> Option<DebugInfo> {
    None
}

#[cfg(feature = "dwarf")]
fn try_parse(sections: DwarfSections, mtime: u64) -> gimli::Result<DebugInfo> {
    let endian = LittleEndian;
    let load = |data: &[u8]| -> EndianSlice<'_, LittleEndian> { EndianSlice::new(data, endian) };

    let dwarf = gimli::Dwarf::load(|id| -> Result<EndianSlice<'_, LittleEndian>, gimli::Error> {
        Ok(match id {
            gimli::SectionId::DebugAbbrev => load(sections.debug_abbrev),
            gimli::SectionId::DebugInfo => load(sections.debug_info),
            gimli::SectionId::DebugStr => load(sections.debug_str),
            gimli::SectionId::DebugLine => load(sections.debug_line),
            gimli::SectionId::DebugRanges => load(sections.debug_ranges),
            gimli::SectionId::DebugRngLists => load(sections.debug_rnglists),
            _ => load(&[]),
        })
    })?;

    let mut name = None;
    let mut comp_dir = None;
    let mut functions = Vec::new();

    let mut units = dwarf.units();
    // Only the single compile unit spec §4.B describes is consulted.
    if let Some(header) = units.next()? {
        let unit = dwarf.unit(header)?;
        let mut entries = unit.entries();
        while let Some((_, entry)) = entries.next_dfs()? {
            match entry.tag() {
                gimli::DW_TAG_compile_unit => {
                    if let Some(attr) = entry.attr_value(gimli::DW_AT_name)? {
                        if let Ok(s) = dwarf.attr_string(&unit, attr) {
                            name = Some(s.to_string_lossy().into_owned());
                        }
                    }
                    if let Some(attr) = entry.attr_value(gimli::DW_AT_comp_dir)? {
                        if let Ok(s) = dwarf.attr_string(&unit, attr) {
                            comp_dir = Some(s.to_string_lossy().into_owned());
                        }
                    }
                }
                gimli::DW_TAG_subprogram => {
                    let low_pc = match entry.attr_value(gimli::DW_AT_low_pc)? {
                        Some(gimli::AttributeValue::Addr(addr)) => Some(addr),
                        _ => None,
                    };
                    let high_pc_attr = entry.attr_value(gimli::DW_AT_high_pc)?;
                    if let (Some(low_pc), Some(high_attr)) = (low_pc, high_pc_attr) {
                        let high_pc = match high_attr {
                            gimli::AttributeValue::Addr(addr) => addr,
                            gimli::AttributeValue::Udata(offset) => low_pc + offset,
                            _ => continue,
                        };
                        functions.push(FunctionRange { low_pc, high_pc });
                    }
                }
                _ => {}
            }
        }
    }

    functions.sort_by_key(|f| f.low_pc);

    Ok(DebugInfo { name, comp_dir, mtime, functions })
}
