//! The object splitter (spec §4.E, §4.E.1): walks a parsed object's
//! sections and turns each into one or more atoms, registering each with
//! the host linker's output-section placement. Runs once per object,
//! strictly before any virtual address is assigned (spec §5).

use scroll::Pread;

use crate::arch::Arch;
use crate::atom::{Atom, Contained, DataInCode, Stab, SymbolWithLoc};
use crate::collaborator::{LinkerCollaborator, MatchingSection};
use crate::error::{Error, Result};
use crate::mach::constants::{S_MOD_INIT_FUNC_POINTERS, S_MOD_TERM_FUNC_POINTERS};
use crate::mach::load_command::Section64;
use crate::mach::relocation::{RelocationInfo, SIZEOF_RELOCATION_INFO};
use crate::mach::symbols::Nlist;
use crate::object::Object;
use crate::ordering::{self, SymbolAtIndex};
use crate::reloc_parse::{self, ParsedEntry};

/// Layout mode flags the host passes in (spec §4.E step 6); the
/// configuration analogue of a CLI flag set, since this engine has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizeMode {
    Debug,
    Release,
}

#[derive(Debug, Clone, Copy)]
pub struct SplitOptions {
    pub subsections_via_symbols: bool,
    pub gc_sections: bool,
    pub optimize_mode: OptimizeMode,
}

/// Everything the splitter produced for one object: the atoms it created,
/// in creation order, and which of them are GC roots (spec §4.E.1).
#[derive(Debug, Default)]
pub struct SplitResult {
    pub atoms: Vec<SymbolWithLoc>,
    pub gc_roots: Vec<SymbolWithLoc>,
}

/// Splits every section of `object` into atoms and hands each to
/// `collaborator.add_atom_to_section` (spec §4.E steps 1-7).
pub fn split_object(
    object: &mut Object,
    collaborator: &mut dyn LinkerCollaborator,
    arch: Arch,
    options: SplitOptions,
) -> Result<SplitResult> {
    let ordered = ordering::order_symbols(&object.symtab);
    let defined_count = ordered.iter().take_while(|s| s.defined).count();
    let defined: Vec<SymbolAtIndex> = ordered[..defined_count].to_vec();

    let has_dices = object.data_in_code_cmd.is_some() && !object.dices.is_empty();
    let sections = object.sections.clone();
    let mut result = SplitResult::default();

    for sect in &sections {
        let matched = match collaborator.get_matching_section(sect) {
            Some(m) => m,
            None => {
                #[cfg(feature = "log")]
                log::debug!("no output section for {:?}/{:?}, skipping", sect.segname(), sect.sectname());
                continue;
            }
        };

        let is_zerofill = sect.is_zerofill();
        let code = if is_zerofill {
            Vec::new()
        } else {
            object
                .data()
                .get(sect.offset as usize..sect.offset as usize + sect.size as usize)
                .ok_or_else(|| Error::Malformed(format!("section {:?} code range out of bounds", sect.sectname())))?
                .to_vec()
        };
        let relocs = read_relocations(object.data(), sect)?;

        let filtered_syms = ordering::filter_symbols_by_address(&defined, sect.addr, sect.addr + sect.size);

        let is_text_section = sect.segname().ok() == Some(crate::mach::constants::SEG_TEXT)
            && sect.sectname().ok() == Some(crate::mach::constants::SECT_TEXT);
        let section_has_dices = has_dices && is_text_section;

        let subsections_via_symbols = object.header.subsections_via_symbols()
            && options.subsections_via_symbols
            && (options.optimize_mode != OptimizeMode::Debug || options.gc_sections);

        if subsections_via_symbols && !filtered_syms.is_empty() {
            if filtered_syms[0].n_value > sect.addr {
                let ordinal = collaborator.get_section_ordinal(matched);
                let head_sym = reloc_parse::get_or_create_section_symbol(object, collaborator, ordinal)?;
                let size = filtered_syms[0].n_value - sect.addr;
                let atom_sym = create_atom_from_subsection(
                    object,
                    collaborator,
                    arch,
                    sect,
                    matched,
                    head_sym.sym_index,
                    sect.addr,
                    size,
                    sect.align,
                    &code,
                    &relocs,
                    section_has_dices,
                    &[],
                )?;
                collaborator.add_atom_to_section(atom_sym, matched);
                result.atoms.push(atom_sym);
                if is_gc_root(sect) {
                    result.gc_roots.push(atom_sym);
                }
            }

            let mut i = 0;
            while i < filtered_syms.len() {
                let group_addr = filtered_syms[i].n_value;
                let mut j = i + 1;
                while j < filtered_syms.len() && filtered_syms[j].n_value == group_addr {
                    j += 1;
                }
                let next_addr = if j < filtered_syms.len() { filtered_syms[j].n_value } else { sect.addr + sect.size };
                let size = next_addr - group_addr;
                let alignment = if group_addr > 0 { group_addr.trailing_zeros().min(sect.align) } else { sect.align };
                let defining_index = filtered_syms[i].index;
                let extra: Vec<u32> = filtered_syms[i + 1..j].iter().map(|s| s.index).collect();

                let atom_sym = create_atom_from_subsection(
                    object,
                    collaborator,
                    arch,
                    sect,
                    matched,
                    defining_index,
                    group_addr,
                    size,
                    alignment,
                    &code,
                    &relocs,
                    section_has_dices,
                    &extra,
                )?;
                collaborator.add_atom_to_section(atom_sym, matched);
                result.atoms.push(atom_sym);
                if is_gc_root(sect) {
                    result.gc_roots.push(atom_sym);
                }
                i = j;
            }
        } else {
            let ordinal = collaborator.get_section_ordinal(matched);
            let defining = reloc_parse::get_or_create_section_symbol(object, collaborator, ordinal)?;
            let atom_sym = create_atom_from_subsection(
                object,
                collaborator,
                arch,
                sect,
                matched,
                defining.sym_index,
                sect.addr,
                sect.size,
                sect.align,
                &code,
                &relocs,
                section_has_dices,
                &[],
            )?;
            collaborator.add_atom_to_section(atom_sym, matched);
            result.atoms.push(atom_sym);
            if is_gc_root(sect) {
                result.gc_roots.push(atom_sym);
            }
        }
    }

    Ok(result)
}

fn read_relocations(data: &[u8], sect: &Section64) -> Result<Vec<RelocationInfo>> {
    let mut out = Vec::with_capacity(sect.nreloc as usize);
    for i in 0..sect.nreloc as usize {
        let info: RelocationInfo = data.pread_with(sect.reloff as usize + i * SIZEOF_RELOCATION_INFO, scroll::LE)?;
        out.push(info);
    }
    Ok(out)
}

fn is_gc_root(sect: &Section64) -> bool {
    sect.is_dont_dead_strip()
        || sect.is_dont_dead_strip_if_references_live()
        || sect.sectname().ok() == Some("__StaticInit")
        || matches!(sect.section_type(), S_MOD_INIT_FUNC_POINTERS | S_MOD_TERM_FUNC_POINTERS)
}

fn align_up(size: u64, alignment: u32) -> u64 {
    let mask = (1u64 << alignment) - 1;
    (size + mask) & !mask
}

/// `createAtomFromSubsection` (spec §4.E.1): builds one atom covering
/// `[region_addr, region_addr + size)` of `sect`, parses the relocations
/// and data-in-code entries that fall in that range, and attaches every
/// other symbol aliasing an address inside it as a contained symbol.
#[allow(clippy::too_many_arguments)]
fn create_atom_from_subsection(
    object: &mut Object,
    collaborator: &mut dyn LinkerCollaborator,
    arch: Arch,
    sect: &Section64,
    matched: MatchingSection,
    defining_sym_index: u32,
    region_addr: u64,
    size: u64,
    alignment: u32,
    code: &[u8],
    relocs: &[RelocationInfo],
    has_dices: bool,
    extra_sym_indexes: &[u32],
) -> Result<SymbolWithLoc> {
    let aligned_size = align_up(size, alignment);
    let mut atom = Atom::empty(defining_sym_index, Some(object.file_id), aligned_size, alignment);

    if !code.is_empty() {
        let region_offset = (region_addr - sect.addr) as usize;
        let end = (region_offset + size as usize).min(code.len());
        if region_offset < end {
            let slice = &code[region_offset..end];
            atom.code[..slice.len()].copy_from_slice(slice);
        }
    }

    let base_offset = region_addr - sect.addr;
    let low = base_offset as i64;
    let high = (base_offset + size) as i64;
    let filtered_relocs = ordering::filter_relocs(relocs, |r| r.r_address as i64, low, high);
    let parsed = reloc_parse::parse_section_relocations(filtered_relocs, base_offset, object, collaborator, sect, code, arch)?;
    for entry in parsed {
        match entry {
            ParsedEntry::Relocation(r) => atom.relocs.push(r),
            ParsedEntry::Rebase { offset, relocation } => {
                atom.rebases.push(offset);
                atom.relocs.push(relocation);
            }
            ParsedEntry::Binding { offset, global_index } => atom.bindings.push(crate::atom::Binding { global_index, offset }),
        }
    }

    if has_dices {
        let dice_low = region_addr as u32;
        let dice_high = (region_addr + size) as u32;
        let filtered_dices = ordering::filter_dice(&object.dices, |d| d.offset, dice_low, dice_high);
        atom.dices = filtered_dices
            .iter()
            .map(|d| DataInCode { offset: d.offset - region_addr as u32, length: d.length, kind: d.kind })
            .collect();
    }

    let ordinal = collaborator.get_section_ordinal(matched);
    for &idx in extra_sym_indexes {
        let nlist: Nlist = object.symtab[idx as usize];
        let offset = nlist.n_value - region_addr;
        let stab = object
            .debug_info
            .as_ref()
            .and_then(|info| info.lookup_function(nlist.n_value))
            .map(Stab::Function)
            .or(Some(Stab::Static));
        atom.contained.push(Contained { sym_index: idx, offset, stab });
        object.symtab[idx as usize].n_sect = ordinal;
        object.atom_by_index_table.insert(idx, SymbolWithLoc::new(defining_sym_index, Some(object.file_id)));
    }

    Ok(object.push_atom(atom))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::test_support::MockCollaborator;
    use crate::mach::constants::{cputype, N_SECT, N_UNDF};
    use crate::mach::header::{MachHeader64, MH_MAGIC_64, MH_OBJECT};
    use crate::reloc_resolve;

    fn object_with_sections(flags: u32, sections: Vec<Section64>) -> Object<'static> {
        static BYTES: [u8; 64] = [0u8; 64];
        object_with_data(flags, sections, &BYTES)
    }

    /// Like `object_with_sections`, but backed by caller-supplied bytes
    /// (leaked for `'static`) so a test can control what the splitter reads
    /// as a section's code.
    fn object_with_data(flags: u32, sections: Vec<Section64>, data: &'static [u8]) -> Object<'static> {
        let header = MachHeader64 {
            magic: MH_MAGIC_64,
            cputype: cputype::CPU_TYPE_ARM64,
            cpusubtype: 0,
            filetype: MH_OBJECT,
            ncmds: 0,
            sizeofcmds: 0,
            flags,
            reserved: 0,
        };
        Object {
            file_id: 0,
            data,
            header,
            sections,
            symtab_cmd: None,
            dysymtab_cmd: None,
            build_version: None,
            data_in_code_cmd: None,
            symtab: Vec::new(),
            strtab: crate::strtab::Strtab::default(),
            dices: Vec::new(),
            debug_info: None,
            sections_as_symbols: std::collections::HashMap::new(),
            atom_by_index_table: std::collections::HashMap::new(),
            managed_atoms: Vec::new(),
            atom_positions: std::collections::HashMap::new(),
        }
    }

    fn leak_bytes(bytes: Vec<u8>) -> &'static [u8] {
        Box::leak(bytes.into_boxed_slice())
    }

    fn text_section(size: u64) -> Section64 {
        let mut sect = Section64 {
            sectname: [0; 16],
            segname: [0; 16],
            addr: 0x1000,
            size,
            offset: 0,
            align: 2,
            reloff: 0,
            nreloc: 0,
            flags: 0x8000_0000,
            reserved1: 0,
            reserved2: 0,
            reserved3: 0,
        };
        sect.sectname[..6].copy_from_slice(b"__text");
        sect.segname[..6].copy_from_slice(b"__TEXT");
        sect
    }

    fn options(subsections: bool) -> SplitOptions {
        SplitOptions { subsections_via_symbols: subsections, gc_sections: false, optimize_mode: OptimizeMode::Release }
    }

    #[test]
    fn whole_section_path_creates_one_atom_when_no_subsections_flag() {
        let sect = text_section(0x20);
        let mut object = object_with_sections(0, vec![sect]);
        let mut collab = MockCollaborator::new();
        collab.sections.push(sect);
        let result = split_object(&mut object, &mut collab, Arch::Aarch64, options(true)).unwrap();
        assert_eq!(result.atoms.len(), 1);
        assert!(result.gc_roots.is_empty());
    }

    #[test]
    fn subsections_path_splits_on_each_distinct_symbol_address() {
        let sect = text_section(0x30);
        let mut object = object_with_sections(crate::mach::header::MH_SUBSECTIONS_VIA_SYMBOLS, vec![sect]);
        object.symtab.push(Nlist { n_strx: 0, n_type: N_SECT, n_sect: 1, n_desc: 0, n_value: 0x1000 });
        object.symtab.push(Nlist { n_strx: 0, n_type: N_SECT, n_sect: 1, n_desc: 0, n_value: 0x1010 });
        object.symtab.push(Nlist { n_strx: 0, n_type: N_UNDF, n_sect: 0, n_desc: 0, n_value: 0 });
        let mut collab = MockCollaborator::new();
        collab.sections.push(sect);
        collab.names.push("a".to_string());
        collab.names.push("b".to_string());
        collab.names.push("extern_fn".to_string());
        let result = split_object(&mut object, &mut collab, Arch::Aarch64, options(true)).unwrap();
        assert_eq!(result.atoms.len(), 2);
        assert_eq!(object.atom(result.atoms[0].sym_index).unwrap().size, 0x10);
        assert_eq!(object.atom(result.atoms[1].sym_index).unwrap().size, 0x20);
    }

    #[test]
    fn head_region_before_first_symbol_gets_its_own_atom() {
        let sect = text_section(0x20);
        let mut object = object_with_sections(crate::mach::header::MH_SUBSECTIONS_VIA_SYMBOLS, vec![sect]);
        object.symtab.push(Nlist { n_strx: 0, n_type: N_SECT, n_sect: 1, n_desc: 0, n_value: 0x1010 });
        let mut collab = MockCollaborator::new();
        collab.sections.push(sect);
        collab.names.push("only".to_string());
        let result = split_object(&mut object, &mut collab, Arch::Aarch64, options(true)).unwrap();
        assert_eq!(result.atoms.len(), 2);
        assert_eq!(object.atom(result.atoms[0].sym_index).unwrap().size, 0x10);
        assert_eq!(object.atom(result.atoms[1].sym_index).unwrap().size, 0x10);
    }

    #[test]
    fn section_with_no_matching_output_is_skipped() {
        let sect = text_section(0x20);
        let mut object = object_with_sections(0, vec![sect]);
        let mut collab = MockCollaborator::new();
        let result = split_object(&mut object, &mut collab, Arch::Aarch64, options(true)).unwrap();
        assert!(result.atoms.is_empty());
    }

    #[test]
    fn dont_dead_strip_section_is_marked_as_gc_root() {
        let mut sect = text_section(0x10);
        sect.flags |= crate::mach::constants::S_ATTR_NO_DEAD_STRIP;
        let mut object = object_with_sections(0, vec![sect]);
        let mut collab = MockCollaborator::new();
        collab.sections.push(sect);
        let result = split_object(&mut object, &mut collab, Arch::Aarch64, options(true)).unwrap();
        assert_eq!(result.gc_roots.len(), 1);
        assert_eq!(result.gc_roots[0], result.atoms[0]);
    }

    fn data_section(size: u64, reloff: u32, nreloc: u32) -> Section64 {
        let mut sect = Section64 {
            sectname: [0; 16],
            segname: [0; 16],
            addr: 0x2000,
            size,
            offset: 0,
            align: 3,
            reloff,
            nreloc,
            flags: crate::mach::constants::S_REGULAR,
            reserved1: 0,
            reserved2: 0,
            reserved3: 0,
        };
        sect.sectname[..6].copy_from_slice(b"__data");
        sect.segname[..6].copy_from_slice(b"__DATA");
        sect
    }

    fn reloc(r_address: i32, r_symbolnum: u32, pcrel: bool, length: u8, extern_: bool, r#type: u8) -> RelocationInfo {
        let mut info = 0u32;
        info |= r_symbolnum & 0x00ff_ffff;
        if pcrel {
            info |= 1 << 24;
        }
        info |= ((length & 0x3) as u32) << 25;
        if extern_ {
            info |= 1 << 27;
        }
        info |= ((r#type & 0xf) as u32) << 28;
        RelocationInfo { r_address, r_info: info }
    }

    fn write_reloc(buf: &mut [u8], offset: usize, info: RelocationInfo) {
        use scroll::Pwrite;
        buf.pwrite_with(info, offset, scroll::LE).unwrap();
    }

    /// Scenario S4: an `UNSIGNED` pointer inside `__DATA` to a symbol
    /// already defined becomes a rebase, and the resolver still writes the
    /// link-time absolute address into the rebase's slot.
    #[test]
    fn unsigned_pointer_to_defined_symbol_rebases_and_round_trips_through_resolve() {
        let sect = data_section(8, 8, 1);
        let mut data = vec![0u8; 16];
        data[0..8].copy_from_slice(&0x10i64.to_le_bytes());
        write_reloc(&mut data, 8, reloc(0, 0, false, 3, true, crate::mach::constants::arm64_reloc::ARM64_RELOC_UNSIGNED));
        let data: &'static [u8] = leak_bytes(data);

        let mut object = object_with_data(0, vec![sect], data);
        object.symtab.push(Nlist { n_strx: 0, n_type: N_SECT, n_sect: 1, n_desc: 0, n_value: 0x3000 });
        let mut collab = MockCollaborator::new();
        collab.sections.push(sect);
        collab.symbols.push(object.symtab[0]);
        collab.names.push("target".to_string());

        let result = split_object(&mut object, &mut collab, Arch::Aarch64, options(false)).unwrap();
        assert_eq!(result.atoms.len(), 1);
        let atom_sym = result.atoms[0];
        let atom = object.atom(atom_sym.sym_index).unwrap();
        assert_eq!(atom.rebases, vec![0]);
        assert!(atom.bindings.is_empty());
        assert_eq!(atom.relocs.len(), 1);

        let mut code = atom.code.clone();
        reloc_resolve::resolve(&atom.relocs[0], &mut code, 0, &collab, Arch::Aarch64, crate::mach::constants::S_REGULAR, None).unwrap();
        assert_eq!(&code[0..8], &0x3010i64.to_le_bytes());
    }

    /// Scenario S5: the same pointer shape, but targeting an undefined
    /// extern symbol, becomes a binding instead — and the resolver must
    /// never touch its code bytes (spec invariant 2).
    #[test]
    fn unsigned_pointer_to_undefined_symbol_binds_without_touching_code() {
        let sect = data_section(8, 8, 1);
        let mut data = vec![0u8; 16];
        write_reloc(&mut data, 8, reloc(0, 0, false, 3, true, crate::mach::constants::arm64_reloc::ARM64_RELOC_UNSIGNED));
        let data: &'static [u8] = leak_bytes(data);

        let mut object = object_with_data(0, vec![sect], data);
        object.symtab.push(Nlist { n_strx: 1, n_type: N_UNDF, n_sect: 0, n_desc: 0, n_value: 0 });
        object.strtab = crate::strtab::Strtab::new(leak_bytes(b"\0_printf\0".to_vec()), 0);
        let mut collab = MockCollaborator::new();
        collab.sections.push(sect);
        collab.symbols.push(object.symtab[0]);
        collab.names.push("_printf".to_string());
        collab.globals.insert("_printf".to_string(), SymbolWithLoc::synthetic(99));

        let result = split_object(&mut object, &mut collab, Arch::Aarch64, options(false)).unwrap();
        let atom_sym = result.atoms[0];
        let atom = object.atom(atom_sym.sym_index).unwrap();
        assert!(atom.rebases.is_empty());
        assert!(atom.relocs.is_empty());
        assert_eq!(atom.bindings.len(), 1);
        assert_eq!(atom.bindings[0].offset, 0);
        assert_eq!(atom.bindings[0].global_index, 99);
        assert_eq!(&atom.code[0..8], &[0u8; 8]);
    }

    /// Scenario S6: a `SUBTRACTOR`/`UNSIGNED` pair normalizes into a single
    /// relocation carrying both symbols, and resolves to their address
    /// difference plus addend.
    #[test]
    fn subtractor_pair_resolves_to_address_difference() {
        let sect = data_section(8, 8, 2);
        let mut data = vec![0u8; 24];
        write_reloc(&mut data, 8, reloc(0, 0, false, 3, true, crate::mach::constants::arm64_reloc::ARM64_RELOC_SUBTRACTOR));
        write_reloc(&mut data, 16, reloc(0, 1, false, 3, true, crate::mach::constants::arm64_reloc::ARM64_RELOC_UNSIGNED));
        let data: &'static [u8] = leak_bytes(data);

        let mut object = object_with_data(0, vec![sect], data);
        object.symtab.push(Nlist { n_strx: 0, n_type: N_SECT, n_sect: 1, n_desc: 0, n_value: 0x1000 });
        object.symtab.push(Nlist { n_strx: 0, n_type: N_SECT, n_sect: 1, n_desc: 0, n_value: 0x1020 });
        let mut collab = MockCollaborator::new();
        collab.sections.push(sect);
        collab.symbols.push(object.symtab[0]);
        collab.symbols.push(object.symtab[1]);
        collab.names.push("a".to_string());
        collab.names.push("b".to_string());

        let result = split_object(&mut object, &mut collab, Arch::Aarch64, options(false)).unwrap();
        let atom_sym = result.atoms[0];
        let atom = object.atom(atom_sym.sym_index).unwrap();
        assert_eq!(atom.relocs.len(), 1);
        assert_eq!(atom.relocs[0].target.sym_index, 1);
        assert_eq!(atom.relocs[0].subtractor.unwrap().sym_index, 0);

        let mut code = atom.code.clone();
        reloc_resolve::resolve(&atom.relocs[0], &mut code, 0, &collab, Arch::Aarch64, crate::mach::constants::S_REGULAR, None).unwrap();
        assert_eq!(&code[0..8], &0x20i64.to_le_bytes());
    }
}
