//! The Mach-O object parser (spec §4.B): reads header, load commands,
//! symbol table, string table, data-in-code, and DWARF section pointers out
//! of a caller-owned file buffer, rebasing every file-offset field so
//! downstream code can treat the object as if it started at offset 0.

use std::collections::HashMap;

use scroll::Pread;

use crate::arch::Arch;
use crate::atom::{Atom, SymbolWithLoc};
use crate::dwarf::{self, DebugInfo, DwarfSections};
use crate::error::Result;
use crate::mach::constants::{SEG_DWARF, SEG_TEXT, SECT_TEXT};
use crate::mach::header::{MachHeader64, SIZEOF_MACH_HEADER_64};
use crate::mach::load_command::{
    BuildVersionCommand, CommandVariant, DataInCodeEntry, DysymtabCommand, LinkeditDataCommand, LoadCommand,
    Section64, SymtabCommand, SIZEOF_DATA_IN_CODE_ENTRY, SIZEOF_SEGMENT_COMMAND_64,
};
use crate::mach::symbols::{Nlist, Symbols};
use crate::strtab::Strtab;

/// A parsed relocatable Mach-O object. Borrows its bytes from the caller
/// (the top-level driver owns the actual file buffer; opening it is outside
/// this engine's scope, spec §1).
pub struct Object<'a> {
    pub file_id: u32,
    pub(crate) data: &'a [u8],
    pub header: MachHeader64,
    pub sections: Vec<Section64>,
    pub symtab_cmd: Option<SymtabCommand>,
    pub dysymtab_cmd: Option<DysymtabCommand>,
    pub build_version: Option<BuildVersionCommand>,
    pub data_in_code_cmd: Option<LinkeditDataCommand>,
    pub symtab: Vec<Nlist>,
    pub strtab: Strtab<'a>,
    pub dices: Vec<DataInCodeEntry>,
    pub debug_info: Option<DebugInfo>,
    /// section ordinal (1-based `n_sect`) -> synthesized symbol index, for
    /// sections whose first byte has no leading symbol.
    pub sections_as_symbols: HashMap<u8, u32>,
    /// symtab index -> the atom that owns it, including contained symbols.
    pub atom_by_index_table: HashMap<u32, SymbolWithLoc>,
    /// this object's own atoms; freed (dropped) in reverse order on teardown.
    pub managed_atoms: Vec<Atom>,
    /// defining symtab index -> position in `managed_atoms`, populated by
    /// the splitter as it creates atoms.
    pub atom_positions: HashMap<u32, usize>,
}

impl<'a> Object<'a> {
    pub fn parse(data: &'a [u8], file_offset: usize, file_id: u32, target_arch: Arch, mtime: u64) -> Result<Object<'a>> {
        let header = MachHeader64::parse(data, file_offset, target_arch)?;

        let mut sections = Vec::new();
        let mut symtab_cmd = None;
        let mut dysymtab_cmd = None;
        let mut build_version = None;
        let mut data_in_code_cmd = None;

        let mut offset = file_offset + SIZEOF_MACH_HEADER_64;
        for _ in 0..header.ncmds {
            let lc = LoadCommand::parse(data, &mut offset, scroll::LE)?;
            match lc.command {
                CommandVariant::Segment64(seg) => {
                    let sect_start = lc.offset + SIZEOF_SEGMENT_COMMAND_64;
                    for i in 0..seg.nsects as usize {
                        let mut sect: Section64 = data.pread_with(sect_start + i * crate::mach::load_command::SIZEOF_SECTION_64, scroll::LE)?;
                        sect.offset += file_offset as u32;
                        if sect.nreloc > 0 {
                            sect.reloff += file_offset as u32;
                        }
                        sections.push(sect);
                    }
                }
                CommandVariant::Symtab(mut cmd) => {
                    cmd.symoff += file_offset as u32;
                    cmd.stroff += file_offset as u32;
                    symtab_cmd = Some(cmd);
                }
                CommandVariant::Dysymtab(cmd) => {
                    dysymtab_cmd = Some(cmd);
                }
                CommandVariant::BuildVersion(cmd) => {
                    build_version = Some(cmd);
                }
                CommandVariant::VersionMin(cmd) => {
                    let platform = if cmd.cmd == crate::mach::load_command::LC_VERSION_MIN_IPHONEOS {
                        crate::mach::load_command::PLATFORM_IOS
                    } else {
                        crate::mach::load_command::PLATFORM_MACOS
                    };
                    build_version = Some(BuildVersionCommand {
                        cmd: cmd.cmd,
                        cmdsize: cmd.cmdsize,
                        platform,
                        minos: cmd.version,
                        sdk: cmd.sdk,
                        ntools: 0,
                    });
                }
                CommandVariant::DataInCode(mut cmd) => {
                    cmd.dataoff += file_offset as u32;
                    data_in_code_cmd = Some(cmd);
                }
                CommandVariant::Unimplemented(lc_header) => {
                    #[cfg(feature = "log")]
                    log::debug!("ignoring unhandled load command {}", crate::mach::load_command::cmd_to_str(lc_header.cmd));
                    let _ = lc_header;
                }
            }
        }

        let mut symtab = Vec::new();
        let mut strtab = Strtab::default();
        if let Some(cmd) = symtab_cmd {
            let symbols = Symbols::parse(data, &cmd)?;
            for entry in symbols.iter() {
                let (_, nlist) = entry?;
                symtab.push(nlist);
            }
            strtab = Strtab::parse(data, cmd.stroff as usize, cmd.strsize as usize, 0x0)?;
        }

        let mut dices = Vec::new();
        if let Some(cmd) = data_in_code_cmd {
            let count = cmd.datasize as usize / SIZEOF_DATA_IN_CODE_ENTRY;
            for i in 0..count {
                let entry: DataInCodeEntry = data.pread_with(cmd.dataoff as usize + i * SIZEOF_DATA_IN_CODE_ENTRY, scroll::LE)?;
                dices.push(entry);
            }
        }

        let debug_info = Self::parse_dwarf(data, &sections, mtime);

        Ok(Object {
            file_id,
            data,
            header,
            sections,
            symtab_cmd,
            dysymtab_cmd,
            build_version,
            data_in_code_cmd,
            symtab,
            strtab,
            dices,
            debug_info,
            sections_as_symbols: HashMap::new(),
            atom_by_index_table: HashMap::new(),
            managed_atoms: Vec::new(),
            atom_positions: HashMap::new(),
        })
    }

    /// Registers `atom` as one of this object's own, returning the
    /// `SymbolWithLoc` future relocations should target.
    pub fn push_atom(&mut self, atom: Atom) -> SymbolWithLoc {
        let sym_index = atom.sym_index;
        let pos = self.managed_atoms.len();
        self.managed_atoms.push(atom);
        self.atom_positions.insert(sym_index, pos);
        let sym = SymbolWithLoc::new(sym_index, Some(self.file_id));
        self.atom_by_index_table.insert(sym_index, sym);
        sym
    }

    pub fn atom(&self, sym_index: u32) -> Option<&Atom> {
        self.atom_positions.get(&sym_index).map(|&pos| &self.managed_atoms[pos])
    }

    pub fn atom_mut(&mut self, sym_index: u32) -> Option<&mut Atom> {
        self.atom_positions.get(&sym_index).copied().map(move |pos| &mut self.managed_atoms[pos])
    }

    fn parse_dwarf(data: &'a [u8], sections: &[Section64], mtime: u64) -> Option<DebugInfo> {
        let mut dwarf_sections = DwarfSections::default();
        let mut any = false;
        for sect in sections {
            if sect.segname().ok() != Some(SEG_DWARF) {
                continue;
            }
            let slice = data.get(sect.offset as usize..sect.offset as usize + sect.size as usize)?;
            match sect.sectname().ok() {
                Some("__debug_abbrev") => { dwarf_sections.debug_abbrev = slice; any = true; }
                Some("__debug_info") => { dwarf_sections.debug_info = slice; any = true; }
                Some("__debug_str") => { dwarf_sections.debug_str = slice; any = true; }
                Some("__debug_line") => { dwarf_sections.debug_line = slice; any = true; }
                Some("__debug_ranges") => { dwarf_sections.debug_ranges = slice; any = true; }
                Some("__debug_rnglists") => { dwarf_sections.debug_rnglists = slice; any = true; }
                _ => {}
            }
        }
        if !any {
            #[cfg(feature = "log")]
            log::warn!("no __DWARF debug sections present; stabs will be Static-only");
            return None;
        }
        dwarf::parse(dwarf_sections, mtime)
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn text_section(&self) -> Option<&Section64> {
        self.sections.iter().find(|s| {
            s.segname().ok() == Some(SEG_TEXT) && s.sectname().ok() == Some(SECT_TEXT)
        })
    }

    pub fn symbol_name(&self, nlist: &Nlist) -> &'a str {
        self.strtab.get(nlist.n_strx as usize)
    }

    pub fn symbol_with_loc(&self, sym_index: u32) -> SymbolWithLoc {
        SymbolWithLoc::new(sym_index, Some(self.file_id))
    }
}
