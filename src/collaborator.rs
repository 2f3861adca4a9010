//! The external interfaces this engine consumes from its host linker (spec
//! §6): symbol resolution, output-section matching, the GOT/stub/TLV table
//! families, and the virtual-address allocator. None of these are
//! implemented here — the host linker owns them — this module only defines
//! the trait boundary and, for tests, a minimal in-memory implementation of
//! it.

use crate::atom::{Atom, SymbolWithLoc};
use crate::mach::load_command::Section64;
use crate::mach::symbols::Nlist;

/// `(output_segment_index, output_section_index)` — the destination an atom
/// is placed into, opaque to this engine beyond equality and the accessors
/// the host exposes through `get_section`/`get_section_ordinal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchingSection {
    pub segment_index: u16,
    pub section_index: u16,
}

/// The capability bundle the splitter and relocation parser/resolver read
/// and mutate. A real linker implements this against its own symbol table,
/// layout, and atom arena; this engine only ever calls through the trait.
pub trait LinkerCollaborator {
    fn get_symbol(&self, sym: SymbolWithLoc) -> Nlist;
    fn get_symbol_mut(&mut self, sym: SymbolWithLoc) -> &mut Nlist;
    fn get_symbol_name(&self, sym: SymbolWithLoc) -> &str;

    fn get_matching_section(&self, sect: &Section64) -> Option<MatchingSection>;
    fn get_section(&self, matched: MatchingSection) -> Section64;
    fn get_section_ordinal(&self, matched: MatchingSection) -> u8;
    fn get_matching_section_from_ordinal(&self, ordinal: u8) -> Option<MatchingSection>;

    fn get_global(&self, name: &str) -> Option<SymbolWithLoc>;
    fn get_global_index(&self, name: &str) -> Option<u32>;
    fn contains_global(&self, name: &str) -> bool;

    fn got_entry(&self, target: SymbolWithLoc) -> Option<SymbolWithLoc>;
    fn stub_entry(&self, target: SymbolWithLoc) -> Option<SymbolWithLoc>;
    fn tlv_ptr_entry(&self, target: SymbolWithLoc) -> Option<SymbolWithLoc>;

    /// Reserves a GOT slot for `target` and returns its index. Idempotent:
    /// calling this twice for the same target must not allocate twice (the
    /// caller checks `got_entry` first).
    fn allocate_got_entry(&mut self, target: SymbolWithLoc) -> u32;
    fn allocate_stub_entry(&mut self, target: SymbolWithLoc) -> u32;
    fn allocate_tlv_ptr_entry(&mut self, target: SymbolWithLoc) -> u32;

    fn create_got_atom(&mut self, target: SymbolWithLoc) -> SymbolWithLoc;
    /// `target` is threaded through only so the implementation can register
    /// `stubs_table[target] = stub_sym`; the stub's own code only ever
    /// references `laptr_sym`.
    fn create_stub_atom(&mut self, laptr_sym: SymbolWithLoc, target: SymbolWithLoc) -> SymbolWithLoc;
    fn create_stub_helper_atom(&mut self) -> SymbolWithLoc;
    fn create_lazy_pointer_atom(&mut self, helper_sym: SymbolWithLoc, target: SymbolWithLoc) -> SymbolWithLoc;
    fn create_tlv_ptr_atom(&mut self, target: SymbolWithLoc) -> SymbolWithLoc;

    fn atom(&self, sym: SymbolWithLoc) -> Option<&Atom>;
    fn atom_mut(&mut self, sym: SymbolWithLoc) -> Option<&mut Atom>;

    fn add_atom_to_section(&mut self, atom: SymbolWithLoc, matched: MatchingSection);
    /// Used only when layout is eager (`needs_prealloc`); assigns a VA
    /// immediately instead of deferring to the free-running layout pass.
    fn allocate_atom(&mut self, atom: SymbolWithLoc, size: u64, alignment: u32, matched: MatchingSection) -> u64;

    fn needs_prealloc(&self) -> bool;

    fn data_segment_cmd_index(&self) -> Option<usize>;
    fn data_const_segment_cmd_index(&self) -> Option<usize>;
    fn text_segment_cmd_index(&self) -> Option<usize>;
    fn got_section_index(&self) -> Option<MatchingSection>;
    fn stubs_section_index(&self) -> Option<MatchingSection>;
    fn stub_helper_section_index(&self) -> Option<MatchingSection>;
    fn la_symbol_ptr_section_index(&self) -> Option<MatchingSection>;
    fn tlv_data_section_index(&self) -> Option<MatchingSection>;
    fn tlv_bss_section_index(&self) -> Option<MatchingSection>;

    fn strtab_insert(&mut self, name: &str) -> u32;
}

/// An in-memory stand-in for tests: single object, no real layout, VAs
/// assigned sequentially on `allocate_atom`. Not exported outside tests —
/// a real host linker's collaborator lives well outside this crate.
#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;

    pub struct MockCollaborator {
        pub symbols: Vec<Nlist>,
        pub names: Vec<String>,
        pub globals: HashMap<String, SymbolWithLoc>,
        pub sections: Vec<Section64>,
        pub got_table: HashMap<SymbolWithLoc, SymbolWithLoc>,
        pub stub_table: HashMap<SymbolWithLoc, SymbolWithLoc>,
        pub tlv_table: HashMap<SymbolWithLoc, SymbolWithLoc>,
        pub atoms: HashMap<SymbolWithLoc, Atom>,
        pub next_synthetic: u32,
        pub next_vaddr: u64,
        pub placements: Vec<(SymbolWithLoc, MatchingSection)>,
    }

    impl MockCollaborator {
        pub fn new() -> Self {
            MockCollaborator {
                symbols: Vec::new(),
                names: Vec::new(),
                globals: HashMap::new(),
                sections: Vec::new(),
                got_table: HashMap::new(),
                stub_table: HashMap::new(),
                tlv_table: HashMap::new(),
                atoms: HashMap::new(),
                next_synthetic: 1,
                next_vaddr: 0x1000,
                placements: Vec::new(),
            }
        }

        fn next_synthetic_sym(&mut self) -> SymbolWithLoc {
            let sym = SymbolWithLoc::synthetic(self.next_synthetic);
            self.next_synthetic += 1;
            sym
        }
    }

    impl LinkerCollaborator for MockCollaborator {
        fn get_symbol(&self, sym: SymbolWithLoc) -> Nlist {
            self.symbols[sym.sym_index as usize]
        }

        fn get_symbol_mut(&mut self, sym: SymbolWithLoc) -> &mut Nlist {
            &mut self.symbols[sym.sym_index as usize]
        }

        fn get_symbol_name(&self, sym: SymbolWithLoc) -> &str {
            &self.names[sym.sym_index as usize]
        }

        fn get_matching_section(&self, sect: &Section64) -> Option<MatchingSection> {
            let want_seg = sect.segname().ok();
            let want_sect = sect.sectname().ok();
            self.sections.iter().position(|s| {
                s.segname().ok() == want_seg && s.sectname().ok() == want_sect
            }).map(|i| MatchingSection { segment_index: 0, section_index: i as u16 })
        }

        fn get_section(&self, matched: MatchingSection) -> Section64 {
            self.sections[matched.section_index as usize]
        }

        fn get_section_ordinal(&self, matched: MatchingSection) -> u8 {
            matched.section_index as u8 + 1
        }

        fn get_matching_section_from_ordinal(&self, ordinal: u8) -> Option<MatchingSection> {
            if ordinal == 0 {
                return None;
            }
            Some(MatchingSection { segment_index: 0, section_index: ordinal as u16 - 1 })
        }

        fn get_global(&self, name: &str) -> Option<SymbolWithLoc> {
            self.globals.get(name).copied()
        }

        fn get_global_index(&self, name: &str) -> Option<u32> {
            self.globals.get(name).map(|s| s.sym_index)
        }

        fn contains_global(&self, name: &str) -> bool {
            self.globals.contains_key(name)
        }

        fn got_entry(&self, target: SymbolWithLoc) -> Option<SymbolWithLoc> {
            self.got_table.get(&target).copied()
        }

        fn stub_entry(&self, target: SymbolWithLoc) -> Option<SymbolWithLoc> {
            self.stub_table.get(&target).copied()
        }

        fn tlv_ptr_entry(&self, target: SymbolWithLoc) -> Option<SymbolWithLoc> {
            self.tlv_table.get(&target).copied()
        }

        fn allocate_got_entry(&mut self, _target: SymbolWithLoc) -> u32 {
            self.got_table.len() as u32
        }

        fn allocate_stub_entry(&mut self, _target: SymbolWithLoc) -> u32 {
            self.stub_table.len() as u32
        }

        fn allocate_tlv_ptr_entry(&mut self, _target: SymbolWithLoc) -> u32 {
            self.tlv_table.len() as u32
        }

        fn create_got_atom(&mut self, target: SymbolWithLoc) -> SymbolWithLoc {
            let sym = self.next_synthetic_sym();
            let mut atom = Atom::empty(sym.sym_index, None, 8, 3);
            atom.relocs.push(crate::atom::Relocation {
                offset: 0,
                target,
                addend: 0,
                subtractor: None,
                pcrel: false,
                length: 3,
                r#type: 0,
            });
            self.atoms.insert(sym, atom);
            self.got_table.insert(target, sym);
            sym
        }

        fn create_stub_atom(&mut self, laptr_sym: SymbolWithLoc, target: SymbolWithLoc) -> SymbolWithLoc {
            let sym = self.next_synthetic_sym();
            let mut atom = Atom::empty(sym.sym_index, None, 6, 1);
            atom.relocs.push(crate::atom::Relocation {
                offset: 0,
                target: laptr_sym,
                addend: 0,
                subtractor: None,
                pcrel: true,
                length: 2,
                r#type: 0,
            });
            self.atoms.insert(sym, atom);
            self.stub_table.insert(target, sym);
            sym
        }

        fn create_stub_helper_atom(&mut self) -> SymbolWithLoc {
            let sym = self.next_synthetic_sym();
            self.atoms.insert(sym, Atom::empty(sym.sym_index, None, 10, 1));
            sym
        }

        fn create_lazy_pointer_atom(&mut self, helper_sym: SymbolWithLoc, target: SymbolWithLoc) -> SymbolWithLoc {
            let sym = self.next_synthetic_sym();
            let mut atom = Atom::empty(sym.sym_index, None, 8, 3);
            atom.relocs.push(crate::atom::Relocation {
                offset: 0,
                target: helper_sym,
                addend: 0,
                subtractor: None,
                pcrel: false,
                length: 3,
                r#type: 0,
            });
            self.atoms.insert(sym, atom);
            sym
        }

        fn create_tlv_ptr_atom(&mut self, target: SymbolWithLoc) -> SymbolWithLoc {
            let sym = self.next_synthetic_sym();
            self.atoms.insert(sym, Atom::empty(sym.sym_index, None, 8, 3));
            self.tlv_table.insert(target, sym);
            sym
        }

        fn atom(&self, sym: SymbolWithLoc) -> Option<&Atom> {
            self.atoms.get(&sym)
        }

        fn atom_mut(&mut self, sym: SymbolWithLoc) -> Option<&mut Atom> {
            self.atoms.get_mut(&sym)
        }

        fn add_atom_to_section(&mut self, atom: SymbolWithLoc, matched: MatchingSection) {
            self.placements.push((atom, matched));
        }

        fn allocate_atom(&mut self, _atom: SymbolWithLoc, size: u64, alignment: u32, _matched: MatchingSection) -> u64 {
            let mask = (1u64 << alignment) - 1;
            let va = (self.next_vaddr + mask) & !mask;
            self.next_vaddr = va + size;
            va
        }

        fn needs_prealloc(&self) -> bool {
            false
        }

        fn data_segment_cmd_index(&self) -> Option<usize> {
            Some(0)
        }

        fn data_const_segment_cmd_index(&self) -> Option<usize> {
            Some(0)
        }

        fn text_segment_cmd_index(&self) -> Option<usize> {
            Some(0)
        }

        fn got_section_index(&self) -> Option<MatchingSection> {
            None
        }

        fn stubs_section_index(&self) -> Option<MatchingSection> {
            None
        }

        fn stub_helper_section_index(&self) -> Option<MatchingSection> {
            None
        }

        fn la_symbol_ptr_section_index(&self) -> Option<MatchingSection> {
            None
        }

        fn tlv_data_section_index(&self) -> Option<MatchingSection> {
            None
        }

        fn tlv_bss_section_index(&self) -> Option<MatchingSection> {
            None
        }

        fn strtab_insert(&mut self, name: &str) -> u32 {
            self.names.push(name.to_string());
            (self.names.len() - 1) as u32
        }
    }
}
