//! The relocation resolver (spec §4.G): the second pass, run only once
//! every atom in the link has a final virtual address. Patches each
//! atom's code buffer in place using the architecture-specific encoders
//! in `arch::aarch64`/`arch::x86_64`.
//!
//! By the time a `Relocation` reaches this module its `target` already
//! names whichever atom the parse phase decided on — the symbol's own
//! atom, or a synthesized GOT/stub/TLV atom (spec §4.F.2). This phase
//! never creates anything; it only reads addresses and writes bytes.

use crate::arch::{aarch64, x86_64, Arch};
use crate::atom::Relocation;
use crate::collaborator::LinkerCollaborator;
use crate::error::{Error, Result};
use crate::mach::constants::{arm64_reloc, x86_64_reloc, S_THREAD_LOCAL_VARIABLES};

/// Resolves and patches one relocation into `code` (the owning atom's
/// backing buffer). `atom_addr` is that atom's final virtual address;
/// `atom_section_type` is the section type the *owning* atom lives in
/// (`is_tlv`, spec §4.G step 2, fires only for `UNSIGNED` pointers inside a
/// `S_THREAD_LOCAL_VARIABLES` descriptor, not for `TLVP_LOAD_*` accesses);
/// `tlv_base` is the thread-local template's base address, required only
/// when `is_tlv` holds.
pub fn resolve(
    reloc: &Relocation,
    code: &mut [u8],
    atom_addr: u64,
    collaborator: &dyn LinkerCollaborator,
    arch: Arch,
    atom_section_type: u32,
    tlv_base: Option<u64>,
) -> Result<()> {
    let source_addr = atom_addr + reloc.offset;
    let target_addr = collaborator.get_symbol(reloc.target).n_value;
    let mut target_addr = target_addr as i64;
    if let Some(subtractor) = reloc.subtractor {
        target_addr -= collaborator.get_symbol(subtractor).n_value as i64;
    }

    if atom_section_type == S_THREAD_LOCAL_VARIABLES {
        let base = tlv_base.ok_or_else(|| Error::FailedToResolveRelocationTarget("no TLV template section present".into()))?;
        target_addr -= base as i64;
    }

    match arch {
        Arch::Aarch64 => resolve_aarch64(reloc, code, source_addr, target_addr, collaborator),
        Arch::X86_64 => resolve_x86_64(reloc, code, source_addr, target_addr, collaborator),
    }
}

fn resolve_aarch64(
    reloc: &Relocation,
    code: &mut [u8],
    source_addr: u64,
    target_addr: i64,
    collaborator: &dyn LinkerCollaborator,
) -> Result<()> {
    let offset = reloc.offset as usize;
    match reloc.r#type {
        t if t == arm64_reloc::ARM64_RELOC_BRANCH26 => {
            aarch64::patch_branch26(code, offset, source_addr, target_addr as u64)
        }
        t if t == arm64_reloc::ARM64_RELOC_PAGE21 || t == arm64_reloc::ARM64_RELOC_GOT_LOAD_PAGE21 || t == arm64_reloc::ARM64_RELOC_TLVP_LOAD_PAGE21 => {
            let target_with_addend = target_addr + reloc.addend;
            let page_delta = ((target_with_addend >> 12) as i64) - ((source_addr >> 12) as i64);
            aarch64::patch_page21(code, offset, page_delta)
        }
        t if t == arm64_reloc::ARM64_RELOC_PAGEOFF12 || t == arm64_reloc::ARM64_RELOC_GOT_LOAD_PAGEOFF12 => {
            let target_with_addend = target_addr + reloc.addend;
            aarch64::patch_pageoff12(code, offset, (target_with_addend & 0xfff) as u32)
        }
        t if t == arm64_reloc::ARM64_RELOC_TLVP_LOAD_PAGEOFF12 => {
            let has_tlv_ptr = collaborator.tlv_ptr_entry(reloc.target).is_some();
            aarch64::patch_tlvp_pageoff12(code, offset, (target_addr & 0xfff) as u32, has_tlv_ptr)
        }
        t if t == arm64_reloc::ARM64_RELOC_POINTER_TO_GOT => {
            let disp = target_addr - source_addr as i64;
            if reloc.pcrel {
                crate::arch::write_i32(code, offset, disp as i32);
            } else {
                crate::arch::write_i64(code, offset, target_addr);
            }
            Ok(())
        }
        t if t == arm64_reloc::ARM64_RELOC_UNSIGNED => {
            let value = target_addr + reloc.addend;
            match reloc.length {
                2 => crate::arch::write_i32(code, offset, value as i32),
                3 => crate::arch::write_i64(code, offset, value),
                _ => return Err(Error::Malformed(format!("unexpected UNSIGNED relocation length {}", reloc.length))),
            }
            Ok(())
        }
        other => Err(Error::UnexpectedRelocationType { offset: reloc.offset, r#type: other }),
    }
}

fn resolve_x86_64(
    reloc: &Relocation,
    code: &mut [u8],
    source_addr: u64,
    target_addr: i64,
    collaborator: &dyn LinkerCollaborator,
) -> Result<()> {
    let offset = reloc.offset as usize;
    match reloc.r#type {
        t if t == x86_64_reloc::X86_64_RELOC_BRANCH
            || t == x86_64_reloc::X86_64_RELOC_GOT
            || t == x86_64_reloc::X86_64_RELOC_GOT_LOAD =>
        {
            let disp = x86_64::branch_or_got_displacement(source_addr, target_addr as u64, reloc.addend);
            crate::arch::write_i32(code, offset, disp as i32);
            Ok(())
        }
        t if t == x86_64_reloc::X86_64_RELOC_SIGNED => {
            let disp = x86_64::signed_displacement(source_addr, target_addr as u64, reloc.addend, 0);
            crate::arch::write_i32(code, offset, disp as i32);
            Ok(())
        }
        t if t == x86_64_reloc::X86_64_RELOC_SIGNED_1 => {
            let disp = x86_64::signed_displacement(source_addr, target_addr as u64, reloc.addend, 1);
            crate::arch::write_i32(code, offset, disp as i32);
            Ok(())
        }
        t if t == x86_64_reloc::X86_64_RELOC_SIGNED_2 => {
            let disp = x86_64::signed_displacement(source_addr, target_addr as u64, reloc.addend, 2);
            crate::arch::write_i32(code, offset, disp as i32);
            Ok(())
        }
        t if t == x86_64_reloc::X86_64_RELOC_SIGNED_4 => {
            let disp = x86_64::signed_displacement(source_addr, target_addr as u64, reloc.addend, 4);
            crate::arch::write_i32(code, offset, disp as i32);
            Ok(())
        }
        t if t == x86_64_reloc::X86_64_RELOC_TLV => {
            // A TLV access whose target never got a TLV pointer entry reads
            // the template offset directly, so the `movq` load of the
            // pointer slot is rewritten to a `leaq` of the offset itself.
            // Otherwise the movq stays and its displacement points at the
            // TLV pointer slot instead of the template.
            let has_tlv_ptr = collaborator.tlv_ptr_entry(reloc.target).is_some();
            if !has_tlv_ptr {
                x86_64::rewrite_movq_to_leaq(code, offset)?;
            }
            let disp = x86_64::branch_or_got_displacement(source_addr, target_addr as u64, reloc.addend);
            crate::arch::write_i32(code, offset, disp as i32);
            Ok(())
        }
        t if t == x86_64_reloc::X86_64_RELOC_UNSIGNED => {
            let value = target_addr + reloc.addend;
            match reloc.length {
                2 => crate::arch::write_i32(code, offset, value as i32),
                3 => crate::arch::write_i64(code, offset, value),
                _ => return Err(Error::Malformed(format!("unexpected UNSIGNED relocation length {}", reloc.length))),
            }
            Ok(())
        }
        other => Err(Error::UnexpectedRelocationType { offset: reloc.offset, r#type: other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::SymbolWithLoc;
    use crate::collaborator::test_support::MockCollaborator;
    use crate::mach::constants::S_THREAD_LOCAL_VARIABLES;
    use crate::mach::symbols::Nlist;

    fn collab_with_target(addr: u64) -> MockCollaborator {
        let mut collab = MockCollaborator::new();
        collab.symbols.push(Nlist { n_strx: 0, n_type: 0xe, n_sect: 1, n_desc: 0, n_value: addr });
        collab
    }

    #[test]
    fn resolves_branch26_to_direct_target() {
        let collab = collab_with_target(0x2010);
        let reloc = Relocation {
            offset: 0,
            target: SymbolWithLoc::new(0, None),
            addend: 0,
            subtractor: None,
            pcrel: true,
            length: 2,
            r#type: arm64_reloc::ARM64_RELOC_BRANCH26,
        };
        let mut code = 0x9400_0000u32.to_le_bytes();
        resolve(&reloc, &mut code, 0x2000, &collab, Arch::Aarch64, 0, None).unwrap();
        assert_eq!(u32::from_le_bytes(code), 0x9400_0004);
    }

    #[test]
    fn resolves_unsigned_pointer_with_addend() {
        let collab = collab_with_target(0x4000);
        let reloc = Relocation {
            offset: 0,
            target: SymbolWithLoc::new(0, None),
            addend: 8,
            subtractor: None,
            pcrel: false,
            length: 3,
            r#type: arm64_reloc::ARM64_RELOC_UNSIGNED,
        };
        let mut code = [0u8; 8];
        resolve(&reloc, &mut code, 0, &collab, Arch::Aarch64, 0, None).unwrap();
        assert_eq!(i64::from_le_bytes(code), 0x4008);
    }

    #[test]
    fn resolves_subtractor_difference() {
        let mut collab = MockCollaborator::new();
        collab.symbols.push(Nlist { n_strx: 0, n_type: 0xe, n_sect: 1, n_desc: 0, n_value: 0x3000 });
        collab.symbols.push(Nlist { n_strx: 0, n_type: 0xe, n_sect: 1, n_desc: 0, n_value: 0x1000 });
        let reloc = Relocation {
            offset: 0,
            target: SymbolWithLoc::new(0, None),
            addend: 0,
            subtractor: Some(SymbolWithLoc::new(1, None)),
            pcrel: false,
            length: 3,
            r#type: arm64_reloc::ARM64_RELOC_UNSIGNED,
        };
        let mut code = [0u8; 8];
        resolve(&reloc, &mut code, 0, &collab, Arch::Aarch64, 0, None).unwrap();
        assert_eq!(i64::from_le_bytes(code), 0x2000);
    }

    #[test]
    fn resolves_x86_64_branch_displacement() {
        let collab = collab_with_target(0x1100);
        let reloc = Relocation {
            offset: 0,
            target: SymbolWithLoc::new(0, None),
            addend: 0,
            subtractor: None,
            pcrel: true,
            length: 2,
            r#type: x86_64_reloc::X86_64_RELOC_BRANCH,
        };
        let mut code = [0u8; 4];
        resolve(&reloc, &mut code, 0x1000, &collab, Arch::X86_64, 0, None).unwrap();
        assert_eq!(i32::from_le_bytes(code), 0x100 - 4);
    }

    #[test]
    fn tlv_relocation_without_base_is_an_error() {
        let collab = collab_with_target(0x1000);
        let reloc = Relocation {
            offset: 0,
            target: SymbolWithLoc::new(0, None),
            addend: 0,
            subtractor: None,
            pcrel: false,
            length: 2,
            r#type: x86_64_reloc::X86_64_RELOC_TLV,
        };
        let mut code = [0u8; 8];
        let err = resolve(&reloc, &mut code, 0, &collab, Arch::X86_64, S_THREAD_LOCAL_VARIABLES, None).unwrap_err();
        assert!(matches!(err, Error::FailedToResolveRelocationTarget(_)));
    }

    #[test]
    fn x86_64_tlv_without_entry_rewrites_movq_to_leaq() {
        let collab = collab_with_target(0x1100);
        let reloc = Relocation {
            offset: 3,
            target: SymbolWithLoc::new(0, None),
            addend: 0,
            subtractor: None,
            pcrel: false,
            length: 2,
            r#type: x86_64_reloc::X86_64_RELOC_TLV,
        };
        let mut code = [0x48, 0x8B, 0x05, 0x00, 0x00, 0x00, 0x00];
        resolve(&reloc, &mut code, 0x1000, &collab, Arch::X86_64, 0, None).unwrap();
        assert_eq!(code[1], 0x8D, "movq should be rewritten to leaq when no TLV pointer entry exists");
        assert_eq!(i32::from_le_bytes(code[3..7].try_into().unwrap()), 0x100 - 7);
    }

    #[test]
    fn x86_64_tlv_with_entry_leaves_movq_and_targets_pointer_slot() {
        let mut collab = collab_with_target(0x1100);
        collab.tlv_table.insert(SymbolWithLoc::new(0, None), SymbolWithLoc::new(0, None));
        let reloc = Relocation {
            offset: 3,
            target: SymbolWithLoc::new(0, None),
            addend: 0,
            subtractor: None,
            pcrel: false,
            length: 2,
            r#type: x86_64_reloc::X86_64_RELOC_TLV,
        };
        let mut code = [0x48, 0x8B, 0x05, 0x00, 0x00, 0x00, 0x00];
        resolve(&reloc, &mut code, 0x1000, &collab, Arch::X86_64, 0, None).unwrap();
        assert_eq!(code[1], 0x8B, "movq must stay a movq when a TLV pointer entry exists");
        assert_eq!(i32::from_le_bytes(code[3..7].try_into().unwrap()), 0x100 - 7);
    }

    #[test]
    fn tlv_descriptor_pointer_subtracts_template_base() {
        let collab = collab_with_target(0x5040);
        let reloc = Relocation {
            offset: 0,
            target: SymbolWithLoc::new(0, None),
            addend: 0,
            subtractor: None,
            pcrel: false,
            length: 3,
            r#type: arm64_reloc::ARM64_RELOC_UNSIGNED,
        };
        let mut code = [0u8; 8];
        resolve(&reloc, &mut code, 0, &collab, Arch::Aarch64, S_THREAD_LOCAL_VARIABLES, Some(0x5000)).unwrap();
        assert_eq!(i64::from_le_bytes(code), 0x40);
    }
}
