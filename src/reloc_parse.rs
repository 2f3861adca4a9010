//! The relocation parser (spec §4.F): walks a section's raw
//! `RelocationInfo` entries and normalizes each into either a `Relocation`
//! an atom carries forward to the resolve phase, a rebase (the loader just
//! adds the final image slide), or a binding (the loader must look up a
//! symbol by name). Also synthesizes the GOT/stub/TLV atoms a target needs
//! the first time it's referenced (§4.F.2).
//!
//! This phase never touches addresses — only the resolve phase (§4.G) does,
//! once every atom in the link has a virtual address. Fusing the two was
//! tried and discarded (spec §9): GOT/stub/TLV creation can still be
//! in-flight when an earlier atom's relocation already needs to reference it.

use crate::arch::Arch;
use crate::atom::{Binding, Relocation, SymbolWithLoc};
use crate::collaborator::{LinkerCollaborator, MatchingSection};
use crate::error::{Error, Result};
use crate::mach::constants::{arm64_reloc, x86_64_reloc, N_SECT, SEG_DATA};
use crate::mach::load_command::Section64;
use crate::mach::relocation::RelocationInfo;
use crate::mach::symbols::Nlist;
use crate::object::Object;

/// One normalized relocation-table entry, still in atom-relative offset
/// space (not yet associated with a specific atom — that's the splitter's
/// job, §4.E.1).
#[derive(Debug, Clone, Copy)]
pub enum ParsedEntry {
    /// A relocation the resolve phase patches once VAs are known.
    Relocation(Relocation),
    /// The resolve phase still writes `relocation`'s target address into
    /// `code` exactly like a plain `Relocation` (spec invariant 1: the
    /// bytes at a rebase offset are the link-time absolute address); `offset`
    /// additionally tells the dynamic loader to slide that slot when the
    /// image loads somewhere other than its link-time base.
    Rebase { offset: u64, relocation: Relocation },
    /// The loader must bind this 8-byte pointer slot to `global_index`'s
    /// runtime address. The resolve phase never writes these bytes (spec
    /// invariant 2).
    Binding { offset: u64, global_index: u32 },
}

impl ParsedEntry {
    pub fn offset(&self) -> u64 {
        match self {
            ParsedEntry::Relocation(r) => r.offset,
            ParsedEntry::Rebase { offset, .. } => *offset,
            ParsedEntry::Binding { offset, .. } => *offset,
        }
    }
}

/// Parses every `RelocationInfo` in `infos` (already sliced to one atom's
/// address range, in `r_address` order) into `ParsedEntry`s, whose offsets
/// are atom-relative (`r_address - base_offset`, spec §4.F). `sect` is the
/// section the relocations apply to, needed for the §4.F.1 rebase/binding
/// decision and to resolve section-ordinal targets.
pub fn parse_section_relocations(
    infos: &[RelocationInfo],
    base_offset: u64,
    object: &mut Object,
    collaborator: &mut dyn LinkerCollaborator,
    sect: &Section64,
    code: &[u8],
    arch: Arch,
) -> Result<Vec<ParsedEntry>> {
    let mut out = Vec::with_capacity(infos.len());
    let mut i = 0;
    while i < infos.len() {
        let info = &infos[i];
        let r#type = info.r_type();
        match arch {
            Arch::Aarch64 if r#type == arm64_reloc::ARM64_RELOC_ADDEND => {
                let addend = info.r_symbolnum() as i64;
                let next = infos.get(i + 1).ok_or(Error::UnexpectedRelocationType {
                    offset: info.r_address as u64,
                    r#type,
                })?;
                let next_type = next.r_type();
                if next_type != arm64_reloc::ARM64_RELOC_PAGE21 && next_type != arm64_reloc::ARM64_RELOC_PAGEOFF12 {
                    return Err(Error::UnexpectedRelocationType { offset: info.r_address as u64, r#type });
                }
                let entry = parse_one(next, base_offset, object, collaborator, sect, code, arch, Some(addend))?;
                out.push(entry);
                i += 2;
                continue;
            }
            Arch::Aarch64 if r#type == arm64_reloc::ARM64_RELOC_SUBTRACTOR => {
                let minuend = infos.get(i + 1).ok_or(Error::UnexpectedRelocationType {
                    offset: info.r_address as u64,
                    r#type,
                })?;
                let entry = parse_subtractor_pair(info, minuend, base_offset, object, collaborator, sect, code, arch)?;
                out.push(entry);
                i += 2;
                continue;
            }
            Arch::X86_64 if r#type == x86_64_reloc::X86_64_RELOC_SUBTRACTOR => {
                let minuend = infos.get(i + 1).ok_or(Error::UnexpectedRelocationType {
                    offset: info.r_address as u64,
                    r#type,
                })?;
                let entry = parse_subtractor_pair(info, minuend, base_offset, object, collaborator, sect, code, arch)?;
                out.push(entry);
                i += 2;
                continue;
            }
            _ => {}
        }
        let entry = parse_one(info, base_offset, object, collaborator, sect, code, arch, None)?;
        out.push(entry);
        i += 1;
    }
    Ok(out)
}

/// Resolves `r_symbolnum`/`r_extern` to the symbol or synthesized section
/// symbol the relocation targets (spec §4.F "resolveTarget").
fn resolve_target(info: &RelocationInfo, object: &mut Object, collaborator: &dyn LinkerCollaborator) -> Result<SymbolWithLoc> {
    if info.r_extern() {
        return Ok(object.symbol_with_loc(info.r_symbolnum()));
    }
    let ordinal = info.r_symbolnum();
    if ordinal == 0 || ordinal as usize > u8::MAX as usize {
        return Err(Error::Malformed(format!("invalid local relocation section ordinal {}", ordinal)));
    }
    let ordinal = ordinal as u8;
    get_or_create_section_symbol(object, collaborator, ordinal)
}

/// Synthesizes (and caches, via `Object.sections_as_symbols`) an `Nlist`
/// standing for the first byte of section `ordinal`, for local relocations
/// that target a section rather than a named symbol.
pub(crate) fn get_or_create_section_symbol(object: &mut Object, collaborator: &dyn LinkerCollaborator, ordinal: u8) -> Result<SymbolWithLoc> {
    if let Some(&sym_index) = object.sections_as_symbols.get(&ordinal) {
        return Ok(SymbolWithLoc::new(sym_index, Some(object.file_id)));
    }
    let matched = collaborator
        .get_matching_section_from_ordinal(ordinal)
        .ok_or_else(|| Error::Malformed(format!("section ordinal {} has no output mapping", ordinal)))?;
    let section = collaborator.get_section(matched);
    let sym_index = object.symtab.len() as u32;
    object.symtab.push(Nlist {
        n_strx: 0,
        n_type: N_SECT,
        n_sect: ordinal,
        n_desc: 0,
        n_value: section.addr,
    });
    object.sections_as_symbols.insert(ordinal, sym_index);
    Ok(SymbolWithLoc::new(sym_index, Some(object.file_id)))
}

#[allow(clippy::too_many_arguments)]
fn parse_one(
    info: &RelocationInfo,
    base_offset: u64,
    object: &mut Object,
    collaborator: &mut dyn LinkerCollaborator,
    sect: &Section64,
    code: &[u8],
    arch: Arch,
    addend_prefix: Option<i64>,
) -> Result<ParsedEntry> {
    let offset = (info.r_address as u64).wrapping_sub(base_offset);
    let r#type = info.r_type();
    let target = resolve_target(info, object, collaborator)?;

    let addend = match addend_prefix {
        Some(a) => a,
        None => addend_from_code(code, info, arch)?,
    };

    if is_unsigned(arch, r#type) && info.r_length() == 3 {
        if let Some(decision) = rebase_or_bind_decision(collaborator, sect, target, offset, addend, info, object, r#type)? {
            return Ok(decision);
        }
    }

    let target = match arch {
        Arch::Aarch64 => ensure_synthetic_target(collaborator, target, r#type, Scope::Aarch64)?,
        Arch::X86_64 => ensure_synthetic_target(collaborator, target, r#type, Scope::X86_64)?,
    };

    Ok(ParsedEntry::Relocation(Relocation {
        offset,
        target,
        addend,
        subtractor: None,
        pcrel: info.r_pcrel(),
        length: info.r_length(),
        r#type,
    }))
}

/// Per the §4.F action table, most relocation kinds carry their addend as
/// the value already sitting in the code bytes at `r_address` rather than
/// in the relocation entry itself. arm64's page/offset/TLV/GOT-pointer
/// kinds encode their displacement in the instruction's immediate fields
/// instead and so never read the code buffer here.
fn addend_from_code(code: &[u8], info: &RelocationInfo, arch: Arch) -> Result<i64> {
    let reads_from_code = match arch {
        Arch::Aarch64 => info.r_type() == arm64_reloc::ARM64_RELOC_UNSIGNED,
        Arch::X86_64 => true,
    };
    if !reads_from_code {
        return Ok(0);
    }
    let offset = info.r_address as usize;
    match info.r_length() {
        0 => Ok(code.get(offset).copied().ok_or_else(|| oob_err(offset))? as i8 as i64),
        1 => {
            let bytes = code.get(offset..offset + 2).ok_or_else(|| oob_err(offset))?;
            Ok(i16::from_le_bytes([bytes[0], bytes[1]]) as i64)
        }
        2 => Ok(crate::arch::read_i32(code, offset)? as i64),
        3 => crate::arch::read_i64(code, offset),
        other => Err(Error::Malformed(format!("unexpected relocation length {}", other))),
    }
}

fn oob_err(offset: usize) -> Error {
    Error::Malformed(format!("relocation addend read at offset {} out of bounds", offset))
}

#[allow(clippy::too_many_arguments)]
fn parse_subtractor_pair(
    subtractor_info: &RelocationInfo,
    minuend_info: &RelocationInfo,
    base_offset: u64,
    object: &mut Object,
    collaborator: &mut dyn LinkerCollaborator,
    sect: &Section64,
    code: &[u8],
    arch: Arch,
) -> Result<ParsedEntry> {
    let minuend_type = minuend_info.r_type();
    if !is_unsigned(arch, minuend_type) {
        return Err(Error::UnexpectedRelocationType {
            offset: subtractor_info.r_address as u64,
            r#type: subtractor_info.r_type(),
        });
    }
    let subtractor = resolve_target(subtractor_info, object, collaborator)?;
    let entry = parse_one(minuend_info, base_offset, object, collaborator, sect, code, arch, None)?;
    match entry {
        ParsedEntry::Relocation(mut reloc) => {
            reloc.subtractor = Some(subtractor);
            Ok(ParsedEntry::Relocation(reloc))
        }
        // A subtracted UNSIGNED pointer is never a rebase/bind: it encodes a
        // section-to-section difference, so it always stays a relocation.
        _ => Ok(ParsedEntry::Relocation(Relocation {
            offset: (minuend_info.r_address as u64).wrapping_sub(base_offset),
            target: resolve_target(minuend_info, object, collaborator)?,
            addend: addend_from_code(code, minuend_info, arch)?,
            subtractor: Some(subtractor),
            pcrel: minuend_info.r_pcrel(),
            length: minuend_info.r_length(),
            r#type: minuend_type,
        })),
    }
}

fn is_unsigned(arch: Arch, r#type: u8) -> bool {
    match arch {
        Arch::Aarch64 => r#type == arm64_reloc::ARM64_RELOC_UNSIGNED,
        Arch::X86_64 => r#type == x86_64_reloc::X86_64_RELOC_UNSIGNED,
    }
}

/// §4.F.1: an 8-byte `UNSIGNED` pointer in a writable data section becomes
/// a rebase (if it targets something already defined) or a binding (if it
/// targets an undefined/external symbol that must be resolved by name at
/// load time), rather than a plain code relocation.
///
/// A rebase still needs its bytes patched with the target's link-time
/// address exactly like a relocation (spec invariant 1) — it just also
/// tells the loader to slide that slot, so it carries the normalized
/// `Relocation` the resolve phase applies alongside the rebase offset.
#[allow(clippy::too_many_arguments)]
fn rebase_or_bind_decision(
    collaborator: &dyn LinkerCollaborator,
    sect: &Section64,
    target: SymbolWithLoc,
    offset: u64,
    addend: i64,
    info: &RelocationInfo,
    object: &Object,
    r#type: u8,
) -> Result<Option<ParsedEntry>> {
    let in_data_segment = matches!(sect.segname().ok(), Some(SEG_DATA) | Some(crate::mach::constants::SEG_DATA_CONST));
    let is_data_like = in_data_segment
        && matches!(
            sect.section_type(),
            crate::mach::constants::S_LITERAL_POINTERS
                | crate::mach::constants::S_REGULAR
                | crate::mach::constants::S_MOD_INIT_FUNC_POINTERS
                | crate::mach::constants::S_MOD_TERM_FUNC_POINTERS
        );
    if !is_data_like {
        return Ok(None);
    }
    let rebase = |target: SymbolWithLoc| ParsedEntry::Rebase {
        offset,
        relocation: Relocation {
            offset,
            target,
            addend,
            subtractor: None,
            pcrel: info.r_pcrel(),
            length: info.r_length(),
            r#type,
        },
    };
    if !info.is_extern() {
        return Ok(Some(rebase(target)));
    }
    let nlist = object.symtab.get(target.sym_index as usize);
    let defined = nlist.map(|n| n.sect()).unwrap_or(false);
    if defined {
        Ok(Some(rebase(target)))
    } else {
        let name = object.symbol_name(nlist.ok_or_else(|| Error::Malformed("relocation target out of symtab range".into()))?);
        let global_index = collaborator
            .get_global_index(name)
            .ok_or_else(|| Error::FailedToResolveRelocationTarget(name.to_string()))?;
        Ok(Some(ParsedEntry::Binding { offset, global_index }))
    }
}

enum Scope {
    Aarch64,
    X86_64,
}

/// For relocation types that address a GOT/stub/TLV slot rather than the
/// symbol's own atom, makes sure that slot exists (creating it on first
/// reference) and redirects `target` to it (spec §4.F.2).
fn ensure_synthetic_target(
    collaborator: &mut dyn LinkerCollaborator,
    target: SymbolWithLoc,
    r#type: u8,
    scope: Scope,
) -> Result<SymbolWithLoc> {
    let needs_got = match scope {
        Scope::Aarch64 => matches!(
            r#type,
            t if t == arm64_reloc::ARM64_RELOC_GOT_LOAD_PAGE21
                || t == arm64_reloc::ARM64_RELOC_GOT_LOAD_PAGEOFF12
                || t == arm64_reloc::ARM64_RELOC_POINTER_TO_GOT
        ),
        Scope::X86_64 => matches!(r#type, t if t == x86_64_reloc::X86_64_RELOC_GOT || t == x86_64_reloc::X86_64_RELOC_GOT_LOAD),
    };
    if needs_got {
        return Ok(ensure_got_entry(collaborator, target));
    }
    let needs_stub = matches!(scope, Scope::Aarch64) && r#type == arm64_reloc::ARM64_RELOC_BRANCH26
        || matches!(scope, Scope::X86_64) && r#type == x86_64_reloc::X86_64_RELOC_BRANCH;
    if needs_stub {
        // Direct, already-defined branch targets never need a stub; only
        // undefined (imported) symbols get trampolined through one.
        if collaborator.get_symbol(target).undf() {
            return Ok(ensure_stub_entry(collaborator, target));
        }
        return Ok(target);
    }
    let needs_tlv = matches!(scope, Scope::Aarch64)
        && (r#type == arm64_reloc::ARM64_RELOC_TLVP_LOAD_PAGE21 || r#type == arm64_reloc::ARM64_RELOC_TLVP_LOAD_PAGEOFF12)
        || matches!(scope, Scope::X86_64) && r#type == x86_64_reloc::X86_64_RELOC_TLV;
    if needs_tlv {
        return Ok(ensure_tlv_ptr_entry(collaborator, target));
    }
    Ok(target)
}

fn ensure_got_entry(collaborator: &mut dyn LinkerCollaborator, target: SymbolWithLoc) -> SymbolWithLoc {
    if let Some(entry) = collaborator.got_entry(target) {
        return entry;
    }
    collaborator.allocate_got_entry(target);
    collaborator.create_got_atom(target)
}

/// Creates the stub-helper/lazy-pointer/stub triple in the order spec
/// §4.F.2 requires: helper first (stub references its sym_index), then
/// lazy pointer (references helper's sym_index), then stub (references
/// the lazy pointer's sym_index). Idempotent: a second call for the same
/// `target` returns the cached stub without creating anything.
fn ensure_stub_entry(collaborator: &mut dyn LinkerCollaborator, target: SymbolWithLoc) -> SymbolWithLoc {
    if let Some(entry) = collaborator.stub_entry(target) {
        return entry;
    }
    collaborator.allocate_stub_entry(target);
    let helper = collaborator.create_stub_helper_atom();
    let laptr = collaborator.create_lazy_pointer_atom(helper, target);
    collaborator.create_stub_atom(laptr, target)
}

fn ensure_tlv_ptr_entry(collaborator: &mut dyn LinkerCollaborator, target: SymbolWithLoc) -> SymbolWithLoc {
    if let Some(entry) = collaborator.tlv_ptr_entry(target) {
        return entry;
    }
    collaborator.allocate_tlv_ptr_entry(target);
    collaborator.create_tlv_ptr_atom(target)
}

#[allow(dead_code)]
fn section_matches(collaborator: &dyn LinkerCollaborator, sect: &Section64) -> Option<MatchingSection> {
    collaborator.get_matching_section(sect)
}

/// Used by bindings to attach a `Binding` to the owning atom at split time.
pub fn binding_from(offset: u64, global_index: u32) -> Binding {
    Binding { global_index, offset }
}
