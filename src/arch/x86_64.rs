//! x86_64 has no fixed-width instruction forms to decode — every relocation
//! class resolves to a plain signed displacement written over 4 or 8 bytes
//! (spec §4.G). The only instruction-aware step is `X86_64_RELOC_TLV`, which
//! rewrites a `movq` opcode to `leaq` when no TLV pointer entry backs the
//! access.

use crate::error::Result;

/// `movq` (opcode `0x8B`) reads a GOT/TLV slot; `leaq` (opcode `0x8D`)
/// computes the address directly. The ModRM/SIB/displacement bytes are
/// unchanged, so only the opcode byte two positions before the relocation's
/// operand needs rewriting.
pub fn rewrite_movq_to_leaq(code: &mut [u8], reloc_offset: usize) -> Result<()> {
    if reloc_offset < 2 {
        return Err(crate::error::Error::Malformed(
            "X86_64_RELOC_TLV relocation offset too small to carry a movq opcode".into(),
        ));
    }
    code[reloc_offset - 2] = 0x8D;
    Ok(())
}

/// `BRANCH` / `GOT` / `GOT_LOAD`: `target - (source + 4) + addend`, the
/// displacement a `call`/`jmp rel32` or RIP-relative `mov` encodes. `source`
/// is the address of the relocation's 4-byte field itself, so the `+4`
/// accounts for the instruction's own length following that field.
pub fn branch_or_got_displacement(source: u64, target: u64, addend: i64) -> i64 {
    (target as i64) - (source as i64 + 4) + addend
}

/// `SIGNED` / `SIGNED_1` / `SIGNED_2` / `SIGNED_4`: like the plain signed
/// form but with an extra `correction` byte count (0, 1, 2, or 4) folded
/// into the base, covering instructions whose displacement field doesn't
/// sit at the very end (e.g. an immediate operand follows it).
pub fn signed_displacement(source: u64, target: u64, addend: i64, correction: u64) -> i64 {
    (target as i64 + addend) - (source as i64 + correction as i64 + 4)
}
