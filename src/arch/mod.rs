//! Architecture selection and the per-architecture encoding rules used by
//! the relocation resolver (spec §4.G).

pub mod aarch64;
pub mod x86_64;

use crate::mach::constants::cputype;

/// The two architectures this engine targets. Both are pure 64-bit Mach-O
/// (`MH_MAGIC_64`); there is no 32-bit support, matching spec §1's scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Aarch64,
    X86_64,
}

impl Arch {
    pub fn from_cputype(raw: u32) -> Option<Arch> {
        match raw {
            cputype::CPU_TYPE_ARM64 => Some(Arch::Aarch64),
            cputype::CPU_TYPE_X86_64 => Some(Arch::X86_64),
            _ => None,
        }
    }
}

/// Reads a little-endian `i32` out of `code` at `offset`, the "addend read
/// from code" step named throughout spec §4.F's per-type action table.
pub fn read_i32(code: &[u8], offset: usize) -> crate::error::Result<i32> {
    let bytes: [u8; 4] = code
        .get(offset..offset + 4)
        .ok_or_else(|| crate::error::Error::Malformed(format!("relocation offset {} out of range", offset)))?
        .try_into()
        .unwrap();
    Ok(i32::from_le_bytes(bytes))
}

pub fn read_i64(code: &[u8], offset: usize) -> crate::error::Result<i64> {
    let bytes: [u8; 8] = code
        .get(offset..offset + 8)
        .ok_or_else(|| crate::error::Error::Malformed(format!("relocation offset {} out of range", offset)))?
        .try_into()
        .unwrap();
    Ok(i64::from_le_bytes(bytes))
}

pub fn write_i32(code: &mut [u8], offset: usize, value: i32) {
    code[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn write_i64(code: &mut [u8], offset: usize, value: i64) {
    code[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub fn write_u32(code: &mut [u8], offset: usize, value: u32) {
    code[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn read_u32(code: &[u8], offset: usize) -> crate::error::Result<u32> {
    let bytes: [u8; 4] = code
        .get(offset..offset + 4)
        .ok_or_else(|| crate::error::Error::Malformed(format!("instruction offset {} out of range", offset)))?
        .try_into()
        .unwrap();
    Ok(u32::from_le_bytes(bytes))
}
