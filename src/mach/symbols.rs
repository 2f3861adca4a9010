//! "Nlist" style symbols — beware, like most symbol tables in most binary
//! formats, they are strippable and not a permanent naming scheme.
//!
//! 64-bit only: `nlist_64` is the sole on-disk shape this engine parses.

use core::fmt::{self, Debug};

use scroll::ctx::{self, SizeWith};
use scroll::Pread;

use crate::error::{self, Result};
use crate::mach::constants::{N_EXT, N_SECT, N_STAB, N_TYPE, N_UNDF};
use crate::mach::load_command::SymtabCommand;

#[repr(C)]
#[derive(Clone, Copy, Pread, Pwrite, SizeWith)]
pub struct Nlist {
    /// index into the string table
    pub n_strx: u32,
    /// type flag, see below
    pub n_type: u8,
    /// section number, or `NO_SECT` (0)
    pub n_sect: u8,
    /// see `<mach-o/stab.h>`
    pub n_desc: u16,
    /// value of this symbol (or stab offset)
    pub n_value: u64,
}

pub const SIZEOF_NLIST_64: usize = 16;
pub const NO_SECT: u8 = 0;

impl Nlist {
    /// `true` if this entry is a debugger stab, not a real symbol.
    pub fn is_stab(&self) -> bool {
        self.n_type & N_STAB != 0
    }

    /// `true` if the symbol is defined in a section (`n_sect` indexes
    /// `sections_as_symbols`), as opposed to undefined/absolute/indirect.
    pub fn sect(&self) -> bool {
        self.n_type & N_TYPE == N_SECT
    }

    /// `true` if the symbol has external (global) linkage.
    pub fn ext(&self) -> bool {
        self.n_type & N_EXT != 0
    }

    /// `true` if the symbol is undefined (imported from elsewhere).
    pub fn undf(&self) -> bool {
        self.n_type & N_TYPE == N_UNDF
    }
}

impl Debug for Nlist {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "strx: {:04} type: {:#02x} sect: {:#x} desc: {:#03x} value: {:#x}",
            self.n_strx, self.n_type, self.n_sect, self.n_desc, self.n_value,
        )
    }
}

/// A zero-copy nlist symbol table, including its accompanying string table.
pub struct Symbols<'a> {
    data: &'a [u8],
    start: usize,
    pub nsyms: usize,
    strtab: usize,
}

impl<'a> Symbols<'a> {
    pub fn parse(bytes: &'a [u8], symtab: &SymtabCommand) -> Result<Symbols<'a>> {
        Ok(Symbols {
            data: bytes,
            start: symtab.symoff as usize,
            nsyms: symtab.nsyms as usize,
            strtab: symtab.stroff as usize,
        })
    }

    /// Parses a single `Nlist` symbol from the binary, with its accompanying name.
    pub fn get(&self, index: usize) -> error::Result<(&'a str, Nlist)> {
        let sym: Nlist = self.data.pread_with(self.start + index * SIZEOF_NLIST_64, scroll::LE)?;
        let name = self.data.pread(self.strtab + sym.n_strx as usize)?;
        Ok((name, sym))
    }

    pub fn iter(&self) -> SymbolsIter<'a, '_> {
        SymbolsIter { symbols: self, index: 0 }
    }
}

pub struct SymbolsIter<'a, 'b> {
    symbols: &'b Symbols<'a>,
    index: usize,
}

impl<'a, 'b> Iterator for SymbolsIter<'a, 'b> {
    type Item = error::Result<(&'a str, Nlist)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.symbols.nsyms {
            return None;
        }
        let item = self.symbols.get(self.index);
        self.index += 1;
        Some(item)
    }
}

impl<'a> Debug for Symbols<'a> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        writeln!(fmt, "Symbols: {{")?;
        for i in 0..self.nsyms {
            match self.get(i) {
                Ok((name, nlist)) => {
                    writeln!(
                        fmt,
                        "{: >10x} {} sect: {:#x} type: {:#02x} desc: {:#03x}",
                        nlist.n_value, name, nlist.n_sect, nlist.n_type, nlist.n_desc
                    )?;
                }
                Err(error) => {
                    writeln!(fmt, "  Bad symbol, index: {}, sym: {:?}", i, error)?;
                }
            }
        }
        writeln!(fmt, "}}")
    }
}
