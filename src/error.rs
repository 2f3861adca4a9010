//! Error types shared by every stage of the splitter/relocation pipeline.

use core::fmt;
use core::result;

use crate::arch::Arch;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Scroll(scroll::Error),
    /// The file's magic/filetype isn't a relocatable Mach-O object.
    NotObject { magic: u32 },
    UnsupportedCpuArchitecture(u32),
    MismatchedCpuArchitecture { expected: Arch, found: Arch },
    /// An `ARM64_RELOC_ADDEND`/`SUBTRACTOR` prefix wasn't followed by its
    /// required successor relocation.
    UnexpectedRelocationType { offset: u64, r#type: u8 },
    /// A GOT-class relocation has no GOT entry, or a TLV relocation has no
    /// thread-local initializer section to anchor against.
    FailedToResolveRelocationTarget(String),
    /// Address arithmetic exceeded the architecture's signed displacement
    /// envelope (32 bits for x86_64, 28 bits for aarch64 branches).
    Overflow(String),
    /// A branch displacement didn't fit in 28 bits; branch islands are not
    /// implemented.
    TodoImplementBranchIslands { source: u64, target: u64 },
    Malformed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Scroll(e) => write!(f, "parse error: {}", e),
            Error::NotObject { magic } => {
                write!(f, "not a relocatable Mach-O object (magic 0x{:x})", magic)
            }
            Error::UnsupportedCpuArchitecture(cputype) => {
                write!(f, "unsupported cpu architecture 0x{:x}", cputype)
            }
            Error::MismatchedCpuArchitecture { expected, found } => write!(
                f,
                "object architecture {:?} does not match target {:?}",
                found, expected
            ),
            Error::UnexpectedRelocationType { offset, r#type } => write!(
                f,
                "unexpected relocation type {:#x} at offset {:#x}",
                r#type, offset
            ),
            Error::FailedToResolveRelocationTarget(name) => {
                write!(f, "failed to resolve relocation target for {}", name)
            }
            Error::Overflow(what) => write!(f, "address overflow: {}", what),
            Error::TodoImplementBranchIslands { source, target } => write!(
                f,
                "branch displacement from {:#x} to {:#x} exceeds range; branch islands unimplemented",
                source, target
            ),
            Error::Malformed(msg) => write!(f, "malformed entity: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Scroll(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Self {
        Error::Scroll(err)
    }
}

pub type Result<T> = result::Result<T, Error>;
