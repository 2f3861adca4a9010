//! Load commands this engine actually consumes: segments/sections, the
//! symbol table, the dysymtab partition, `BUILD_VERSION`, and
//! `DATA_IN_CODE`. Every other command is parsed only as far as its
//! generic header so its size can be skipped (spec §7 — "unknown load
//! commands are logged and ignored").

use std::fmt::{self, Display};

use scroll::{ctx, Endian, Pread};

use crate::error::{self, Error};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread, Pwrite, SizeWith)]
pub struct LoadCommandHeader {
    pub cmd: u32,
    pub cmdsize: u32,
}

impl Display for LoadCommandHeader {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "LoadCommandHeader: {} size: {}", cmd_to_str(self.cmd), self.cmdsize)
    }
}

pub const SIZEOF_LOAD_COMMAND: usize = 8;

/// for 64-bit architectures
#[repr(C)]
#[derive(Debug, Clone, Copy, Pread, Pwrite, SizeWith)]
pub struct Section64 {
    /// name of this section
    pub sectname: [u8; 16],
    /// segment this section goes in
    pub segname: [u8; 16],
    /// memory address of this section
    pub addr: u64,
    /// size in bytes of this section
    pub size: u64,
    /// file offset of this section
    pub offset: u32,
    /// section alignment (power of 2)
    pub align: u32,
    /// file offset of relocation entries
    pub reloff: u32,
    /// number of relocation entries
    pub nreloc: u32,
    /// flags (section type and attributes)
    pub flags: u32,
    /// reserved (for offset or index)
    pub reserved1: u32,
    /// reserved (for count or sizeof)
    pub reserved2: u32,
    /// reserved
    pub reserved3: u32,
}

pub const SIZEOF_SECTION_64: usize = 80;

impl Section64 {
    pub fn segname(&self) -> error::Result<&str> {
        Ok(self.segname.pread::<&str>(0)?)
    }

    pub fn sectname(&self) -> error::Result<&str> {
        Ok(self.sectname.pread::<&str>(0)?)
    }

    pub fn section_type(&self) -> u32 {
        self.flags & crate::mach::constants::SECTION_TYPE
    }

    pub fn is_zerofill(&self) -> bool {
        let ty = self.section_type();
        ty == crate::mach::constants::S_ZEROFILL || ty == crate::mach::constants::S_THREAD_LOCAL_ZEROFILL
    }

    pub fn is_dont_dead_strip(&self) -> bool {
        self.flags & crate::mach::constants::S_ATTR_NO_DEAD_STRIP != 0
    }

    pub fn is_dont_dead_strip_if_references_live(&self) -> bool {
        self.flags & crate::mach::constants::S_ATTR_LIVE_SUPPORT != 0
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread, Pwrite, SizeWith)]
pub struct SegmentCommand64 {
    pub cmd: u32,
    pub cmdsize: u32,
    pub segname: [u8; 16],
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: u32,
    pub initprot: u32,
    pub nsects: u32,
    pub flags: u32,
}

pub const SIZEOF_SEGMENT_COMMAND_64: usize = 72;

impl SegmentCommand64 {
    pub fn name(&self) -> error::Result<&str> {
        Ok(self.segname.pread::<&str>(0)?)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread, Pwrite, SizeWith)]
pub struct SymtabCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub symoff: u32,
    pub nsyms: u32,
    pub stroff: u32,
    pub strsize: u32,
}

pub const SIZEOF_SYMTAB_COMMAND: usize = 24;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread, Pwrite, SizeWith)]
pub struct DysymtabCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub ilocalsym: u32,
    pub nlocalsym: u32,
    pub iextdefsym: u32,
    pub nextdefsym: u32,
    pub iundefsym: u32,
    pub nundefsym: u32,
    pub tocoff: u32,
    pub ntoc: u32,
    pub modtaboff: u32,
    pub nmodtab: u32,
    pub extrefsymoff: u32,
    pub nextrefsyms: u32,
    pub indirectsymoff: u32,
    pub nindirectsyms: u32,
    pub extreloff: u32,
    pub nextrel: u32,
    pub locreloff: u32,
    pub nlocrel: u32,
}

pub const SIZEOF_DYSYMTAB_COMMAND: usize = 80;

/// The `LC_DATA_IN_CODE` (and other `__LINKEDIT` blob) commands all share
/// this shape: an offset/size pair into `__LINKEDIT`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pread, Pwrite, SizeWith)]
pub struct LinkeditDataCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub dataoff: u32,
    pub datasize: u32,
}

pub const SIZEOF_LINKEDIT_DATA_COMMAND: usize = 16;

/// `LC_BUILD_VERSION`. The trailing `ntools` build-tool-version records are
/// not read; the engine only exposes platform/minos/sdk (SPEC_FULL §B.1).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pread, Pwrite, SizeWith)]
pub struct BuildVersionCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub platform: u32,
    pub minos: u32,
    pub sdk: u32,
    pub ntools: u32,
}

pub const SIZEOF_BUILD_VERSION_COMMAND: usize = 24;

/// `LC_VERSION_MIN_MACOSX`/`LC_VERSION_MIN_IPHONEOS`: the legacy
/// predecessor to `LC_BUILD_VERSION`. Platform isn't carried in the
/// payload, only implied by which of the two command constants `cmd` is.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pread, Pwrite, SizeWith)]
pub struct VersionMinCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub version: u32,
    pub sdk: u32,
}

pub const SIZEOF_VERSION_MIN_COMMAND: usize = 16;

pub const PLATFORM_MACOS: u32 = 1;
pub const PLATFORM_IOS: u32 = 2;

/// A single data-in-code range within `__text` (spec §3 `dices`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pread, Pwrite, SizeWith)]
pub struct DataInCodeEntry {
    /// offset from the start of the `__TEXT` segment
    pub offset: u32,
    /// number of bytes in the data range
    pub length: u16,
    /// a `DICE_KIND_*` value
    pub kind: u16,
}

pub const SIZEOF_DATA_IN_CODE_ENTRY: usize = 8;

///////////////////////////////////////
// Load command numbers
///////////////////////////////////////

pub const LC_SEGMENT: u32 = 0x1;
pub const LC_SYMTAB: u32 = 0x2;
pub const LC_THREAD: u32 = 0x4;
pub const LC_UNIXTHREAD: u32 = 0x5;
pub const LC_DYSYMTAB: u32 = 0xb;
pub const LC_LOAD_DYLIB: u32 = 0xc;
pub const LC_ID_DYLIB: u32 = 0xd;
pub const LC_SEGMENT_64: u32 = 0x19;
pub const LC_UUID: u32 = 0x1b;
pub const LC_CODE_SIGNATURE: u32 = 0x1d;
pub const LC_VERSION_MIN_MACOSX: u32 = 0x24;
pub const LC_VERSION_MIN_IPHONEOS: u32 = 0x25;
pub const LC_FUNCTION_STARTS: u32 = 0x26;
pub const LC_DATA_IN_CODE: u32 = 0x29;
pub const LC_SOURCE_VERSION: u32 = 0x2A;
pub const LC_BUILD_VERSION: u32 = 0x32;

pub fn cmd_to_str(cmd: u32) -> &'static str {
    match cmd {
        LC_SEGMENT => "LC_SEGMENT",
        LC_SYMTAB => "LC_SYMTAB",
        LC_THREAD => "LC_THREAD",
        LC_UNIXTHREAD => "LC_UNIXTHREAD",
        LC_DYSYMTAB => "LC_DYSYMTAB",
        LC_LOAD_DYLIB => "LC_LOAD_DYLIB",
        LC_ID_DYLIB => "LC_ID_DYLIB",
        LC_SEGMENT_64 => "LC_SEGMENT_64",
        LC_UUID => "LC_UUID",
        LC_CODE_SIGNATURE => "LC_CODE_SIGNATURE",
        LC_VERSION_MIN_MACOSX => "LC_VERSION_MIN_MACOSX",
        LC_VERSION_MIN_IPHONEOS => "LC_VERSION_MIN_IPHONEOS",
        LC_FUNCTION_STARTS => "LC_FUNCTION_STARTS",
        LC_DATA_IN_CODE => "LC_DATA_IN_CODE",
        LC_SOURCE_VERSION => "LC_SOURCE_VERSION",
        LC_BUILD_VERSION => "LC_BUILD_VERSION",
        _ => "LC_UNKNOWN",
    }
}

///////////////////////////////////////////
// Typesafe command variants
///////////////////////////////////////////

#[derive(Debug)]
pub enum CommandVariant {
    Segment64(SegmentCommand64),
    Symtab(SymtabCommand),
    Dysymtab(DysymtabCommand),
    BuildVersion(BuildVersionCommand),
    VersionMin(VersionMinCommand),
    DataInCode(LinkeditDataCommand),
    Unimplemented(LoadCommandHeader),
}

impl<'a> ctx::TryFromCtx<'a, (usize, ctx::DefaultCtx)> for CommandVariant {
    type Error = Error;
    fn try_from_ctx(buffer: &'a [u8], (offset, le): (usize, Endian)) -> Result<Self, Error> {
        use self::CommandVariant::*;
        let lc = buffer.pread_with::<LoadCommandHeader>(offset, le)?;
        let size = lc.cmdsize as usize;
        if offset + size > buffer.len() {
            return Err(Error::Malformed(format!(
                "{} has size larger than remainder of binary: {:?}",
                &lc,
                buffer.len()
            )));
        }
        match lc.cmd {
            LC_SEGMENT_64 => Ok(Segment64(buffer.pread_with(offset, le)?)),
            LC_SYMTAB => Ok(Symtab(buffer.pread_with(offset, le)?)),
            LC_DYSYMTAB => Ok(Dysymtab(buffer.pread_with(offset, le)?)),
            LC_BUILD_VERSION => Ok(BuildVersion(buffer.pread_with(offset, le)?)),
            LC_VERSION_MIN_MACOSX | LC_VERSION_MIN_IPHONEOS => Ok(VersionMin(buffer.pread_with(offset, le)?)),
            LC_DATA_IN_CODE => Ok(DataInCode(buffer.pread_with(offset, le)?)),
            _ => Ok(Unimplemented(lc)),
        }
    }
}

impl CommandVariant {
    pub fn cmdsize(&self) -> usize {
        use self::CommandVariant::*;
        (match *self {
            Segment64(comm) => comm.cmdsize,
            Symtab(comm) => comm.cmdsize,
            Dysymtab(comm) => comm.cmdsize,
            BuildVersion(comm) => comm.cmdsize,
            VersionMin(comm) => comm.cmdsize,
            DataInCode(comm) => comm.cmdsize,
            Unimplemented(comm) => comm.cmdsize,
        }) as usize
    }

    pub fn cmd(&self) -> u32 {
        use self::CommandVariant::*;
        match *self {
            Segment64(comm) => comm.cmd,
            Symtab(comm) => comm.cmd,
            Dysymtab(comm) => comm.cmd,
            BuildVersion(comm) => comm.cmd,
            VersionMin(comm) => comm.cmd,
            DataInCode(comm) => comm.cmd,
            Unimplemented(comm) => comm.cmd,
        }
    }
}

#[derive(Debug)]
pub struct LoadCommand {
    pub offset: usize,
    pub command: CommandVariant,
}

impl LoadCommand {
    pub fn parse(buffer: &[u8], offset: &mut usize, le: scroll::Endian) -> error::Result<Self> {
        let start = *offset;
        let command = buffer.pread_with::<CommandVariant>(start, le)?;
        let size = command.cmdsize();
        *offset = start + size;
        Ok(LoadCommand { offset: start, command })
    }
}
