//! The atom data model (spec §3, §4.D): the smallest independently
//! relocatable unit of code or data, plus the bookkeeping a splitter and
//! relocation resolver hang off it.

/// Identifies a specific symbol table entry: either an object's own symtab
/// (`file = Some(k)`) or the linker's synthetic table (`file = None`).
/// Equality is structural; this is the stable key atoms and relocations use
/// to reference each other across objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolWithLoc {
    pub sym_index: u32,
    pub file: Option<u32>,
}

impl SymbolWithLoc {
    pub fn new(sym_index: u32, file: Option<u32>) -> Self {
        SymbolWithLoc { sym_index, file }
    }

    /// A synthetic (linker-owned) symbol reference.
    pub fn synthetic(sym_index: u32) -> Self {
        SymbolWithLoc { sym_index, file: None }
    }
}

/// What kind of stab record a contained symbol should emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stab {
    /// Emits `N_BNSYM`/`N_FUN`/`N_ENSYM`; carries the function's byte size.
    Function(u64),
    /// Emits `N_STSYM`.
    Static,
    /// Emits `N_GSYM`.
    Global,
}

/// An additional symbol whose address falls inside an atom's range but
/// which isn't the atom's defining symbol.
#[derive(Debug, Clone, Copy)]
pub struct Contained {
    pub sym_index: u32,
    pub offset: u64,
    pub stab: Option<Stab>,
}

/// A normalized relocation record, resolved from raw `relocation_info`
/// during parse (spec §4.F) and consumed by the resolver (spec §4.G).
#[derive(Debug, Clone, Copy)]
pub struct Relocation {
    pub offset: u64,
    pub target: SymbolWithLoc,
    pub addend: i64,
    pub subtractor: Option<SymbolWithLoc>,
    pub pcrel: bool,
    /// width is `2^length` bytes: 2 => 4 bytes, 3 => 8 bytes.
    pub length: u8,
    /// raw Mach-O relocation type byte; architecture-dependent meaning.
    pub r#type: u8,
}

impl Relocation {
    /// Byte width of the field this relocation patches.
    pub fn width(&self) -> u64 {
        1u64 << self.length
    }
}

/// A loader-rewritten slot: `{global_index, offset_within_atom}`. The
/// dynamic loader writes the resolved address of `global_index` at `offset`
/// (the lazy variant is resolved through `dyld_stub_binder` on first call).
#[derive(Debug, Clone, Copy)]
pub struct Binding {
    pub global_index: u32,
    pub offset: u64,
}

/// A data-in-code entry, atom-relative (offsets normalized against the
/// atom's own start during split, spec §4.E.1).
#[derive(Debug, Clone, Copy)]
pub struct DataInCode {
    pub offset: u32,
    pub length: u16,
    pub kind: u16,
}

/// A contiguous run of bytes relocated as a unit.
#[derive(Debug, Clone)]
pub struct Atom {
    /// the atom's defining symbol
    pub sym_index: u32,
    pub file: Option<u32>,
    pub code: Vec<u8>,
    pub size: u64,
    /// power-of-two exponent; `2^alignment` is the byte alignment.
    pub alignment: u32,
    pub contained: Vec<Contained>,
    pub relocs: Vec<Relocation>,
    /// byte offsets the dynamic loader slides when the run-time base
    /// differs from the link-time base.
    pub rebases: Vec<u64>,
    pub bindings: Vec<Binding>,
    pub lazy_bindings: Vec<Binding>,
    pub dices: Vec<DataInCode>,
    pub next: Option<SymbolWithLoc>,
    pub prev: Option<SymbolWithLoc>,
    /// opaque DWARF payload; not interpreted by this engine beyond stab
    /// generation at split time.
    pub dbg_info_atom: Option<Vec<u8>>,
    /// incremental-update marker, consumed by the external writer.
    pub dirty: bool,
}

impl Atom {
    /// `createEmptyAtom` (spec §4.D): allocates `code` pre-sized to
    /// `aligned_size` (zeroed; callers fill it from section bytes, or leave
    /// it zero for zero-fill sections).
    pub fn empty(sym_index: u32, file: Option<u32>, aligned_size: u64, alignment: u32) -> Atom {
        Atom {
            sym_index,
            file,
            code: vec![0u8; aligned_size as usize],
            size: aligned_size,
            alignment,
            contained: Vec::new(),
            relocs: Vec::new(),
            rebases: Vec::new(),
            bindings: Vec::new(),
            lazy_bindings: Vec::new(),
            dices: Vec::new(),
            next: None,
            prev: None,
            dbg_info_atom: None,
            dirty: true,
        }
    }

    /// The canonical empty atom has no defining symbol.
    pub fn is_canonical_empty(&self) -> bool {
        self.sym_index == 0
    }

    pub fn symbol_with_loc(&self) -> SymbolWithLoc {
        SymbolWithLoc::new(self.sym_index, self.file)
    }
}

/// `capacity(atom)` (spec §4.D): distance from this atom's start VA to the
/// next atom's start VA in the same output section, or the full remaining
/// address space if this is the last atom.
pub fn capacity(start_va: u64, next_atom_start_va: Option<u64>) -> u64 {
    match next_atom_start_va {
        Some(next) => next.saturating_sub(start_va),
        None => u64::MAX - start_va,
    }
}

/// `freeListEligible(atom)` (spec §4.D): true iff the atom's capacity
/// exceeds its ideally-padded size plus the layout's minimum text capacity.
/// `pad_to_ideal` and `min_text_capacity` are supplied by the external
/// layout component; this module only exposes the predicate.
pub fn free_list_eligible(capacity: u64, pad_to_ideal: u64, min_text_capacity: u64) -> bool {
    capacity > pad_to_ideal + min_text_capacity
}
