//! Process identifiers.
//!
//! A pid packs a process-table index into its top `idx_bits` and a slot
//! generation into the next `gen_bits`. The generation changes every time a
//! slot is reused, so a pid held after its process died stops matching.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(u32);

impl Pid {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{:#010x}>", self.0)
    }
}

/// Bit split between index and generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidLayout {
    idx_bits: u8,
    gen_bits: u8,
}

impl PidLayout {
    /// Returns `None` unless both widths are at least 1 and sum to at most 32.
    pub const fn new(idx_bits: u8, gen_bits: u8) -> Option<Self> {
        if idx_bits == 0 || gen_bits == 0 || idx_bits as u32 + gen_bits as u32 > 32 {
            return None;
        }
        Some(Self { idx_bits, gen_bits })
    }

    #[inline]
    pub const fn idx_bits(&self) -> u8 {
        self.idx_bits
    }

    #[inline]
    pub const fn gen_bits(&self) -> u8 {
        self.gen_bits
    }

    #[inline]
    const fn idx_shift(&self) -> u32 {
        32 - self.idx_bits as u32
    }

    #[inline]
    const fn gen_shift(&self) -> u32 {
        32 - self.idx_bits as u32 - self.gen_bits as u32
    }

    #[inline]
    const fn idx_mask(&self) -> u32 {
        u32::MAX >> (32 - self.idx_bits as u32)
    }

    #[inline]
    const fn gen_mask(&self) -> u32 {
        u32::MAX >> (32 - self.gen_bits as u32)
    }

    /// Number of process slots this layout can address.
    pub const fn max_processes(&self) -> usize {
        1usize << self.idx_bits
    }

    pub const fn make(&self, idx: u32, gen: u32) -> Pid {
        Pid(((idx & self.idx_mask()) << self.idx_shift())
            | ((gen & self.gen_mask()) << self.gen_shift()))
    }

    #[inline]
    pub const fn index(&self, pid: Pid) -> u32 {
        (pid.0 >> self.idx_shift()) & self.idx_mask()
    }

    #[inline]
    pub const fn generation(&self, pid: Pid) -> u32 {
        (pid.0 >> self.gen_shift()) & self.gen_mask()
    }

    /// Generation that follows `gen`, wrapping within `gen_bits`.
    #[inline]
    pub const fn next_generation(&self, gen: u32) -> u32 {
        gen.wrapping_add(1) & self.gen_mask()
    }
}

impl Default for PidLayout {
    fn default() -> Self {
        Self {
            idx_bits: 16,
            gen_bits: 16,
        }
    }
}
