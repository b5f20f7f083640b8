//! Instruction format and opcodes.

use core::fmt;

use num_enum::TryFromPrimitive;

use crate::error::CodecError;

/// Smallest value the signed 24-bit payload can hold.
pub const PAYLOAD_MIN: i32 = -(1 << 23);
/// Largest value the signed 24-bit payload can hold.
pub const PAYLOAD_MAX: i32 = (1 << 23) - 1;

/// 4-byte fixed instruction format.
///
/// The opcode sits in the low 8 bits, a signed 24-bit payload in the upper 24.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Instruction(u32);

impl Instruction {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Packs `op` with `payload`, rejecting payloads outside 24 bits.
    pub fn new(op: Opcode, payload: i32) -> Result<Self, CodecError> {
        if !(PAYLOAD_MIN..=PAYLOAD_MAX).contains(&payload) {
            return Err(CodecError::PayloadOutOfRange { op, payload });
        }
        Ok(Self::pack(op, payload))
    }

    #[inline]
    const fn pack(op: Opcode, payload: i32) -> Self {
        Self(((payload as u32) << 8) | op as u32)
    }

    #[inline]
    pub const fn op_byte(self) -> u8 {
        self.0 as u8
    }

    #[inline]
    pub fn opcode(self) -> Option<Opcode> {
        Opcode::from_u8(self.op_byte())
    }

    /// Sign-extended payload.
    #[inline]
    pub const fn payload(self) -> i32 {
        (self.0 as i32) >> 8
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    pub const fn nop() -> Self {
        Self::pack(Opcode::Nop, 0)
    }

    pub fn pop(n: i32) -> Result<Self, CodecError> {
        Self::new(Opcode::Pop, n)
    }

    pub fn ldk(idx: i32) -> Result<Self, CodecError> {
        Self::new(Opcode::Ldk, idx)
    }

    pub const fn nil() -> Self {
        Self::pack(Opcode::Nil, 0)
    }

    pub const fn ldb(value: bool) -> Self {
        Self::pack(Opcode::Ldb, value as i32)
    }

    pub fn lsi(value: i32) -> Result<Self, CodecError> {
        Self::new(Opcode::Lsi, value)
    }

    pub fn llv(idx: i32) -> Result<Self, CodecError> {
        Self::new(Opcode::Llv, idx)
    }

    pub fn slv(idx: i32) -> Result<Self, CodecError> {
        Self::new(Opcode::Slv, idx)
    }

    pub fn imp(idx: i32) -> Result<Self, CodecError> {
        Self::new(Opcode::Imp, idx)
    }

    pub fn cls(idx: i32) -> Result<Self, CodecError> {
        Self::new(Opcode::Cls, idx)
    }

    pub fn jmp(displacement: i32) -> Result<Self, CodecError> {
        Self::new(Opcode::Jmp, displacement)
    }

    pub fn jin(displacement: i32) -> Result<Self, CodecError> {
        Self::new(Opcode::Jin, displacement)
    }

    pub fn ivk(nargs: i32) -> Result<Self, CodecError> {
        Self::new(Opcode::Ivk, nargs)
    }

    pub const fn ret() -> Self {
        Self::pack(Opcode::Ret, 0)
    }

    pub const fn snd() -> Self {
        Self::pack(Opcode::Snd, 0)
    }

    pub fn rcv(displacement: i32) -> Result<Self, CodecError> {
        Self::new(Opcode::Rcv, displacement)
    }

    pub const fn rmv() -> Self {
        Self::pack(Opcode::Rmv, 0)
    }

    pub const fn rwd() -> Self {
        Self::pack(Opcode::Rwd, 0)
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode() {
            Some(op) if op.has_payload() => write!(f, "{} {}", op.mnemonic(), self.payload()),
            Some(op) => f.write_str(op.mnemonic()),
            None => write!(f, "??({:#04x}) {}", self.op_byte(), self.payload()),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Opcode numbering is part of the chunk format and never changes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum Opcode {
    // === STACK ===
    Nop = 0,
    Pop = 1,

    // === LOAD ===
    Ldk = 10,
    Nil = 11,
    Ldb = 12,
    Lsi = 13,
    Llv = 14,
    Slv = 15,
    Imp = 16,
    Cls = 17,

    // === JUMP ===
    Jmp = 30,
    Jin = 31,

    // === CALL ===
    Ivk = 40,
    Ret = 41,

    // === MESSAGE ===
    Snd = 50,
    Rcv = 51,
    Rmv = 52,
    Rwd = 53,
}

impl Opcode {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        Self::try_from(v).ok()
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Pop => "POP",
            Opcode::Ldk => "LDK",
            Opcode::Nil => "NIL",
            Opcode::Ldb => "LDB",
            Opcode::Lsi => "LSI",
            Opcode::Llv => "LLV",
            Opcode::Slv => "SLV",
            Opcode::Imp => "IMP",
            Opcode::Cls => "CLS",
            Opcode::Jmp => "JMP",
            Opcode::Jin => "JIN",
            Opcode::Ivk => "IVK",
            Opcode::Ret => "RET",
            Opcode::Snd => "SND",
            Opcode::Rcv => "RCV",
            Opcode::Rmv => "RMV",
            Opcode::Rwd => "RWD",
        }
    }

    /// Whether the payload carries an operand for this opcode.
    pub const fn has_payload(self) -> bool {
        !matches!(
            self,
            Opcode::Nop | Opcode::Nil | Opcode::Ret | Opcode::Snd | Opcode::Rmv | Opcode::Rwd
        )
    }
}
