//! Function prototypes and chunk headers.

use crate::error::CodecError;
use crate::instruction::Instruction;

/// Every chunk starts with these four bytes ("Any\0").
pub const SIGNATURE: [u8; 4] = [0x41, 0x6E, 0x79, 0x00];
pub const VERSION_MAJOR: u8 = 0;
pub const VERSION_MINOR: u8 = 1;
/// Encoded size of [`ChunkHeader`].
pub const HEADER_SIZE: usize = 12;

/// Constant pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Integer(i64),
    String(String),
    Real(f64),
}

impl Constant {
    /// Tag stored in the chunk for this kind of constant.
    pub const fn tag(&self) -> u32 {
        match self {
            Constant::Integer(_) => 0,
            Constant::String(_) => 1,
            Constant::Real(_) => 2,
        }
    }
}

/// Symbolic reference to a function exported by another module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Import {
    pub module: String,
    pub name: String,
}

impl Import {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

/// A compiled function. Prototypes nest: the module prototype owns the
/// module's functions, each of which may own further nested ones.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Prototype {
    pub source: String,
    pub symbol: String,
    pub instructions: Vec<Instruction>,
    pub constants: Vec<Constant>,
    pub imports: Vec<Import>,
    pub nesteds: Vec<Prototype>,
}

impl Prototype {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Appends an instruction, returning its index.
    pub fn emit(&mut self, inst: Instruction) -> usize {
        self.instructions.push(inst);
        self.instructions.len() - 1
    }

    pub fn add_constant(&mut self, constant: Constant) -> u32 {
        let idx = self.constants.len() as u32;
        self.constants.push(constant);
        idx
    }

    /// Adds an import, reusing an existing entry for the same symbol.
    pub fn add_import(&mut self, module: &str, name: &str) -> u32 {
        if let Some(idx) = self
            .imports
            .iter()
            .position(|i| i.module == module && i.name == name)
        {
            return idx as u32;
        }
        self.imports.push(Import::new(module, name));
        (self.imports.len() - 1) as u32
    }

    pub fn add_nested(&mut self, proto: Prototype) -> u32 {
        self.nesteds.push(proto);
        (self.nesteds.len() - 1) as u32
    }

    /// Number of prototypes in this tree, including `self`.
    pub fn tree_size(&self) -> usize {
        1 + self.nesteds.iter().map(Prototype::tree_size).sum::<usize>()
    }
}

/// The fixed 12-byte header in front of every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub major: u8,
    pub minor: u8,
    pub big_endian: bool,
    pub integer_size: u8,
    pub float_size: u8,
    pub instruction_size: u8,
}

impl ChunkHeader {
    /// Header describing chunks produced on this host.
    pub const fn host() -> Self {
        Self {
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            big_endian: cfg!(target_endian = "big"),
            integer_size: core::mem::size_of::<i64>() as u8,
            float_size: core::mem::size_of::<f64>() as u8,
            instruction_size: core::mem::size_of::<Instruction>() as u8,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..4].copy_from_slice(&SIGNATURE);
        out[4] = (self.major << 4) | (self.minor & 0x0F);
        out[5] = self.big_endian as u8;
        out[6] = self.integer_size;
        out[7] = self.float_size;
        out[8] = self.instruction_size;
        out
    }

    /// Parses the header fields. Compatibility is checked separately by
    /// [`ChunkHeader::check_compatible`].
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CodecError::UnexpectedEof(bytes.len()));
        }
        if bytes[..4] != SIGNATURE {
            return Err(CodecError::BadSignature);
        }
        Ok(Self {
            major: bytes[4] >> 4,
            minor: bytes[4] & 0x0F,
            big_endian: bytes[5] != 0,
            integer_size: bytes[6],
            float_size: bytes[7],
            instruction_size: bytes[8],
        })
    }

    pub fn check_compatible(&self) -> Result<(), CodecError> {
        let host = Self::host();
        if (self.major, self.minor) != (host.major, host.minor) {
            return Err(CodecError::VersionMismatch {
                found_major: self.major,
                found_minor: self.minor,
                expected_major: host.major,
                expected_minor: host.minor,
            });
        }
        if self.big_endian != host.big_endian {
            return Err(CodecError::EndiannessMismatch);
        }
        for (what, found, expected) in [
            ("integer", self.integer_size, host.integer_size),
            ("float", self.float_size, host.float_size),
            ("instruction", self.instruction_size, host.instruction_size),
        ] {
            if found != expected {
                return Err(CodecError::WidthMismatch {
                    what,
                    found,
                    expected,
                });
            }
        }
        Ok(())
    }
}

impl Default for ChunkHeader {
    fn default() -> Self {
        Self::host()
    }
}

/// A loadable unit: one header and the module prototype tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub header: ChunkHeader,
    pub module: Prototype,
}

impl Chunk {
    pub fn new(module: Prototype) -> Self {
        Self {
            header: ChunkHeader::host(),
            module,
        }
    }

    /// The module name, taken from the module prototype's symbol.
    pub fn name(&self) -> &str {
        &self.module.symbol
    }
}
