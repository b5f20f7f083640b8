//! Binary chunk serialization.
//!
//! Layout after the 12-byte header, one prototype at a time (depth first):
//!
//! ```text
//! i64 source, i64 symbol              string table refs
//! i64 strings_sz, i64 num_instructions, i64 num_nesteds,
//! i64 num_constants, i64 num_imports
//! [u8; strings_sz]                    NUL-terminated strings, ref 0 = ""
//! [u32; num_instructions]
//! [{u32 tag, u32 pad, i64 integer, i64 string, f64 real}; num_constants]
//! [{i64 module, i64 name}; num_imports]
//! nested prototypes
//! ```
//!
//! Multi-byte fields use the byte order recorded in the header, which must
//! be the host's.

use hashbrown::HashMap;

use crate::bytecode::{Chunk, ChunkHeader, Constant, Import, Prototype, HEADER_SIZE};
use crate::error::CodecError;
use crate::instruction::Instruction;

const PROTO_HEADER_SIZE: usize = 7 * 8;
const CONSTANT_SIZE: usize = 4 + 4 + 8 + 8 + 8;
const IMPORT_SIZE: usize = 16;

// =============================================================================
// Writer
// =============================================================================

pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-prototype string table. Offset 0 is always the empty string.
struct StringTable {
    bytes: Vec<u8>,
    offsets: HashMap<String, i64>,
}

impl StringTable {
    fn new() -> Self {
        Self {
            bytes: vec![0],
            offsets: HashMap::new(),
        }
    }

    fn intern(&mut self, s: &str) -> i64 {
        if s.is_empty() {
            return 0;
        }
        if let Some(&off) = self.offsets.get(s) {
            return off;
        }
        let off = self.bytes.len() as i64;
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(s.to_owned(), off);
        off
    }
}

impl Chunk {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_bytes(&self.header.encode());
        write_prototype(&mut w, &self.module);
        w.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let header = ChunkHeader::decode(bytes)?;
        header.check_compatible()?;
        let mut r = ByteReader::new(bytes);
        r.skip(HEADER_SIZE)?;
        let module = read_prototype(&mut r)?;
        if r.remaining() != 0 {
            return Err(CodecError::TrailingBytes(r.remaining()));
        }
        Ok(Self { header, module })
    }
}

fn write_prototype(w: &mut ByteWriter, proto: &Prototype) {
    let mut strings = StringTable::new();
    let source = strings.intern(&proto.source);
    let symbol = strings.intern(&proto.symbol);
    let constants: Vec<(u32, i64, i64, f64)> = proto
        .constants
        .iter()
        .map(|c| match c {
            Constant::Integer(v) => (c.tag(), *v, 0, 0.0),
            Constant::String(s) => (c.tag(), 0, strings.intern(s), 0.0),
            Constant::Real(v) => (c.tag(), 0, 0, *v),
        })
        .collect();
    let imports: Vec<(i64, i64)> = proto
        .imports
        .iter()
        .map(|i| (strings.intern(&i.module), strings.intern(&i.name)))
        .collect();

    w.write_i64(source);
    w.write_i64(symbol);
    w.write_i64(strings.bytes.len() as i64);
    w.write_i64(proto.instructions.len() as i64);
    w.write_i64(proto.nesteds.len() as i64);
    w.write_i64(proto.constants.len() as i64);
    w.write_i64(proto.imports.len() as i64);
    w.write_bytes(&strings.bytes);
    for inst in &proto.instructions {
        w.write_u32(inst.raw());
    }
    for (tag, integer, string, real) in constants {
        w.write_u32(tag);
        w.write_u32(0);
        w.write_i64(integer);
        w.write_i64(string);
        w.write_f64(real);
    }
    for (module, name) in imports {
        w.write_i64(module);
        w.write_i64(name);
    }
    for nested in &proto.nesteds {
        write_prototype(w, nested);
    }
}

// =============================================================================
// Reader
// =============================================================================

pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof(self.data.len()));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), CodecError> {
        self.read_bytes(n).map(|_| ())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_ne_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_ne_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_ne_bytes(self.read_array()?))
    }

    /// Reads a count of `elem_size`-byte records, rejecting counts the
    /// remaining input cannot possibly hold.
    fn read_count(&mut self, what: &'static str, elem_size: usize) -> Result<usize, CodecError> {
        let count = self.read_i64()?;
        let fits = usize::try_from(count)
            .ok()
            .filter(|&n| n.checked_mul(elem_size).is_some_and(|b| b <= self.remaining()));
        fits.ok_or(CodecError::InvalidCount { what, count })
    }
}

fn lookup_string(table: &[u8], off: i64) -> Result<String, CodecError> {
    if off == 0 {
        return Ok(String::new());
    }
    let start = usize::try_from(off)
        .ok()
        .filter(|&s| s < table.len())
        .ok_or(CodecError::InvalidStringRef(off))?;
    let len = table[start..]
        .iter()
        .position(|&b| b == 0)
        .ok_or(CodecError::InvalidStringRef(off))?;
    core::str::from_utf8(&table[start..start + len])
        .map(str::to_owned)
        .map_err(|_| CodecError::InvalidUtf8)
}

fn read_prototype(r: &mut ByteReader<'_>) -> Result<Prototype, CodecError> {
    if r.remaining() < PROTO_HEADER_SIZE {
        return Err(CodecError::UnexpectedEof(r.pos + r.remaining()));
    }
    let source = r.read_i64()?;
    let symbol = r.read_i64()?;
    let strings_sz = r.read_count("string table", 1)?;
    // Counts are checked against the bytes left after the string table, a
    // loose bound that still stops absurd allocations.
    let num_instructions = r.read_count("instruction", 4)?;
    let num_nesteds = r.read_count("nested prototype", PROTO_HEADER_SIZE)?;
    let num_constants = r.read_count("constant", CONSTANT_SIZE)?;
    let num_imports = r.read_count("import", IMPORT_SIZE)?;

    let table = r.read_bytes(strings_sz)?;
    let string = |off: i64| lookup_string(table, off);

    let mut proto = Prototype {
        source: string(source)?,
        symbol: string(symbol)?,
        ..Prototype::default()
    };

    proto.instructions.reserve(num_instructions);
    for _ in 0..num_instructions {
        proto.instructions.push(Instruction::from_raw(r.read_u32()?));
    }

    proto.constants.reserve(num_constants);
    for _ in 0..num_constants {
        let tag = r.read_u32()?;
        r.skip(4)?;
        let integer = r.read_i64()?;
        let str_ref = r.read_i64()?;
        let real = r.read_f64()?;
        proto.constants.push(match tag {
            0 => Constant::Integer(integer),
            1 => Constant::String(string(str_ref)?),
            2 => Constant::Real(real),
            other => return Err(CodecError::InvalidConstantTag(other)),
        });
    }

    proto.imports.reserve(num_imports);
    for _ in 0..num_imports {
        let module = string(r.read_i64()?)?;
        let name = string(r.read_i64()?)?;
        proto.imports.push(Import { module, name });
    }

    for _ in 0..num_nesteds {
        proto.nesteds.push(read_prototype(r)?);
    }
    Ok(proto)
}
