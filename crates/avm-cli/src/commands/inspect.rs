//! `avm inspect`

use std::fmt::Write;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use avm_common_core::{Chunk, ChunkHeader, Constant, Prototype};

pub fn inspect(path: &Path) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let header = ChunkHeader::decode(&bytes)?;
    print!("{}", format_header(&header));
    let chunk = Chunk::from_bytes(&bytes)?;
    print!("{}", format_chunk(&chunk));
    Ok(())
}

pub fn format_header(h: &ChunkHeader) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "version     {}.{}", h.major, h.minor);
    let _ = writeln!(
        out,
        "endianness  {}",
        if h.big_endian { "big" } else { "little" }
    );
    let _ = writeln!(
        out,
        "widths      int={} float={} inst={}",
        h.integer_size, h.float_size, h.instruction_size
    );
    out
}

/// The prototype tree, one indented block per prototype.
pub fn format_chunk(chunk: &Chunk) -> String {
    let mut out = String::new();
    format_proto(&mut out, &chunk.module, 0);
    out
}

fn format_proto(out: &mut String, p: &Prototype, depth: usize) {
    let pad = "  ".repeat(depth);
    let name = if p.symbol.is_empty() { "<anon>" } else { &p.symbol };
    let _ = write!(out, "{pad}proto {name}");
    if !p.source.is_empty() {
        let _ = write!(out, " ({})", p.source);
    }
    out.push('\n');

    for (i, k) in p.constants.iter().enumerate() {
        let _ = match k {
            Constant::Integer(v) => writeln!(out, "{pad}  k{i} = {v}"),
            Constant::Real(v) => writeln!(out, "{pad}  k{i} = {v:?}"),
            Constant::String(s) => writeln!(out, "{pad}  k{i} = {s:?}"),
        };
    }
    for (i, imp) in p.imports.iter().enumerate() {
        let _ = writeln!(out, "{pad}  import {i} {}:{}", imp.module, imp.name);
    }
    for (ip, inst) in p.instructions.iter().enumerate() {
        let _ = writeln!(out, "{pad}  {ip:4}  {inst}");
    }
    for nested in &p.nesteds {
        format_proto(out, nested, depth + 1);
    }
}
