//! Chunk loading and import linking.
//!
//! A loaded chunk is flattened into a list of prototypes, module prototype
//! first, so that a function value is just `(chunk, proto)` indices. Every
//! prototype carries its imports already resolved to values.

use hashbrown::HashMap;
use tracing::{debug, warn};

use avm_common_core::{Chunk, Constant, Import, Instruction, Prototype};
use avm_runtime::{FuncRef, Value};

use crate::error::{LoadError, VmError};
use crate::native::NativeRegistry;

/// A prototype ready to execute.
#[derive(Debug)]
pub struct LoadedProto {
    pub source: String,
    pub symbol: String,
    pub instructions: Vec<Instruction>,
    pub constants: Vec<Constant>,
    /// Resolved import values, parallel to the chunk's import list.
    pub imports: Vec<Value>,
    /// Prototype indices (within the same chunk) of the nested functions.
    pub nesteds: Vec<u32>,
}

#[derive(Debug)]
pub struct LoadedChunk {
    pub name: String,
    pub protos: Vec<LoadedProto>,
    /// Exported symbol -> prototype index.
    exports: HashMap<String, u32>,
}

pub type UnresolvedHandler = Box<dyn FnMut(&str, &str)>;

pub struct Loader {
    natives: NativeRegistry,
    chunks: Vec<LoadedChunk>,
    by_name: HashMap<String, u32>,
    on_unresolved: Option<UnresolvedHandler>,
}

impl Loader {
    pub fn new(natives: NativeRegistry) -> Self {
        Self {
            natives,
            chunks: Vec::new(),
            by_name: HashMap::new(),
            on_unresolved: None,
        }
    }

    #[inline]
    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    #[inline]
    pub fn natives_mut(&mut self) -> &mut NativeRegistry {
        &mut self.natives
    }

    /// Lets unresolved imports load as nil, reporting each to `handler`.
    pub fn on_unresolved(&mut self, handler: impl FnMut(&str, &str) + 'static) {
        self.on_unresolved = Some(Box::new(handler));
    }

    pub fn chunks(&self) -> &[LoadedChunk] {
        &self.chunks
    }

    /// Decodes, validates and links a binary chunk. Returns its index.
    pub fn load(&mut self, bytes: &[u8]) -> Result<u32, LoadError> {
        let chunk = Chunk::from_bytes(bytes)?;
        self.load_chunk(chunk)
    }

    pub fn load_chunk(&mut self, chunk: Chunk) -> Result<u32, LoadError> {
        let name = chunk.module.symbol.clone();
        if self.by_name.contains_key(&name) {
            return Err(LoadError::DuplicateModule(name));
        }
        let chunk_idx = self.chunks.len() as u32;

        let mut flat = Vec::with_capacity(chunk.module.tree_size());
        flatten(chunk.module, &mut flat);

        let exports: HashMap<String, u32> = flat[0]
            .1
            .iter()
            .filter_map(|&idx| {
                let symbol = &flat[idx as usize].0.symbol;
                (!symbol.is_empty()).then(|| (symbol.clone(), idx))
            })
            .collect();

        let mut protos = Vec::with_capacity(flat.len());
        for (proto, nesteds) in flat {
            let imports = proto
                .imports
                .iter()
                .map(|import| self.resolve(import, &name, chunk_idx, &exports))
                .collect::<Result<Vec<_>, _>>()?;
            protos.push(LoadedProto {
                source: proto.source,
                symbol: proto.symbol,
                instructions: proto.instructions,
                constants: proto.constants,
                imports,
                nesteds,
            });
        }

        debug!(module = %name, protos = protos.len(), exports = exports.len(), "chunk loaded");
        self.by_name.insert(name.clone(), chunk_idx);
        self.chunks.push(LoadedChunk {
            name,
            protos,
            exports,
        });
        Ok(chunk_idx)
    }

    /// Natives first, then exports of loaded modules (the chunk being
    /// loaded included).
    fn resolve(
        &mut self,
        import: &Import,
        own_name: &str,
        own_idx: u32,
        own_exports: &HashMap<String, u32>,
    ) -> Result<Value, LoadError> {
        if let Some(id) = self.natives.lookup(&import.module, &import.name) {
            return Ok(Value::NativeFunc(id));
        }
        let found = if import.module == own_name {
            own_exports.get(&import.name).map(|&proto| FuncRef {
                chunk: own_idx,
                proto,
            })
        } else {
            self.find(&import.module, &import.name)
        };
        if let Some(func) = found {
            return Ok(Value::ByteCodeFunc(func));
        }
        match self.on_unresolved.as_mut() {
            Some(handler) => {
                warn!(module = %import.module, name = %import.name, "unresolved import");
                handler(&import.module, &import.name);
                Ok(Value::Nil)
            }
            None => Err(LoadError::Unresolved {
                module: import.module.clone(),
                name: import.name.clone(),
            }),
        }
    }

    /// Exported function `name` of module `module`.
    pub fn find(&self, module: &str, name: &str) -> Option<FuncRef> {
        let &chunk = self.by_name.get(module)?;
        let &proto = self.chunks[chunk as usize].exports.get(name)?;
        Some(FuncRef { chunk, proto })
    }

    pub fn proto(&self, func: FuncRef) -> Result<&LoadedProto, VmError> {
        self.chunks
            .get(func.chunk as usize)
            .and_then(|c| c.protos.get(func.proto as usize))
            .ok_or(VmError::InvalidFunction {
                chunk: func.chunk,
                proto: func.proto,
            })
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(NativeRegistry::with_stdlib())
    }
}

/// Depth-first numbering; each entry keeps the indices of its children.
fn flatten(proto: Prototype, out: &mut Vec<(Prototype, Vec<u32>)>) -> u32 {
    let idx = out.len();
    let Prototype {
        source,
        symbol,
        instructions,
        constants,
        imports,
        nesteds,
    } = proto;
    out.push((
        Prototype {
            source,
            symbol,
            instructions,
            constants,
            imports,
            nesteds: Vec::new(),
        },
        Vec::new(),
    ));
    let children: Vec<u32> = nesteds.into_iter().map(|n| flatten(n, out)).collect();
    out[idx].1 = children;
    idx as u32
}
