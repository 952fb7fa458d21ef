//! # Cartridge Writer
//!
//! Serialises compiled programs and asset blobs into the on-disk `.sfc`
//! container. The layout is fixed and little-endian throughout so a
//! runtime can mmap the file and read it without further parsing:
//!
//! ```text
//! header   magic, version, payload crc32, title[64], width, height,
//!          threads, window flags, section count
//! directory [name[32], type, offset, size] per section
//! payloads concatenated section bodies
//! ```
//!
//! A `Program` payload carries, in order: the bytecode header (counts and
//! scratch sizes), the instruction stream, the symbol table, the task
//! table, the binding table, the tensor descriptors, the push-constant
//! block and the remaining non-scalar constant data.

use std::fs;
use std::path::Path;

use weft_ast::AppSettings;
use weft_isa::{Program, MAX_DIMS};

use crate::diag::{CompileError, CompileResult};

/// Cartridge magic: `WFTC`.
pub const CARTRIDGE_MAGIC: u32 = u32::from_le_bytes(*b"WFTC");
/// Container format version.
pub const CARTRIDGE_VERSION: u32 = 1;

const TITLE_LEN: usize = 64;
const SECTION_NAME_LEN: usize = 32;
const SYMBOL_NAME_LEN: usize = 48;

/// Section payload type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SectionKind {
    Program = 0,
    Image = 1,
    Font = 2,
    Pipeline = 3,
    Raw = 4,
}

/// One named section queued for serialisation.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub kind: SectionKind,
    pub payload: Vec<u8>,
}

impl Section {
    pub fn program(name: impl Into<String>, prog: &Program) -> Section {
        Section {
            name: name.into(),
            kind: SectionKind::Program,
            payload: encode_program(prog),
        }
    }
}

/// Little-endian byte sink with fixed-width string fields.
#[derive(Default)]
struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }
    /// NUL-padded fixed-width string, truncated to fit.
    fn name(&mut self, s: &str, width: usize) {
        let bytes = s.as_bytes();
        let n = bytes.len().min(width - 1);
        self.buf.extend_from_slice(&bytes[..n]);
        self.buf.resize(self.buf.len() + (width - n), 0);
    }
}

/// Serialise a program into a `Program` section payload.
pub fn encode_program(prog: &Program) -> Vec<u8> {
    let mut w = ByteWriter::default();

    // Bytecode header.
    w.u32(prog.instructions.len() as u32);
    w.u32(prog.tasks.len() as u32);
    w.u32(prog.bindings.len() as u32);
    w.u32(prog.symbols.len() as u32);
    w.u32(prog.tensors.len() as u32);
    w.u32(prog.push_constants.len() as u32);
    w.u32(prog.sync_scratch_size);
    w.u32(prog.reduction_scratch_size);

    for inst in &prog.instructions {
        w.u16(inst.opcode as u16);
        w.u16(inst.dst);
        for src in inst.srcs {
            w.u16(src);
        }
        w.u16(inst.line);
        w.u16(inst.column);
    }

    for sym in &prog.symbols {
        w.name(&sym.name, SYMBOL_NAME_LEN);
        w.u64(sym.name_hash);
        w.u16(sym.register);
        w.u16(sym.flags);
        w.u32(0); // reserved
    }

    for task in &prog.tasks {
        w.u32(task.start_inst);
        w.u32(task.inst_count);
        w.u16(task.domain_reg);
        w.u8(task.strategy as u8);
        w.u8(task.flags);
        w.u32(task.binding_offset);
        w.u32(task.binding_count);
        for d in task.grid.dims {
            w.u32(d);
        }
        for t in task.grid.tile_shape {
            w.u32(t);
        }
        w.u32(task.grid.total_tiles);
    }

    for binding in &prog.bindings {
        w.u16(binding.reg);
        w.u8(binding.flags);
        w.u8(0); // pad
        for s in binding.strides {
            w.i32(s);
        }
    }

    for desc in &prog.tensors {
        w.u8(desc.info.dtype.to_u8());
        w.u8(desc.info.ndim);
        w.u8(desc.flags);
        w.u8(0); // pad
        for d in 0..MAX_DIMS {
            w.i32(desc.info.shape[d]);
        }
        let data_size = desc
            .data
            .as_ref()
            .map(|d| d.len() as u32)
            .unwrap_or_default();
        w.u32(data_size);
        w.u32(desc.push_offset.unwrap_or(u32::MAX));
    }

    w.bytes(&prog.push_constants);

    // Non-scalar constant payloads, in register order; sizes are in the
    // descriptors above.
    for desc in &prog.tensors {
        if let Some(data) = &desc.data {
            w.bytes(data);
        }
    }

    w.buf
}

/// Assemble and write a cartridge file.
pub fn save_cartridge(
    path: &Path,
    settings: &AppSettings,
    sections: &[Section],
) -> CompileResult<()> {
    let bytes = encode_cartridge(settings, sections);
    fs::write(path, &bytes).map_err(|source| CompileError::CartridgeWrite {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(
        path = %path.display(),
        sections = sections.len(),
        size = bytes.len(),
        "cartridge written"
    );
    Ok(())
}

/// Build the full cartridge image in memory.
pub fn encode_cartridge(settings: &AppSettings, sections: &[Section]) -> Vec<u8> {
    // Payload region first; the header stores its checksum.
    let mut payloads = ByteWriter::default();
    let mut offsets = Vec::with_capacity(sections.len());
    let header_size = 4 + 4 + 4 + TITLE_LEN + 4 + 4 + 4 + 1 + 3 + 4;
    let dir_size = sections.len() * (SECTION_NAME_LEN + 4 + 8 + 8);
    let payload_base = (header_size + dir_size) as u64;
    for section in sections {
        offsets.push(payload_base + payloads.buf.len() as u64);
        payloads.bytes(&section.payload);
    }
    let crc = crc32fast::hash(&payloads.buf);

    let mut w = ByteWriter::default();
    w.u32(CARTRIDGE_MAGIC);
    w.u32(CARTRIDGE_VERSION);
    w.u32(crc);
    w.name(&settings.title, TITLE_LEN);
    w.u32(settings.width);
    w.u32(settings.height);
    w.u32(settings.threads);
    let mut flags = 0u8;
    if settings.vsync {
        flags |= 1 << 0;
    }
    if settings.fullscreen {
        flags |= 1 << 1;
    }
    if settings.resizable {
        flags |= 1 << 2;
    }
    w.u8(flags);
    w.bytes(&[0; 3]); // pad
    w.u32(sections.len() as u32);

    for (section, offset) in sections.iter().zip(&offsets) {
        w.name(&section.name, SECTION_NAME_LEN);
        w.u32(section.kind as u32);
        w.u64(*offset);
        w.u64(section.payload.len() as u64);
    }

    w.bytes(&payloads.buf);
    w.buf
}
