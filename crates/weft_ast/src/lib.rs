//! # Weft AST
//!
//! Untyped syntax-tree types for Weft graph manifests. The parser in the
//! compiler crate produces these from JSON text; the lowering pass
//! consumes them and resolves every surface `type` string into an opcode.
//!
//! Nodes carry their attributes as a free-form JSON object so that the
//! attribute dispatch table in the lowering pass stays the single source
//! of truth for attribute semantics.

use std::path::PathBuf;

use serde_json::{Map, Value};

/// Position of a construct in its source file, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLoc {
    pub file: String,
    /// 1-based line; 0 when unknown.
    pub line: u32,
    /// 1-based column; 0 when unknown.
    pub column: u32,
}

impl SourceLoc {
    /// Location known only down to the file.
    pub fn file_only(file: impl Into<String>) -> SourceLoc {
        SourceLoc {
            file: file.into(),
            line: 0,
            column: 0,
        }
    }
}

/// Application settings embedded in the cartridge header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub fullscreen: bool,
    pub resizable: bool,
    /// Worker threads for the runtime; 0 = auto.
    pub threads: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            title: "Weft App".to_string(),
            width: 800,
            height: 600,
            vsync: true,
            fullscreen: false,
            resizable: true,
            threads: 0,
        }
    }
}

/// One declared graph node: surface type string plus attribute bag.
#[derive(Debug, Clone)]
pub struct AstNode {
    pub id: String,
    /// Surface type, e.g. `"add"` or an imported subgraph name.
    pub ty: String,
    /// All remaining attributes (`shape`, `dtype`, `value`, `domain`, ...).
    pub attrs: Map<String, Value>,
    pub loc: SourceLoc,
}

/// One declared edge between two named nodes.
#[derive(Debug, Clone)]
pub struct AstLink {
    pub src: String,
    pub src_port: String,
    pub dst: String,
    pub dst_port: String,
}

/// A parsed manifest graph.
#[derive(Debug, Clone, Default)]
pub struct AstGraph {
    /// Paths of imported subgraph files, relative to the manifest.
    pub imports: Vec<String>,
    pub nodes: Vec<AstNode>,
    pub links: Vec<AstLink>,
    pub settings: AppSettings,
    /// Absolute or as-given path of the source file.
    pub path: PathBuf,
}

impl AstGraph {
    /// Location of a node by id, falling back to the file itself.
    pub fn loc_of(&self, id: &str) -> SourceLoc {
        self.nodes
            .iter()
            .find(|n| n.id == id)
            .map(|n| n.loc.clone())
            .unwrap_or_else(|| SourceLoc::file_only(self.path.display().to_string()))
    }
}
