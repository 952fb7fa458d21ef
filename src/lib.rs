//! # Weft Compiler
//!
//! Ahead-of-time compiler for declarative tensor-dataflow graphs. A
//! JSON manifest describes typed tensor operations and their links; the
//! compiler resolves types and shapes, inlines subgraphs, lowers
//! composites, fuses patterns, allocates registers, partitions the work
//! into schedulable tasks and serialises the result into a cartridge the
//! runtime executor mmaps and runs.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! JSON manifest
//!     |
//! [Parser]        -> AstGraph (attribute bags + source locations)
//!     |
//! [Lower]         -> GraphIr (opcodes, edges, resource flags)
//!     |
//! [Inline]        -> CALL nodes replaced by subgraph bodies
//! [Decompose]     -> composites rewritten to atomics
//! [Fuse]          -> MUL+ADD -> FMA and friends
//! [Simplify]      -> zero-copy bridges short-circuited
//! [Sort]          -> topological order
//! [Analyze]       -> dtypes, shapes, strides, spatial flags
//! [Validate]      -> arity / dtype masks / ranks / assertions
//! [DomainSplit]   -> execution domains per shape representative
//! [Liveness]      -> abstract registers, bridge aliasing
//! [TaskPlan]      -> tasks, grids, bindings, barriers, baked strides
//!     |
//! [Emit]          -> weft_isa::Program
//!     |
//! [Cartridge]     -> .sfc container on disk
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut diag = weft::Diagnostics::new();
//! let mut ir = weft::load_graph(Path::new("graph.json"), &mut diag)?;
//! let program = weft::compile(&mut ir, Path::new("graph.json"), &mut diag)?;
//! weft::cartridge::save_cartridge(
//!     Path::new("graph.sfc"),
//!     &ir.settings,
//!     &[weft::cartridge::Section::program("main", &program)],
//! )?;
//! ```

pub mod cartridge;
pub mod codegen;
pub mod diag;
pub mod ir;
pub mod manifest;
pub mod parser;
pub mod passes;
pub mod rules;

use std::fs;
use std::path::Path;

pub use diag::{CompileError, CompileResult, Diagnostics};
pub use ir::GraphIr;
pub use weft_isa::Program;

use passes::{run_pipeline, PassCtx};

/// Read, parse and lower a graph file into IR. Root graphs require every
/// `input` to declare its shape.
pub fn load_graph(path: &Path, diag: &mut Diagnostics) -> CompileResult<GraphIr> {
    load_graph_file(path, diag, true)
}

/// As [`load_graph`], with control over strict input-shape checking.
/// Subgraphs loaded for inlining skip it: their inputs are replaced by
/// the caller's producers.
pub fn load_graph_file(
    path: &Path,
    diag: &mut Diagnostics,
    strict_inputs: bool,
) -> CompileResult<GraphIr> {
    let src = fs::read_to_string(path).map_err(|source| CompileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ast = parser::parse_graph(&src, path).map_err(|source| CompileError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let mut ir = GraphIr::new();
    passes::lower::run(&ast, &mut ir, diag, strict_inputs)?;
    Ok(ir)
}

/// Run the full pass pipeline over `ir` and emit the program. Semantic
/// failures land in `diag`; the first failing pass aborts.
pub fn compile(
    ir: &mut GraphIr,
    base_path: &Path,
    diag: &mut Diagnostics,
) -> CompileResult<Program> {
    let mut ctx = PassCtx::new(ir, base_path.to_path_buf(), diag);
    run_pipeline(&mut ctx)?;
    Ok(codegen::emit(&ctx))
}
