//! # Pass Pipeline
//!
//! The compiler is a linear pipeline of passes over a shared context:
//! the mutable graph IR plus the analysis artefacts later passes and
//! codegen consume (topological order, task and binding tables).
//!
//! ```text
//! Lower -> Inline -> Decompose -> Fuse -> Simplify -> Sort ->
//! Analyze -> Validate -> DomainSplit -> Liveness -> TaskPlan -> Emit
//! ```
//!
//! The pipeline itself is declarative data: a list of `(name, function)`
//! pairs. The driver runs each pass in order and aborts on the first one
//! that either returns a fatal error or files diagnostics. Lower sits in
//! front of the pipeline (it creates the IR the context borrows) and
//! Emit behind it (it consumes the finished context).

pub mod analyze;
pub mod decompose;
pub mod domain_split;
pub mod fuse;
pub mod inline;
pub mod liveness;
pub mod lower;
pub mod simplify;
pub mod sort;
pub mod task_plan;
pub mod validate;

use std::path::PathBuf;

use crate::diag::{CompileError, CompileResult, Diagnostics};
use crate::ir::{GraphIr, NodeIdx};
use weft_isa::{op_meta, Binding, OpCategory, OpKind, Task};

/// Shared state threaded through the pipeline.
pub struct PassCtx<'a> {
    pub ir: &'a mut GraphIr,
    /// Path of the graph file being compiled; relative subgraph paths
    /// resolve against its directory.
    pub base_path: PathBuf,
    pub diag: &'a mut Diagnostics,

    /// Live nodes in dependency order; produced by Sort.
    pub sorted: Vec<NodeIdx>,
    /// Produced by TaskPlan, consumed by Emit.
    pub tasks: Vec<Task>,
    pub bindings: Vec<Binding>,
}

impl<'a> PassCtx<'a> {
    pub fn new(ir: &'a mut GraphIr, base_path: PathBuf, diag: &'a mut Diagnostics) -> PassCtx<'a> {
        PassCtx {
            ir,
            base_path,
            diag,
            sorted: Vec::new(),
            tasks: Vec::new(),
            bindings: Vec::new(),
        }
    }

    /// Sorted nodes that emit instructions: atomics, reductions and
    /// accelerated kernels plus memory ops, minus the zero-copy bridges.
    pub fn compute_sorted(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        self.sorted
            .iter()
            .copied()
            .filter(|&idx| is_compute(self.ir.node(idx).kind))
    }
}

/// True for kinds that become instructions.
pub fn is_compute(kind: OpKind) -> bool {
    op_meta(kind).category != OpCategory::Special && !kind.is_bridge()
}

/// A pass transforms the context in place; semantic problems go to the
/// diagnostics buffer, fatal infrastructure problems into the error.
pub type PassFn = fn(&mut PassCtx) -> CompileResult<()>;

/// The compilation pipeline, in execution order.
pub static PIPELINE: &[(&str, PassFn)] = &[
    ("inline", inline::run),
    ("decompose", decompose::run),
    ("fuse", fuse::run),
    ("simplify", simplify::run),
    ("sort", sort::run),
    ("analyze", analyze::run),
    ("validate", validate::run),
    ("domain-split", domain_split::run),
    ("liveness", liveness::run),
    ("task-plan", task_plan::run),
];

/// Run every pass in order. The first pass that fails, fatally or by
/// filing diagnostics, aborts the pipeline.
pub fn run_pipeline(ctx: &mut PassCtx) -> CompileResult<()> {
    for &(name, pass) in PIPELINE {
        tracing::debug!(pass = name, "running pass");
        pass(ctx)?;
        if ctx.diag.has_errors() {
            tracing::error!(pass = name, "pass failed");
            return Err(CompileError::PassFailed(name));
        }
    }
    Ok(())
}
