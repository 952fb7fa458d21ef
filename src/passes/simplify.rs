//! # Simplify: zero-copy bridge short-circuiting
//!
//! `Reshape` and `Slice` forward their input unchanged at execution time,
//! so every edge whose producer chain runs through them is rewired to the
//! nearest non-bridge node. The bridge nodes stay in the graph for their
//! shape metadata and register aliasing; they simply stop being read by
//! compute nodes and never become instructions.

use weft_isa::MAX_PORTS;

use crate::diag::CompileResult;
use crate::ir::{GraphIr, NodeIdx, PortRef};
use crate::passes::PassCtx;

const MAX_BRIDGE_DEPTH: usize = 64;

pub fn run(ctx: &mut PassCtx) -> CompileResult<()> {
    let count = ctx.ir.len() as NodeIdx;
    for idx in 0..count {
        if ctx.ir.node(idx).is_tombstone() {
            continue;
        }
        for port in 0..MAX_PORTS {
            let Some(src) = ctx.ir.source(PortRef::new(idx, port)) else {
                continue;
            };
            let real = trace_real_source(ctx.ir, src);
            if real != src {
                ctx.ir.connect(real, PortRef::new(idx, port));
            }
        }
    }
    Ok(())
}

fn trace_real_source(ir: &GraphIr, mut src: PortRef) -> PortRef {
    let mut depth = 0;
    while ir.node(src.node).kind.is_bridge() && depth < MAX_BRIDGE_DEPTH {
        match ir.source(PortRef::new(src.node, 0)) {
            Some(upstream) => {
                src = upstream;
                depth += 1;
            }
            None => break,
        }
    }
    src
}
