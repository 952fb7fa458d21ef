//! # Domain split: execution-domain partitioning
//!
//! Groups nodes into execution domains so the task planner can batch
//! instructions that iterate the same space. Every output picks a
//! representative (the first earlier output with an identical shape, so
//! same-shaped sinks share a domain) and claims its ancestors, stopping
//! at reduction nodes and at shapes that cannot broadcast against the
//! representative. A node claimed by two different-shaped domains is
//! demoted to shared and materialises before crossing domains.
//!
//! Reductions then root their own domain at their input: a `sum` iterates
//! the space it consumes, not the one it feeds.

use weft_isa::{op_meta, OpCategory, OpKind, MAX_PORTS};

use crate::diag::CompileResult;
use crate::ir::{GraphIr, NodeIdx};
use crate::passes::PassCtx;

pub fn run(ctx: &mut PassCtx) -> CompileResult<()> {
    let ir = &mut *ctx.ir;
    let live: Vec<NodeIdx> = ir.live_indices().collect();

    // Author-declared domains served analysis; execution grouping starts
    // from a clean slate.
    for &idx in &live {
        ir.node_mut(idx).domain = None;
    }

    let outputs: Vec<NodeIdx> = live
        .iter()
        .copied()
        .filter(|&i| ir.node(i).kind == OpKind::Output)
        .collect();
    for (pos, &out) in outputs.iter().enumerate() {
        let out_info = ir.node(out).out_info;
        let rep = outputs[..pos]
            .iter()
            .copied()
            .find(|&earlier| ir.node(earlier).out_info.shape_eq(&out_info))
            .unwrap_or(out);
        mark_domain(ir, out, rep);
    }

    for &idx in &live {
        if op_meta(ir.node(idx).kind).category != OpCategory::Reduction {
            continue;
        }
        if let Some(src) = ir.input_source(idx, 0) {
            ir.node_mut(idx).domain = Some(src);
            mark_domain(ir, src, src);
        }
    }

    Ok(())
}

/// Walk backward from `start`, assigning `rep` to unclaimed ancestors.
fn mark_domain(ir: &mut GraphIr, start: NodeIdx, rep: NodeIdx) {
    let rep_info = ir.node(rep).out_info;
    let mut work = vec![start];
    while let Some(idx) = work.pop() {
        let node = ir.node(idx);

        if let Some(existing) = node.domain {
            // Claimed by another domain: compatible shapes coexist,
            // different shapes force materialisation (shared).
            if existing != rep && !ir.node(existing).out_info.shape_eq(&rep_info) {
                ir.node_mut(idx).domain = None;
            }
            continue;
        }

        if idx != start {
            let category = op_meta(node.kind).category;
            if category == OpCategory::Reduction {
                continue;
            }
            if !node.out_info.broadcast_compatible(&rep_info) {
                continue;
            }
        }

        ir.node_mut(idx).domain = Some(rep);
        for port in 0..MAX_PORTS {
            if let Some(src) = ir.input_source(idx, port) {
                work.push(src);
            }
        }
    }
}
