//! # Inline: subgraph expansion
//!
//! Repeatedly replaces every `Call` node with a renamed copy of its
//! referenced subgraph. Grafted node ids are prefixed with
//! `"<call.id>::"`; the subgraph's `Input` nodes bind positionally to the
//! call's ports and are replaced by the caller's producers; each
//! `Output`'s internal producer is spliced into the call's slot.
//!
//! Nested calls inside grafted subgraphs are picked up by the next wave.
//! The wave cap bounds mutually recursive imports.

use std::path::{Path, PathBuf};

use weft_isa::{Dtype, OpKind};

use crate::diag::CompileResult;
use crate::ir::{GraphIr, NodeIdx, PortRef};
use crate::passes::PassCtx;

/// Maximum inlining waves before we assume cyclic imports.
const MAX_INLINE_DEPTH: usize = 32;

pub fn run(ctx: &mut PassCtx) -> CompileResult<()> {
    for _wave in 0..MAX_INLINE_DEPTH {
        let calls: Vec<NodeIdx> = ctx
            .ir
            .live_indices()
            .filter(|&i| ctx.ir.node(i).kind == OpKind::Call)
            .collect();
        if calls.is_empty() {
            return Ok(());
        }

        for call_idx in calls {
            let node = ctx.ir.node(call_idx);
            let loc = node.loc.clone();
            let Some(path) = node.sub_graph_path.clone() else {
                ctx.diag.report(
                    loc,
                    format!("Call '{}' has no subgraph path", node.id),
                );
                return Ok(());
            };
            let resolved = resolve_subgraph_path(&path, &ctx.base_path);
            tracing::debug!(path = %resolved.display(), "inlining subgraph");

            let sub = crate::load_graph_file(&resolved, ctx.diag, false)?;
            if ctx.diag.has_errors() {
                return Ok(());
            }
            inline_call(ctx.ir, call_idx, &sub);
        }
    }

    if let Some(i) = ctx
        .ir
        .live_indices()
        .find(|&i| ctx.ir.node(i).kind == OpKind::Call)
    {
        let node = ctx.ir.node(i);
        ctx.diag.report(
            node.loc.clone(),
            format!(
                "Inline recursion limit exceeded at '{}' (cyclic imports?)",
                node.id
            ),
        );
    }
    Ok(())
}

/// Paths recorded at lowering time are already joined against their
/// manifest's directory; fall back to the compiling file's directory for
/// paths that do not resolve as given.
fn resolve_subgraph_path(path: &Path, base_path: &Path) -> PathBuf {
    if path.is_absolute() || path.exists() {
        return path.to_path_buf();
    }
    match base_path.parent() {
        Some(dir) => dir.join(path),
        None => path.to_path_buf(),
    }
}

/// Graft `sub` into the host graph in place of `call_idx`.
fn inline_call(ir: &mut GraphIr, call_idx: NodeIdx, sub: &GraphIr) {
    let prefix = ir.node(call_idx).id.clone();
    let map = ir.graft(sub, &prefix);

    let mut input_ordinal = 0usize;
    for i in 0..sub.len() as NodeIdx {
        let Some(grafted) = map[i as usize] else { continue };
        match sub.node(i).kind {
            OpKind::Input => {
                // The k-th subgraph input takes the producer wired to the
                // call's k-th port.
                let producer = ir.source(PortRef::new(call_idx, input_ordinal));
                input_ordinal += 1;
                if let Some(p) = producer {
                    ir.replace(grafted, p.node);
                }
                ir.remove(grafted);
            }
            OpKind::Output => {
                if let Some(internal) = ir.source(PortRef::new(grafted, 0)) {
                    // Declared output info seeds the producer when the
                    // subgraph body left it untyped.
                    if ir.node(internal.node).out_info.dtype == Dtype::Unknown {
                        ir.node_mut(internal.node).out_info = sub.node(i).out_info;
                    }
                    ir.replace(call_idx, internal.node);
                }
                ir.remove(grafted);
            }
            _ => {}
        }
    }

    ir.remove(call_idx);
}
