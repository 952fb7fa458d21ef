//! # Liveness: register allocation
//!
//! Two phases. First, every compute node and every constant receives a
//! fresh abstract register. Second, the bridges (`input`, `output`,
//! `reshape`, `slice`) alias to the register of the nearest non-bridge
//! source along input 0, so views cost nothing at runtime. An `input`
//! with no producer is an externally supplied source and keeps a fresh
//! register of its own.
//!
//! Register reuse across disjoint lifetimes is intentionally left out;
//! aliasing already makes the common view chains free.

use weft_isa::{OpKind, REG_NONE};

use crate::diag::CompileResult;
use crate::ir::NodeIdx;
use crate::passes::{is_compute, PassCtx};

/// Bound on bridge chains; deeper chains keep the register found so far.
const MAX_TRACE_DEPTH: usize = 32;

fn is_aliasing_bridge(kind: OpKind) -> bool {
    matches!(
        kind,
        OpKind::Input | OpKind::Output | OpKind::Reshape | OpKind::Slice
    )
}

pub fn run(ctx: &mut PassCtx) -> CompileResult<()> {
    let ir = &mut *ctx.ir;
    let live: Vec<NodeIdx> = ir.live_indices().collect();

    // Phase 1: unique registers for instruction results and constants.
    let mut next_reg: u16 = 0;
    for &idx in &live {
        let kind = ir.node(idx).kind;
        let node = ir.node_mut(idx);
        if is_compute(kind) || kind == OpKind::Const {
            node.out_reg = next_reg;
            next_reg += 1;
        } else {
            node.out_reg = REG_NONE;
        }
    }

    // Phase 2: alias bridges through input 0.
    for &idx in &live {
        if ir.node(idx).out_reg != REG_NONE {
            continue;
        }
        let mut chain = Vec::new();
        let mut cur = idx;
        for _ in 0..MAX_TRACE_DEPTH {
            let node = ir.node(cur);
            if node.out_reg != REG_NONE || !is_aliasing_bridge(node.kind) {
                break;
            }
            let Some(src) = ir.input_source(cur, 0) else {
                break;
            };
            chain.push(cur);
            cur = src;
        }
        let root_reg = if ir.node(cur).out_reg != REG_NONE {
            ir.node(cur).out_reg
        } else {
            let reg = next_reg;
            next_reg += 1;
            ir.node_mut(cur).out_reg = reg;
            reg
        };
        for bridge in chain {
            ir.node_mut(bridge).out_reg = root_reg;
        }
    }

    tracing::debug!(registers = next_reg, "liveness: allocated registers");
    Ok(())
}
