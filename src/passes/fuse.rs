//! # Fuse: pattern fusion
//!
//! Collapses an op and one or two of its producers into a specialised
//! opcode (`MUL + ADD -> FMA`) when every matched producer has the right
//! kind and few enough users. Saturating: scans restart until a full
//! sweep makes no change.
//!
//! Replacement wiring: each matched producer's own inputs land on the
//! replacement consecutively from its `remap_to_port`; producers of the
//! target's non-matched ports keep their data on the remaining free
//! ports, in port order.

use weft_isa::{op_meta, port_index, MAX_PORTS};

use crate::diag::CompileResult;
use crate::ir::{GraphIr, NodeIdx, PortRef};
use crate::passes::PassCtx;
use crate::rules::{FusionRule, FUSION_RULES};

pub fn run(ctx: &mut PassCtx) -> CompileResult<()> {
    loop {
        let mut changed = false;
        let initial = ctx.ir.len() as NodeIdx;
        'scan: for idx in 0..initial {
            if ctx.ir.node(idx).is_tombstone() {
                continue;
            }
            for rule in FUSION_RULES {
                if try_fuse(ctx.ir, idx, rule) {
                    // Indices shifted; restart the scan.
                    changed = true;
                    break 'scan;
                }
            }
        }
        if !changed {
            return Ok(());
        }
    }
}

fn try_fuse(ir: &mut GraphIr, idx: NodeIdx, rule: &FusionRule) -> bool {
    if ir.node(idx).kind != rule.target_kind {
        return false;
    }

    // Match every listed producer pattern first; no mutation on failure.
    let mut matched: Vec<(usize, NodeIdx)> = Vec::new();
    for m in rule.matches {
        let Some(port) = port_index(rule.target_kind, m.port_name) else {
            return false;
        };
        let Some(src) = ir.source(PortRef::new(idx, port)) else {
            return false;
        };
        if ir.node(src.node).kind != m.match_kind || ir.user_count(src.node) > m.max_users {
            return false;
        }
        matched.push((port, src.node));
    }

    let fused = ir.add(format!("{}_f", ir.node(idx).id), rule.replace_with);
    let loc = ir.node(idx).loc.clone();
    let domain = ir.node(idx).domain;
    {
        let node = ir.node_mut(fused);
        node.loc = loc;
        node.domain = domain;
    }
    ir.replace(idx, fused);

    let target_meta = op_meta(rule.target_kind);
    let mut used = [false; MAX_PORTS];
    let mut carried: Vec<PortRef> = Vec::new();
    for port in 0..MAX_PORTS {
        if target_meta.ports[port].is_none() {
            continue;
        }
        if let Some(mi) = matched.iter().position(|&(p, _)| p == port) {
            let producer = matched[mi].1;
            let base = port_index(rule.replace_with, rule.matches[mi].remap_to_port).unwrap_or(0);
            for q in 0..MAX_PORTS {
                if let Some(s) = ir.source(PortRef::new(producer, q)) {
                    ir.connect(s, PortRef::new(fused, base + q));
                    used[base + q] = true;
                }
            }
        } else if let Some(s) = ir.source(PortRef::new(idx, port)) {
            carried.push(s);
        }
    }
    let mut free = (0..MAX_PORTS).filter(|&p| !used[p]);
    for s in carried {
        if let Some(p) = free.next() {
            ir.connect(s, PortRef::new(fused, p));
        }
    }

    for (_, producer) in matched {
        ir.remove(producer);
    }
    ir.remove(idx);
    true
}
