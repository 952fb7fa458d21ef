//! # Decompose: composite lowering
//!
//! Rewrites composite ops (`magnitude`, `normalize`, `lerp`) into the
//! atomic subgraphs declared in `LOWERING_RULES`. Runs once over the
//! initial node count; the atomic nodes a rule introduces are not
//! themselves revisited.

use weft_isa::port_index;

use crate::diag::CompileResult;
use crate::ir::{GraphIr, NodeIdx, PortRef};
use crate::passes::PassCtx;
use crate::rules::{LoweringRule, LOWERING_RULES};

pub fn run(ctx: &mut PassCtx) -> CompileResult<()> {
    let initial = ctx.ir.len() as NodeIdx;
    for idx in 0..initial {
        if ctx.ir.node(idx).is_tombstone() {
            continue;
        }
        let kind = ctx.ir.node(idx).kind;
        if let Some(rule) = LOWERING_RULES.iter().find(|r| r.target_kind == kind) {
            apply_rule(ctx.ir, idx, rule);
        }
    }
    Ok(())
}

fn apply_rule(ir: &mut GraphIr, node_idx: NodeIdx, rule: &LoweringRule) {
    let base = ir.len() as NodeIdx;
    let orig_id = ir.node(node_idx).id.clone();
    let orig_loc = ir.node(node_idx).loc.clone();
    let orig_domain = ir.node(node_idx).domain;
    let orig_kind = ir.node(node_idx).kind;

    for step in rule.steps {
        let idx = ir.add(format!("{orig_id}.{}", step.id), step.kind);
        let node = ir.node_mut(idx);
        node.loc = orig_loc.clone();
        node.domain = orig_domain;
    }

    for (si, step) in rule.steps.iter().enumerate() {
        for (p, entry) in step.input_map.iter().enumerate() {
            let Some(input_id) = entry else { continue };
            let dst = PortRef::new(base + si as NodeIdx, p);
            if let Some(j) = rule.steps.iter().position(|s| s.id == *input_id) {
                ir.connect(PortRef::new(base + j as NodeIdx, 0), dst);
            } else if let Some(port) = port_index(orig_kind, input_id) {
                // Entry names a port of the original op: steal its producer.
                if let Some(producer) = ir.source(PortRef::new(node_idx, port)) {
                    ir.connect(producer, dst);
                }
            }
        }
    }

    if let Some(j) = rule.steps.iter().position(|s| s.id == rule.output_node_id) {
        ir.replace(node_idx, base + j as NodeIdx);
    }
    ir.remove(node_idx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_isa::OpKind;

    #[test]
    fn test_lerp_expands_to_atomics() {
        let mut ir = GraphIr::new();
        let a = ir.add("a", OpKind::Input);
        let b = ir.add("b", OpKind::Input);
        let t = ir.add("t", OpKind::Input);
        let l = ir.add("l", OpKind::Lerp);
        let o = ir.add("o", OpKind::Output);
        ir.connect(PortRef::new(a, 0), PortRef::new(l, 0));
        ir.connect(PortRef::new(b, 0), PortRef::new(l, 1));
        ir.connect(PortRef::new(t, 0), PortRef::new(l, 2));
        ir.connect(PortRef::new(l, 0), PortRef::new(o, 0));

        let rule = LOWERING_RULES
            .iter()
            .find(|r| r.target_kind == OpKind::Lerp)
            .unwrap();
        apply_rule(&mut ir, l, rule);

        assert!(ir.node(l).is_tombstone());
        let span = ir.find_by_id("l.span").unwrap();
        let scaled = ir.find_by_id("l.scaled").unwrap();
        let mix = ir.find_by_id("l.mix").unwrap();

        // span = b - a
        assert_eq!(ir.input_source(span, 0), Some(b));
        assert_eq!(ir.input_source(span, 1), Some(a));
        // scaled = span * t
        assert_eq!(ir.input_source(scaled, 0), Some(span));
        assert_eq!(ir.input_source(scaled, 1), Some(t));
        // o now reads the mix step
        assert_eq!(ir.input_source(o, 0), Some(mix));
        assert_eq!(ir.node(mix).kind, OpKind::Add);
    }

    #[test]
    fn test_magnitude_reuses_input_twice() {
        let mut ir = GraphIr::new();
        let v = ir.add("v", OpKind::Input);
        let m = ir.add("m", OpKind::Magnitude);
        ir.connect(PortRef::new(v, 0), PortRef::new(m, 0));

        let rule = LOWERING_RULES
            .iter()
            .find(|r| r.target_kind == OpKind::Magnitude)
            .unwrap();
        apply_rule(&mut ir, m, rule);

        let dot = ir.find_by_id("m.dot").unwrap();
        assert_eq!(ir.input_source(dot, 0), Some(v));
        assert_eq!(ir.input_source(dot, 1), Some(v));
        assert_eq!(ir.user_count(v), 2);
    }
}
