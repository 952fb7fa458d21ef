//! # Sort: topological ordering
//!
//! Depth-first post-order over data-dependency edges, iterative with an
//! explicit stack, tri-colour marking for cycle detection. The result
//! lists every live node with producers before consumers; the compute
//! filter applied by later passes derives from it.

use weft_isa::MAX_PORTS;

use crate::diag::CompileResult;
use crate::ir::{NodeIdx, PortRef};
use crate::passes::PassCtx;

const WHITE: u8 = 0;
const GREY: u8 = 1;
const BLACK: u8 = 2;

pub fn run(ctx: &mut PassCtx) -> CompileResult<()> {
    let count = ctx.ir.len();
    let mut color = vec![WHITE; count];
    let mut order: Vec<NodeIdx> = Vec::with_capacity(count);

    for root in 0..count {
        if ctx.ir.node(root as NodeIdx).is_tombstone() || color[root] != WHITE {
            continue;
        }
        color[root] = GREY;
        let mut stack: Vec<(NodeIdx, usize)> = vec![(root as NodeIdx, 0)];

        while let Some(&(idx, port)) = stack.last() {
            if port < MAX_PORTS {
                if let Some(frame) = stack.last_mut() {
                    frame.1 += 1;
                }
                if let Some(src) = ctx.ir.source(PortRef::new(idx, port)) {
                    match color[src.node as usize] {
                        WHITE => {
                            color[src.node as usize] = GREY;
                            stack.push((src.node, 0));
                        }
                        GREY => {
                            let node = ctx.ir.node(src.node);
                            ctx.diag.report(
                                node.loc.clone(),
                                format!("cycle detected involving node '{}'", node.id),
                            );
                            return Ok(());
                        }
                        _ => {}
                    }
                }
            } else {
                color[idx as usize] = BLACK;
                order.push(idx);
                stack.pop();
            }
        }
    }

    ctx.sorted = order;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::ir::GraphIr;
    use weft_isa::OpKind;

    fn sort_of(ir: &mut GraphIr) -> (Vec<NodeIdx>, bool) {
        let mut diag = Diagnostics::new();
        let mut ctx = PassCtx::new(ir, "test.json".into(), &mut diag);
        run(&mut ctx).unwrap();
        let sorted = ctx.sorted.clone();
        (sorted, diag.has_errors())
    }

    #[test]
    fn test_producers_precede_consumers() {
        let mut ir = GraphIr::new();
        let a = ir.add("a", OpKind::Input);
        let b = ir.add("b", OpKind::Input);
        let c = ir.add("c", OpKind::Add);
        let o = ir.add("o", OpKind::Output);
        ir.connect(PortRef::new(a, 0), PortRef::new(c, 0));
        ir.connect(PortRef::new(b, 0), PortRef::new(c, 1));
        ir.connect(PortRef::new(c, 0), PortRef::new(o, 0));

        let (sorted, failed) = sort_of(&mut ir);
        assert!(!failed);
        assert_eq!(sorted.len(), 4);
        let pos = |n: NodeIdx| sorted.iter().position(|&x| x == n).unwrap();
        assert!(pos(a) < pos(c));
        assert!(pos(b) < pos(c));
        assert!(pos(c) < pos(o));
    }

    #[test]
    fn test_sort_is_stable_when_rerun() {
        let mut ir = GraphIr::new();
        let a = ir.add("a", OpKind::Input);
        let c = ir.add("c", OpKind::Abs);
        ir.connect(PortRef::new(a, 0), PortRef::new(c, 0));

        let (first, _) = sort_of(&mut ir);
        let (second, _) = sort_of(&mut ir);
        assert_eq!(first, second);
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut ir = GraphIr::new();
        let x = ir.add("x", OpKind::Add);
        let y = ir.add("y", OpKind::Add);
        ir.connect(PortRef::new(x, 0), PortRef::new(y, 0));
        ir.connect(PortRef::new(y, 0), PortRef::new(x, 0));

        let mut diag = Diagnostics::new();
        let mut ctx = PassCtx::new(&mut ir, "test.json".into(), &mut diag);
        run(&mut ctx).unwrap();
        assert!(diag.has_errors());
        assert!(diag.entries()[0].message.contains("cycle detected"));
    }

    #[test]
    fn test_tombstones_are_skipped() {
        let mut ir = GraphIr::new();
        let a = ir.add("a", OpKind::Input);
        let dead = ir.add("dead", OpKind::Abs);
        ir.remove(dead);

        let (sorted, _) = sort_of(&mut ir);
        assert_eq!(sorted, vec![a]);
    }
}
