//! # Emit: Program assembly
//!
//! Final stage of a compilation: folds the analysed graph and the task
//! plan into the `weft_isa::Program` a cartridge section serialises.
//!
//! ```text
//! PassCtx {ir, sorted, tasks, bindings} -> [Emit] -> Program
//! ```
//!
//! - one symbol per live node with an id (`output` symbols redirect to
//!   their producer's register),
//! - one tensor descriptor per register, with alias/constant/reduction
//!   flags,
//! - scalar constants packed into the push-constant block in register
//!   order, non-scalar constant payloads kept per register,
//! - one instruction per compute node in topological order.

use weft_isa::program::{
    fnv1a_hash, RESOURCE_FLAG_MASK, SYMBOL_FLAG_INPUT, SYMBOL_FLAG_OUTPUT, SYNC_SCRATCH_SIZE,
    TENSOR_FLAG_ALIAS, TENSOR_FLAG_CONSTANT, TENSOR_FLAG_REDUCTION,
};
use weft_isa::{
    op_meta, DispatchStrategy, Instruction, OpKind, Program, Symbol, TensorDesc, MAX_PORTS,
    MAX_REGISTERS, REG_NONE,
};

use crate::ir::NodeIdx;
use crate::passes::PassCtx;

pub fn emit(ctx: &PassCtx) -> Program {
    let ir = &*ctx.ir;
    let live: Vec<NodeIdx> = ir.live_indices().collect();

    let tensor_count = live
        .iter()
        .filter(|&&i| ir.node(i).out_reg != REG_NONE)
        .map(|&i| ir.node(i).out_reg as usize + 1)
        .max()
        .unwrap_or(0);

    let mut tensors = vec![TensorDesc::default(); tensor_count];
    let mut symbols = Vec::new();

    for &idx in &live {
        let node = ir.node(idx);
        let reg = node.out_reg;
        if reg != REG_NONE {
            tensors[reg as usize].info = node.out_info;
        }

        if !node.id.is_empty() {
            let mut flags = u16::from(node.resource_flags & RESOURCE_FLAG_MASK);
            let mut target = reg;
            match node.kind {
                OpKind::Input => flags |= SYMBOL_FLAG_INPUT,
                OpKind::Output => {
                    flags |= SYMBOL_FLAG_OUTPUT;
                    if let Some(src) = ir.input_source(idx, 0) {
                        target = ir.node(src).out_reg;
                    }
                }
                _ => {}
            }
            symbols.push(Symbol {
                name: node.id.clone(),
                name_hash: fnv1a_hash(&node.id),
                register: target,
                flags,
            });
            if matches!(node.kind, OpKind::Input | OpKind::Output) && target != REG_NONE {
                // I/O registers are externally visible storage.
                tensors[target as usize].flags |= TENSOR_FLAG_ALIAS;
            }
        }
    }

    // Constants: scalars go into the push-constant block in register
    // order, larger payloads ride along per register.
    let mut const_nodes: Vec<NodeIdx> = live
        .iter()
        .copied()
        .filter(|&i| ir.node(i).kind == OpKind::Const && ir.node(i).out_reg != REG_NONE)
        .collect();
    const_nodes.sort_by_key(|&i| ir.node(i).out_reg);

    let mut push_constants = Vec::new();
    for idx in const_nodes {
        let node = ir.node(idx);
        let reg = node.out_reg as usize;
        tensors[reg].flags |= TENSOR_FLAG_CONSTANT;
        let Some(data) = &node.const_data else { continue };
        if node.const_info.ndim == 0 {
            tensors[reg].push_offset = Some(push_constants.len() as u32);
            push_constants.extend_from_slice(data);
        } else {
            tensors[reg].data = Some(data.clone());
        }
    }

    // Instructions, in compute-filtered topological order.
    let mut instructions = Vec::new();
    let mut needs_sync = false;
    for idx in ctx.compute_sorted() {
        let node = ir.node(idx);
        let meta = op_meta(node.kind);

        if meta.strategy == DispatchStrategy::TwoPassSync {
            needs_sync = true;
        }
        if meta.strategy == DispatchStrategy::Reduction && node.out_reg != REG_NONE {
            tensors[node.out_reg as usize].flags |= TENSOR_FLAG_REDUCTION;
        }

        let mut srcs = [REG_NONE; MAX_PORTS];
        for (k, src_reg) in srcs.iter_mut().enumerate() {
            if meta.ports[k].is_none() {
                continue;
            }
            if let Some(src) = ir.input_source(idx, k) {
                *src_reg = ir.node(src).out_reg;
            }
        }

        instructions.push(Instruction {
            opcode: node.kind,
            dst: node.out_reg,
            srcs,
            line: node.loc.line.min(u16::MAX as u32) as u16,
            column: node.loc.column.min(u16::MAX as u32) as u16,
        });
    }

    let has_reduction_task = ctx
        .tasks
        .iter()
        .any(|t| t.strategy == DispatchStrategy::Reduction);

    Program {
        instructions,
        symbols,
        tasks: ctx.tasks.clone(),
        bindings: ctx.bindings.clone(),
        tensors,
        push_constants,
        sync_scratch_size: if needs_sync { SYNC_SCRATCH_SIZE } else { 0 },
        reduction_scratch_size: if has_reduction_task {
            (MAX_REGISTERS * 4) as u32
        } else {
            0
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::ir::{GraphIr, PortRef};
    use crate::passes::run_pipeline;
    use weft_isa::{Dtype, TypeInfo};

    fn compile_ir(ir: &mut GraphIr) -> Program {
        let mut diag = Diagnostics::new();
        let mut ctx = PassCtx::new(ir, "test.json".into(), &mut diag);
        run_pipeline(&mut ctx).unwrap();
        emit(&ctx)
    }

    #[test]
    fn test_empty_graph_emits_empty_program() {
        let mut ir = GraphIr::new();
        let prog = compile_ir(&mut ir);
        assert!(prog.instructions.is_empty());
        assert!(prog.tasks.is_empty());
        assert!(prog.symbols.is_empty());
        assert!(prog.tensors.is_empty());
        assert_eq!(prog.sync_scratch_size, 0);
    }

    #[test]
    fn test_passthrough_output_aliases_input() {
        let mut ir = GraphIr::new();
        let x = ir.add("x", OpKind::Input);
        ir.node_mut(x).const_info = TypeInfo::with_shape(Dtype::F32, &[4]);
        let o = ir.add("o", OpKind::Output);
        ir.connect(PortRef::new(x, 0), PortRef::new(o, 0));

        let prog = compile_ir(&mut ir);
        assert!(prog.instructions.is_empty());
        let x_sym = prog.symbols.iter().find(|s| s.name == "x").unwrap();
        let o_sym = prog.symbols.iter().find(|s| s.name == "o").unwrap();
        assert_eq!(x_sym.register, o_sym.register);
        assert_ne!(
            prog.tensors[o_sym.register as usize].flags & TENSOR_FLAG_ALIAS,
            0
        );
    }

    #[test]
    fn test_scalar_const_lands_in_push_block() {
        let mut ir = GraphIr::new();
        let x = ir.add("x", OpKind::Input);
        ir.node_mut(x).const_info = TypeInfo::with_shape(Dtype::F32, &[4]);
        let k = ir.add("k", OpKind::Const);
        {
            let n = ir.node_mut(k);
            n.const_info = TypeInfo::scalar(Dtype::F32);
            n.const_data = Some(2.5f32.to_le_bytes().to_vec());
        }
        let m = ir.add("m", OpKind::Mul);
        let o = ir.add("o", OpKind::Output);
        ir.connect(PortRef::new(x, 0), PortRef::new(m, 0));
        ir.connect(PortRef::new(k, 0), PortRef::new(m, 1));
        ir.connect(PortRef::new(m, 0), PortRef::new(o, 0));

        let prog = compile_ir(&mut ir);
        assert_eq!(prog.push_constants.len(), 4);
        let k_sym = prog.symbols.iter().find(|s| s.name == "k").unwrap();
        let desc = &prog.tensors[k_sym.register as usize];
        assert_eq!(desc.push_offset, Some(0));
        assert_ne!(desc.flags & TENSOR_FLAG_CONSTANT, 0);
        assert!(desc.data.is_none());
    }

    #[test]
    fn test_instruction_operands_reference_registers() {
        let mut ir = GraphIr::new();
        let a = ir.add("a", OpKind::Input);
        ir.node_mut(a).const_info = TypeInfo::with_shape(Dtype::F32, &[4]);
        let b = ir.add("b", OpKind::Input);
        ir.node_mut(b).const_info = TypeInfo::with_shape(Dtype::F32, &[4]);
        let c = ir.add("c", OpKind::Add);
        let o = ir.add("o", OpKind::Output);
        ir.connect(PortRef::new(a, 0), PortRef::new(c, 0));
        ir.connect(PortRef::new(b, 0), PortRef::new(c, 1));
        ir.connect(PortRef::new(c, 0), PortRef::new(o, 0));

        let prog = compile_ir(&mut ir);
        assert_eq!(prog.instructions.len(), 1);
        let inst = &prog.instructions[0];
        assert_eq!(inst.opcode, OpKind::Add);
        let a_reg = prog.symbols.iter().find(|s| s.name == "a").unwrap().register;
        let b_reg = prog.symbols.iter().find(|s| s.name == "b").unwrap().register;
        assert_eq!(inst.srcs[0], a_reg);
        assert_eq!(inst.srcs[1], b_reg);
        assert_eq!(inst.srcs[2], REG_NONE);
    }
}
