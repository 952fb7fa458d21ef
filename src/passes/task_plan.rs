//! # Task plan: scheduling, bindings, barriers, stride baking
//!
//! Walks the compute nodes in topological order and groups them into
//! tasks. A new task starts on the first node, on a domain change, on a
//! dispatch-strategy change, and unconditionally for two-pass-sync nodes.
//! Each task records its dispatch grid, its slice of the binding table
//! (one merged record per register, with access flags), and a barrier
//! flag when an instruction reads a register written earlier in the same
//! task.
//!
//! After grouping, every binding gets byte strides baked against its
//! task's domain: axis stride 0 where the operand broadcasts, the
//! contiguous element stride times the dtype size elsewhere.

use weft_isa::program::{
    BINDING_FLAG_READ, BINDING_FLAG_REDUCTION, BINDING_FLAG_WRITE, TASK_FLAG_BARRIER,
};
use weft_isa::{op_meta, Binding, DispatchStrategy, Grid, Task, MAX_DIMS, MAX_PORTS, MAX_REGISTERS};

use crate::diag::CompileResult;
use crate::ir::NodeIdx;
use crate::passes::PassCtx;

/// Fixed-size register bitset for within-task write tracking.
struct RegSet([u64; MAX_REGISTERS / 64]);

impl RegSet {
    fn new() -> RegSet {
        RegSet([0; MAX_REGISTERS / 64])
    }

    fn clear(&mut self) {
        self.0 = [0; MAX_REGISTERS / 64];
    }

    fn insert(&mut self, reg: u16) {
        let reg = reg as usize % MAX_REGISTERS;
        self.0[reg / 64] |= 1 << (reg % 64);
    }

    fn contains(&self, reg: u16) -> bool {
        let reg = reg as usize % MAX_REGISTERS;
        self.0[reg / 64] & (1 << (reg % 64)) != 0
    }
}

pub fn run(ctx: &mut PassCtx) -> CompileResult<()> {
    let compute: Vec<NodeIdx> = ctx.compute_sorted().collect();
    let ir = &*ctx.ir;

    let mut tasks: Vec<Task> = Vec::new();
    let mut bindings: Vec<Binding> = Vec::new();
    let mut instr_idx: u32 = 0;
    let mut last_domain: Option<NodeIdx> = None;
    let mut last_strategy = DispatchStrategy::Default;
    let mut written = RegSet::new();

    for &idx in &compute {
        let node = ir.node(idx);
        let meta = op_meta(node.kind);

        let domain_changed = node.domain != last_domain;
        let strategy_changed = meta.strategy != last_strategy;
        let is_sync = meta.strategy == DispatchStrategy::TwoPassSync;

        if tasks.is_empty() || domain_changed || strategy_changed || is_sync {
            if let Some(prev) = tasks.last_mut() {
                prev.inst_count = instr_idx - prev.start_inst;
            }
            let dom_idx = node.domain.unwrap_or(idx);
            let dom = ir.node(dom_idx);
            tasks.push(Task {
                start_inst: instr_idx,
                inst_count: 0,
                strategy: meta.strategy,
                flags: 0,
                domain_reg: dom.out_reg,
                binding_offset: bindings.len() as u32,
                binding_count: 0,
                grid: Grid::for_domain(&dom.out_info),
            });
            last_domain = node.domain;
            last_strategy = meta.strategy;
            written.clear();
        }

        // Operand registers: destination plus up to four sources.
        let mut regs: [Option<u16>; 5] = [Some(node.out_reg), None, None, None, None];
        for k in 0..MAX_PORTS {
            if meta.ports[k].is_none() {
                continue;
            }
            if let Some(src) = ir.input_source(idx, k) {
                regs[k + 1] = Some(ir.node(src).out_reg);
            }
        }

        // Reading a register written earlier in this task needs a barrier;
        // the write set resets so one task flags at most one hazard.
        for reg in regs.iter().skip(1).flatten() {
            if written.contains(*reg) {
                if let Some(task) = tasks.last_mut() {
                    task.flags |= TASK_FLAG_BARRIER;
                }
                written.clear();
                break;
            }
        }

        let task = match tasks.last_mut() {
            Some(task) => task,
            None => continue,
        };
        let offset = task.binding_offset as usize;
        for (k, reg) in regs.iter().enumerate() {
            let Some(reg) = *reg else { continue };
            let mut flags = if k == 0 {
                written.insert(reg);
                BINDING_FLAG_WRITE
            } else {
                BINDING_FLAG_READ
            };
            if k == 0 && meta.strategy == DispatchStrategy::Reduction {
                flags |= BINDING_FLAG_REDUCTION;
            }
            match bindings[offset..].iter_mut().find(|b| b.reg == reg) {
                Some(existing) => existing.flags |= flags,
                None => {
                    bindings.push(Binding {
                        reg,
                        flags,
                        strides: [0; MAX_DIMS],
                    });
                    task.binding_count += 1;
                }
            }
        }

        instr_idx += 1;
    }

    if let Some(prev) = tasks.last_mut() {
        prev.inst_count = instr_idx - prev.start_inst;
    }

    // Stride baking.
    for task in &tasks {
        let Some(dom_node) = ir.find_by_reg(task.domain_reg) else {
            continue;
        };
        let dom_info = ir.node(dom_node).out_info;
        let start = task.binding_offset as usize;
        let end = start + task.binding_count as usize;
        for binding in &mut bindings[start..end] {
            let Some(reg_node) = ir.find_by_reg(binding.reg) else {
                continue;
            };
            let info = ir.node(reg_node).out_info;
            let elem_strides = info.broadcast_strides(&dom_info);
            let size = match info.dtype.size() {
                0 => 4,
                s => s,
            } as i32;
            for d in 0..MAX_DIMS {
                binding.strides[d] = elem_strides[d] * size;
            }
        }
    }

    ctx.tasks = tasks;
    ctx.bindings = bindings;
    Ok(())
}
