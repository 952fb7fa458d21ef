//! # Analyze: shape and dtype inference
//!
//! Single forward pass over the topological order. For every live node:
//! resolve the output shape through the op's shape rule, resolve the
//! output dtype through its dtype rule (defaulting to `F32`), recompute
//! contiguous strides, then derive the domain element count, the spatial
//! flag, and generator inflation.
//!
//! Errors do not abort the scan: as many problems as fit the diagnostic
//! buffer are collected per run, and the pass driver fails the pipeline
//! afterwards.

use weft_isa::{
    op_meta, Dtype, DtypeRule, OpKind, ShapeRule, TypeInfo, MAX_DIMS, MAX_PORTS,
    OP_FLAG_FORCE_DOM, OP_FLAG_GENERATOR,
};

use crate::diag::CompileResult;
use crate::ir::{GraphIr, NodeIdx};
use crate::passes::PassCtx;

pub fn run(ctx: &mut PassCtx) -> CompileResult<()> {
    let sorted = ctx.sorted.clone();

    // Seed boundary nodes from their declared info before inference runs;
    // domain references may point at nodes that sort later.
    for &idx in &sorted {
        let node = ctx.ir.node_mut(idx);
        match node.kind {
            OpKind::Input | OpKind::Output | OpKind::Const => {
                let dtype = if node.const_info.dtype != Dtype::Unknown {
                    node.const_info.dtype
                } else {
                    node.out_info.dtype
                };
                node.out_info = node.const_info;
                node.out_info.dtype = dtype;
                node.out_info.calc_strides();
            }
            _ => {}
        }
    }

    let first_output = ctx
        .ir
        .live_indices()
        .find(|&i| ctx.ir.node(i).kind == OpKind::Output);

    for &idx in &sorted {
        analyze_node(ctx, idx, first_output);
    }
    Ok(())
}

struct InputView {
    idx: Option<NodeIdx>,
    info: TypeInfo,
    spatial: bool,
}

fn analyze_node(ctx: &mut PassCtx, idx: NodeIdx, first_output: Option<NodeIdx>) {
    let kind = ctx.ir.node(idx).kind;
    let meta = op_meta(kind);
    let loc = ctx.ir.node(idx).loc.clone();

    let mut inputs: [InputView; MAX_PORTS] = std::array::from_fn(|_| InputView {
        idx: None,
        info: TypeInfo::default(),
        spatial: false,
    });
    for (k, view) in inputs.iter_mut().enumerate() {
        if meta.ports[k].is_none() {
            continue;
        }
        if let Some(src) = ctx.ir.input_source(idx, k) {
            let src_node = ctx.ir.node(src);
            *view = InputView {
                idx: Some(src),
                info: src_node.out_info,
                spatial: src_node.is_spatial,
            };
        }
    }

    let mut out = ctx.ir.node(idx).out_info;

    // 1. Output shape.
    match meta.shape_rule {
        ShapeRule::Special => match kind {
            OpKind::Input => {
                if out.ndim == 0 {
                    if let Some(view) = inputs.first().filter(|v| v.idx.is_some()) {
                        out = view.info;
                    }
                }
            }
            OpKind::Output => {
                if out.ndim == 0 {
                    if let Some(view) = inputs.first().filter(|v| v.idx.is_some()) {
                        out = view.info;
                    }
                }
                if ctx.ir.node(idx).domain.is_none() {
                    if let Some(src) = inputs[0].idx {
                        let inherited = ctx.ir.node(src).domain.unwrap_or(src);
                        ctx.ir.node_mut(idx).domain = Some(inherited);
                    }
                }
            }
            _ => {}
        },
        ShapeRule::SameAsS1 => {
            if inputs[0].idx.is_none() {
                ctx.diag
                    .report(loc, format!("Missing input for {}", meta.name));
                return;
            }
            copy_shape(&mut out, &inputs[0].info);
        }
        ShapeRule::SameAsS2 => {
            if inputs[1].idx.is_none() {
                ctx.diag
                    .report(loc, format!("Missing second input for {}", meta.name));
                return;
            }
            copy_shape(&mut out, &inputs[1].info);
        }
        ShapeRule::Broadcast => {
            if inputs[0].idx.is_none() || inputs[1].idx.is_none() {
                ctx.diag
                    .report(loc, format!("Missing inputs for broadcast in {}", meta.name));
                return;
            }
            let Some(pair) = broadcast_or_report(ctx, &loc, &inputs[0].info, &inputs[1].info)
            else {
                return;
            };
            if inputs[2].idx.is_some() {
                let Some(all) = broadcast_or_report(ctx, &loc, &pair, &inputs[2].info) else {
                    return;
                };
                copy_shape(&mut out, &all);
            } else {
                copy_shape(&mut out, &pair);
            }
        }
        ShapeRule::MatMul => {
            if inputs[0].idx.is_none() || inputs[1].idx.is_none() {
                ctx.diag.report(loc, "Missing inputs for matmul");
                return;
            }
            let a = &inputs[0].info;
            let b = &inputs[1].info;
            if a.ndim < 2 || b.ndim < 2 {
                ctx.diag.report(
                    loc,
                    format!(
                        "MatMul inputs must be at least 2-D (got {}-D and {}-D)",
                        a.ndim, b.ndim
                    ),
                );
                return;
            }
            out.ndim = 2;
            out.shape[0] = a.shape[a.ndim as usize - 2];
            out.shape[1] = b.shape[b.ndim as usize - 1];
        }
        ShapeRule::Transpose => {
            if inputs[0].idx.is_none() {
                ctx.diag.report(loc, "Missing input for transpose");
                return;
            }
            copy_shape(&mut out, &inputs[0].info);
            if out.ndim >= 2 {
                let n = out.ndim as usize;
                out.shape.swap(n - 2, n - 1);
            }
        }
        ShapeRule::Dot => {
            if inputs[0].idx.is_none() {
                ctx.diag.report(loc, "Missing input for dot");
                return;
            }
            let a = &inputs[0].info;
            out.ndim = a.ndim.saturating_sub(1);
            for k in 0..out.ndim as usize {
                out.shape[k] = a.shape[k];
            }
        }
        ShapeRule::Join => {
            if inputs[0].idx.is_none() || inputs[1].idx.is_none() {
                ctx.diag.report(loc, "Missing inputs for join");
                return;
            }
            copy_shape(&mut out, &inputs[0].info);
            // The joined axis is the sum of every provided input's last
            // dimension; scalars contribute one lane each.
            let mut lanes = 0;
            for view in inputs.iter().filter(|v| v.idx.is_some()) {
                lanes += if view.info.ndim == 0 {
                    1
                } else {
                    view.info.shape[view.info.ndim as usize - 1]
                };
            }
            if out.ndim == 0 {
                out.ndim = 1;
            }
            out.shape[out.ndim as usize - 1] = lanes;
        }
        ShapeRule::Gather => {
            if inputs[1].idx.is_none() {
                ctx.diag.report(loc, "Missing indices for gather");
                return;
            }
            copy_shape(&mut out, &inputs[1].info);
        }
        ShapeRule::Reshape => {
            match constant_values(ctx.ir, inputs[1].idx) {
                Some(dims) => {
                    out.ndim = dims.len().min(MAX_DIMS) as u8;
                    for (k, d) in dims.iter().take(MAX_DIMS).enumerate() {
                        out.shape[k] = *d;
                    }
                }
                // No constant shape connected: the node is a pure alias.
                None => copy_shape(&mut out, &inputs[0].info),
            }
        }
        ShapeRule::Slice => match constant_values(ctx.ir, inputs[1].idx) {
            Some(range) if range.len() >= 2 => {
                out.ndim = 1;
                out.shape[0] = range[1];
            }
            _ => {
                ctx.diag.report(loc, "Slice needs a constant range input");
                return;
            }
        },
        ShapeRule::Scalar => {
            out.ndim = 0;
            out.shape[0] = 1;
        }
    }

    // 2. Output dtype.
    let mut dtype = match meta.out_rule {
        DtypeRule::ForceF32 => Dtype::F32,
        DtypeRule::ForceU8 => Dtype::U8,
        DtypeRule::ForceI32 => Dtype::I32,
        DtypeRule::SameAsInput => inputs[0].info.dtype,
        DtypeRule::SameAsInput2 => inputs[1].info.dtype,
        DtypeRule::Unspecified => Dtype::Unknown,
    };
    if dtype == Dtype::Unknown {
        dtype = if out.dtype != Dtype::Unknown {
            out.dtype
        } else {
            Dtype::F32
        };
    }
    out.dtype = dtype;

    // 3. Strides, domain and spatial analysis.
    out.calc_strides();
    ctx.ir.node_mut(idx).out_info = out;

    let is_generator = meta.flags & OP_FLAG_GENERATOR != 0;
    let dom_idx = match ctx.ir.node(idx).domain {
        Some(d) => d,
        None if is_generator => first_output.unwrap_or(idx),
        None => idx,
    };
    let dom_info = ctx.ir.node(dom_idx).out_info;
    let task_cnt = dom_info.element_count();

    let has_spatial_input = inputs.iter().any(|v| v.spatial);
    ctx.ir.node_mut(idx).is_spatial = task_cnt > 1 || is_generator || has_spatial_input;

    // Generators inflate to their domain so they yield a full stream.
    if is_generator && task_cnt > 1 && meta.flags & OP_FLAG_FORCE_DOM == 0 {
        let node = ctx.ir.node_mut(idx);
        node.out_info.ndim = dom_info.ndim;
        node.out_info.shape = dom_info.shape;
        node.out_info.calc_strides();
    }
}

fn copy_shape(out: &mut TypeInfo, from: &TypeInfo) {
    out.ndim = from.ndim;
    out.shape = from.shape;
}

fn broadcast_or_report(
    ctx: &mut PassCtx,
    loc: &weft_ast::SourceLoc,
    a: &TypeInfo,
    b: &TypeInfo,
) -> Option<TypeInfo> {
    match TypeInfo::broadcast(a, b) {
        Some(out) => Some(out),
        None => {
            ctx.diag.report(
                loc.clone(),
                format!(
                    "Incompatible shapes for broadcast: {} vs {}",
                    a.format_shape(),
                    b.format_shape()
                ),
            );
            None
        }
    }
}

/// Integer values of a constant vector input (reshape shapes, slice
/// ranges). Accepts `I32` and `F32` payloads.
fn constant_values(ir: &GraphIr, input: Option<NodeIdx>) -> Option<Vec<i32>> {
    let node = ir.node(input?);
    let data = node.const_data.as_ref()?;
    let count = node.const_info.element_count();
    let mut values = Vec::with_capacity(count);
    match node.const_info.dtype {
        Dtype::I32 => {
            for chunk in data.chunks_exact(4).take(count) {
                values.push(i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
            }
        }
        Dtype::F32 => {
            for chunk in data.chunks_exact(4).take(count) {
                values.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as i32);
            }
        }
        _ => return None,
    }
    Some(values)
}
