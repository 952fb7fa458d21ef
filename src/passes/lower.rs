//! # Lower: AST -> IR
//!
//! Turns the untyped manifest AST into the graph IR: resolves every
//! surface `type` string to an opcode (metadata name, alias table, or an
//! import providing a subgraph), walks each node's attribute bag through
//! a dispatch table, resolves `domain` references in a second pass, and
//! materialises links through the graph builder.
//!
//! Attribute keys are processed in table order, so `shape` and `dtype`
//! are always applied before `value` regardless of their order in the
//! manifest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use weft_ast::AstGraph;
use weft_isa::program::{
    RESOURCE_FLAG_OUTPUT, RESOURCE_FLAG_PERSISTENT, RESOURCE_FLAG_READONLY,
    RESOURCE_FLAG_SCREEN_SIZE,
};
use weft_isa::{op_from_name, port_index, Dtype, OpKind, MAX_DIMS};

use crate::diag::{CompileResult, Diagnostics};
use crate::ir::{GraphIr, NodeIdx, PortRef};
use crate::rules::TYPE_ALIASES;

/// Lower a parsed manifest into `ir`. `strict_inputs` requires every
/// `input` node to declare a shape; subgraph files are lowered without it
/// because their inputs take the caller's shape when inlined.
pub fn run(
    ast: &AstGraph,
    ir: &mut GraphIr,
    diag: &mut Diagnostics,
    strict_inputs: bool,
) -> CompileResult<()> {
    ir.settings = ast.settings.clone();
    let base_dir = ast.path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut by_id: HashMap<&str, NodeIdx> = HashMap::new();

    for node in &ast.nodes {
        let mut sub_path = None;
        let kind = match resolve_type(&node.ty) {
            Some(kind) => kind,
            None => match find_import_for_type(ast, &node.ty, &base_dir) {
                Some(path) => {
                    sub_path = Some(path);
                    OpKind::Call
                }
                None => {
                    diag.report(
                        node.loc.clone(),
                        format!(
                            "Unknown type '{}' not in ISA and not in imports",
                            node.ty
                        ),
                    );
                    return Ok(());
                }
            },
        };

        let idx = ir.add(node.id.clone(), kind);
        {
            let n = ir.node_mut(idx);
            n.loc = node.loc.clone();
            n.sub_graph_path = sub_path;
        }
        by_id.insert(node.id.as_str(), idx);

        if strict_inputs && kind == OpKind::Input && !node.attrs.contains_key("shape") {
            diag.report(
                node.loc.clone(),
                format!("Input '{}' is missing required 'shape' attribute", node.id),
            );
            return Ok(());
        }

        if !apply_attrs(ir, idx, &node.attrs, &base_dir, diag) {
            return Ok(());
        }
    }

    // Second pass: domains can reference nodes declared later.
    for (i, node) in ast.nodes.iter().enumerate() {
        if let Some(Value::String(domain_id)) = node.attrs.get("domain") {
            match by_id.get(domain_id.as_str()) {
                Some(&target) => ir.node_mut(i as NodeIdx).domain = Some(target),
                None => {
                    diag.report(
                        node.loc.clone(),
                        format!("Unresolved domain '{}' on node '{}'", domain_id, node.id),
                    );
                    return Ok(());
                }
            }
        }
    }

    for link in &ast.links {
        let (Some(&src), Some(&dst)) = (by_id.get(link.src.as_str()), by_id.get(link.dst.as_str()))
        else {
            let missing = if by_id.contains_key(link.src.as_str()) {
                &link.dst
            } else {
                &link.src
            };
            diag.report(
                ast.loc_of(missing),
                format!("Link references unknown node '{missing}'"),
            );
            return Ok(());
        };
        let src_port = port_index(ir.node(src).kind, &link.src_port).unwrap_or(0);
        let dst_port = port_index(ir.node(dst).kind, &link.dst_port).unwrap_or(0);
        ir.connect(PortRef::new(src, src_port), PortRef::new(dst, dst_port));
    }

    Ok(())
}

fn resolve_type(ty: &str) -> Option<OpKind> {
    op_from_name(ty).or_else(|| {
        TYPE_ALIASES
            .iter()
            .find(|(alias, _)| *alias == ty)
            .map(|&(_, kind)| kind)
    })
}

/// Match a surface type name against the basename (without extension) of
/// each import, returning the resolved subgraph path.
fn find_import_for_type(ast: &AstGraph, ty: &str, base_dir: &Path) -> Option<PathBuf> {
    for import in &ast.imports {
        let path = Path::new(import);
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem == ty {
            return Some(if path.is_absolute() {
                path.to_path_buf()
            } else {
                base_dir.join(path)
            });
        }
    }
    None
}

type AttrHandler = fn(&mut GraphIr, NodeIdx, &Value, &Path) -> bool;

/// Dispatch table; order is processing order. `meta` and `domain` are
/// structural keys handled outside the table.
static ATTR_HANDLERS: &[(&str, AttrHandler)] = &[
    ("shape", handle_shape),
    ("dtype", handle_dtype),
    ("readonly", handle_readonly),
    ("persistent", handle_persistent),
    ("screen_size", handle_screen_size),
    ("output", handle_output_flag),
    ("path", handle_path),
    ("axis", handle_axis),
    ("value", handle_value),
];

fn apply_attrs(
    ir: &mut GraphIr,
    idx: NodeIdx,
    attrs: &Map<String, Value>,
    base_dir: &Path,
    diag: &mut Diagnostics,
) -> bool {
    for (key, handler) in ATTR_HANDLERS {
        if let Some(value) = attrs.get(*key) {
            if !handler(ir, idx, value, base_dir) {
                let node = ir.node(idx);
                diag.report(
                    node.loc.clone(),
                    format!("Invalid value for attribute '{}' on node '{}'", key, node.id),
                );
                return false;
            }
        }
    }

    if let Some(Value::Object(meta)) = attrs.get("meta") {
        if !apply_attrs(ir, idx, meta, base_dir, diag) {
            return false;
        }
    }

    for key in attrs.keys() {
        let known = ATTR_HANDLERS.iter().any(|(k, _)| k == key)
            || matches!(key.as_str(), "meta" | "domain" | "name");
        if !known {
            let node = ir.node(idx);
            diag.warn(
                node.loc.clone(),
                format!("Unknown attribute '{}' for node '{}'", key, node.id),
            );
        }
    }
    true
}

fn handle_shape(ir: &mut GraphIr, idx: NodeIdx, val: &Value, _base: &Path) -> bool {
    let Value::Array(items) = val else { return false };
    let node = ir.node_mut(idx);
    node.const_info.ndim = items.len().min(MAX_DIMS) as u8;
    for (i, item) in items.iter().take(MAX_DIMS).enumerate() {
        let Some(d) = item.as_i64() else { return false };
        node.const_info.shape[i] = d as i32;
    }
    node.const_info.calc_strides();
    if matches!(node.kind, OpKind::Input | OpKind::Output | OpKind::Const) {
        let dtype = node.out_info.dtype;
        node.out_info = node.const_info;
        if node.out_info.dtype == Dtype::Unknown {
            node.out_info.dtype = dtype;
        }
    }
    true
}

fn handle_dtype(ir: &mut GraphIr, idx: NodeIdx, val: &Value, _base: &Path) -> bool {
    let Some(s) = val.as_str() else { return false };
    let Some(dtype) = Dtype::from_str(s) else { return false };
    let node = ir.node_mut(idx);
    node.const_info.dtype = dtype;
    node.out_info.dtype = dtype;
    true
}

fn handle_readonly(ir: &mut GraphIr, idx: NodeIdx, val: &Value, _base: &Path) -> bool {
    if val.as_bool() == Some(true) {
        ir.node_mut(idx).resource_flags |= RESOURCE_FLAG_READONLY;
    }
    true
}

fn handle_persistent(ir: &mut GraphIr, idx: NodeIdx, val: &Value, _base: &Path) -> bool {
    if val.as_bool() == Some(true) {
        ir.node_mut(idx).resource_flags |= RESOURCE_FLAG_PERSISTENT;
    }
    true
}

fn handle_screen_size(ir: &mut GraphIr, idx: NodeIdx, val: &Value, _base: &Path) -> bool {
    if val.as_bool() == Some(true) {
        ir.node_mut(idx).resource_flags |= RESOURCE_FLAG_SCREEN_SIZE;
    }
    true
}

fn handle_output_flag(ir: &mut GraphIr, idx: NodeIdx, val: &Value, _base: &Path) -> bool {
    if val.as_bool() == Some(true) {
        ir.node_mut(idx).resource_flags |= RESOURCE_FLAG_OUTPUT;
    }
    true
}

fn handle_path(ir: &mut GraphIr, idx: NodeIdx, val: &Value, base: &Path) -> bool {
    let Some(s) = val.as_str() else { return false };
    let path = Path::new(s);
    ir.node_mut(idx).sub_graph_path = Some(if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    });
    true
}

fn handle_axis(ir: &mut GraphIr, idx: NodeIdx, val: &Value, _base: &Path) -> bool {
    let node = ir.node_mut(idx);
    if !matches!(node.kind, OpKind::IndexX | OpKind::IndexY | OpKind::IndexZ) {
        return true;
    }
    node.kind = match val.as_i64() {
        Some(1) => OpKind::IndexY,
        Some(2) => OpKind::IndexZ,
        _ => OpKind::IndexX,
    };
    true
}

fn handle_value(ir: &mut GraphIr, idx: NodeIdx, val: &Value, _base: &Path) -> bool {
    let node = ir.node_mut(idx);
    if node.const_info.dtype == Dtype::Unknown {
        node.const_info.dtype = Dtype::F32;
    }
    if node.const_info.ndim == 0 {
        if let Value::Array(items) = val {
            node.const_info.ndim = 1;
            node.const_info.shape[0] = items.len() as i32;
            node.const_info.calc_strides();
        }
    }
    node.out_info = node.const_info;

    let count = node.const_info.element_count().max(1);
    match parse_payload(val, node.const_info.dtype, count) {
        Some(bytes) => {
            node.const_data = Some(bytes);
            true
        }
        None => false,
    }
}

/// Serialise a JSON number or number array into a little-endian element
/// buffer of `count` elements; missing trailing elements are zero.
fn parse_payload(val: &Value, dtype: Dtype, count: usize) -> Option<Vec<u8>> {
    let mut bytes = vec![0u8; count * dtype.size().max(1)];
    let mut write = |i: usize, n: f64, bytes: &mut Vec<u8>| {
        match dtype {
            Dtype::F32 => {
                bytes[i * 4..i * 4 + 4].copy_from_slice(&(n as f32).to_le_bytes());
            }
            Dtype::I32 => {
                bytes[i * 4..i * 4 + 4].copy_from_slice(&(n as i32).to_le_bytes());
            }
            Dtype::U8 => bytes[i] = n as u8,
            Dtype::Unknown => {}
        }
    };
    match val {
        Value::Number(n) => write(0, n.as_f64()?, &mut bytes),
        Value::Array(items) => {
            for (i, item) in items.iter().take(count).enumerate() {
                write(i, item.as_f64()?, &mut bytes);
            }
        }
        _ => return None,
    }
    Some(bytes)
}
