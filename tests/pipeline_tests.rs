//! End-to-end pipeline tests
//!
//! Compile real manifest files from a temp directory through the full
//! pass pipeline and check the emitted programs and cartridges.

use std::fs;
use std::path::{Path, PathBuf};

use weft::cartridge::{encode_cartridge, Section, CARTRIDGE_MAGIC};
use weft::{compile, load_graph, Diagnostics, Program};
use weft_isa::program::{SYMBOL_FLAG_OUTPUT, TENSOR_FLAG_ALIAS};
use weft_isa::{DispatchStrategy, OpKind, REG_NONE};

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

fn compile_file(path: &Path) -> Result<Program, Diagnostics> {
    let mut diag = Diagnostics::new();
    let result = load_graph(path, &mut diag)
        .and_then(|mut ir| compile(&mut ir, path, &mut diag));
    match result {
        Ok(program) if !diag.has_errors() => Ok(program),
        _ => Err(diag),
    }
}

fn reg_of(program: &Program, name: &str) -> u16 {
    program
        .symbols
        .iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("no symbol '{name}'"))
        .register
}

#[test]
fn test_scalar_add_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "add.json",
        r#"{ "nodes": [
             { "id": "a", "type": "input", "shape": [4], "dtype": "f32" },
             { "id": "b", "type": "input", "shape": [4], "dtype": "f32" },
             { "id": "c", "type": "add" },
             { "id": "o", "type": "output" } ],
            "links": [
             { "src": "a", "dst": "c", "dst_port": "a" },
             { "src": "b", "dst": "c", "dst_port": "b" },
             { "src": "c", "dst": "o" } ] }"#,
    );
    let program = compile_file(&path).unwrap();

    assert_eq!(program.instructions.len(), 1);
    assert_eq!(program.instructions[0].opcode, OpKind::Add);
    assert_eq!(program.tasks.len(), 1);
    let task = &program.tasks[0];
    assert_eq!(task.inst_count, 1);
    assert_eq!(task.grid.dims[0], 1);
    assert_eq!(task.grid.tile_shape[0], 4);
    assert_eq!(task.grid.total_tiles, 1);

    // The output symbol resolves to the add's register.
    assert_eq!(reg_of(&program, "o"), program.instructions[0].dst);
    let o_sym = program.symbols.iter().find(|s| s.name == "o").unwrap();
    assert_ne!(o_sym.flags & SYMBOL_FLAG_OUTPUT, 0);
}

#[test]
fn test_fma_fusion_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "fma.json",
        r#"{ "nodes": [
             { "id": "a", "type": "input", "shape": [8], "dtype": "f32" },
             { "id": "b", "type": "input", "shape": [8], "dtype": "f32" },
             { "id": "c", "type": "input", "shape": [8], "dtype": "f32" },
             { "id": "m", "type": "mul" },
             { "id": "n", "type": "add" },
             { "id": "o", "type": "output" } ],
            "links": [
             { "src": "a", "dst": "m", "dst_port": "a" },
             { "src": "b", "dst": "m", "dst_port": "b" },
             { "src": "m", "dst": "n", "dst_port": "a" },
             { "src": "c", "dst": "n", "dst_port": "b" },
             { "src": "n", "dst": "o" } ] }"#,
    );
    let program = compile_file(&path).unwrap();

    assert_eq!(program.instructions.len(), 1);
    let inst = &program.instructions[0];
    assert_eq!(inst.opcode, OpKind::Fma);
    assert_eq!(inst.srcs[0], reg_of(&program, "a"));
    assert_eq!(inst.srcs[1], reg_of(&program, "b"));
    assert_eq!(inst.srcs[2], reg_of(&program, "c"));
}

#[test]
fn test_reshape_aliases_and_emits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "reshape.json",
        r#"{ "nodes": [
             { "id": "x", "type": "input", "shape": [2, 6], "dtype": "f32" },
             { "id": "dims", "type": "const", "dtype": "i32", "value": [3, 4] },
             { "id": "r", "type": "reshape" },
             { "id": "s", "type": "sqrt" },
             { "id": "o", "type": "output" } ],
            "links": [
             { "src": "x", "dst": "r", "dst_port": "in" },
             { "src": "dims", "dst": "r", "dst_port": "shape" },
             { "src": "r", "dst": "s" },
             { "src": "s", "dst": "o" } ] }"#,
    );
    let program = compile_file(&path).unwrap();

    // Only the sqrt computes; the reshape is a free view of x.
    assert_eq!(program.instructions.len(), 1);
    assert_eq!(program.instructions[0].opcode, OpKind::Sqrt);
    assert_eq!(program.instructions[0].srcs[0], reg_of(&program, "x"));
    assert_eq!(reg_of(&program, "r"), reg_of(&program, "x"));
}

#[test]
fn test_subgraph_inline_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "lib/norm.json",
        r#"{ "nodes": [
             { "id": "in", "type": "input" },
             { "id": "s", "type": "sqrt" },
             { "id": "out", "type": "output" } ],
            "links": [
             { "src": "in", "dst": "s" },
             { "src": "s", "dst": "out" } ] }"#,
    );
    let path = write_file(
        dir.path(),
        "host.json",
        r#"{ "imports": ["lib/norm.json"],
            "nodes": [
             { "id": "x", "type": "input", "shape": [4], "dtype": "f32" },
             { "id": "n", "type": "norm" },
             { "id": "o", "type": "output" } ],
            "links": [
             { "src": "x", "dst": "n" },
             { "src": "n", "dst": "o" } ] }"#,
    );
    let program = compile_file(&path).unwrap();

    assert_eq!(program.instructions.len(), 1);
    assert_eq!(program.instructions[0].opcode, OpKind::Sqrt);
    assert_eq!(program.instructions[0].srcs[0], reg_of(&program, "x"));
    // Grafted body nodes carry the call id prefix; boundaries are gone.
    assert!(program.symbols.iter().any(|s| s.name == "n::s"));
    assert!(!program.symbols.iter().any(|s| s.name == "n::in"));
    assert_eq!(reg_of(&program, "o"), reg_of(&program, "n::s"));
}

#[test]
fn test_broadcast_pair_semantics() {
    let dir = tempfile::tempdir().unwrap();
    // [3,1] + [1,2] broadcasts to [3,2].
    let good = write_file(
        dir.path(),
        "good.json",
        r#"{ "nodes": [
             { "id": "a", "type": "input", "shape": [3, 1], "dtype": "f32" },
             { "id": "b", "type": "input", "shape": [1, 2], "dtype": "f32" },
             { "id": "c", "type": "add" },
             { "id": "o", "type": "output" } ],
            "links": [
             { "src": "a", "dst": "c", "dst_port": "a" },
             { "src": "b", "dst": "c", "dst_port": "b" },
             { "src": "c", "dst": "o" } ] }"#,
    );
    let program = compile_file(&good).unwrap();
    let c_reg = reg_of(&program, "c");
    let info = &program.tensors[c_reg as usize].info;
    assert_eq!(&info.shape[..2], &[3, 2]);

    // [3,1] + [4,2] cannot broadcast on the leading axis.
    let bad = write_file(
        dir.path(),
        "bad.json",
        r#"{ "nodes": [
             { "id": "a", "type": "input", "shape": [3, 1], "dtype": "f32" },
             { "id": "b", "type": "input", "shape": [4, 2], "dtype": "f32" },
             { "id": "c", "type": "add" },
             { "id": "o", "type": "output" } ],
            "links": [
             { "src": "a", "dst": "c", "dst_port": "a" },
             { "src": "b", "dst": "c", "dst_port": "b" },
             { "src": "c", "dst": "o" } ] }"#,
    );
    let diag = compile_file(&bad).unwrap_err();
    assert!(diag
        .entries()
        .iter()
        .any(|d| d.message.contains("Incompatible shapes for broadcast: [3, 1] vs [4, 2]")));
}

#[test]
fn test_cycle_aborts_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "cycle.json",
        r#"{ "nodes": [
             { "id": "x", "type": "neg" },
             { "id": "y", "type": "neg" } ],
            "links": [
             { "src": "x", "dst": "y" },
             { "src": "y", "dst": "x" } ] }"#,
    );
    let diag = compile_file(&path).unwrap_err();
    assert!(diag
        .entries()
        .iter()
        .any(|d| d.message.contains("cycle detected")));
}

#[test]
fn test_reduction_pipeline_scratch_and_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "reduce.json",
        r#"{ "nodes": [
             { "id": "x", "type": "input", "shape": [16], "dtype": "f32" },
             { "id": "y", "type": "input", "shape": [3], "dtype": "f32" },
             { "id": "s", "type": "sum" },
             { "id": "c", "type": "add" },
             { "id": "o", "type": "output" } ],
            "links": [
             { "src": "x", "dst": "s" },
             { "src": "s", "dst": "c", "dst_port": "a" },
             { "src": "y", "dst": "c", "dst_port": "b" },
             { "src": "c", "dst": "o" } ] }"#,
    );
    let program = compile_file(&path).unwrap();

    assert_eq!(program.tasks.len(), 2);
    assert_eq!(program.tasks[0].strategy, DispatchStrategy::Reduction);
    assert_eq!(program.tasks[1].strategy, DispatchStrategy::Default);
    assert!(program.reduction_scratch_size > 0);

    // The scalar sum binding in the elementwise task broadcasts with
    // zero strides.
    let s_reg = reg_of(&program, "s");
    let t = &program.tasks[1];
    let bindings =
        &program.bindings[t.binding_offset as usize..(t.binding_offset + t.binding_count) as usize];
    let b = bindings.iter().find(|b| b.reg == s_reg).unwrap();
    assert_eq!(b.strides, [0; 4]);
}

#[test]
fn test_task_instruction_coverage_invariant() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "chain.json",
        r#"{ "nodes": [
             { "id": "x", "type": "input", "shape": [16], "dtype": "f32" },
             { "id": "n", "type": "neg" },
             { "id": "s", "type": "sum" },
             { "id": "e", "type": "exp" },
             { "id": "o", "type": "output" } ],
            "links": [
             { "src": "x", "dst": "n" },
             { "src": "n", "dst": "s" },
             { "src": "s", "dst": "e" },
             { "src": "e", "dst": "o" } ] }"#,
    );
    let program = compile_file(&path).unwrap();

    let total: u32 = program.tasks.iter().map(|t| t.inst_count).sum();
    assert_eq!(total as usize, program.instructions.len());

    // Every operand of every instruction is covered by its task's
    // binding slice exactly once.
    for task in &program.tasks {
        let bindings = &program.bindings
            [task.binding_offset as usize..(task.binding_offset + task.binding_count) as usize];
        for inst in &program.instructions
            [task.start_inst as usize..(task.start_inst + task.inst_count) as usize]
        {
            let mut operands = vec![inst.dst];
            operands.extend(inst.srcs.iter().copied().filter(|&r| r != REG_NONE));
            for reg in operands {
                assert_eq!(
                    bindings.iter().filter(|b| b.reg == reg).count(),
                    1,
                    "operand {reg} not covered exactly once"
                );
            }
        }
    }
}

#[test]
fn test_empty_graph_produces_valid_cartridge() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "empty.json", r#"{ "nodes": [], "links": [] }"#);
    let program = compile_file(&path).unwrap();
    assert!(program.instructions.is_empty());
    assert!(program.tasks.is_empty());

    let bytes = encode_cartridge(
        &weft_ast::AppSettings::default(),
        &[Section::program("main", &program)],
    );
    assert_eq!(
        u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
        CARTRIDGE_MAGIC
    );
}

#[test]
fn test_input_to_output_passthrough() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "pass.json",
        r#"{ "nodes": [
             { "id": "x", "type": "input", "shape": [4], "dtype": "f32" },
             { "id": "o", "type": "output" } ],
            "links": [ { "src": "x", "dst": "o" } ] }"#,
    );
    let program = compile_file(&path).unwrap();

    assert!(program.instructions.is_empty());
    assert_eq!(reg_of(&program, "o"), reg_of(&program, "x"));
    let reg = reg_of(&program, "o");
    assert_ne!(program.tensors[reg as usize].flags & TENSOR_FLAG_ALIAS, 0);
}

#[test]
fn test_window_settings_reach_cartridge() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "win.json",
        r#"{ "window": { "title": "weave", "width": 1024, "height": 768 },
            "runtime": { "threads": 3 },
            "nodes": [
             { "id": "x", "type": "input", "shape": [1], "dtype": "f32" },
             { "id": "o", "type": "output" } ],
            "links": [ { "src": "x", "dst": "o" } ] }"#,
    );
    let mut diag = Diagnostics::new();
    let ir = load_graph(&path, &mut diag).unwrap();
    assert_eq!(ir.settings.title, "weave");
    assert_eq!(ir.settings.width, 1024);
    assert_eq!(ir.settings.threads, 3);

    let bytes = encode_cartridge(&ir.settings, &[]);
    assert_eq!(&bytes[12..17], b"weave");
}
