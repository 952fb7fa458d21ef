//! # Manifest Parser
//!
//! JSON text -> `weft_ast::AstGraph`. The heavy lifting is `serde_json`;
//! this module adds the two things the raw deserialiser cannot give us:
//!
//! - default ports on links (`"out"` / `"in"`),
//! - per-node source locations, recovered by scanning the raw text for
//!   the position of each node's `"id"` value (serde does not expose
//!   spans, and diagnostics without `file:line:column` are useless).
//!
//! ```text
//! JSON text -> [Parser] -> AstGraph -> Lower -> GraphIr
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use weft_ast::{AppSettings, AstGraph, AstLink, AstNode, SourceLoc};

#[derive(Deserialize)]
struct RawManifest {
    window: Option<RawWindow>,
    runtime: Option<RawRuntime>,
    #[serde(default)]
    imports: Vec<String>,
    #[serde(default)]
    nodes: Vec<RawNode>,
    #[serde(default)]
    links: Vec<RawLink>,
}

#[derive(Deserialize)]
struct RawWindow {
    title: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    vsync: Option<bool>,
    fullscreen: Option<bool>,
    resizable: Option<bool>,
}

#[derive(Deserialize)]
struct RawRuntime {
    threads: Option<u32>,
}

#[derive(Deserialize)]
struct RawNode {
    id: String,
    #[serde(rename = "type", default)]
    ty: String,
    #[serde(flatten)]
    attrs: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawLink {
    src: String,
    #[serde(default = "default_src_port")]
    src_port: String,
    dst: String,
    #[serde(default = "default_dst_port")]
    dst_port: String,
}

fn default_src_port() -> String {
    "out".to_string()
}

fn default_dst_port() -> String {
    "in".to_string()
}

/// Parse a graph manifest into an AST with source locations.
pub fn parse_graph(src: &str, path: &Path) -> Result<AstGraph, serde_json::Error> {
    let raw: RawManifest = serde_json::from_str(src)?;
    let file = path.display().to_string();
    let id_locs = scan_id_locations(src);

    let mut settings = AppSettings::default();
    if let Some(window) = raw.window {
        if let Some(title) = window.title {
            settings.title = title;
        }
        settings.width = window.width.unwrap_or(settings.width);
        settings.height = window.height.unwrap_or(settings.height);
        settings.vsync = window.vsync.unwrap_or(settings.vsync);
        settings.fullscreen = window.fullscreen.unwrap_or(settings.fullscreen);
        settings.resizable = window.resizable.unwrap_or(settings.resizable);
    }
    if let Some(runtime) = raw.runtime {
        settings.threads = runtime.threads.unwrap_or(settings.threads);
    }

    let nodes = raw
        .nodes
        .into_iter()
        .map(|n| {
            let loc = match id_locs.get(n.id.as_str()) {
                Some(&(line, column)) => SourceLoc {
                    file: file.clone(),
                    line,
                    column,
                },
                None => SourceLoc::file_only(file.clone()),
            };
            AstNode {
                id: n.id,
                ty: n.ty,
                attrs: n.attrs,
                loc,
            }
        })
        .collect();

    let links = raw
        .links
        .into_iter()
        .map(|l| AstLink {
            src: l.src,
            src_port: l.src_port,
            dst: l.dst,
            dst_port: l.dst_port,
        })
        .collect();

    Ok(AstGraph {
        imports: raw.imports,
        nodes,
        links,
        settings,
        path: path.to_path_buf(),
    })
}

/// Scan raw JSON text for `"id": "<value>"` pairs and record the line and
/// column of each value's opening quote. First occurrence wins.
fn scan_id_locations(src: &str) -> HashMap<String, (u32, u32)> {
    let bytes = src.as_bytes();
    let mut locs = HashMap::new();
    let mut i = 0;
    let mut line: u32 = 1;
    let mut col: u32 = 1;
    let mut pending_id_value = false;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                line += 1;
                col = 1;
                i += 1;
            }
            b'"' => {
                let start = (line, col);
                let (value, consumed) = read_string(&bytes[i..]);
                col += consumed as u32;
                i += consumed;
                if pending_id_value {
                    locs.entry(value).or_insert(start);
                    pending_id_value = false;
                } else if value == "id" && next_nonspace(bytes, i) == Some(b':') {
                    pending_id_value = true;
                }
            }
            b':' | b' ' | b'\t' | b'\r' => {
                col += 1;
                i += 1;
            }
            _ => {
                // Any other token between key and value cancels the match
                // (numeric ids carry no quote to anchor on).
                pending_id_value = false;
                col += 1;
                i += 1;
            }
        }
    }
    locs
}

/// Read a JSON string starting at an opening quote. Returns the value
/// (escape pairs collapsed to their literal byte) and the bytes consumed.
fn read_string(bytes: &[u8]) -> (String, usize) {
    let mut out = Vec::new();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => return (String::from_utf8_lossy(&out).into_owned(), i + 1),
            b'\\' if i + 1 < bytes.len() => {
                out.push(bytes[i + 1]);
                i += 2;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    (String::from_utf8_lossy(&out).into_owned(), i)
}

fn next_nonspace(bytes: &[u8], mut i: usize) -> Option<u8> {
    while i < bytes.len() {
        if !bytes[i].is_ascii_whitespace() {
            return Some(bytes[i]);
        }
        i += 1;
    }
    None
}
