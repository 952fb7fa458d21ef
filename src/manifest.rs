//! # Application Manifest Loader
//!
//! A `.mfapp` manifest describes a whole cartridge: which kernel graphs
//! to compile, which asset files to embed, and the window/runtime
//! settings for the header. Three layouts are accepted:
//!
//! - `pipeline.kernels`: a multi-kernel application,
//! - `runtime.entry`: a single kernel compiled as `main`,
//! - a raw graph (`nodes` at the top level): the manifest is itself the
//!   kernel.
//!
//! The raw manifest text is embedded as a `Pipeline` section so the
//! runtime can re-read scheduling metadata the compiler does not
//! interpret.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use weft_ast::AppSettings;

use crate::cartridge::SectionKind;
use crate::diag::{CompileError, CompileResult};
use crate::parser;

/// One kernel graph to compile into a `Program` section.
#[derive(Debug, Clone)]
pub struct KernelDesc {
    pub id: String,
    pub path: PathBuf,
}

/// One asset file to embed verbatim.
#[derive(Debug, Clone)]
pub struct AssetDesc {
    pub name: String,
    pub path: PathBuf,
    pub kind: SectionKind,
}

/// A fully resolved application manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub settings: AppSettings,
    pub kernels: Vec<KernelDesc>,
    pub assets: Vec<AssetDesc>,
    /// The manifest source text, embedded as the `pipeline` section.
    pub raw_json: String,
}

#[derive(Deserialize)]
struct RawDoc {
    runtime: Option<RawRuntime>,
    pipeline: Option<RawPipeline>,
    #[serde(default)]
    assets: Vec<RawAsset>,
}

#[derive(Deserialize)]
struct RawRuntime {
    entry: Option<String>,
}

#[derive(Deserialize)]
struct RawPipeline {
    #[serde(default)]
    kernels: Vec<RawKernel>,
}

#[derive(Deserialize)]
struct RawKernel {
    id: Option<String>,
    entry: Option<String>,
}

#[derive(Deserialize)]
struct RawAsset {
    name: Option<String>,
    path: Option<String>,
    #[serde(rename = "type")]
    ty: Option<String>,
}

/// Load and resolve a `.mfapp` manifest.
pub fn load_manifest(path: &Path) -> CompileResult<Manifest> {
    let src = fs::read_to_string(path).map_err(|source| CompileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ast = parser::parse_graph(&src, path).map_err(|source| CompileError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: RawDoc = serde_json::from_str(&src).map_err(|source| CompileError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let join = |p: &str| {
        let p = Path::new(p);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            base_dir.join(p)
        }
    };

    let mut kernels = Vec::new();
    if let Some(pipeline) = &doc.pipeline {
        for kernel in &pipeline.kernels {
            let Some(entry) = &kernel.entry else { continue };
            kernels.push(KernelDesc {
                id: kernel.id.clone().unwrap_or_else(|| "kernel".to_string()),
                path: join(entry),
            });
        }
    } else if let Some(entry) = doc.runtime.as_ref().and_then(|r| r.entry.as_ref()) {
        kernels.push(KernelDesc {
            id: "main".to_string(),
            path: join(entry),
        });
    }
    if kernels.is_empty() && !ast.nodes.is_empty() {
        // The manifest is itself a graph.
        kernels.push(KernelDesc {
            id: "main".to_string(),
            path: path.to_path_buf(),
        });
    }

    let assets = doc
        .assets
        .iter()
        .filter_map(|a| {
            let path = a.path.as_ref()?;
            Some(AssetDesc {
                name: a.name.clone().unwrap_or_else(|| "asset".to_string()),
                path: join(path),
                kind: match a.ty.as_deref() {
                    Some("image") => SectionKind::Image,
                    Some("font") => SectionKind::Font,
                    _ => SectionKind::Raw,
                },
            })
        })
        .collect();

    Ok(Manifest {
        settings: ast.settings,
        kernels,
        assets,
        raw_json: src,
    })
}
