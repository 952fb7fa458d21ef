//! # weftc: the Weft cartridge compiler
//!
//! ```bash
//! weftc <input.mfapp|input.json> [output.sfc]
//! ```
//!
//! A `.mfapp` input is treated as an application manifest: every kernel
//! it names is compiled into a `Program` section, assets are embedded,
//! and the manifest itself rides along as the `pipeline` section. Any
//! other input is compiled as a single graph into a `main` section.
//!
//! Exit code 0 on success, 1 on any failure; diagnostics are printed as
//! `file:line:column: error: <message>`.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use weft::cartridge::{save_cartridge, Section, SectionKind};
use weft::manifest::load_manifest;
use weft::{compile, load_graph, Diagnostics};

#[derive(Parser)]
#[command(
    name = "weftc",
    version,
    about = "Compile tensor-dataflow graphs into runnable cartridges"
)]
struct Cli {
    /// Input manifest (.mfapp) or single graph (.json)
    input: PathBuf,

    /// Output cartridge; defaults to the input with extension .sfc
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension("sfc"));

    let is_manifest = cli
        .input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mfapp"));

    let (settings, sections) = if is_manifest {
        build_from_manifest(cli)?
    } else {
        tracing::info!(input = %cli.input.display(), "compiling single graph");
        let mut diag = Diagnostics::new();
        let result = load_graph(&cli.input, &mut diag)
            .and_then(|mut ir| compile(&mut ir, &cli.input, &mut diag).map(|p| (ir, p)));
        match result {
            Ok((ir, program)) if !diag.has_errors() => (
                ir.settings.clone(),
                vec![Section::program("main", &program)],
            ),
            _ => bail!("compilation failed"),
        }
    };

    save_cartridge(&output, &settings, &sections).context("saving cartridge")?;
    Ok(())
}

fn build_from_manifest(cli: &Cli) -> anyhow::Result<(weft_ast::AppSettings, Vec<Section>)> {
    let manifest = load_manifest(&cli.input)?;
    let mut sections = Vec::new();

    for kernel in &manifest.kernels {
        tracing::info!(kernel = %kernel.id, path = %kernel.path.display(), "compiling kernel");
        let mut diag = Diagnostics::new();
        let result = load_graph(&kernel.path, &mut diag)
            .and_then(|mut ir| compile(&mut ir, &kernel.path, &mut diag));
        match result {
            Ok(program) if !diag.has_errors() => {
                sections.push(Section::program(kernel.id.clone(), &program));
            }
            _ => bail!("kernel '{}' failed to compile", kernel.id),
        }
    }

    for asset in &manifest.assets {
        match fs::read(&asset.path) {
            Ok(payload) => {
                tracing::info!(asset = %asset.name, size = payload.len(), "embedded asset");
                sections.push(Section {
                    name: asset.name.clone(),
                    kind: asset.kind,
                    payload,
                });
            }
            Err(err) => {
                tracing::warn!(asset = %asset.name, path = %asset.path.display(), %err,
                    "skipping unreadable asset");
            }
        }
    }

    sections.push(Section {
        name: "pipeline".to_string(),
        kind: SectionKind::Pipeline,
        payload: manifest.raw_json.clone().into_bytes(),
    });

    Ok((manifest.settings, sections))
}
