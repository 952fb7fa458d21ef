//! Compiler Diagnostics
//!
//! Semantic errors are collected into a bounded in-memory buffer rather
//! than raised through `Result`: the analysis and validation passes keep
//! scanning after a failure so authors see a batch of problems per run.
//! The pass driver consults the buffer at every pass boundary and aborts
//! the pipeline on the first pass that filed an error.
//!
//! `CompileError` covers the fatal, non-semantic failures (I/O, JSON,
//! pipeline abort, cartridge write) that do travel as `Err`.

use std::path::PathBuf;

use thiserror::Error;
use weft_ast::SourceLoc;

/// Maximum diagnostics retained per compilation; further reports are
/// suppressed with a single overflow notice.
pub const DIAG_CAPACITY: usize = 32;

/// Fatal compiler errors.
#[derive(Error, Debug)]
pub enum CompileError {
    /// File read failure
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON parse failure
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A pass reported diagnostics; details are in the buffer
    #[error("pass '{0}' failed")]
    PassFailed(&'static str),

    /// Cartridge write failure
    #[error("could not write cartridge {path}: {source}")]
    CartridgeWrite {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type for compiler operations.
pub type CompileResult<T> = Result<T, CompileError>;

/// One reported problem with its source location.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub loc: SourceLoc,
    pub message: String,
}

impl Diagnostic {
    /// Render as `file:line:column: error: message`.
    pub fn render(&self) -> String {
        let file = if self.loc.file.is_empty() {
            "unknown"
        } else {
            self.loc.file.as_str()
        };
        if self.loc.line > 0 {
            format!(
                "{}:{}:{}: error: {}",
                file, self.loc.line, self.loc.column, self.message
            )
        } else {
            format!("{}: error: {}", file, self.message)
        }
    }
}

/// Bounded diagnostics buffer shared by every pass.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    suppressed: u32,
    has_error: bool,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    /// Report an error. Errors are echoed through `tracing` immediately
    /// so interactive runs show problems as they are found.
    pub fn report(&mut self, loc: SourceLoc, message: impl Into<String>) {
        self.has_error = true;
        if self.entries.len() >= DIAG_CAPACITY {
            if self.suppressed == 0 {
                tracing::error!("diagnostic capacity reached, suppressing further errors");
            }
            self.suppressed += 1;
            return;
        }
        let diag = Diagnostic {
            loc,
            message: message.into(),
        };
        tracing::error!("{}", diag.render());
        self.entries.push(diag);
    }

    /// Report a non-fatal warning. Warnings are logged but do not fail
    /// the pipeline and do not consume diagnostic capacity.
    pub fn warn(&mut self, loc: SourceLoc, message: impl Into<String>) {
        let message = message.into();
        if loc.line > 0 {
            tracing::warn!(
                "{}:{}:{}: warning: {}",
                loc.file,
                loc.line,
                loc.column,
                message
            );
        } else {
            tracing::warn!("{}: warning: {}", loc.file, message);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.has_error
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Number of reports dropped after the capacity was reached.
    pub fn suppressed(&self) -> u32 {
        self.suppressed
    }

    /// All retained diagnostics rendered one per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for d in &self.entries {
            out.push_str(&d.render());
            out.push('\n');
        }
        if self.suppressed > 0 {
            out.push_str(&format!("({} further errors suppressed)\n", self.suppressed));
        }
        out
    }
}
