//! Diagnostics accumulated during a run and the reporter that drains them.
//!
//! Nothing in the pipeline aborts on a diagnostic. Every phase pushes onto the
//! context's [`ErrorStack`] and carries on; [`drain_errors`] formats the stack
//! at phase boundaries and clears it.

use std::{io, path::PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::context::Context;

/// Category of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// The file could not be read.
    Io,
    /// Unterminated string or comment, or an unrecognized character.
    Lex,
    /// Unexpected token during parsing.
    Syntax,
    /// Duplicate declaration or unresolved type reference.
    Symbol,
}

/// A single reported problem. Its `Display` form is the line written to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ERROR ({file}:{line}): {message}")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub file: String,
    pub line: u32,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        file: impl Into<String>,
        line: u32,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            kind,
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

/// What happens when more errors arrive than the stack can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Keep the first `capacity` errors and count the rest.
    #[default]
    Truncate,
    /// Ignore the capacity.
    Grow,
}

/// Errors pulled off an [`ErrorStack`] by [`ErrorStack::drain`].
#[derive(Debug, Default)]
pub struct Drained {
    pub diagnostics: Vec<Diagnostic>,
    /// Errors dropped because the stack was full.
    pub suppressed: usize,
}

/// Bounded, append-only list of diagnostics.
#[derive(Debug, Clone)]
pub struct ErrorStack {
    entries: Vec<Diagnostic>,
    capacity: usize,
    overflow: OverflowPolicy,
    suppressed: usize,
    total: usize,
}

impl ErrorStack {
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        ErrorStack {
            entries: Vec::new(),
            capacity,
            overflow,
            suppressed: 0,
            total: 0,
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.total += 1;
        if self.overflow == OverflowPolicy::Truncate && self.entries.len() >= self.capacity {
            self.suppressed += 1;
            return;
        }
        self.entries.push(diagnostic);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Number of errors held, not counting suppressed ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if anything was pushed since the last drain, suppressed errors
    /// included.
    pub fn has_pending(&self) -> bool {
        !self.entries.is_empty() || self.suppressed > 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of errors suppressed since the last drain.
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }

    /// Every error ever pushed, including drained and suppressed ones.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn drain(&mut self) -> Drained {
        Drained {
            diagnostics: std::mem::take(&mut self.entries),
            suppressed: std::mem::take(&mut self.suppressed),
        }
    }
}

/// Destination for formatted error lines.
pub trait DiagnosticSink {
    fn emit(&mut self, line: &str);
}

/// Writes every line to standard error.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn emit(&mut self, line: &str) {
        eprintln!("{line}");
    }
}

impl DiagnosticSink for Vec<String> {
    fn emit(&mut self, line: &str) {
        self.push(line.to_owned());
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &mut S {
    fn emit(&mut self, line: &str) {
        (**self).emit(line);
    }
}

/// Emits every pending error as `ERROR (<file>:<line>): <message>` and clears
/// the stack. Returns how many errors were drained, suppressed ones included.
pub fn drain_errors<S: DiagnosticSink + ?Sized>(ctx: &mut Context, sink: &mut S) -> usize {
    let capacity = ctx.errors().capacity();
    let drained = ctx.errors_mut().drain();

    for diagnostic in &drained.diagnostics {
        sink.emit(&diagnostic.to_string());
    }
    if drained.suppressed > 0 {
        sink.emit(&format!(
            "ERROR: {} further error(s) suppressed (limit {capacity})",
            drained.suppressed
        ));
    }

    let count = drained.diagnostics.len() + drained.suppressed;
    if count > 0 {
        debug!(count, suppressed = drained.suppressed, "drained errors");
    }
    count
}

/// Failure to load a source file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not load \"{}\": {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
