//! Drives a run: load, parse, patch, materialize, dispatch, report.
//!
//! [`run`] handles the common one-file case. [`Session`] accepts any number of
//! files into one context and resolves them together, so a declaration may
//! be used before the file that declares it has been parsed.

use std::{fs, path::Path, process::ExitCode, sync::Arc};

use tracing::{debug, info};

use crate::{
    ast::NodeId,
    context::{Context, ContextConfig},
    error::{DiagnosticKind, DiagnosticSink, LoadError, StderrSink, drain_errors},
    generators::{Generator, GeneratorError, dispatch},
    materialize::materialize_context,
    parser::parse_file,
    patch::patch_context,
};

/// How reported diagnostics affect the final status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitPolicy {
    /// Any diagnostic during the run makes it fail.
    #[default]
    FailOnErrors,
    /// The run succeeds whatever was reported.
    AlwaysSucceed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => ExitCode::SUCCESS,
            ExitStatus::Failure => ExitCode::FAILURE,
        }
    }
}

/// Options for a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Log progress lines. Error lines are emitted regardless.
    pub verbose: bool,
    pub exit_policy: ExitPolicy,
    pub context: ContextConfig,
}

/// Everything a finished session hands back.
#[derive(Debug)]
pub struct RunReport<S> {
    pub status: ExitStatus,
    /// The fully patched and materialized context.
    pub context: Context,
    pub sink: S,
    /// Diagnostics emitted over the whole run, suppressed ones included.
    pub error_count: usize,
}

/// A multi-file run sharing one [`Context`].
pub struct Session<G: Generator, S: DiagnosticSink> {
    options: RunOptions,
    ctx: Context,
    generator: G,
    sink: S,
    error_count: usize,
}

impl<G: Generator, S: DiagnosticSink> Session<G, S> {
    /// Starts a session and calls the generator's `on_init`.
    pub fn new(options: RunOptions, mut generator: G, sink: S) -> Self {
        if options.verbose {
            info!("ddlc v{}", env!("CARGO_PKG_VERSION"));
        }
        generator.on_init();

        Session {
            ctx: Context::new(options.context.clone()),
            options,
            generator,
            sink,
            error_count: 0,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Loads and parses one file, then drains its errors.
    ///
    /// A file that cannot be read is reported as an I/O diagnostic and yields
    /// `None`; the session carries on with the remaining files.
    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> Option<NodeId> {
        let path = path.as_ref();
        let filename = path.display().to_string();
        if self.options.verbose {
            info!("Processing file at \"{filename}\".");
        }

        match load_file(path) {
            Ok(source) => {
                let root = parse_file(&mut self.ctx, source, &filename);
                self.drain();
                Some(root)
            }
            Err(error) => {
                self.ctx
                    .report_unlocated(DiagnosticKind::Io, &filename, error.to_string());
                self.drain();
                None
            }
        }
    }

    /// Parses an in-memory buffer under `name`, then drains its errors.
    pub fn parse_source(&mut self, name: &str, text: impl Into<Arc<str>>) -> NodeId {
        if self.options.verbose {
            info!("Processing file at \"{name}\".");
        }
        let root = parse_file(&mut self.ctx, text, name);
        self.drain();
        root
    }

    /// Resolves every file, hands each declaration to the generator and
    /// closes the run.
    ///
    /// A callback failure still drains errors and calls `on_cleanup` before
    /// it is returned.
    pub fn finish(mut self) -> Result<RunReport<S>, GeneratorError> {
        patch_context(&mut self.ctx);
        let materialized = materialize_context(&mut self.ctx);

        let roots: Vec<NodeId> = self.ctx.roots().collect();
        for &root in &roots {
            let file = self.ctx.node(root).location().file;
            self.ctx.release_source(file);
        }
        debug!(files = roots.len(), materialized, "graph resolved");

        let mut result = Ok(());
        for file in self.ctx.files() {
            result = dispatch(&self.ctx, file.root(), &mut self.generator, file.name());
            if result.is_err() {
                break;
            }
        }

        self.drain();
        self.generator.on_cleanup();
        result?;

        let status = match self.options.exit_policy {
            ExitPolicy::FailOnErrors if self.error_count > 0 => ExitStatus::Failure,
            _ => ExitStatus::Success,
        };
        debug!(errors = self.error_count, ?status, "run finished");

        Ok(RunReport {
            status,
            context: self.ctx,
            sink: self.sink,
            error_count: self.error_count,
        })
    }

    fn drain(&mut self) {
        self.error_count += drain_errors(&mut self.ctx, &mut self.sink);
    }
}

/// Runs a single file through the whole pipeline, reporting to stderr.
pub fn run<G: Generator>(
    path: impl AsRef<Path>,
    options: RunOptions,
    generator: G,
) -> Result<ExitStatus, GeneratorError> {
    let mut session = Session::new(options, generator, StderrSink);
    session.parse_file(path);
    Ok(session.finish()?.status)
}

fn load_file(path: &Path) -> Result<Arc<str>, LoadError> {
    fs::read_to_string(path)
        .map(Arc::from)
        .map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })
}
