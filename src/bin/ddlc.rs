//! `ddlc`: parses DDL files, resolves them together and prints an outline of
//! every declaration.

use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::Parser;
use ddlc::{
    context::ContextConfig,
    driver::{ExitPolicy, RunOptions, Session},
    error::StderrSink,
    generators::outline::OutlineGenerator,
};
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt};

/// Command line interface for the DDL front-end.
#[derive(Parser)]
#[command(
    name = "ddlc",
    author,
    version,
    about = "Parses data-description files into a resolved declaration graph"
)]
struct Cli {
    /// Source files. All of them share one symbol table.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Log progress while processing.
    #[arg(short, long)]
    verbose: bool,

    /// Exit successfully even if errors were reported.
    #[arg(long)]
    lenient: bool,

    /// Errors kept between reports before the rest are suppressed.
    #[arg(long, value_name = "N", default_value_t = 256)]
    max_errors: usize,

    /// Require declarations for primitive names such as `u32`.
    #[arg(long)]
    no_builtins: bool,

    /// Check the files without printing the outline.
    #[arg(long)]
    check: bool,
}

impl Cli {
    fn options(&self) -> RunOptions {
        RunOptions {
            verbose: self.verbose,
            exit_policy: if self.lenient {
                ExitPolicy::AlwaysSucceed
            } else {
                ExitPolicy::FailOnErrors
            },
            context: ContextConfig {
                error_capacity: self.max_errors,
                builtin_primitives: !self.no_builtins,
                ..ContextConfig::default()
            },
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "info" } else { "warn" }));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let writer: Box<dyn Write> = if cli.check {
        Box::new(io::sink())
    } else {
        Box::new(io::stdout().lock())
    };

    let mut session = Session::new(cli.options(), OutlineGenerator::new(writer, None), StderrSink);
    for path in &cli.files {
        session.parse_file(path);
    }

    match session.finish() {
        Ok(report) => report.status.into(),
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
