//! Dependency analysis driver.
//!
//! Provides the `tslgen` binary. Every subcommand loads a JSON library
//! description, builds and checks its primitive dependency graph, and then
//! reports on it:
//!
//! - `check` prints one line per invalid or unsafe node
//! - `summary` prints counts, coverage and unsafe test chains
//! - `order` prints the classes in dependency order
//! - `export` writes the graph as JSON or Graphviz DOT
//! - `slice` writes the part of the graph some nodes depend on
//!
//! Logging goes to stderr; `-v` raises the level, `TSLGEN_LOG` overrides it
//! with a full filter directive.

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tslgen_core::{AnalysisOptions, CoreError, DependencyGraph, LevelOfDetail, Library, NodeKey};
use tslgen_report::{GraphExport, ReportError, Summary};

const EXIT_OK: i32 = 0;
const EXIT_FATAL: i32 = 1;
const EXIT_REJECTED: i32 = 2;
const EXIT_INPUT: i32 = 3;

/// Primitive dependency analysis for SIMD template libraries.
#[derive(Parser)]
#[command(name = "tslgen", about = "Primitive dependency analysis for SIMD template libraries")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Check a library and list every invalid or unsafe node.
    Check(AnalysisArgs),

    /// Print summary statistics.
    Summary {
        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the primitive classes in dependency order.
    Order(AnalysisArgs),

    /// Export the whole graph.
    Export {
        #[command(flatten)]
        analysis: AnalysisArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Export the nodes named by --node and everything they require.
    Slice {
        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Node id to keep (repeatable), e.g. `add` or `add<int, avx2>`.
        #[arg(short, long = "node", required = true)]
        nodes: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct AnalysisArgs {
    /// Path to the JSON library description.
    #[arg(short, long)]
    library: PathBuf,

    /// Level of detail: default, primitive-instantiation, test,
    /// test-instantiation (default: from --config, else test-instantiation).
    #[arg(long)]
    level: Option<String>,

    /// JSON file with analysis options.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Treat unsafe nodes as a failure.
    #[arg(long)]
    deny_warnings: bool,
}

#[derive(Args)]
struct OutputArgs {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Output file (default: stdout).
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Dot,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Check(analysis) => run_check(&analysis),
        Commands::Summary { analysis, json } => run_summary(&analysis, json),
        Commands::Order(analysis) => run_order(&analysis),
        Commands::Export { analysis, output } => run_export(&analysis, None, &output),
        Commands::Slice {
            analysis,
            nodes,
            output,
        } => run_export(&analysis, Some(nodes.as_slice()), &output),
    };
    process::exit(exit_code);
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_env("TSLGEN_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

/// Returns exit code: 0 = accepted, 1 = fatal analysis error,
/// 2 = library not well defined (or unsafe with --deny-warnings),
/// 3 = I/O or input error.
fn run_check(args: &AnalysisArgs) -> i32 {
    let (options, graph) = match load(args) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    graph.log_errors();
    graph.log_warnings();
    for diagnostic in graph.errors().iter().chain(&graph.warnings()) {
        println!("{diagnostic}");
    }

    if options.accepts(&graph) {
        println!(
            "library is well defined ({} nodes, {} warnings)",
            graph.node_count(),
            graph.warnings().len()
        );
        EXIT_OK
    } else {
        eprintln!(
            "Error: library rejected ({} invalid, {} unsafe nodes)",
            graph.errors().len(),
            graph.warnings().len()
        );
        EXIT_REJECTED
    }
}

fn run_summary(args: &AnalysisArgs, json: bool) -> i32 {
    let (_, graph) = match load(args) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let summary = match Summary::from_graph(&graph) {
        Ok(summary) => summary,
        Err(e) => return report_error(&e),
    };
    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{text}"),
            Err(e) => return report_error(&ReportError::from(e)),
        }
    } else {
        println!("{summary}");
    }
    EXIT_OK
}

fn run_order(args: &AnalysisArgs) -> i32 {
    let (_, graph) = match load(args) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    match graph.sorted_classes() {
        Ok(classes) => {
            for class in classes {
                println!("{class}");
            }
            EXIT_OK
        }
        Err(e) => core_error(&e),
    }
}

fn run_export(args: &AnalysisArgs, nodes: Option<&[String]>, output: &OutputArgs) -> i32 {
    let (_, graph) = match load(args) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let graph = match nodes {
        Some(ids) => match slice(&graph, ids) {
            Ok(sliced) => sliced,
            Err(e) => return core_error(&e),
        },
        None => graph,
    };

    let export = || GraphExport::from_graph(&graph);
    let written = match (output.format, &output.output) {
        (Format::Json, Some(path)) => export().write_json(path),
        (Format::Dot, Some(path)) => tslgen_report::write_dot(&graph, path),
        (Format::Json, None) => export().to_json_string().map(|text| println!("{text}")),
        (Format::Dot, None) => {
            println!("{}", tslgen_report::to_dot(&graph));
            Ok(())
        }
    };
    match written {
        Ok(()) => EXIT_OK,
        Err(e) => report_error(&e),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Loads options and library and runs the analysis, or returns the exit code
/// of the first failure.
fn load(args: &AnalysisArgs) -> Result<(AnalysisOptions, DependencyGraph), i32> {
    let options = options(args).map_err(|e| core_error(&e))?;
    let library = Library::from_json_file(&args.library).map_err(|e| core_error(&e))?;
    info!(
        library = %args.library.display(),
        classes = library.classes.len(),
        level = %options.level,
        "library loaded"
    );
    let graph = tslgen_core::analyze(&library, &options).map_err(|e| core_error(&e))?;
    Ok((options, graph))
}

/// Options from --config, overridden by explicit flags.
fn options(args: &AnalysisArgs) -> Result<AnalysisOptions, CoreError> {
    let mut options = match &args.config {
        Some(path) => AnalysisOptions::from_json_file(path)?,
        None => AnalysisOptions::default(),
    };
    if let Some(level) = &args.level {
        options.level = level.parse::<LevelOfDetail>()?;
    }
    options.deny_warnings |= args.deny_warnings;
    Ok(options)
}

fn slice(graph: &DependencyGraph, ids: &[String]) -> Result<DependencyGraph, CoreError> {
    let keys = ids
        .iter()
        .map(|id| {
            graph.find(id).ok_or_else(|| CoreError::NodeNotFound {
                key: NodeKey::primitive(id),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    graph.slice(&keys)
}

fn exit_code(error: &CoreError) -> i32 {
    match error {
        CoreError::Io { .. }
        | CoreError::Json(_)
        | CoreError::UnknownLevel { .. }
        | CoreError::NodeNotFound { .. } => EXIT_INPUT,
        CoreError::DependencyCycle { .. }
        | CoreError::ClassCycle { .. }
        | CoreError::MalformedInstantiation { .. }
        | CoreError::Pattern(_) => EXIT_FATAL,
    }
}

fn core_error(error: &CoreError) -> i32 {
    eprintln!("Error: {error}");
    exit_code(error)
}

fn report_error(error: &ReportError) -> i32 {
    match error {
        ReportError::Core(e) => core_error(e),
        ReportError::Io { .. } | ReportError::Json(_) => {
            eprintln!("Error: {error}");
            EXIT_INPUT
        }
    }
}
