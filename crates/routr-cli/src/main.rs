use anyhow::Result;
use clap::{Parser, Subcommand};

use routr_cli::commands::plan::{handle_plan, PlanArgs};
use routr_cli::commands::search::{handle_search, SearchArgs};
use routr_cli::commands::spatial::{
    handle_cell, handle_distance, handle_path, handle_ring, CellArgs, DistanceArgs, PathArgs,
    RingArgs,
};
use routr_cli::output::OutputFormat;
use routr_service_shared::{
    init_logging, init_metrics, record_command, render_metrics, LogFormat, LoggingConfig,
    MetricsConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "routr spatial tools and route planning")]
struct Cli {
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Print Prometheus metrics to stderr after the command.
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the cell containing a point.
    Cell(CellArgs),
    /// List the cells within k rings of a point's cell.
    Ring(RingArgs),
    /// Great-circle distance between two points.
    Distance(DistanceArgs),
    /// Cells sampled along the straight line between two points.
    Path(PathArgs),
    /// Search a routes file with spatial, text, and numeric filters.
    Search(SearchArgs),
    /// Create, optimize, and analyze a route set from a routes file.
    Plan(PlanArgs),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Cell(_) => "cell",
            Command::Ring(_) => "ring",
            Command::Distance(_) => "distance",
            Command::Path(_) => "path",
            Command::Search(_) => "search",
            Command::Plan(_) => "plan",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    if cli.metrics {
        init_metrics(&MetricsConfig::from_env())?;
    }

    let format = cli.format;
    let name = cli.command.name();
    let result = match &cli.command {
        Command::Cell(args) => handle_cell(args, format),
        Command::Ring(args) => handle_ring(args, format),
        Command::Distance(args) => handle_distance(args, format),
        Command::Path(args) => handle_path(args, format),
        Command::Search(args) => handle_search(args, format).await,
        Command::Plan(args) => handle_plan(args, format).await,
    };
    record_command(name, result.is_ok());

    if cli.metrics {
        eprint!("{}", render_metrics());
    }
    result
}

/// Text logs at `warn` unless `LOG_FORMAT` or `RUST_LOG` say otherwise.
fn init_tracing() {
    let mut config = LoggingConfig::from_env().with_service("routr-cli");
    if std::env::var_os("LOG_FORMAT").is_none() {
        config = config.with_format(LogFormat::Text);
    }
    if std::env::var_os("RUST_LOG").is_none() {
        config.level = "warn".to_string();
    }
    init_logging(&config);
}
