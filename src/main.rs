// Replays a recorded decoder trace through the complexity pipeline and writes the
// configured reports.
//
// Example:
//   COMPLEXITY_FILENAME=cells.txt complexity_grid replay decode.jsonl
//   complexity_grid replay decode.jsonl --cell-report cells.txt --group-report ctus.txt --dump-xy

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use complexity_grid::config::ComplexityConfig;
use complexity_grid::core_modules::trace::TraceReader;
use complexity_grid::logging::{self, LogFormat, LoggingConfig};
use complexity_grid::pipeline::{ComplexityPipeline, SessionState};

#[derive(Parser)]
#[command(name = "complexity_grid")]
#[command(
    about = "Resample decoder bit/QP measurements onto a uniform 16x16 grid",
    long_about = None
)]
struct Cli {
    /// Optional TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Multi-line, colored log output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a decoder trace (one JSON event per line)
    Replay {
        /// Path to the trace file
        trace: PathBuf,

        /// Per-cell report output (overrides COMPLEXITY_FILENAME)
        #[arg(long)]
        cell_report: Option<PathBuf>,

        /// Per-group report output (overrides COMPLEXITY_CTU_FILENAME)
        #[arg(long)]
        group_report: Option<PathBuf>,

        /// Prefix report lines with the cell coordinates
        #[arg(long)]
        dump_xy: bool,

        /// Directory for per-picture heatmap PNGs
        #[arg(long)]
        heatmap_dir: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        ComplexityConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    let level = logging::parse_log_level(&config.log_level).map_err(anyhow::Error::msg)?;
    let format = if cli.pretty {
        LogFormat::Pretty
    } else {
        LogFormat::Compact
    };
    logging::init(&LoggingConfig::new(level).with_format(format)).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Replay {
            trace,
            cell_report,
            group_report,
            dump_xy,
            heatmap_dir,
        } => {
            if cell_report.is_some() {
                config.filename = cell_report;
            }
            if group_report.is_some() {
                config.ctu_filename = group_report;
            }
            if heatmap_dir.is_some() {
                config.heatmap_dir = heatmap_dir;
            }
            config.dump_xy |= dump_xy;
            replay(&trace, &config)
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn replay(trace_path: &Path, config: &ComplexityConfig) -> Result<()> {
    if !config.any_sink_enabled() {
        warn!("no report sink configured, replaying for validation only");
    }

    let file = File::open(trace_path)
        .with_context(|| format!("failed to open trace {}", trace_path.display()))?;
    let mut pipeline = ComplexityPipeline::from_config(config)?;

    for item in TraceReader::new(BufReader::new(file)) {
        let (line, event) = item?;
        pipeline
            .handle(&event)
            .with_context(|| format!("{}:{}: {:?}", trace_path.display(), line, event))?;
    }

    if pipeline.session().state() != SessionState::Idle {
        warn!("trace ended inside a picture, last picture not reported");
    }

    let stats = pipeline.stats();
    info!(
        reported = stats.pictures_reported,
        suppressed = stats.pictures_suppressed,
        reports = stats.reports,
        "replay complete"
    );
    Ok(())
}
