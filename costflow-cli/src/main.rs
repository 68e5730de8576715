mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use costflow::core::StageName;
use costflow::providers::ReportFormat;

#[derive(Parser)]
#[command(
    name = "costflow",
    version,
    about = "Review cloud spend: scan, analyze, optimize, report"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

/// Where run state and reports live, and how reports are written.
#[derive(Args, Debug, Clone)]
struct Dirs {
    /// Directory holding run snapshots
    #[arg(long, env = "COSTFLOW_STATE_DIR", default_value = ".costflow/runs")]
    state_dir: PathBuf,
    /// Directory receiving `<run-id>/` report files
    #[arg(long, env = "COSTFLOW_OUTPUT_DIR", default_value = "reports")]
    output_dir: PathBuf,
    /// Report format (json, csv, all)
    #[arg(long, env = "COSTFLOW_REPORT_FORMAT", default_value = "all")]
    format: ReportFormat,
    /// Pause after this stage succeeds (scan, analyze, optimize, report)
    #[arg(long)]
    until: Option<StageName>,
}

impl Dirs {
    fn output(&self) -> commands::Output<'_> {
        commands::Output {
            state_dir: &self.state_dir,
            output_dir: &self.output_dir,
            format: self.format,
            until: self.until,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over an estate file
    Run {
        /// Path to the estate JSON file
        #[arg(long)]
        estate: PathBuf,
        /// Path to a JSON config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Maximum resources to scan
        #[arg(long)]
        limit: Option<usize>,
        #[command(flatten)]
        dirs: Dirs,
    },
    /// Resume a failed or interrupted run from its snapshot
    Resume {
        /// Run identifier
        run_id: String,
        /// Path to the estate JSON file
        #[arg(long)]
        estate: PathBuf,
        /// Path to a JSON config file
        #[arg(long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        dirs: Dirs,
    },
    /// Show the stage history of a run
    Status {
        /// Run identifier
        run_id: String,
        /// Directory holding run snapshots
        #[arg(long, env = "COSTFLOW_STATE_DIR", default_value = ".costflow/runs")]
        state_dir: PathBuf,
    },
    /// Print the effective configuration
    Config {
        /// Path to a JSON config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    logging::init(&cli.log_level, cli.json_logs)?;

    match cli.command {
        Commands::Run {
            estate,
            config,
            limit,
            dirs,
        } => {
            commands::run::execute(&estate, config.as_deref(), limit, &dirs.output()).await
        }
        Commands::Resume {
            run_id,
            estate,
            config,
            dirs,
        } => {
            commands::resume::execute(&run_id, &estate, config.as_deref(), &dirs.output()).await
        }
        Commands::Status { run_id, state_dir } => {
            commands::status::execute(&run_id, &state_dir).await
        }
        Commands::Config { config } => commands::config::execute(config.as_deref()),
    }
}
