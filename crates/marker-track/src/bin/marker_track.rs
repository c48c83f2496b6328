use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use marker_track::io::{write_report, write_report_file, SessionConfig};
use marker_track::replay::{run_session, ReplayOptions};

#[derive(Parser)]
#[command(name = "marker-track")]
#[command(about = "Replay and inspect recorded marker tracking sessions", long_about = None)]
struct Cli {
    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", value_parser = parse_level)]
    log_level: LevelFilter,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a recorded session through the tracker and print every published snapshot
    Replay {
        /// Session JSON file
        session: PathBuf,

        /// Seconds between two simulated host updates
        #[arg(long, default_value_t = 1.0 / 60.0)]
        step: f64,

        /// Last simulated host time (default: until every marker is removed)
        #[arg(long)]
        until: Option<f64>,

        /// Write the JSON-lines report here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Validate a session file without running it
    CheckConfig {
        /// Session JSON file
        session: PathBuf,
    },
}

fn parse_level(raw: &str) -> Result<LevelFilter, String> {
    raw.parse::<LevelFilter>()
        .map_err(|_| format!("unknown log level '{raw}'"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    marker_track::logging::init(cli.log_level);

    match cli.cmd {
        Commands::Replay {
            session,
            step,
            until,
            out,
        } => {
            let config = SessionConfig::load_json(&session)?;
            let report = run_session(&config, ReplayOptions { step, until })?;
            info!(
                "replayed {} frames from {}: {} snapshots",
                config.frames.len(),
                session.display(),
                report.len()
            );
            match out {
                Some(path) => write_report_file(&path, &report)?,
                None => write_report(io::stdout().lock(), &report)?,
            }
        }
        Commands::CheckConfig { session } => {
            let config = SessionConfig::load_json(&session)?;
            println!(
                "ok: {} frames, {} detections, timeout {}s, publish interval {}s",
                config.frames.len(),
                config.detection_count(),
                config.tracker.tracking_lost_timeout,
                config.tracker.min_publish_interval
            );
        }
    }
    Ok(())
}
