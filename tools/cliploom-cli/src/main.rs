//! Cliploom CLI: plan, preview and render timed clip sequences.
//!
//! Usage:
//!   cliploom render [OPTIONS]    Render clips and audio into one WebM file
//!   cliploom preview [OPTIONS]   Walk the timeline showing first frames
//!   cliploom plan [OPTIONS]      Print derived durations and playback rates
//!   cliploom check               Check the media host for required elements
//!   cliploom config [--write]    Show or write the effective configuration

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use cliploom_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "cliploom",
    about = "Stretch clips to cut points and render them over a trimmed audio track",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that plays the timeline.
#[derive(Args, Debug, Clone)]
pub struct TimelineArgs {
    /// Video clips, in their initial order
    #[arg(long = "video", required = true)]
    pub videos: Vec<PathBuf>,

    /// Comma-separated cut points in seconds, e.g. "1.5, 3, 4.25"
    #[arg(short, long)]
    pub timestamps: String,

    /// Play the clips in a random order
    #[arg(long, conflicts_with = "order")]
    pub shuffle: bool,

    /// Explicit clip order as comma-separated indices, e.g. "2,0,1"
    #[arg(long, value_delimiter = ',')]
    pub order: Option<Vec<usize>>,

    /// Use synthetic sources and the in-memory encoder instead of the media host
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the timeline into one clip
    Render {
        #[command(flatten)]
        timeline: TimelineArgs,

        /// Audio track played underneath the clips
        #[arg(short, long)]
        audio: Option<PathBuf>,

        /// Audio position (seconds) the track starts from
        #[arg(long, requires = "audio")]
        audio_start: Option<f64>,

        /// Audio position (seconds) the capture keeps running until
        #[arg(long, requires = "audio")]
        audio_end: Option<f64>,

        /// Output file (defaults to the configured output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the artifact metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the first frame of each segment in timeline order
    Preview {
        #[command(flatten)]
        timeline: TimelineArgs,
    },

    /// Print derived segment durations and playback rates
    Plan {
        /// Comma-separated cut points in seconds
        #[arg(short, long)]
        timestamps: String,

        /// Natural clip lengths in seconds, in play order
        #[arg(long, value_delimiter = ',')]
        durations: Option<Vec<f64>>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check the media host for the elements rendering needs
    Check,

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (mut config, config_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    cliploom_common::logging::init_logging(&config.logging);
    if let Some(e) = config_error {
        tracing::warn!(error = %e, "Using default configuration");
    }

    match cli.command {
        Commands::Render {
            timeline,
            audio,
            audio_start,
            audio_end,
            output,
            json,
        } => {
            commands::render::run(
                &config,
                timeline,
                commands::render::AudioArgs {
                    path: audio,
                    start: audio_start,
                    end: audio_end,
                },
                output,
                json,
            )
            .await
        }
        Commands::Preview { timeline } => commands::preview::run(&config, timeline).await,
        Commands::Plan {
            timestamps,
            durations,
            json,
        } => commands::plan::run(&timestamps, durations, json),
        Commands::Check => commands::check::run(),
        Commands::Config { write } => commands::config::run(&config, write),
    }
}
