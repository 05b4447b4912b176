// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "checkpost")]
#[command(about = "Transit checkpoint vehicle verification")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Config file (default: ~/.config/checkpost/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether text is a valid vehicle identifier
    Validate {
        /// Text to check, e.g. 12-34-567
        text: String,
    },

    /// Decode a QR code from an image file
    Decode {
        /// Image file
        image: PathBuf,

        /// Only decode a centred square of this size in pixels
        #[arg(short, long)]
        window: Option<u32>,
    },

    /// List cameras built from frame images
    List {
        /// Images the virtual camera replays
        #[arg(short, long, num_args = 1.., required = true)]
        frames: Vec<PathBuf>,
    },

    /// Run the scan, capture and verify workflow
    Run {
        /// Images the virtual camera replays
        #[arg(short, long, num_args = 1.., required = true)]
        frames: Vec<PathBuf>,

        /// Verification API base URL
        #[arg(long)]
        api_url: Option<String>,

        /// Bearer token for the verification API
        #[arg(long)]
        token: Option<String>,

        /// Read operator commands from stdin instead of capturing and
        /// confirming automatically
        #[arg(short, long)]
        interactive: bool,

        /// Decode the whole frame instead of the centred scan window
        #[arg(long)]
        full_frame: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=checkpost=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { text } => cli::validate_identifier(&text),
        Commands::Decode { image, window } => cli::decode_image(&image, window),
        Commands::List { frames } => cli::list_cameras(&frames),
        Commands::Run {
            frames,
            api_url,
            token,
            interactive,
            full_frame,
        } => cli::run_workflow(cli::RunOptions {
            frames,
            config: cli.config,
            api_url,
            token,
            interactive,
            full_frame,
        }),
    }
}
