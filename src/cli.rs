use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediaforge")]
#[command(author, version, about = "Streaming media relay that remuxes and transcodes on the fly")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the ffmpeg command line a stream descriptor would run
    Args {
        /// Stream descriptor JSON file ("-" for stdin)
        #[arg(required = true)]
        descriptor: PathBuf,

        /// Strategy to build for (defaults to the one the descriptor selects)
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    LiveRemux,
    AudioOnly,
    VideoOnly,
    Gif,
}

impl From<StrategyArg> for mediaforge_common::Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::LiveRemux => Self::LiveRemux,
            StrategyArg::AudioOnly => Self::AudioOnly,
            StrategyArg::VideoOnly => Self::VideoOnly,
            StrategyArg::Gif => Self::Gif,
        }
    }
}
