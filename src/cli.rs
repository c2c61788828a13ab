use clap::{Parser, Subcommand};

use ytclip::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "ytclip",
    about = "Search YouTube transcripts for keywords and cut clips around the matches",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Preferred caption language (overrides config)
    #[arg(short, long, global = true)]
    pub lang: Option<String>,

    /// Output format: text (default), json
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    /// Show configuration and progress on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API
    Serve {
        /// Address to listen on (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Find transcript segments containing any of the keywords
    Analyze {
        /// Video or playlist URLs (reads from stdin if omitted)
        urls: Vec<String>,

        /// Keyword to search for (repeatable)
        #[arg(short, long = "keyword", required = true)]
        keywords: Vec<String>,
    },

    /// Cut clips out of a single video
    Clips {
        /// Video URL or ID
        url: String,

        /// Time range in seconds, START or START-END (repeatable)
        #[arg(short, long = "at", value_parser = ytclip::parse_timestamp, required = true)]
        timestamps: Vec<Timestamp>,

        /// Trim from the remote stream instead of downloading first
        #[arg(long)]
        remote: bool,
    },

    /// Print full transcripts
    Transcripts {
        /// Video URLs, or playlist URLs with --playlist
        #[arg(required = true)]
        urls: Vec<String>,

        /// Treat each URL as a playlist and expand it
        #[arg(long)]
        playlist: bool,
    },
}
