use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use eyre::{Result, bail};
use log::{debug, info};

mod cli;

use cli::{Cli, Command as CliCommand, OutputFormat};
use ytclip::clip::CLIPS_URL_PREFIX;
use ytclip::config::Config;
use ytclip::output;
use ytclip::pipeline::{ClipMode, Pipeline, TranscriptSet};

fn setup_logging() -> Result<()> {
    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("ytclip.log");

    let target = Box::new(std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?);

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized: {}", log_file.display());
    Ok(())
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ytclip")
        .join("logs")
}

fn tool_version(name: &str) -> Option<String> {
    Command::new(name)
        .arg(if name.ends_with("ffmpeg") { "-version" } else { "--version" })
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| {
            String::from_utf8_lossy(&o.stdout)
                .trim()
                .lines()
                .next()
                .unwrap_or("")
                .to_string()
        })
}

fn build_after_help(config: &Config) -> String {
    let tool_line = |name: &str, purpose: &str| match tool_version(name) {
        Some(v) => format!("  \x1b[32m✅\x1b[0m {name:<10} {v}"),
        None => format!("  \x1b[31m❌\x1b[0m {name:<10} (not found, needed for {purpose})"),
    };

    let log_path = log_dir().join("ytclip.log");

    format!(
        "\nREQUIRED TOOLS:\n{}\n{}\n\nLogs are written to: {}",
        tool_line(&config.yt_dlp, "playlists and downloads"),
        tool_line(&config.ffmpeg, "clip extraction"),
        log_path.display()
    )
}

fn read_stdin_urls() -> Result<Vec<String>> {
    let stdin = io::stdin();
    let lines = stdin.lock().lines().collect::<Result<Vec<_>, _>>()?;
    Ok(lines
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

fn print_transcripts(set: &TranscriptSet, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", output::render_transcripts_text(set)),
        OutputFormat::Json => println!("{}", output::render_json(set)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;

    // Load config file (non-fatal if missing/invalid)
    let mut config = Config::load().unwrap_or_default();

    let after_help = build_after_help(&config);
    let cmd = <Cli as clap::CommandFactory>::command().after_help(after_help);
    let matches = cmd.get_matches();
    let cli = <Cli as clap::FromArgMatches>::from_arg_matches(&matches)?;

    // CLI flags take priority over config
    if let Some(ref lang) = cli.lang {
        config.default_lang = lang.clone();
    }

    if cli.verbose {
        let config_path = ytclip::config::config_path();
        if config_path.exists() {
            eprintln!("Config: {}", config_path.display());
        }
        eprintln!("Language: {}", config.default_lang);
        debug!("Effective config: {config:?}");
    }

    match cli.command {
        CliCommand::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            let pipeline = Arc::new(Pipeline::from_config(&config)?);
            if cli.verbose {
                eprintln!("Serving on {bind}, clips in {}", config.clip_dir.display());
            }
            ytclip::server::serve(pipeline, &bind).await?;
        }
        CliCommand::Analyze { urls, keywords } => {
            let urls = if urls.is_empty() { read_stdin_urls()? } else { urls };
            if urls.is_empty() {
                bail!("no URL provided\n\nUsage: ytclip analyze -k <KEYWORD> <URL>...\n       echo <URL> | ytclip analyze -k <KEYWORD>");
            }

            let pipeline = Pipeline::from_config(&config)?;
            let analysis = pipeline.analyze(&urls, &keywords).await?;
            if cli.verbose {
                eprintln!(
                    "Videos with transcripts: {}, skipped: {}",
                    analysis.results.len(),
                    analysis.skipped.len()
                );
            }
            match cli.format {
                OutputFormat::Text => println!("{}", output::render_analysis_text(&analysis)),
                OutputFormat::Json => println!("{}", output::render_json(&analysis)),
            }
        }
        CliCommand::Clips { url, timestamps, remote } => {
            let pipeline = Pipeline::from_config(&config)?;
            let mode = if remote { ClipMode::Remote } else { ClipMode::Download };
            let list = pipeline.extract_clips(&url, &timestamps, mode).await?;
            match cli.format {
                OutputFormat::Text => {
                    let prefix = format!("{CLIPS_URL_PREFIX}/");
                    for clip in &list.clips {
                        let relative = clip.strip_prefix(&prefix).unwrap_or(clip);
                        println!("{}", config.clip_dir.join(relative).display());
                    }
                }
                OutputFormat::Json => println!("{}", output::render_json(&list)),
            }
        }
        CliCommand::Transcripts { urls, playlist } => {
            let pipeline = Pipeline::from_config(&config)?;
            if playlist {
                for url in &urls {
                    let set = pipeline.expand_playlist(url).await?;
                    print_transcripts(&set, cli.format);
                }
            } else {
                let set = pipeline.playlist_transcripts(&urls).await?;
                print_transcripts(&set, cli.format);
            }
        }
    }

    Ok(())
}
