use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
};
use serde::Serialize;
use tracing::{info, Level};

use songsync::{
    app::{self, App},
    config::PlayerOptions,
    keys::parse_clock,
    locate::active_line,
    lrc::{format_timestamp, parse_document, LrcMeta},
    lyrics::fetch_timed_text,
    rodio_transport::RodioTransport,
    visualizer::AnalysisRegistry,
};

#[derive(Parser)]
#[command(name = "songsync", version, about = "Play a song with synced lyrics and a live spectrum")]
struct Cli {
    /// Write logs to this file (the player owns the terminal)
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// More log output: -v info, -vv debug, -vvv trace
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Play an audio file with its timed lyrics
    Play {
        /// Audio file to play
        audio: PathBuf,

        #[command(flatten)]
        opts: PlayerOptions,
    },
    /// Print the lines of a timed lyrics file or URL
    Lyrics {
        /// Lyrics file or http(s) URL
        source: String,

        /// Mark the line active at this time (m:ss or seconds)
        #[arg(long, value_name = "TIME", value_parser = parse_at)]
        at: Option<f64>,

        /// Output as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn parse_at(s: &str) -> Result<f64, String> {
    parse_clock(s).ok_or_else(|| format!("expected m:ss or seconds, got '{s}'"))
}

#[derive(Serialize)]
struct JsonLine<'a> {
    time: f64,
    text: &'a str,
    active: bool,
}

#[derive(Serialize)]
struct JsonLyrics<'a> {
    meta: &'a LrcMeta,
    lines: Vec<JsonLine<'a>>,
}

fn init_logging(log_file: Option<&Path>, verbose: u8, interactive: bool) -> Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    match log_file {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_max_level(level)
                .init();
        }
        // Anything written to the terminal would tear through the TUI.
        None if interactive => {}
        None => {
            tracing_subscriber::fmt()
                .with_writer(io::stderr)
                .with_target(false)
                .with_max_level(level)
                .init();
        }
    }
    Ok(())
}

fn print_lyrics(source: &str, at: Option<f64>, json: bool) -> Result<()> {
    let text = fetch_timed_text(source)
        .with_context(|| format!("Unable to load lyrics file: {source}"))?;
    let doc = parse_document(&text);
    let active = at.and_then(|t| active_line(&doc.lines, t));

    if json {
        let lines: Vec<JsonLine> = doc
            .lines
            .iter()
            .enumerate()
            .map(|(i, l)| JsonLine {
                time: l.seconds(),
                text: &l.text,
                active: active == Some(i),
            })
            .collect();
        let out = JsonLyrics {
            meta: &doc.meta,
            lines,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if doc.lines.is_empty() {
        println!("No lyrics available");
        return Ok(());
    }
    for (i, line) in doc.lines.iter().enumerate() {
        let marker = if active == Some(i) { '>' } else { ' ' };
        println!("{marker} {} {}", format_timestamp(line.time), line.text);
    }
    Ok(())
}

fn play(audio: PathBuf, opts: PlayerOptions) -> Result<()> {
    let transport = RodioTransport::new(audio.clone()).context("Failed to open audio output")?;
    let mut app = App::new(transport, &audio, &opts, AnalysisRegistry::default());
    info!(audio = %audio.display(), "starting player");

    let mut terminal = ratatui::init();
    let result = execute!(io::stdout(), EnableMouseCapture)
        .and_then(|()| app::run(&mut terminal, &mut app));
    let _ = execute!(io::stdout(), DisableMouseCapture);
    ratatui::restore();
    result.context("Terminal I/O failed")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let interactive = matches!(cli.command, Cmd::Play { .. });
    init_logging(cli.log_file.as_deref(), cli.verbose, interactive)?;

    match cli.command {
        Cmd::Play { audio, opts } => play(audio, opts),
        Cmd::Lyrics { source, at, json } => print_lyrics(&source, at, json),
    }
}
