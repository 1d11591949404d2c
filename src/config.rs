use std::{path::Path, time::Duration};

use clap::Args;

use crate::{keys::parse_clock, retry::RetryPolicy, visualizer::BAR_COUNT};

/// Options for an interactive playback session.
#[derive(Debug, Clone, Args)]
pub struct PlayerOptions {
    /// Timed lyrics file or http(s) URL [default: the audio path with a .lrc extension]
    #[arg(long, value_name = "SRC")]
    pub lyrics: Option<String>,

    /// Seek here once the audio is ready, then start playing (m:ss or seconds)
    #[arg(long, value_name = "TIME", value_parser = parse_start)]
    pub start: Option<f64>,

    /// Initial volume, 0.0 to 1.0
    #[arg(long, default_value_t = 1.0, value_parser = parse_volume)]
    pub volume: f32,

    /// Number of spectrum bars
    #[arg(long, default_value_t = BAR_COUNT, value_parser = parse_bars)]
    pub bars: usize,

    /// How often the view re-reads player state, in milliseconds (100 to 5000)
    #[arg(long, default_value_t = 500)]
    pub reconcile_ms: u64,

    /// Attempts for the start-up seek before giving up
    #[arg(long, default_value_t = 10)]
    pub retry_attempts: u32,

    /// Delay between start-up seek attempts, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub retry_delay_ms: u64,
}

fn parse_start(s: &str) -> Result<f64, String> {
    parse_clock(s).ok_or_else(|| format!("expected m:ss or seconds, got '{s}'"))
}

fn parse_volume(s: &str) -> Result<f32, String> {
    let v: f32 = s.parse().map_err(|_| format!("not a number: '{s}'"))?;
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(format!("volume must be between 0 and 1, got {v}"))
    }
}

fn parse_bars(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(n) if (1..=256).contains(&n) => Ok(n),
        _ => Err(format!("bar count must be 1 to 256, got '{s}'")),
    }
}

impl PlayerOptions {
    pub fn lyrics_source(&self, audio: &Path) -> String {
        match &self.lyrics {
            Some(src) => src.clone(),
            None => audio.with_extension("lrc").to_string_lossy().into_owned(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
            ..RetryPolicy::default()
        }
    }

    /// Unclamped; `Reconciler::new` applies the bounds.
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_ms)
    }
}
