use std::{
    fs, io,
    sync::mpsc::{self, Receiver, TryRecvError},
    thread,
};

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Wrap},
    Frame,
};
use tracing::{debug, warn};

use crate::{
    error::FetchError,
    locate::active_line,
    lrc::{parse_document, LrcDocument, TimedLine},
    theme::Theme,
};

/// Lines kept visible above and below the active line when auto-scrolling.
const REVEAL_MARGIN: usize = 2;

fn fetch_url(url: &str) -> Result<String, FetchError> {
    let mut response = ureq::get(url).call().map_err(|e| match e {
        ureq::Error::StatusCode(status) => FetchError::Status {
            status,
            url: url.to_string(),
        },
        other => FetchError::Io(other.to_string()),
    })?;
    response
        .body_mut()
        .read_to_string()
        .map_err(|e| FetchError::Io(e.to_string()))
}

fn fetch_file(path: &str) -> Result<String, FetchError> {
    match fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(FetchError::NotFound(path.to_string())),
        Err(e) => Err(FetchError::Io(e.to_string())),
    }
}

/// Read a timed-text source: `http(s)://` URLs over the network, anything
/// else from disk.
pub fn fetch_timed_text(source: &str) -> Result<String, FetchError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        fetch_url(source)
    } else {
        fetch_file(source)
    }
}

/// Identifies one load request. Results carrying an older generation are
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub generation: u64,
    pub source: String,
}

#[derive(Debug)]
pub struct FetchResult {
    pub generation: u64,
    pub result: Result<String, FetchError>,
}

pub fn spawn_fetch(ticket: LoadTicket) -> Receiver<FetchResult> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = fetch_timed_text(&ticket.source);
        let _ = tx.send(FetchResult {
            generation: ticket.generation,
            result,
        });
    });
    rx
}

#[derive(Debug, Clone, PartialEq)]
pub enum LyricsState {
    Loading,
    /// The fetch failed; holds the message to show.
    Error(String),
    /// The source was read but had no timed lines.
    Empty,
    Ready(LrcDocument),
}

/// Keeps the active lyric line in step with the player's time stream.
pub struct LyricsSync {
    source: String,
    state: LyricsState,
    generation: u64,
    time: f64,
    scrub: Option<f64>,
    active: Option<usize>,
    stream: Option<Receiver<f64>>,
}

impl Default for LyricsSync {
    fn default() -> Self {
        Self::new()
    }
}

impl LyricsSync {
    pub fn new() -> Self {
        LyricsSync {
            source: String::new(),
            state: LyricsState::Loading,
            generation: 0,
            time: 0.0,
            scrub: None,
            active: None,
            stream: None,
        }
    }

    /// Switch to a new source. The caller performs the fetch with the ticket.
    pub fn load(&mut self, source: impl Into<String>) -> LoadTicket {
        self.generation += 1;
        self.source = source.into();
        self.state = LyricsState::Loading;
        self.active = None;
        LoadTicket {
            generation: self.generation,
            source: self.source.clone(),
        }
    }

    /// Invalidate any fetch still in flight.
    pub fn cancel(&mut self) {
        self.generation += 1;
    }

    /// Apply a fetch result. Returns false when it belongs to a load that
    /// has since been replaced or cancelled.
    pub fn finish_load(&mut self, fetched: FetchResult) -> bool {
        if fetched.generation != self.generation {
            debug!(
                stale = fetched.generation,
                current = self.generation,
                "dropping stale lyrics response"
            );
            return false;
        }
        self.state = match fetched.result {
            Err(e) => {
                warn!("lyrics unavailable: {e}");
                LyricsState::Error(e.to_string())
            }
            Ok(text) => {
                let doc = parse_document(&text);
                if doc.lines.is_empty() {
                    LyricsState::Empty
                } else {
                    debug!(lines = doc.lines.len(), "lyrics loaded");
                    LyricsState::Ready(doc)
                }
            }
        };
        self.recompute();
        true
    }

    pub fn subscribe(&mut self, stream: Receiver<f64>) {
        self.stream = Some(stream);
    }

    pub fn unsubscribe(&mut self) {
        self.stream = None;
    }

    /// Drain the time stream. Returns true if anything arrived.
    pub fn pump(&mut self) -> bool {
        let mut received = false;
        loop {
            let next = match &self.stream {
                Some(rx) => rx.try_recv(),
                None => return received,
            };
            match next {
                Ok(t) => {
                    received = true;
                    self.on_time_update(t);
                }
                Err(TryRecvError::Empty) => return received,
                Err(TryRecvError::Disconnected) => {
                    self.stream = None;
                    return received;
                }
            }
        }
    }

    /// A time reported by the player. Ignored while the user is scrubbing,
    /// since it describes where playback was, not where it is headed.
    pub fn on_time_update(&mut self, t: f64) {
        if self.scrub.is_some() || !t.is_finite() {
            return;
        }
        self.time = t;
        self.recompute();
    }

    pub fn begin_scrub(&mut self) {
        self.scrub = Some(self.time);
    }

    pub fn scrub_to(&mut self, t: f64) {
        if self.scrub.is_none() || !t.is_finite() {
            return;
        }
        self.scrub = Some(t.max(0.0));
        self.recompute();
    }

    /// Finish scrubbing and hand back the position to seek to.
    pub fn end_scrub(&mut self) -> Option<f64> {
        let t = self.scrub.take()?;
        self.time = t;
        self.recompute();
        Some(t)
    }

    pub fn is_scrubbing(&self) -> bool {
        self.scrub.is_some()
    }

    /// The scrub position while scrubbing, otherwise the last reported time.
    pub fn display_time(&self) -> f64 {
        self.scrub.unwrap_or(self.time)
    }

    fn recompute(&mut self) {
        self.active = match &self.state {
            LyricsState::Ready(doc) => active_line(&doc.lines, self.display_time()),
            _ => None,
        };
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn state(&self) -> &LyricsState {
        &self.state
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn lines(&self) -> &[TimedLine] {
        match &self.state {
            LyricsState::Ready(doc) => &doc.lines,
            _ => &[],
        }
    }
}

/// Scroll offset that keeps `active` on screen with a small margin.
pub fn reveal_offset(scroll: usize, active: usize, visible: usize, total: usize) -> usize {
    if visible == 0 {
        return 0;
    }
    let margin = REVEAL_MARGIN.min(visible.saturating_sub(1) / 2);
    let mut scroll = scroll;
    if active < scroll + margin {
        scroll = active.saturating_sub(margin);
    } else if active + margin >= scroll + visible {
        scroll = active + margin + 1 - visible;
    }
    scroll.min(total.saturating_sub(visible))
}

fn message(text: String, theme: &Theme) -> Vec<Line<'static>> {
    text.lines()
        .map(|l| Line::styled(l.to_string(), Style::default().fg(theme.dimmed)))
        .collect()
}

/// Draw the lyrics panel with the active line highlighted.
pub fn draw_lyrics(
    frame: &mut Frame,
    area: Rect,
    sync: &LyricsSync,
    lyrics_scroll: &mut usize,
    theme: &Theme,
) {
    let mut title = String::from(" Lyrics ");
    let lyrics_lines: Vec<Line> = match sync.state() {
        LyricsState::Loading => message(format!("Loading lyrics...\n\n{}", sync.source()), theme),
        LyricsState::Error(msg) => {
            let mut lines = vec![Line::styled(
                format!("Unable to load lyrics file: {msg}"),
                Style::default().fg(theme.negative),
            )];
            lines.push(Line::styled(
                format!("Path: {}", sync.source()),
                Style::default().fg(theme.dimmed),
            ));
            lines
        }
        LyricsState::Empty => message("No lyrics available".into(), theme),
        LyricsState::Ready(doc) => {
            if let (Some(t), Some(a)) = (&doc.meta.title, &doc.meta.artist) {
                title = format!(" Lyrics · {t} - {a} ");
            }
            doc.lines
                .iter()
                .enumerate()
                .map(|(i, l)| {
                    let text = if l.is_blank() { " ".to_string() } else { l.text.clone() };
                    if sync.active() == Some(i) {
                        Line::from(Span::styled(
                            text,
                            Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
                        ))
                    } else {
                        Line::from(Span::styled(text, Style::default().fg(theme.dimmed)))
                    }
                    .centered()
                })
                .collect()
        }
    };

    let visible_height = area.height.saturating_sub(2) as usize;
    let total_lines = lyrics_lines.len();
    if let Some(active) = sync.active() {
        *lyrics_scroll = reveal_offset(*lyrics_scroll, active, visible_height, total_lines);
    } else {
        *lyrics_scroll = (*lyrics_scroll).min(total_lines.saturating_sub(visible_height));
    }

    let lyrics_widget = Paragraph::new(lyrics_lines)
        .wrap(Wrap { trim: true })
        .scroll((*lyrics_scroll as u16, 0))
        .style(Style::default().fg(theme.text))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .title(title),
        );
    frame.render_widget(lyrics_widget, area);
}
