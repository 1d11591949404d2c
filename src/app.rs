use std::{
    io,
    path::Path,
    sync::mpsc::{Receiver, TryRecvError},
    time::{Duration, Instant},
};

use crossterm::event::{self, Event, KeyEventKind, MouseButton, MouseEvent, MouseEventKind};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    DefaultTerminal, Frame,
};
use tracing::{debug, info};

use crate::{
    config::PlayerOptions,
    controls::{controls_height, draw_controls},
    keys::{self, parse_clock, Command, Focus},
    lyrics::{draw_lyrics, spawn_fetch, FetchResult, LyricsState, LyricsSync},
    now_playing::{draw_now_playing_bar, now_playing_height},
    player::{PlaybackController, PlayerMirror, ReadyAction, Reconciler},
    progress::{draw_progress, progress_inner, seek_target},
    retry::RetryPolicy,
    theme::{Theme, THEME},
    transport::MediaTransport,
    visualizer::{draw_visualizer, AnalysisRegistry, Visualizer},
    volume::draw_volume,
};

// Roughly one display refresh
const FRAME: Duration = Duration::from_millis(16);
const JUMP_INPUT_MAX: usize = 12;

/// The song page: player, lyrics and spectrum for one audio file.
pub struct App<T: MediaTransport> {
    controller: PlaybackController<T>,
    file_name: String,
    lyrics_source: String,
    lyrics: LyricsSync,
    fetch_rx: Option<Receiver<FetchResult>>,
    lyrics_scroll: usize,
    visualizer: Visualizer,
    reconciler: Reconciler,
    mirror: PlayerMirror,
    start_at: Option<f64>,
    retry: RetryPolicy,
    focus: Focus,
    focus_before_jump: Focus,
    jump: String,
    progress_area: Rect,
    theme: &'static Theme,
    quit: bool,
}

impl<T: MediaTransport> App<T> {
    pub fn new(transport: T, audio: &Path, opts: &PlayerOptions, registry: AnalysisRegistry) -> Self {
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".into());

        let mut controller = PlaybackController::new(transport);
        controller.set_volume(opts.volume);

        App {
            controller,
            file_name,
            lyrics_source: opts.lyrics_source(audio),
            lyrics: LyricsSync::new(),
            fetch_rx: None,
            lyrics_scroll: 0,
            visualizer: Visualizer::new(registry, opts.bars),
            reconciler: Reconciler::new(opts.reconcile_interval()),
            mirror: PlayerMirror::default(),
            start_at: opts.start,
            retry: opts.retry_policy(),
            focus: Focus::Player,
            focus_before_jump: Focus::Player,
            jump: String::new(),
            progress_area: Rect::default(),
            theme: &THEME,
            quit: false,
        }
    }

    /// Open the player, start fetching lyrics, and queue the initial
    /// seek-and-play for when the audio is ready.
    pub fn start(&mut self, now: Instant) {
        self.controller.open();
        self.lyrics.subscribe(self.controller.subscribe());
        let ticket = self.lyrics.load(self.lyrics_source.clone());
        info!(source = %ticket.source, "fetching lyrics");
        self.fetch_rx = Some(spawn_fetch(ticket));
        self.controller.when_ready(
            ReadyAction {
                seek_to: self.start_at,
                play: true,
            },
            self.retry,
            now,
        );
    }

    /// Tear down in reverse: nothing may touch the player after it closes.
    pub fn shutdown(&mut self) {
        self.lyrics.cancel();
        self.lyrics.unsubscribe();
        self.fetch_rx = None;
        self.visualizer.unmount();
        self.controller.close();
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// One pass of the run loop's background work.
    pub fn tick(&mut self, now: Instant) {
        self.controller.pump(now);
        self.lyrics.pump();
        self.poll_fetch();

        if self.reconciler.poll(now, &self.controller, &mut self.mirror) {
            match &self.mirror.handle {
                Some(handle) => self.visualizer.attach(handle),
                None => self.visualizer.detach(),
            }
        }
        self.visualizer.tick(now, self.mirror.playing);
    }

    fn poll_fetch(&mut self) {
        let Some(rx) = &self.fetch_rx else {
            return;
        };
        match rx.try_recv() {
            Ok(fetched) => {
                self.lyrics.finish_load(fetched);
                self.fetch_rx = None;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => self.fetch_rx = None,
        }
    }

    pub fn apply(&mut self, command: Command) {
        debug!(?command, focus = ?self.focus, "command");
        match command {
            Command::TogglePlay => {
                self.controller.toggle();
                self.reconciler.force();
            }
            Command::SeekBy(delta) => {
                self.controller.seek_by(delta);
                self.reconciler.force();
            }
            Command::VolumeBy(delta) => {
                let volume = self.controller.volume() + delta;
                self.controller.set_volume(volume);
            }
            Command::ToggleMute => self.controller.toggle_mute(),
            Command::CycleFocus => self.focus = self.focus.next(),
            Command::OpenJump => {
                self.focus_before_jump = self.focus;
                self.focus = Focus::JumpInput;
                self.jump.clear();
            }
            Command::JumpChar(c) => {
                if self.jump.len() < JUMP_INPUT_MAX {
                    self.jump.push(c);
                }
            }
            Command::JumpBackspace => {
                self.jump.pop();
            }
            Command::JumpSubmit => {
                match parse_clock(&self.jump) {
                    Some(t) => {
                        self.controller.seek(t);
                        self.reconciler.force();
                    }
                    None => debug!(input = %self.jump, "ignoring unparseable jump target"),
                }
                self.focus = self.focus_before_jump;
            }
            Command::JumpCancel => self.focus = self.focus_before_jump,
            Command::Quit => self.quit = true,
        }
    }

    fn scrub_time(&self, column: u16, clamp: bool) -> Option<f64> {
        let inner = progress_inner(self.progress_area);
        if inner.width == 0 {
            return None;
        }
        let column = if clamp {
            column.clamp(inner.x, inner.x + inner.width - 1)
        } else {
            column
        };
        seek_target(self.progress_area, column, self.controller.duration())
    }

    fn over_progress(&self, m: &MouseEvent) -> bool {
        let area = self.progress_area;
        m.row >= area.y && m.row < area.y + area.height
    }

    /// Press, drag and release on the progress bar scrub the lyrics and
    /// commit a seek on release.
    pub fn on_mouse(&mut self, m: MouseEvent) {
        match m.kind {
            MouseEventKind::Down(MouseButton::Left) if self.over_progress(&m) => {
                if let Some(t) = self.scrub_time(m.column, false) {
                    self.lyrics.begin_scrub();
                    self.lyrics.scrub_to(t);
                }
            }
            MouseEventKind::Drag(MouseButton::Left) if self.lyrics.is_scrubbing() => {
                if let Some(t) = self.scrub_time(m.column, true) {
                    self.lyrics.scrub_to(t);
                }
            }
            MouseEventKind::Up(MouseButton::Left) => {
                if let Some(t) = self.lyrics.end_scrub() {
                    self.controller.seek(t);
                    self.reconciler.force();
                }
            }
            _ => {}
        }
    }
}

pub fn run<T: MediaTransport>(terminal: &mut DefaultTerminal, app: &mut App<T>) -> io::Result<()> {
    app.start(Instant::now());
    while !app.should_quit() {
        app.tick(Instant::now());
        terminal.draw(|f| draw(f, app))?;

        if event::poll(FRAME)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if let Some(command) = keys::resolve(key.code, key.modifiers, app.focus) {
                        app.apply(command);
                    }
                }
                Event::Mouse(m) => app.on_mouse(m),
                _ => {}
            }
        }
    }
    app.shutdown();
    Ok(())
}

fn draw<T: MediaTransport>(frame: &mut Frame, app: &mut App<T>) {
    let area = frame.area();
    let theme = app.theme;
    let state = app.controller.state();
    let meta = match app.lyrics.state() {
        LyricsState::Ready(doc) => Some(&doc.meta),
        _ => None,
    };
    let muted = app.controller.is_muted();

    let np_height = now_playing_height(state, &app.file_name, meta, area.width, theme);
    let ctl_height = controls_height(area.width, app.focus, &app.jump, muted, theme);
    let chunks = Layout::vertical([
        Constraint::Length(np_height),
        Constraint::Min(8),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(ctl_height),
    ])
    .split(area);
    let middle = Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[1]);

    draw_now_playing_bar(frame, chunks[0], state, &app.file_name, meta, theme);
    draw_lyrics(frame, middle[0], &app.lyrics, &mut app.lyrics_scroll, theme);
    draw_visualizer(
        frame,
        middle[1],
        app.visualizer.bars(),
        app.visualizer.is_live() && app.mirror.playing,
        theme,
    );

    app.progress_area = chunks[2];
    let scrub = app.lyrics.is_scrubbing().then(|| app.lyrics.display_time());
    draw_progress(
        frame,
        chunks[2],
        app.controller.current_time(),
        app.controller.duration(),
        scrub,
        app.focus == Focus::Scrubber,
        theme,
    );
    draw_volume(frame, chunks[3], app.controller.volume(), muted, theme);
    draw_controls(frame, chunks[4], app.focus, &app.jump, muted, theme);
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use clap::Parser;
    use crossterm::event::KeyModifiers;

    use super::*;
    use crate::transport::fake::FakeTransport;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        opts: PlayerOptions,
    }

    fn options(args: &[&str]) -> PlayerOptions {
        Harness::parse_from(std::iter::once("songsync").chain(args.iter().copied())).opts
    }

    fn started(dir: &tempfile::TempDir, args: &[&str]) -> (App<FakeTransport>, Instant) {
        let audio: PathBuf = dir.path().join("refrain.mp3");
        fs::write(
            audio.with_extension("lrc"),
            "[00:00.00]intro\n[00:57.00]chorus\n[01:30.00]outro\n",
        )
        .unwrap();
        let mut app = App::new(
            FakeTransport::with_duration(180.0),
            &audio,
            &options(args),
            AnalysisRegistry::default(),
        );
        let t0 = Instant::now();
        app.start(t0);
        let fetched = app.fetch_rx.take().unwrap().recv().unwrap();
        assert!(app.lyrics.finish_load(fetched));
        (app, t0)
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    #[test]
    fn start_position_is_applied_once_ready() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, t0) = started(&dir, &["--start", "0:57"]);

        app.tick(t0);
        assert_eq!(app.controller.current_time(), 0.0);

        app.tick(t0 + Duration::from_millis(200));
        assert_eq!(app.controller.current_time(), 57.0);
        assert!(app.controller.is_playing());

        // The view's mirror catches up on the next reconciliation.
        app.tick(t0 + Duration::from_millis(500));
        assert_eq!(app.lyrics.active(), Some(1));
        assert!(app.mirror.playing);
        assert!(app.visualizer.is_live());
    }

    #[test]
    fn dragging_the_progress_bar_scrubs_then_seeks() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, t0) = started(&dir, &[]);
        app.tick(t0 + Duration::from_millis(200));
        // Inner gauge spans columns 1..=10 on row 21.
        app.progress_area = Rect::new(0, 20, 12, 3);

        app.on_mouse(mouse(MouseEventKind::Down(MouseButton::Left), 1, 21));
        assert!(app.lyrics.is_scrubbing());
        app.on_mouse(mouse(MouseEventKind::Drag(MouseButton::Left), 40, 2));
        assert_eq!(app.lyrics.display_time(), 180.0);
        assert_eq!(app.lyrics.active(), Some(2));
        assert_eq!(app.controller.current_time(), 0.0);

        app.on_mouse(mouse(MouseEventKind::Up(MouseButton::Left), 40, 2));
        assert!(!app.lyrics.is_scrubbing());
        assert_eq!(app.controller.current_time(), 180.0);
    }

    #[test]
    fn go_to_input_seeks_and_restores_focus() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, t0) = started(&dir, &[]);
        app.tick(t0 + Duration::from_millis(200));

        app.apply(Command::CycleFocus);
        app.apply(Command::OpenJump);
        assert_eq!(app.focus, Focus::JumpInput);
        for c in "1:30".chars() {
            app.apply(Command::JumpChar(c));
        }
        app.apply(Command::JumpSubmit);
        assert_eq!(app.focus, Focus::Scrubber);
        assert_eq!(app.controller.current_time(), 90.0);

        app.apply(Command::OpenJump);
        app.apply(Command::JumpChar('9'));
        app.apply(Command::JumpCancel);
        assert_eq!(app.controller.current_time(), 90.0);
    }

    #[test]
    fn volume_keys_stay_in_range() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _) = started(&dir, &["--volume", "0.98"]);
        app.apply(Command::VolumeBy(0.05));
        assert_eq!(app.controller.volume(), 1.0);
        app.apply(Command::ToggleMute);
        assert!(app.controller.is_muted());
    }

    #[test]
    fn shutdown_releases_everything() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, t0) = started(&dir, &[]);
        app.tick(t0 + Duration::from_millis(200));
        app.apply(Command::Quit);
        assert!(app.should_quit());

        app.shutdown();
        assert!(!app.controller.is_open());
        assert!(!app.visualizer.is_mounted());
        // Late fetch results are ignored after teardown.
        assert!(!app.lyrics.finish_load(FetchResult {
            generation: 1,
            result: Ok(String::new()),
        }));
    }
}
