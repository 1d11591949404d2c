use std::{
    sync::mpsc::{self, Receiver, Sender},
    time::{Duration, Instant},
};

use tracing::{debug, trace, warn};

use crate::{
    error::PlayerError,
    retry::{Attempt, Retry, RetryPolicy},
    transport::{MediaHandle, MediaTransport, ReadyState, TransportEvent},
};

/// Volume writes smaller than this are not sent to the transport.
pub const VOLUME_EPSILON: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
    Error,
}

impl PlayerPhase {
    pub fn label(self) -> &'static str {
        match self {
            PlayerPhase::Idle => "Idle",
            PlayerPhase::Loading => "Loading",
            PlayerPhase::Ready => "Ready",
            PlayerPhase::Playing => "Playing",
            PlayerPhase::Paused => "Paused",
            PlayerPhase::Ended => "Ended",
            PlayerPhase::Error => "Error",
        }
    }
}

/// A value we have asked for (`local`) next to the one the transport last
/// reported (`confirmed`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reconciled<T> {
    pub local: T,
    pub confirmed: T,
}

impl<T: Copy> Reconciled<T> {
    fn confirm(&mut self, value: T) {
        self.local = value;
        self.confirmed = value;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub phase: PlayerPhase,
    pub time: Reconciled<f64>,
    pub playing: Reconciled<bool>,
    pub duration: Option<f64>,
    pub buffering: bool,
    pub volume: f32,
    pub error: Option<PlayerError>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState {
            phase: PlayerPhase::Idle,
            time: Reconciled::default(),
            playing: Reconciled::default(),
            duration: None,
            buffering: false,
            volume: 1.0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekOutcome {
    Applied(f64),
    Clamped { requested: f64, applied: f64 },
    Rejected,
    Failed,
}

/// What to do once the transport can play from a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadyAction {
    pub seek_to: Option<f64>,
    pub play: bool,
}

struct PendingAction {
    action: ReadyAction,
    retry: Retry,
}

/// Imperative front for one media transport.
///
/// Transport requests are fire-and-forget; state changes when the matching
/// events are pumped. Seeks are the exception: the time is updated and
/// published right away.
pub struct PlaybackController<T: MediaTransport> {
    transport: T,
    state: PlaybackState,
    open: bool,
    awaiting_seek: bool,
    subscribers: Vec<Sender<f64>>,
    pending: Option<PendingAction>,
    scratch: Vec<TransportEvent>,
}

impl<T: MediaTransport> PlaybackController<T> {
    pub fn new(transport: T) -> Self {
        PlaybackController {
            transport,
            state: PlaybackState::default(),
            open: false,
            awaiting_seek: false,
            subscribers: Vec::new(),
            pending: None,
            scratch: Vec::new(),
        }
    }

    pub fn open(&mut self) {
        if self.open {
            return;
        }
        let volume = self.state.volume;
        self.state = PlaybackState {
            phase: PlayerPhase::Loading,
            volume,
            ..PlaybackState::default()
        };
        self.open = true;
        self.write_volume(volume);
        self.transport.load();
        debug!("player opened");
    }

    /// Stop playback and forget everything except volume.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.transport.pause();
        // Events from this session must not leak into the next one.
        self.transport.poll_events(&mut self.scratch);
        self.scratch.clear();
        self.subscribers.clear();
        self.pending = None;
        self.awaiting_seek = false;
        let volume = self.state.volume;
        self.state = PlaybackState {
            volume,
            ..PlaybackState::default()
        };
        self.open = false;
        debug!("player closed");
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn play(&mut self) {
        if !self.open {
            return;
        }
        match self.transport.play() {
            Ok(()) => {
                self.state.playing.local = true;
                if self.state.phase == PlayerPhase::Ended {
                    self.state.phase = PlayerPhase::Ready;
                }
            }
            Err(e) => {
                warn!("play rejected: {e}");
                self.state.error = Some(PlayerError::PlayRejected(e.to_string()));
            }
        }
    }

    pub fn pause(&mut self) {
        if !self.open {
            return;
        }
        self.transport.pause();
        self.state.playing.local = false;
    }

    pub fn toggle(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    fn effective_duration(&self) -> Option<f64> {
        match self.transport.duration() {
            Some(d) if d.is_finite() && d > 0.0 => Some(d),
            _ => self.state.duration.filter(|d| *d > 0.0),
        }
    }

    /// Jump to `seconds`, clamped to the known duration. Negative or
    /// non-finite targets are ignored.
    pub fn seek(&mut self, seconds: f64) -> SeekOutcome {
        if !self.open || !seconds.is_finite() || seconds < 0.0 {
            trace!(seconds, "seek ignored");
            return SeekOutcome::Rejected;
        }
        let applied = match self.effective_duration() {
            Some(max) => seconds.clamp(0.0, max),
            None => seconds,
        };
        if let Err(e) = self.transport.set_position(applied) {
            debug!("seek to {applied:.2}s failed: {e}");
            return SeekOutcome::Failed;
        }
        self.state.time.local = applied;
        self.awaiting_seek = true;
        if self.state.phase == PlayerPhase::Ended {
            self.state.phase = PlayerPhase::Ready;
        }
        self.publish(applied);

        if applied == seconds {
            SeekOutcome::Applied(applied)
        } else {
            SeekOutcome::Clamped {
                requested: seconds,
                applied,
            }
        }
    }

    /// Relative seek for keyboard use; never goes below zero.
    pub fn seek_by(&mut self, delta: f64) -> SeekOutcome {
        let target = (self.current_time() + delta).max(0.0);
        self.seek(target)
    }

    pub fn current_time(&self) -> f64 {
        self.state.time.local
    }

    pub fn duration(&self) -> Option<f64> {
        self.effective_duration()
    }

    /// Whether the transport is actually playing right now.
    pub fn is_playing(&self) -> bool {
        self.open && !self.transport.is_paused()
    }

    /// For the visualizer pipeline only.
    pub fn media_handle(&self) -> MediaHandle {
        self.transport.handle()
    }

    pub fn volume(&self) -> f32 {
        self.state.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        if volume.is_nan() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.state.volume = volume;
        self.write_volume(volume);
    }

    pub fn is_muted(&self) -> bool {
        self.transport.is_muted()
    }

    pub fn toggle_mute(&mut self) {
        let muted = !self.transport.is_muted();
        self.transport.set_muted(muted);
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// A stream of `currentTime` values, one per transport update or seek.
    pub fn subscribe(&mut self) -> Receiver<f64> {
        let (tx, rx) = mpsc::channel();
        tx.send(self.current_time()).ok();
        self.subscribers.push(tx);
        rx
    }

    /// Run `action` once the transport has current data, retrying on the
    /// policy's cadence until it does.
    pub fn when_ready(&mut self, action: ReadyAction, policy: RetryPolicy, now: Instant) {
        self.pending = Some(PendingAction {
            action,
            retry: Retry::start(policy, now),
        });
    }

    pub fn has_pending_action(&self) -> bool {
        self.pending.is_some()
    }

    /// Apply queued transport events and advance any pending ready-action.
    pub fn pump(&mut self, now: Instant) {
        let mut events = std::mem::take(&mut self.scratch);
        self.transport.poll_events(&mut events);
        for event in events.drain(..) {
            self.handle_event(event);
        }
        self.scratch = events;
        self.run_pending(now);
    }

    fn run_pending(&mut self, now: Instant) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        match pending.retry.poll(now) {
            Attempt::Wait => {}
            Attempt::Exhausted => {
                warn!(
                    "gave up waiting for the player after {} attempts",
                    pending.retry.attempts()
                );
                self.pending = None;
            }
            Attempt::Try(n) => {
                if self.open && self.transport.ready_state() >= ReadyState::HaveCurrentData {
                    let action = pending.action;
                    self.pending = None;
                    debug!(attempt = n, "player ready, running queued action");
                    if let Some(t) = action.seek_to {
                        self.seek(t);
                    }
                    if action.play {
                        self.play();
                    }
                }
            }
        }
    }

    fn write_volume(&mut self, volume: f32) {
        if (self.transport.volume() - volume).abs() > VOLUME_EPSILON {
            self.transport.set_volume(volume);
        }
    }

    fn publish(&mut self, time: f64) {
        self.subscribers.retain(|tx| tx.send(time).is_ok());
    }

    fn handle_event(&mut self, event: TransportEvent) {
        if !self.open {
            return;
        }
        trace!(?event, "transport event");
        let s = &mut self.state;
        match event {
            TransportEvent::LoadStart => {
                if s.phase != PlayerPhase::Error {
                    s.phase = PlayerPhase::Loading;
                }
            }
            TransportEvent::LoadedMetadata { duration } => {
                if let Some(d) = duration.filter(|d| d.is_finite() && *d > 0.0) {
                    s.duration = Some(d);
                }
                s.error = None;
                if matches!(s.phase, PlayerPhase::Loading | PlayerPhase::Error) {
                    s.phase = PlayerPhase::Ready;
                }
            }
            TransportEvent::CanPlay => {
                s.buffering = false;
                s.error = None;
                if s.phase == PlayerPhase::Loading {
                    s.phase = PlayerPhase::Ready;
                }
            }
            TransportEvent::CanPlayThrough => s.buffering = false,
            TransportEvent::Waiting => s.buffering = true,
            TransportEvent::Play | TransportEvent::Playing => {
                s.playing.confirm(true);
                s.buffering = false;
                s.phase = PlayerPhase::Playing;
            }
            TransportEvent::Pause => {
                s.playing.confirm(false);
                if matches!(s.phase, PlayerPhase::Playing | PlayerPhase::Ready) {
                    s.phase = PlayerPhase::Paused;
                }
            }
            TransportEvent::Ended => {
                s.playing.confirm(false);
                s.time.confirm(0.0);
                s.phase = PlayerPhase::Ended;
                self.awaiting_seek = false;
                self.publish(0.0);
            }
            TransportEvent::Seeked => {
                self.awaiting_seek = false;
                let t = self.transport.position();
                if t.is_finite() && t >= 0.0 {
                    self.state.time.confirm(t);
                    self.publish(t);
                }
            }
            TransportEvent::TimeUpdate => {
                // Anything before `seeked` describes the old position.
                if self.awaiting_seek
                    || self.transport.ready_state() < ReadyState::HaveCurrentData
                {
                    return;
                }
                let t = self.transport.position();
                if t.is_finite() && t >= 0.0 {
                    self.state.time.confirm(t);
                    self.publish(t);
                }
            }
            TransportEvent::VolumeChange => {
                s.volume = self.transport.volume().clamp(0.0, 1.0);
            }
            TransportEvent::Error(kind) => {
                warn!(?kind, "transport error");
                s.playing.confirm(false);
                s.buffering = false;
                s.error = Some(PlayerError::Transport(kind));
                s.phase = PlayerPhase::Error;
            }
        }
    }
}

pub const MIN_RECONCILE_INTERVAL: Duration = Duration::from_millis(100);
pub const MAX_RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

/// What the outer view believes about the player between reconciliations.
#[derive(Debug, Clone, Default)]
pub struct PlayerMirror {
    pub playing: bool,
    pub handle: Option<MediaHandle>,
}

/// Re-reads player state on a fixed interval instead of trusting that every
/// transport event was seen, and on demand after user commands.
#[derive(Debug, Clone)]
pub struct Reconciler {
    interval: Duration,
    next_due: Option<Instant>,
}

impl Reconciler {
    pub fn new(interval: Duration) -> Self {
        Reconciler {
            interval: interval.clamp(MIN_RECONCILE_INTERVAL, MAX_RECONCILE_INTERVAL),
            next_due: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Make the next `poll` run regardless of the interval.
    pub fn force(&mut self) {
        self.next_due = None;
    }

    pub fn poll<T: MediaTransport>(
        &mut self,
        now: Instant,
        controller: &PlaybackController<T>,
        mirror: &mut PlayerMirror,
    ) -> bool {
        if self.next_due.is_some_and(|due| now < due) {
            return false;
        }
        self.next_due = Some(now + self.interval);
        mirror.playing = controller.is_playing();
        mirror.handle = controller.is_open().then(|| controller.media_handle());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::MediaErrorKind, transport::fake::FakeTransport};

    fn opened(transport: FakeTransport) -> PlaybackController<FakeTransport> {
        let mut c = PlaybackController::new(transport);
        c.open();
        c.pump(Instant::now());
        c
    }

    #[test]
    fn loads_into_ready() {
        let c = opened(FakeTransport::with_duration(180.0));
        assert_eq!(c.state().phase, PlayerPhase::Ready);
        assert_eq!(c.duration(), Some(180.0));
    }

    #[test]
    fn stays_loading_without_metadata() {
        let c = opened(FakeTransport::new());
        assert_eq!(c.state().phase, PlayerPhase::Loading);
        assert_eq!(c.duration(), None);
    }

    #[test]
    fn seek_clamps_to_known_duration() {
        let mut c = opened(FakeTransport::with_duration(180.0));
        assert_eq!(c.seek(-5.0), SeekOutcome::Rejected);
        assert_eq!(c.current_time(), 0.0);
        assert_eq!(
            c.seek(200.0),
            SeekOutcome::Clamped {
                requested: 200.0,
                applied: 180.0
            }
        );
        assert_eq!(c.current_time(), 180.0);
        assert_eq!(c.transport().position, 180.0);
    }

    #[test]
    fn seek_passes_through_when_duration_unknown() {
        let mut c = opened(FakeTransport::new());
        assert_eq!(c.seek(200.0), SeekOutcome::Applied(200.0));
        assert_eq!(c.current_time(), 200.0);
    }

    #[test]
    fn seek_uses_last_known_duration_when_transport_forgets() {
        let mut c = opened(FakeTransport::with_duration(90.0));
        c.transport_mut().duration = Some(f64::INFINITY);
        c.seek(120.0);
        assert_eq!(c.current_time(), 90.0);
    }

    #[test]
    fn seek_rejects_non_finite() {
        let mut c = opened(FakeTransport::with_duration(60.0));
        c.seek(10.0);
        assert_eq!(c.seek(f64::NAN), SeekOutcome::Rejected);
        assert_eq!(c.seek(f64::INFINITY), SeekOutcome::Rejected);
        assert_eq!(c.current_time(), 10.0);
    }

    #[test]
    fn seek_failures_are_swallowed() {
        let mut c = opened(FakeTransport::with_duration(60.0));
        c.transport_mut().fail_seek = true;
        assert_eq!(c.seek(30.0), SeekOutcome::Failed);
        assert_eq!(c.current_time(), 0.0);
        assert!(c.state().error.is_none());
    }

    #[test]
    fn seek_publishes_before_transport_confirms() {
        let mut c = opened(FakeTransport::with_duration(60.0));
        let rx = c.subscribe();
        assert_eq!(rx.try_recv(), Ok(0.0));
        c.seek(42.0);
        assert_eq!(rx.try_recv(), Ok(42.0));
    }

    #[test]
    fn stale_time_updates_are_ignored_until_seeked() {
        let mut c = opened(FakeTransport::with_duration(60.0));
        c.transport_mut().position = 3.0;
        let rx = c.subscribe();
        rx.try_recv().ok();

        c.seek(40.0);
        // A timeupdate from before the seek lands first.
        c.transport_mut().queued.push_front(TransportEvent::TimeUpdate);
        c.pump(Instant::now());

        let seen: Vec<f64> = rx.try_iter().collect();
        assert_eq!(seen, [40.0, 40.0]);
        assert_eq!(c.current_time(), 40.0);

        c.transport_mut().advance_to(40.25);
        c.pump(Instant::now());
        assert_eq!(rx.try_recv(), Ok(40.25));
    }

    #[test]
    fn pause_then_play_settles_on_playing() {
        let mut c = opened(FakeTransport::with_duration(60.0));
        c.play();
        c.pump(Instant::now());
        assert!(c.is_playing());

        c.pause();
        c.play();
        // Nothing confirmed yet, but the transport itself is playing.
        assert!(c.is_playing());
        c.pump(Instant::now());
        assert!(c.is_playing());
        assert!(c.state().playing.confirmed);
        assert_eq!(c.state().phase, PlayerPhase::Playing);
    }

    #[test]
    fn is_playing_follows_transport_not_cache() {
        let mut c = opened(FakeTransport::with_duration(60.0));
        c.play();
        c.pump(Instant::now());
        // Paused behind the controller's back, event not yet delivered.
        c.transport_mut().paused = true;
        assert!(!c.is_playing());
        assert!(c.state().playing.confirmed);
    }

    #[test]
    fn pause_is_idempotent() {
        let mut c = opened(FakeTransport::with_duration(60.0));
        c.pause();
        c.pause();
        c.pump(Instant::now());
        assert!(!c.is_playing());
        assert_eq!(c.state().phase, PlayerPhase::Ready);
    }

    #[test]
    fn ended_rewinds_and_recovers_on_play() {
        let mut c = opened(FakeTransport::with_duration(60.0));
        let rx = c.subscribe();
        c.play();
        c.transport_mut().advance_to(59.9);
        c.pump(Instant::now());

        c.transport_mut().paused = true;
        c.transport_mut().push(TransportEvent::Ended);
        c.pump(Instant::now());
        assert_eq!(c.state().phase, PlayerPhase::Ended);
        assert_eq!(c.current_time(), 0.0);
        assert_eq!(rx.try_iter().last(), Some(0.0));

        c.play();
        assert_eq!(c.state().phase, PlayerPhase::Ready);
        c.pump(Instant::now());
        assert_eq!(c.state().phase, PlayerPhase::Playing);
    }

    #[test]
    fn transport_errors_are_classified() {
        let mut c = opened(FakeTransport::with_duration(60.0));
        c.transport_mut()
            .push(TransportEvent::Error(MediaErrorKind::NotFound));
        c.pump(Instant::now());
        assert_eq!(c.state().phase, PlayerPhase::Error);
        assert_eq!(
            c.state().error,
            Some(PlayerError::Transport(MediaErrorKind::NotFound))
        );
    }

    #[test]
    fn rejected_play_keeps_other_state() {
        let mut c = opened(FakeTransport::with_duration(60.0));
        c.set_volume(0.4);
        c.transport_mut().reject_play = true;
        c.play();
        assert!(matches!(c.state().error, Some(PlayerError::PlayRejected(_))));
        assert_eq!(c.duration(), Some(60.0));
        assert_eq!(c.volume(), 0.4);
        assert!(!c.is_playing());
    }

    #[test]
    fn small_volume_changes_are_not_written() {
        let mut c = opened(FakeTransport::with_duration(60.0));
        let writes = c.transport().volume_writes;
        c.set_volume(0.995);
        assert_eq!(c.transport().volume_writes, writes);
        c.set_volume(0.5);
        assert_eq!(c.transport().volume_writes, writes + 1);

        // The echo from the transport does not cause another write.
        c.pump(Instant::now());
        assert_eq!(c.volume(), 0.5);
        assert_eq!(c.transport().volume_writes, writes + 1);

        c.set_volume(7.0);
        assert_eq!(c.volume(), 1.0);
    }

    #[test]
    fn close_resets_everything_but_volume() {
        let mut c = opened(FakeTransport::with_duration(60.0));
        let rx = c.subscribe();
        c.set_volume(0.3);
        c.play();
        c.seek(20.0);
        c.pump(Instant::now());

        c.close();
        assert!(!c.is_playing());
        assert_eq!(c.state().phase, PlayerPhase::Idle);
        assert_eq!(c.current_time(), 0.0);
        assert_eq!(c.state().duration, None);
        assert_eq!(c.volume(), 0.3);
        // Subscriptions are dropped with the session.
        rx.try_iter().count();
        assert!(rx.recv().is_err());

        c.open();
        c.pump(Instant::now());
        assert_eq!(c.state().phase, PlayerPhase::Ready);
        assert_eq!(c.transport().loads, 2);
    }

    #[test]
    fn ready_action_retries_until_loaded() {
        let mut c = opened(FakeTransport::new());
        let t0 = Instant::now();
        c.when_ready(
            ReadyAction {
                seek_to: Some(57.0),
                play: true,
            },
            RetryPolicy::default(),
            t0,
        );
        c.pump(t0 + Duration::from_millis(200));
        assert!(c.has_pending_action());
        assert!(!c.is_playing());

        c.transport_mut().finish_loading(240.0);
        c.pump(t0 + Duration::from_millis(300));
        assert!(!c.has_pending_action());
        assert_eq!(c.current_time(), 57.0);
        assert!(c.is_playing());
    }

    #[test]
    fn ready_action_gives_up() {
        let mut c = opened(FakeTransport::new());
        let t0 = Instant::now();
        let policy = RetryPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(100),
            initial_delay: Duration::ZERO,
        };
        c.when_ready(ReadyAction { seek_to: None, play: true }, policy, t0);
        for step in 0..5 {
            c.pump(t0 + Duration::from_millis(100 * step));
        }
        assert!(!c.has_pending_action());

        c.transport_mut().finish_loading(10.0);
        c.pump(t0 + Duration::from_secs(1));
        assert!(!c.is_playing());
    }

    #[test]
    fn reconciler_runs_on_interval_or_when_forced() {
        let mut c = opened(FakeTransport::with_duration(60.0));
        let mut mirror = PlayerMirror::default();
        let mut r = Reconciler::new(Duration::from_secs(2));
        let t0 = Instant::now();

        assert!(r.poll(t0, &c, &mut mirror));
        assert!(!mirror.playing);
        assert_eq!(mirror.handle, Some(c.media_handle()));

        c.play();
        assert!(!r.poll(t0 + Duration::from_secs(1), &c, &mut mirror));
        assert!(!mirror.playing);
        assert!(r.poll(t0 + Duration::from_secs(2), &c, &mut mirror));
        assert!(mirror.playing);

        c.pause();
        r.force();
        assert!(r.poll(t0 + Duration::from_millis(2100), &c, &mut mirror));
        assert!(!mirror.playing);
    }

    #[test]
    fn reconcile_interval_is_bounded() {
        assert_eq!(Reconciler::new(Duration::ZERO).interval(), MIN_RECONCILE_INTERVAL);
        assert_eq!(
            Reconciler::new(Duration::from_secs(60)).interval(),
            MAX_RECONCILE_INTERVAL
        );
    }
}
