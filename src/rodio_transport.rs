use std::{
    collections::VecDeque,
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use symphonia::core::{
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, warn};

use crate::{
    error::{MediaErrorKind, TransportError},
    transport::{MediaHandle, MediaTransport, ReadyState, SampleBuf, TransportEvent, SAMPLE_BUF_SIZE},
};

// Roughly the cadence of a browser's timeupdate
const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

// Source wrapper that copies samples to a shared buffer
struct TappedSource<S> {
    inner: S,
    buf: SampleBuf,
}

impl<S> TappedSource<S>
where
    S: Source<Item = f32>,
{
    fn new(source: S, buf: SampleBuf) -> Self {
        TappedSource { inner: source, buf }
    }
}

impl<S> Iterator for TappedSource<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let sample = self.inner.next()?;
        if let Ok(mut buf) = self.buf.try_lock() {
            if buf.len() >= SAMPLE_BUF_SIZE {
                buf.pop_front();
            }
            buf.push_back(sample);
        }
        Some(sample)
    }
}

impl<S> Source for TappedSource<S>
where
    S: Source<Item = f32>,
{
    fn current_span_len(&self) -> Option<usize> {
        self.inner.current_span_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }

    fn try_seek(&mut self, pos: Duration) -> Result<(), rodio::source::SeekError> {
        let result = self.inner.try_seek(pos);
        if result.is_ok() {
            if let Ok(mut buf) = self.buf.lock() {
                buf.clear();
            }
        }
        result
    }
}

pub fn probe_duration(path: &Path) -> Option<Duration> {
    let file = fs::File::open(path).ok()?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .ok()?;

    let reader = probed.format;
    let track = reader.default_track()?;
    let time_base = track.codec_params.time_base?;
    let n_frames = track.codec_params.n_frames?;
    let time = time_base.calc_time(n_frames);

    Some(Duration::from_secs_f64(time.seconds as f64 + time.frac))
}

/// Plays one audio file through the default output device.
///
/// Seeking rebuilds the sink from a fresh decoder, which is more reliable
/// than clearing a live one.
pub struct RodioTransport {
    path: PathBuf,
    stream: OutputStream,
    sink: Option<Sink>,
    seek_base: Duration,
    duration: Option<Duration>,
    ready: ReadyState,
    paused: bool,
    ended: bool,
    volume: f32,
    handle: MediaHandle,
    queued: VecDeque<TransportEvent>,
    last_time_update: Option<Instant>,
}

impl RodioTransport {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, TransportError> {
        let mut stream = OutputStreamBuilder::from_default_device()
            .and_then(|builder| builder.open_stream_or_fallback())
            .map_err(|e| TransportError::Device(e.to_string()))?;
        stream.log_on_drop(false);

        Ok(RodioTransport {
            path: path.into(),
            stream,
            sink: None,
            seek_base: Duration::ZERO,
            duration: None,
            ready: ReadyState::HaveNothing,
            paused: true,
            ended: false,
            volume: 1.0,
            handle: MediaHandle::new(),
            queued: VecDeque::new(),
            last_time_update: None,
        })
    }

    fn open_decoder(&self) -> Result<Decoder<io::BufReader<fs::File>>, MediaErrorKind> {
        let file = fs::File::open(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => MediaErrorKind::NotFound,
            _ => MediaErrorKind::DecodeOrIo,
        })?;
        Decoder::new(io::BufReader::new(file)).map_err(|e| {
            debug!("decoder rejected {}: {e}", self.path.display());
            MediaErrorKind::DecodeOrIo
        })
    }

    fn output_volume(&self) -> f32 {
        if self.handle.is_muted() { 0.0 } else { self.volume }
    }

    // Drop old sink and create a fresh one to avoid clear() issues
    fn replace_sink(&mut self, at: Duration) -> Result<(), MediaErrorKind> {
        let mut source = self.open_decoder()?;
        let base = if at.is_zero() {
            Duration::ZERO
        } else {
            seek_base_after(source.try_seek(at), at)
        };
        self.handle.set_format(source.channels(), source.sample_rate());

        if let Some(old) = self.sink.take() {
            old.stop();
        }
        let sink = Sink::connect_new(self.stream.mixer());
        sink.set_volume(self.output_volume());
        if self.paused {
            sink.pause();
        }
        sink.append(TappedSource::new(source, self.handle.sample_buf()));

        self.sink = Some(sink);
        self.seek_base = base;
        if let Ok(mut buf) = self.handle.sample_buf().lock() {
            buf.clear();
        }
        Ok(())
    }
}

/// Where playback really starts after asking the decoder to seek to `at`.
/// A decoder that cannot seek starts over from the beginning.
fn seek_base_after(result: Result<(), rodio::source::SeekError>, at: Duration) -> Duration {
    match result {
        Ok(()) => at,
        Err(e) => {
            warn!("seek to {:.2}s failed, restarting from 0: {e}", at.as_secs_f64());
            Duration::ZERO
        }
    }
}

impl MediaTransport for RodioTransport {
    fn load(&mut self) {
        self.queued.push_back(TransportEvent::LoadStart);
        self.paused = true;
        self.ended = false;
        match self.replace_sink(Duration::ZERO) {
            Ok(()) => {
                self.duration = probe_duration(&self.path);
                self.ready = ReadyState::HaveEnoughData;
                self.queued.push_back(TransportEvent::LoadedMetadata {
                    duration: self.duration.map(|d| d.as_secs_f64()),
                });
                self.queued.push_back(TransportEvent::CanPlay);
                self.queued.push_back(TransportEvent::CanPlayThrough);
            }
            Err(kind) => {
                warn!(?kind, "could not load {}", self.path.display());
                self.sink = None;
                self.ready = ReadyState::HaveNothing;
                self.queued.push_back(TransportEvent::Error(kind));
            }
        }
    }

    fn play(&mut self) -> Result<(), TransportError> {
        if self.sink.is_none() {
            return Err(TransportError::PlayRejected("no media loaded".into()));
        }
        if self.ended {
            self.replace_sink(Duration::ZERO)
                .map_err(|kind| TransportError::PlayRejected(format!("{kind:?}")))?;
            self.ended = false;
        }
        if self.paused {
            if let Some(sink) = &self.sink {
                sink.play();
            }
            self.paused = false;
            self.last_time_update = None;
            self.queued.push_back(TransportEvent::Play);
            self.queued.push_back(TransportEvent::Playing);
        }
        Ok(())
    }

    fn pause(&mut self) {
        if self.paused {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.pause();
        }
        self.paused = true;
        self.queued.push_back(TransportEvent::Pause);
    }

    fn set_position(&mut self, seconds: f64) -> Result<(), TransportError> {
        if self.sink.is_none() {
            return Err(TransportError::Seek("no media loaded".into()));
        }
        let at = Duration::try_from_secs_f64(seconds)
            .map_err(|e| TransportError::Seek(e.to_string()))?;
        self.replace_sink(at)
            .map_err(|kind| TransportError::Seek(format!("{kind:?}")))?;
        self.ended = false;
        self.queued.push_back(TransportEvent::Seeked);
        Ok(())
    }

    fn position(&self) -> f64 {
        let played = self.sink.as_ref().map(|s| s.get_pos()).unwrap_or_default();
        (self.seek_base + played).as_secs_f64()
    }

    fn duration(&self) -> Option<f64> {
        self.duration.map(|d| d.as_secs_f64())
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn ready_state(&self) -> ReadyState {
        self.ready
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        self.handle.set_volume(volume);
        if let Some(sink) = &self.sink {
            sink.set_volume(self.output_volume());
        }
        self.queued.push_back(TransportEvent::VolumeChange);
    }

    fn is_muted(&self) -> bool {
        self.handle.is_muted()
    }

    fn set_muted(&mut self, muted: bool) {
        self.handle.set_muted(muted);
        if let Some(sink) = &self.sink {
            sink.set_volume(self.output_volume());
        }
        self.queued.push_back(TransportEvent::VolumeChange);
    }

    fn handle(&self) -> MediaHandle {
        self.handle.clone()
    }

    fn poll_events(&mut self, out: &mut Vec<TransportEvent>) {
        if let Some(sink) = &self.sink {
            if !self.paused && !self.ended && sink.empty() {
                self.ended = true;
                self.paused = true;
                self.queued.push_back(TransportEvent::Ended);
            } else if !self.paused {
                let due = self
                    .last_time_update
                    .is_none_or(|at| at.elapsed() >= TIME_UPDATE_INTERVAL);
                if due {
                    self.last_time_update = Some(Instant::now());
                    self.queued.push_back(TransportEvent::TimeUpdate);
                }
            }
        }
        out.extend(self.queued.drain(..));
    }
}

#[cfg(test)]
mod tests {
    use rodio::source::SeekError;

    use super::*;

    #[test]
    fn seek_base_follows_decoder_result() {
        let at = Duration::from_secs(30);
        assert_eq!(seek_base_after(Ok(()), at), at);

        let unsupported = Err(SeekError::NotSupported {
            underlying_source: "wav",
        });
        assert_eq!(seek_base_after(unsupported, at), Duration::ZERO);
    }
}
