use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
};

use crate::error::{MediaErrorKind, TapError, TransportError};

// Shared ring buffer for audio samples
pub type SampleBuf = Arc<Mutex<VecDeque<f32>>>;

pub const SAMPLE_BUF_SIZE: usize = 4096;

/// How much media the transport has buffered, in the order it progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// Notifications a transport queues for the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportEvent {
    LoadStart,
    LoadedMetadata { duration: Option<f64> },
    CanPlay,
    CanPlayThrough,
    Waiting,
    Play,
    Playing,
    Pause,
    Seeked,
    TimeUpdate,
    Ended,
    VolumeChange,
    Error(MediaErrorKind),
}

/// A playable audio output. Operations return once the request is issued;
/// what actually happened is reported later through `poll_events`.
pub trait MediaTransport {
    fn load(&mut self);
    fn play(&mut self) -> Result<(), TransportError>;
    fn pause(&mut self);
    fn set_position(&mut self, seconds: f64) -> Result<(), TransportError>;
    fn position(&self) -> f64;
    /// `None` until metadata is known; may be infinite for unbounded streams.
    fn duration(&self) -> Option<f64>;
    fn is_paused(&self) -> bool;
    fn ready_state(&self) -> ReadyState;
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);
    fn is_muted(&self) -> bool;
    fn set_muted(&mut self, muted: bool);
    fn handle(&self) -> MediaHandle;
    fn poll_events(&mut self, out: &mut Vec<TransportEvent>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

struct HandleInner {
    id: HandleId,
    samples: SampleBuf,
    channels: AtomicU16,
    sample_rate: AtomicU32,
    volume_bits: AtomicU32,
    muted: AtomicBool,
    tapped: AtomicBool,
}

/// Identity of one media output, plus the sample stream it exposes.
///
/// Clones share identity. The output can be tapped for analysis once.
#[derive(Clone)]
pub struct MediaHandle {
    inner: Arc<HandleInner>,
}

#[derive(Clone)]
pub struct WeakMediaHandle {
    inner: Weak<HandleInner>,
}

/// The analysis side of a successful tap. Does not keep the output alive.
#[derive(Clone)]
pub struct MediaSource {
    samples: SampleBuf,
    handle: WeakMediaHandle,
}

impl MediaHandle {
    pub fn new() -> Self {
        let id = HandleId(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed));
        MediaHandle {
            inner: Arc::new(HandleInner {
                id,
                samples: Arc::new(Mutex::new(VecDeque::with_capacity(SAMPLE_BUF_SIZE))),
                channels: AtomicU16::new(2),
                sample_rate: AtomicU32::new(44_100),
                volume_bits: AtomicU32::new(1.0f32.to_bits()),
                muted: AtomicBool::new(false),
                tapped: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> HandleId {
        self.inner.id
    }

    pub fn downgrade(&self) -> WeakMediaHandle {
        WeakMediaHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Buffer the decoder writes played samples into.
    pub fn sample_buf(&self) -> SampleBuf {
        Arc::clone(&self.inner.samples)
    }

    /// Connect an analysis source to this output. Fails on every call after
    /// the first, whoever made it.
    pub fn create_source(&self) -> Result<MediaSource, TapError> {
        if self.inner.tapped.swap(true, Ordering::AcqRel) {
            return Err(TapError::AlreadyTapped);
        }
        Ok(MediaSource {
            samples: self.sample_buf(),
            handle: self.downgrade(),
        })
    }

    pub fn set_format(&self, channels: u16, sample_rate: u32) {
        self.inner.channels.store(channels, Ordering::Relaxed);
        self.inner.sample_rate.store(sample_rate, Ordering::Relaxed);
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate.load(Ordering::Relaxed)
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.inner.volume_bits.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: f32) {
        self.inner
            .volume_bits
            .store(volume.to_bits(), Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.inner.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.inner.muted.store(muted, Ordering::Relaxed);
    }
}

impl Default for MediaHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for MediaHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MediaHandle").field(&self.inner.id).finish()
    }
}

impl WeakMediaHandle {
    pub fn upgrade(&self) -> Option<MediaHandle> {
        self.inner.upgrade().map(|inner| MediaHandle { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl MediaSource {
    pub fn samples(&self) -> &SampleBuf {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.handle.upgrade().map_or(1, |h| h.channels())
    }
}
