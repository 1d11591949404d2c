use std::{
    cell::RefCell,
    collections::HashMap,
    rc::Rc,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    widgets::{Block, BorderType, Borders, Widget},
    Frame,
};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use tracing::{debug, warn};

use crate::{
    error::AnalysisError,
    theme::Theme,
    transport::{HandleId, MediaHandle, MediaSource, WeakMediaHandle},
};

pub const BAR_COUNT: usize = 32;
pub const FFT_SIZE: usize = 256;

// Time smoothing between successive spectra, as in a WebAudio analyser
const SMOOTHING: f32 = 0.8;
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;
// Headroom left above the tallest live bar
const LIVE_SCALE: f32 = 0.8;
// Quiet-but-present bars never drop below this
const MIN_BAR: f32 = 0.04;
// Fraction of the remaining distance covered per frame
const EASE: f32 = 0.35;

const EIGHTHS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Tap → FFT analyser for one media output.
pub struct AnalysisGraph {
    source: MediaSource,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    smoothed: RefCell<Vec<f32>>,
}

impl AnalysisGraph {
    fn new(source: MediaSource) -> Self {
        let fft = FftPlanner::<f32>::new().plan_fft_forward(FFT_SIZE);
        let window = (0..FFT_SIZE)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (FFT_SIZE as f32 - 1.0)).cos())
            })
            .collect();
        AnalysisGraph {
            source,
            fft,
            window,
            smoothed: RefCell::new(vec![0.0; FFT_SIZE / 2]),
        }
    }

    pub fn bin_count(&self) -> usize {
        FFT_SIZE / 2
    }

    /// Current spectrum, one level in 0..=1 per bin.
    pub fn sample(&self) -> Result<Vec<f32>, AnalysisError> {
        let samples: Vec<f32> = {
            let buf = self
                .source
                .samples()
                .lock()
                .map_err(|_| AnalysisError::BufferPoisoned)?;
            buf.iter().copied().collect()
        };

        // Mix the newest frames down to mono; short buffers are zero-padded
        let ch_count = self.source.channels().max(1) as usize;
        let frames = samples.len() / ch_count;
        let start = frames.saturating_sub(FFT_SIZE);
        let mut input = vec![Complex::new(0.0f32, 0.0); FFT_SIZE];
        for (i, frame) in (start..frames).enumerate() {
            let offset = frame * ch_count;
            let mono = samples[offset..offset + ch_count].iter().sum::<f32>() / ch_count as f32;
            input[i] = Complex::new(mono * self.window[i], 0.0);
        }

        self.fft.process(&mut input);

        let mut smoothed = self.smoothed.borrow_mut();
        let levels = input[..self.bin_count()]
            .iter()
            .zip(smoothed.iter_mut())
            .map(|(c, prev)| {
                let mag = c.norm() / FFT_SIZE as f32;
                *prev = SMOOTHING * *prev + (1.0 - SMOOTHING) * mag;
                let db = if *prev > 0.0 { 20.0 * prev.log10() } else { f32::NEG_INFINITY };
                ((db - MIN_DB) / (MAX_DB - MIN_DB)).clamp(0.0, 1.0)
            })
            .collect();
        Ok(levels)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(u64);

static NEXT_VIEW: AtomicU64 = AtomicU64::new(1);

enum Tap {
    Live {
        graph: Rc<AnalysisGraph>,
        claimed_by: Option<ViewId>,
    },
    /// The output was tapped by someone else before we asked.
    Unavailable,
}

struct Entry {
    handle: WeakMediaHandle,
    tap: Tap,
}

/// What a visualizer got from `AnalysisRegistry::claim`.
#[derive(Clone)]
pub enum Attachment {
    Live(Rc<AnalysisGraph>),
    Fallback,
}

impl Attachment {
    pub fn is_live(&self) -> bool {
        matches!(self, Attachment::Live(_))
    }
}

/// Remembers which media outputs already have an analysis graph.
///
/// Entries are keyed by handle identity and hold the handle weakly, so an
/// output that goes away drops out on the next claim. Clones share state.
#[derive(Clone, Default)]
pub struct AnalysisRegistry {
    entries: Rc<RefCell<HashMap<HandleId, Entry>>>,
}

impl AnalysisRegistry {
    pub fn claim(&self, handle: &MediaHandle, view: ViewId) -> Attachment {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|_, e| e.handle.is_alive());

        let entry = entries.entry(handle.id()).or_insert_with(|| {
            let tap = match handle.create_source() {
                Ok(source) => {
                    debug!(handle = ?handle.id(), "analysis graph connected");
                    Tap::Live {
                        graph: Rc::new(AnalysisGraph::new(source)),
                        claimed_by: None,
                    }
                }
                Err(e) => {
                    warn!(handle = ?handle.id(), "visualizer falling back: {e}");
                    Tap::Unavailable
                }
            };
            Entry {
                handle: handle.downgrade(),
                tap,
            }
        });

        match &mut entry.tap {
            Tap::Live { graph, claimed_by } => {
                if matches!(claimed_by, Some(owner) if *owner != view) {
                    debug!(handle = ?handle.id(), "graph in use by another view");
                    return Attachment::Fallback;
                }
                *claimed_by = Some(view);
                Attachment::Live(Rc::clone(graph))
            }
            Tap::Unavailable => Attachment::Fallback,
        }
    }

    pub fn release(&self, handle: HandleId, view: ViewId) {
        if let Some(Entry {
            tap: Tap::Live { claimed_by, .. },
            ..
        }) = self.entries.borrow_mut().get_mut(&handle)
        {
            if *claimed_by == Some(view) {
                *claimed_by = None;
            }
        }
    }

    pub fn live_graphs(&self) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|e| matches!(e.tap, Tap::Live { .. }))
            .count()
    }

    pub fn is_claimed(&self, handle: HandleId) -> bool {
        matches!(
            self.entries.borrow().get(&handle),
            Some(Entry {
                tap: Tap::Live {
                    claimed_by: Some(_),
                    ..
                },
                ..
            })
        )
    }

    pub fn reset(&self) {
        self.entries.borrow_mut().clear();
    }
}

/// Map a spectrum onto `count` bars. Low bins get more bars than high ones,
/// and the DC bin is never shown.
pub fn live_bars(spectrum: &[f32], count: usize, volume: f32) -> Vec<f32> {
    if spectrum.is_empty() {
        return vec![0.0; count];
    }
    let bins = spectrum.len();
    let gain = volume.clamp(0.0, 1.0) * LIVE_SCALE;
    (0..count)
        .map(|i| {
            let frac = i as f32 / count as f32;
            let bin = (1 + (frac * frac * (bins - 1) as f32) as usize).min(bins - 1);
            let level = spectrum[bin] * gain;
            if spectrum[bin] > 0.0 && level < MIN_BAR {
                MIN_BAR
            } else {
                level.min(1.0)
            }
        })
        .collect()
}

/// Idle animation used whenever no live spectrum is available.
pub fn synthetic_bars(t: f32, count: usize) -> Vec<f32> {
    (0..count)
        .map(|i| ((t * 2.0 + i as f32 * 0.3).sin() * 0.5 + 0.5) * 0.6)
        .collect()
}

/// One mounted spectrum view.
pub struct Visualizer {
    id: ViewId,
    registry: AnalysisRegistry,
    handle: Option<(HandleId, WeakMediaHandle)>,
    attachment: Attachment,
    bars: Vec<f32>,
    started: Option<Instant>,
    mounted: bool,
}

impl Visualizer {
    pub fn new(registry: AnalysisRegistry, bar_count: usize) -> Self {
        Visualizer {
            id: ViewId(NEXT_VIEW.fetch_add(1, Ordering::Relaxed)),
            registry,
            handle: None,
            attachment: Attachment::Fallback,
            bars: vec![0.0; bar_count.max(1)],
            started: None,
            mounted: true,
        }
    }

    /// Point the view at a media output. Repeat calls for the same output
    /// are no-ops.
    pub fn attach(&mut self, handle: &MediaHandle) {
        if !self.mounted || self.handle.as_ref().is_some_and(|(id, _)| *id == handle.id()) {
            return;
        }
        self.detach();
        self.attachment = self.registry.claim(handle, self.id);
        self.handle = Some((handle.id(), handle.downgrade()));
    }

    pub fn detach(&mut self) {
        if let Some((id, _)) = self.handle.take() {
            self.registry.release(id, self.id);
        }
        self.attachment = Attachment::Fallback;
    }

    pub fn is_live(&self) -> bool {
        self.attachment.is_live()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Stop rendering and give the graph back. The graph itself stays
    /// registered for the next view.
    pub fn unmount(&mut self) {
        self.detach();
        self.mounted = false;
    }

    /// Advance one frame. Returns the eased bar heights, or `None` once
    /// unmounted.
    pub fn tick(&mut self, now: Instant, playing: bool) -> Option<&[f32]> {
        if !self.mounted {
            return None;
        }
        let started = *self.started.get_or_insert(now);
        let t = now.saturating_duration_since(started).as_secs_f32();
        let target = self
            .live_target(playing)
            .unwrap_or_else(|| synthetic_bars(t, self.bars.len()));
        for (bar, goal) in self.bars.iter_mut().zip(target) {
            *bar += (goal - *bar) * EASE;
        }
        Some(&self.bars)
    }

    fn live_target(&self, playing: bool) -> Option<Vec<f32>> {
        let Attachment::Live(graph) = &self.attachment else {
            return None;
        };
        if !playing {
            return None;
        }
        let handle = self.handle.as_ref()?.1.upgrade()?;
        let volume = handle.volume();
        if handle.is_muted() || volume <= 0.0 {
            return None;
        }
        match graph.sample() {
            Ok(spectrum) => Some(live_bars(&spectrum, self.bars.len(), volume)),
            Err(e) => {
                debug!("spectrum unavailable this frame: {e}");
                None
            }
        }
    }

    pub fn bars(&self) -> &[f32] {
        &self.bars
    }
}

impl Drop for Visualizer {
    fn drop(&mut self) {
        self.detach();
    }
}

struct SpectrumWidget<'a> {
    bars: &'a [f32],
    theme: &'a Theme,
    block: Option<Block<'a>>,
}

impl<'a> SpectrumWidget<'a> {
    fn new(bars: &'a [f32], theme: &'a Theme) -> Self {
        SpectrumWidget {
            bars,
            theme,
            block: None,
        }
    }

    fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }
}

impl Widget for SpectrumWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner = if let Some(block) = self.block {
            let inner = block.inner(area);
            block.render(area, buf);
            inner
        } else {
            area
        };

        if inner.width == 0 || inner.height == 0 || self.bars.is_empty() {
            return;
        }

        let cols = inner.width as usize;
        let rows = inner.height as usize;
        let count = self.bars.len();

        for cx in 0..cols {
            let idx = cx * count / cols;
            let eighths = (self.bars[idx].clamp(0.0, 1.0) * (rows * 8) as f32).round() as usize;
            let color = self.theme.bars[idx % self.theme.bars.len()];
            // Bars grow upward from the bottom row
            for row in 0..rows {
                let fill = eighths.saturating_sub(row * 8).min(8);
                let x = inner.x + cx as u16;
                let y = inner.y + (rows - 1 - row) as u16;
                buf[(x, y)].set_char(EIGHTHS[fill]).set_fg(color);
            }
        }
    }
}

/// Render the spectrum bars into the given area.
pub fn draw_visualizer(frame: &mut Frame, area: Rect, bars: &[f32], live: bool, theme: &Theme) {
    let title = if live { " Spectrum " } else { " Spectrum · idle " };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(title);
    frame.render_widget(SpectrumWidget::new(bars, theme).block(block), area);
}
