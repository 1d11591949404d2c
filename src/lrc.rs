use std::time::Duration;

use serde::Serialize;

/// One timed lyric line. `text` is empty for pause/spacing markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedLine {
    pub time: Duration,
    pub text: String,
}

impl TimedLine {
    pub fn new(time: Duration, text: impl Into<String>) -> Self {
        TimedLine {
            time,
            text: text.into(),
        }
    }

    pub fn seconds(&self) -> f64 {
        self.time.as_secs_f64()
    }

    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }
}

/// ID tags found in the header of an LRC file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LrcMeta {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub author: Option<String>,
    /// Milliseconds; positive values make lyrics appear sooner.
    pub offset_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LrcDocument {
    pub meta: LrcMeta,
    pub lines: Vec<TimedLine>,
}

// "[MM:SS.cc]" is exactly ten bytes.
const TAG_LEN: usize = 10;

/// Parse a `[MM:SS.cc]` tag at the start of `s`.
fn parse_tag(s: &str) -> Option<Duration> {
    let b = s.as_bytes();
    if b.len() < TAG_LEN
        || b[0] != b'['
        || b[3] != b':'
        || b[6] != b'.'
        || b[9] != b']'
    {
        return None;
    }
    let two = |i: usize| -> Option<u64> {
        let (hi, lo) = (b[i], b[i + 1]);
        if hi.is_ascii_digit() && lo.is_ascii_digit() {
            Some(((hi - b'0') * 10 + (lo - b'0')) as u64)
        } else {
            None
        }
    };
    let minutes = two(1)?;
    let seconds = two(4)?;
    let centis = two(7)?;
    Some(Duration::from_millis(
        (minutes * 60 + seconds) * 1000 + centis * 10,
    ))
}

/// Locate the first timestamp tag anywhere in the line.
fn find_tag(line: &str) -> Option<(usize, Duration)> {
    line.match_indices('[')
        .find_map(|(pos, _)| parse_tag(&line[pos..]).map(|t| (pos, t)))
}

/// Parse timed text into lines sorted by time.
///
/// Lines without a `[MM:SS.cc]` tag are dropped, as are timed lines with no
/// text unless nothing has been kept yet. Several tags in a row at the front
/// of a line repeat the same text at each time. The result is empty when
/// nothing parses.
pub fn parse(raw: &str) -> Vec<TimedLine> {
    let mut lines: Vec<TimedLine> = Vec::new();

    for line in raw.lines() {
        let Some((pos, first)) = find_tag(line) else {
            continue;
        };

        let mut times = vec![first];
        let mut rest = &line[pos + TAG_LEN..];
        // Only a tag that leads the line can be followed by more tags.
        if line[..pos].trim().is_empty() {
            while let Some(t) = parse_tag(rest.trim_start()) {
                times.push(t);
                rest = &rest.trim_start()[TAG_LEN..];
            }
        }

        let text = if times.len() > 1 {
            rest.trim().to_string()
        } else {
            let mut stripped = String::with_capacity(line.len());
            stripped.push_str(&line[..pos]);
            stripped.push_str(rest);
            stripped.trim().to_string()
        };

        if text.is_empty() && !lines.is_empty() {
            continue;
        }
        for time in times {
            lines.push(TimedLine::new(time, text.clone()));
        }
    }

    // sort_by_key is stable, so equal timestamps keep file order
    lines.sort_by_key(|l| l.time);
    lines
}

fn id_tag<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let inner = line.trim().strip_prefix('[')?.strip_suffix(']')?;
    let (k, v) = inner.split_once(':')?;
    if k.trim().eq_ignore_ascii_case(key) {
        Some(v.trim())
    } else {
        None
    }
}

/// Parse timed text together with its ID tags, applying `[offset:]`.
pub fn parse_document(raw: &str) -> LrcDocument {
    let mut meta = LrcMeta::default();
    for line in raw.lines() {
        if let Some(v) = id_tag(line, "ti") {
            meta.title = Some(v.to_string());
        } else if let Some(v) = id_tag(line, "ar") {
            meta.artist = Some(v.to_string());
        } else if let Some(v) = id_tag(line, "al") {
            meta.album = Some(v.to_string());
        } else if let Some(v) = id_tag(line, "by") {
            meta.author = Some(v.to_string());
        } else if let Some(v) = id_tag(line, "offset") {
            meta.offset_ms = v.trim_start_matches('+').parse().unwrap_or(0);
        }
    }

    let mut lines = parse(raw);
    if meta.offset_ms != 0 {
        let shift = Duration::from_millis(meta.offset_ms.unsigned_abs());
        for line in &mut lines {
            line.time = if meta.offset_ms > 0 {
                line.time.saturating_sub(shift)
            } else {
                line.time + shift
            };
        }
    }

    LrcDocument { meta, lines }
}

/// Render a time as an LRC tag, e.g. `[01:05.20]`.
pub fn format_timestamp(time: Duration) -> String {
    let centis = time.as_millis() / 10;
    format!(
        "[{:02}:{:02}.{:02}]",
        centis / 6000,
        (centis / 100) % 60,
        centis % 100
    )
}
