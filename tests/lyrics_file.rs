use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use songsync::lrc::parse_document;
use songsync::lyrics::{spawn_fetch, LyricsState, LyricsSync};
use songsync::rodio_transport::probe_duration;

/// Write a mono 16-bit PCM WAV of a sine wave.
fn generate_sine_wav(dir: &Path, filename: &str, frequency: f64, duration_secs: f64) -> PathBuf {
    let sample_rate: u32 = 44_100;
    let num_samples = (sample_rate as f64 * duration_secs) as usize;
    let data_size = (num_samples * 2) as u32;

    let path = dir.join(filename);
    let mut file = std::fs::File::create(&path).unwrap();

    file.write_all(b"RIFF").unwrap();
    file.write_all(&(36 + data_size).to_le_bytes()).unwrap();
    file.write_all(b"WAVE").unwrap();

    file.write_all(b"fmt ").unwrap();
    file.write_all(&16u32.to_le_bytes()).unwrap();
    file.write_all(&1u16.to_le_bytes()).unwrap(); // PCM
    file.write_all(&1u16.to_le_bytes()).unwrap(); // mono
    file.write_all(&sample_rate.to_le_bytes()).unwrap();
    file.write_all(&(sample_rate * 2).to_le_bytes()).unwrap();
    file.write_all(&2u16.to_le_bytes()).unwrap();
    file.write_all(&16u16.to_le_bytes()).unwrap();

    file.write_all(b"data").unwrap();
    file.write_all(&data_size.to_le_bytes()).unwrap();
    for i in 0..num_samples {
        let t = i as f64 / sample_rate as f64;
        let sample = 0.5 * (2.0 * std::f64::consts::PI * frequency * t).sin();
        file.write_all(&((sample * i16::MAX as f64) as i16).to_le_bytes()).unwrap();
    }

    path
}

#[test]
fn test_probe_duration_of_wav() {
    let dir = tempfile::tempdir().unwrap();
    let path = generate_sine_wav(dir.path(), "tone.wav", 440.0, 2.0);
    let duration = probe_duration(&path).unwrap();
    assert!((duration.as_secs_f64() - 2.0).abs() < 0.01, "{duration:?}");

    assert!(probe_duration(&dir.path().join("missing.wav")).is_none());
}

#[test]
fn test_offset_tag_shifts_lines() {
    let doc = parse_document("[offset:+500]\n[00:00.20]a\n[00:02.00]b\n");
    assert_eq!(doc.meta.offset_ms, 500);
    assert_eq!(doc.lines[0].time, Duration::ZERO);
    assert_eq!(doc.lines[1].time, Duration::from_millis(1500));

    let doc = parse_document("[offset:-250]\n[00:01.00]a\n");
    assert_eq!(doc.lines[0].time, Duration::from_millis(1250));
}

#[test]
fn test_sync_view_follows_file_and_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("song.lrc");
    std::fs::write(
        &path,
        "[ti:Refrain]\n[00:00.00]Intro\n[00:05.00]\n[00:10.00]Chorus\n",
    )
    .unwrap();

    let mut sync = LyricsSync::new();
    let ticket = sync.load(path.to_string_lossy());
    let fetched = spawn_fetch(ticket).recv().unwrap();
    assert!(sync.finish_load(fetched));

    match sync.state() {
        LyricsState::Ready(doc) => {
            assert_eq!(doc.meta.title.as_deref(), Some("Refrain"));
            // The mid-song pause marker is dropped.
            assert_eq!(doc.lines.len(), 2);
            assert!(doc.lines.iter().all(|l| !l.is_blank()));
        }
        other => panic!("expected lyrics, got {other:?}"),
    }

    let (tx, rx) = mpsc::channel();
    sync.subscribe(rx);
    tx.send(6.0).unwrap();
    sync.pump();
    assert_eq!(sync.active(), Some(0));
    for t in [0.0, 4.99, 5.0, 9.0, 30.0] {
        tx.send(t).unwrap();
    }
    sync.pump();
    assert_eq!(sync.active(), Some(1));
    assert_eq!(sync.lines().len(), 2);
}

#[test]
fn test_switching_source_discards_old_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a.lrc");
    let second = dir.path().join("b.lrc");
    std::fs::write(&first, "[00:01.00]from a\n").unwrap();
    std::fs::write(&second, "[00:01.00]from b\n").unwrap();

    let mut sync = LyricsSync::new();
    let old = spawn_fetch(sync.load(first.to_string_lossy()));
    let new = spawn_fetch(sync.load(second.to_string_lossy()));

    assert!(!sync.finish_load(old.recv().unwrap()));
    assert!(sync.finish_load(new.recv().unwrap()));
    assert_eq!(sync.lines()[0].text, "from b");
}
