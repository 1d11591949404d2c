use thiserror::Error;

/// Why the timed-text source could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("lyrics file not found: {0}")]
    NotFound(String),
    #[error("failed to load lyrics: HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("failed to load lyrics: {0}")]
    Io(String),
}

/// Transport fault classification, mirrored from the media error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaErrorKind {
    NotFound,
    DecodeOrIo,
    Unknown,
}

/// Errors returned directly by transport operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("play request rejected: {0}")]
    PlayRejected(String),
    #[error("seek failed: {0}")]
    Seek(String),
    #[error("audio device unavailable: {0}")]
    Device(String),
}

/// User-visible player error, scoped to the player panel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    #[error("{}", transport_message(*.0))]
    Transport(MediaErrorKind),
    #[error("Failed to play audio")]
    PlayRejected(String),
}

fn transport_message(kind: MediaErrorKind) -> &'static str {
    match kind {
        MediaErrorKind::NotFound => "Audio file not found. Please check the file path.",
        MediaErrorKind::DecodeOrIo => "Audio error. Please check the file.",
        MediaErrorKind::Unknown => "Failed to load audio file.",
    }
}

/// The media handle's output was already claimed by another analysis graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TapError {
    #[error("media output is already connected to an analysis graph")]
    AlreadyTapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("tap buffer is poisoned")]
    BufferPoisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_messages_are_classified() {
        let not_found = PlayerError::Transport(MediaErrorKind::NotFound).to_string();
        let decode = PlayerError::Transport(MediaErrorKind::DecodeOrIo).to_string();
        let unknown = PlayerError::Transport(MediaErrorKind::Unknown).to_string();
        assert!(not_found.contains("not found"));
        assert_ne!(not_found, decode);
        assert_ne!(decode, unknown);
    }
}
