pub mod app;
pub mod config;
pub mod controls;
pub mod error;
pub mod gauge;
pub mod keys;
pub mod locate;
pub mod lrc;
pub mod lyrics;
pub mod now_playing;
pub mod player;
pub mod progress;
pub mod retry;
pub mod rodio_transport;
pub mod theme;
pub mod transport;
pub mod visualizer;
pub mod volume;
