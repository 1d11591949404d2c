use crossterm::event::{KeyCode, KeyModifiers};

pub const SEEK_STEP: f64 = 10.0;
pub const VOLUME_STEP: f32 = 0.05;

/// Which control receives keystrokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Player,
    /// The progress bar. Behaves like a range input: arrows move it, Space
    /// does nothing.
    Scrubber,
    /// The go-to-time text box. Swallows everything except its own editing
    /// keys.
    JumpInput,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::Player => Focus::Scrubber,
            Focus::Scrubber => Focus::Player,
            Focus::JumpInput => Focus::JumpInput,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    TogglePlay,
    SeekBy(f64),
    VolumeBy(f32),
    ToggleMute,
    CycleFocus,
    OpenJump,
    JumpChar(char),
    JumpBackspace,
    JumpSubmit,
    JumpCancel,
    Quit,
}

pub fn resolve(code: KeyCode, modifiers: KeyModifiers, focus: Focus) -> Option<Command> {
    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
        return Some(Command::Quit);
    }

    if focus == Focus::JumpInput {
        return match code {
            KeyCode::Char(c) if c.is_ascii_digit() || c == ':' || c == '.' => {
                Some(Command::JumpChar(c))
            }
            KeyCode::Backspace => Some(Command::JumpBackspace),
            KeyCode::Enter => Some(Command::JumpSubmit),
            KeyCode::Esc => Some(Command::JumpCancel),
            _ => None,
        };
    }

    match code {
        KeyCode::Char(' ') if focus == Focus::Scrubber => None,
        KeyCode::Char(' ') => Some(Command::TogglePlay),
        KeyCode::Left => Some(Command::SeekBy(-SEEK_STEP)),
        KeyCode::Right => Some(Command::SeekBy(SEEK_STEP)),
        KeyCode::Up => Some(Command::VolumeBy(VOLUME_STEP)),
        KeyCode::Down => Some(Command::VolumeBy(-VOLUME_STEP)),
        KeyCode::Char('m') => Some(Command::ToggleMute),
        KeyCode::Tab | KeyCode::BackTab => Some(Command::CycleFocus),
        KeyCode::Char('g') => Some(Command::OpenJump),
        KeyCode::Char('q') | KeyCode::Esc => Some(Command::Quit),
        _ => None,
    }
}

/// Parse `m:ss`, `m:ss.cc` or plain seconds.
pub fn parse_clock(input: &str) -> Option<f64> {
    let input = input.trim();
    let secs = match input.split_once(':') {
        Some((m, s)) => {
            let minutes: u32 = m.parse().ok()?;
            let seconds: f64 = s.parse().ok()?;
            if !(0.0..60.0).contains(&seconds) || s.starts_with(['+', '-']) {
                return None;
            }
            minutes as f64 * 60.0 + seconds
        }
        None => input.parse().ok()?,
    };
    (secs.is_finite() && secs >= 0.0).then_some(secs)
}
