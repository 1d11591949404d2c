use ratatui::style::Color;

pub struct Theme {
    pub accent: Color,
    pub secondary: Color,
    pub positive: Color,
    pub negative: Color,
    pub text: Color,
    pub dimmed: Color,
    /// Spectrum bars cycle through these, left to right.
    pub bars: [Color; 4],
}

const AMBER: Color = Color::Rgb(0xF2, 0xA7, 0x04);
const SAND: Color = Color::Rgb(0xEA, 0xC9, 0x86);
const RUST: Color = Color::Rgb(0xC7, 0x70, 0x17);
const DUSK: Color = Color::Rgb(0x64, 0x84, 0xAC);

pub const THEME: Theme = Theme {
    accent: AMBER,
    secondary: DUSK,
    positive: SAND,
    negative: Color::Rgb(224, 108, 117),
    text: Color::White,
    dimmed: Color::DarkGray,
    bars: [AMBER, SAND, RUST, DUSK],
};
