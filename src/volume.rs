use ratatui::{
    layout::{Alignment, Rect},
    text::Line,
    widgets::{Block, BorderType, Borders},
    Frame,
};

use crate::gauge::RoundedGauge;
use crate::theme::Theme;

pub fn draw_volume(frame: &mut Frame, area: Rect, volume: f32, muted: bool, theme: &Theme) {
    let label = if muted {
        " muted ".to_string()
    } else {
        format!(" {}% ", (volume * 100.0).round() as u16)
    };
    let color = if muted { theme.dimmed } else { theme.positive };
    let vol_gauge = RoundedGauge::new(volume as f64, color)
        .dimmed_color(theme.dimmed)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .title(" Volume ")
                .title(Line::from(label).alignment(Alignment::Right)),
        );
    frame.render_widget(vol_gauge, area);
}
