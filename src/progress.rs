use ratatui::{
    layout::{Alignment, Rect},
    style::Style,
    text::Line,
    widgets::{Block, BorderType, Borders},
    Frame,
};

use crate::gauge::{column_ratio, RoundedGauge};
use crate::theme::Theme;

/// `m:ss`, or `--:--` for times that cannot be shown.
pub fn format_clock(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "--:--".to_string();
    }
    let secs = seconds as u64;
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn known_duration(total: Option<f64>) -> Option<f64> {
    total.filter(|d| d.is_finite() && *d > 0.0)
}

/// Area inside the progress block's border, where the gauge row is drawn.
pub fn progress_inner(area: Rect) -> Rect {
    Block::default().borders(Borders::ALL).inner(area)
}

/// Time under terminal column `x` of the progress panel drawn at `area`.
pub fn seek_target(area: Rect, x: u16, total: Option<f64>) -> Option<f64> {
    let duration = known_duration(total)?;
    column_ratio(progress_inner(area), x).map(|r| r * duration)
}

pub fn draw_progress(
    frame: &mut Frame,
    area: Rect,
    elapsed: f64,
    total: Option<f64>,
    scrub: Option<f64>,
    focused: bool,
    theme: &Theme,
) {
    let shown = scrub.unwrap_or(elapsed);
    let progress_label = match known_duration(total) {
        Some(t) => format!("{} / {}", format_clock(shown), format_clock(t)),
        None => format_clock(shown),
    };
    let ratio = known_duration(total).map_or(0.0, |t| (elapsed / t).min(1.0));

    let border_style = if focused {
        Style::default().fg(theme.accent)
    } else {
        Style::default()
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(border_style)
        .title(" Progress ")
        .title(Line::from(format!(" {progress_label} ")).alignment(Alignment::Right));

    let mut gauge = RoundedGauge::new(ratio, theme.accent)
        .dimmed_color(theme.dimmed)
        .block(block);
    if let (Some(s), Some(t)) = (scrub, known_duration(total)) {
        gauge = gauge.marker(s / t, theme.text);
    }
    frame.render_widget(gauge, area);
}
