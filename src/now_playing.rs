use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Wrap},
    Frame,
};

use crate::lrc::LrcMeta;
use crate::player::{PlaybackState, PlayerPhase};
use crate::theme::Theme;

fn meta_parts(meta: Option<&LrcMeta>) -> Vec<&str> {
    let Some(meta) = meta else {
        return Vec::new();
    };
    [&meta.title, &meta.artist, &meta.album]
        .into_iter()
        .filter_map(|p| p.as_deref())
        .collect()
}

fn build_lines<'a>(
    state: &PlaybackState,
    file_name: &'a str,
    meta: Option<&'a LrcMeta>,
    theme: &Theme,
) -> Vec<Line<'a>> {
    let badge = match state.phase {
        PlayerPhase::Error => theme.negative,
        PlayerPhase::Playing => theme.accent,
        _ => theme.secondary,
    };
    let mut title_spans = vec![
        Span::styled(
            format!(" {} ", state.phase.label()),
            Style::default().fg(Color::Black).bg(badge),
        ),
        Span::raw("  "),
        Span::styled(file_name, Style::default().fg(theme.text)),
    ];
    if state.buffering {
        title_spans.push(Span::styled("  buffering…", Style::default().fg(theme.dimmed)));
    }
    let mut lines = vec![Line::from(title_spans)];

    let parts = meta_parts(meta);
    if !parts.is_empty() {
        lines.push(Line::from(vec![
            Span::raw("         "),
            Span::styled(parts.join("  ·  "), Style::default().fg(theme.dimmed)),
        ]));
    }
    if let Some(err) = &state.error {
        lines.push(Line::from(vec![
            Span::raw("         "),
            Span::styled(err.to_string(), Style::default().fg(theme.negative)),
        ]));
    }
    lines
}

/// Height needed for the Now Playing bar, accounting for line wrapping.
pub fn now_playing_height(
    state: &PlaybackState,
    file_name: &str,
    meta: Option<&LrcMeta>,
    width: u16,
    theme: &Theme,
) -> u16 {
    let inner_w = width.saturating_sub(2) as usize;
    if inner_w == 0 {
        return 3;
    }
    let rows: usize = build_lines(state, file_name, meta, theme)
        .iter()
        .map(|l| l.width().div_ceil(inner_w).max(1))
        .sum();
    rows as u16 + 2
}

pub fn draw_now_playing_bar(
    frame: &mut Frame,
    area: Rect,
    state: &PlaybackState,
    file_name: &str,
    meta: Option<&LrcMeta>,
    theme: &Theme,
) {
    let title = Paragraph::new(build_lines(state, file_name, meta, theme))
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .title(" Now Playing "),
        );
    frame.render_widget(title, area);
}
