use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame,
};

use crate::keys::Focus;
use crate::theme::Theme;

fn build_control_spans(focus: Focus, jump: &str, muted: bool, theme: &Theme) -> Vec<Span<'static>> {
    let key_style = Style::default().fg(Color::Black).bg(theme.secondary);
    if focus == Focus::JumpInput {
        return vec![
            Span::styled(" Go to ", key_style),
            Span::styled(format!(" {jump}▏ "), Style::default().fg(theme.accent)),
            Span::styled(" Enter ", key_style),
            Span::raw(" Jump  "),
            Span::styled(" Esc ", key_style),
            Span::raw(" Cancel"),
        ];
    }
    let mut spans = Vec::new();
    if focus == Focus::Player {
        spans.extend([Span::styled(" Space ", key_style), Span::raw(" Play/Pause  ")]);
    }
    spans.extend([
        Span::styled(" ←/→ ", key_style),
        Span::raw(" Seek ±10s  "),
        Span::styled(" ↑/↓ ", key_style),
        Span::raw(" Volume  "),
        Span::styled(" m ", key_style),
        Span::styled(
            if muted { " Unmute  " } else { " Mute  " },
            Style::default().fg(if muted { theme.accent } else { Color::Reset }),
        ),
        Span::styled(" Tab ", key_style),
        Span::raw(if focus == Focus::Scrubber { " Focus: Scrubber  " } else { " Focus: Player  " }),
        Span::styled(" g ", key_style),
        Span::raw(" Go to  "),
        Span::styled(" q ", key_style),
        Span::raw(" Quit"),
    ]);
    spans
}

/// Wrap spans into lines, breaking at group boundaries (every 2 spans = key + label).
fn wrap_lines(spans: Vec<Span<'static>>, inner_w: usize) -> Vec<Line<'static>> {
    if inner_w == 0 {
        return vec![Line::from(spans)];
    }
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut current_w: usize = 0;
    for chunk in spans.chunks(2) {
        let group_w: usize = Line::from(chunk.to_vec()).width();
        if current_w + group_w > inner_w && current_w > 0 {
            lines.push(Line::from(std::mem::take(&mut current)));
            current_w = 0;
        }
        current.extend(chunk.iter().cloned());
        current_w += group_w;
    }
    if !current.is_empty() {
        lines.push(Line::from(current));
    }
    lines
}

pub fn controls_height(width: u16, focus: Focus, jump: &str, muted: bool, theme: &Theme) -> u16 {
    let spans = build_control_spans(focus, jump, muted, theme);
    let lines = wrap_lines(spans, width.saturating_sub(2) as usize);
    lines.len() as u16 + 2
}

pub fn draw_controls(frame: &mut Frame, area: Rect, focus: Focus, jump: &str, muted: bool, theme: &Theme) {
    let spans = build_control_spans(focus, jump, muted, theme);
    let lines = wrap_lines(spans, area.width.saturating_sub(2) as usize);
    let help = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(" Controls "),
    );
    frame.render_widget(help, area);
}
