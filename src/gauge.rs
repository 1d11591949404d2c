use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Color,
    widgets::{Block, Widget},
};

/// One-row gauge drawn with light/heavy box rules, optionally with a
/// marker showing where a drag will land.
pub struct RoundedGauge<'a> {
    ratio: f64,
    filled_color: Color,
    dimmed_color: Color,
    marker: Option<f64>,
    marker_color: Color,
    block: Option<Block<'a>>,
}

impl<'a> RoundedGauge<'a> {
    pub fn new(ratio: f64, filled_color: Color) -> Self {
        RoundedGauge {
            ratio: sanitize(ratio),
            filled_color,
            dimmed_color: Color::DarkGray,
            marker: None,
            marker_color: Color::White,
            block: None,
        }
    }

    pub fn dimmed_color(mut self, color: Color) -> Self {
        self.dimmed_color = color;
        self
    }

    pub fn marker(mut self, ratio: f64, color: Color) -> Self {
        self.marker = Some(sanitize(ratio));
        self.marker_color = color;
        self
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }
}

fn sanitize(ratio: f64) -> f64 {
    if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) }
}

impl Widget for RoundedGauge<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner = if let Some(block) = self.block {
            let inner = block.inner(area);
            block.render(area, buf);
            inner
        } else {
            area
        };

        if inner.width < 2 || inner.height == 0 {
            return;
        }

        let width = inner.width as usize;
        let filled = (self.ratio * width as f64).round() as usize;
        let y = inner.y;

        for col in 0..width {
            let (ch, fg) = if col < filled {
                if col == 0 {
                    ('╺', self.filled_color)
                } else if col == filled - 1 && filled < width {
                    ('╸', self.filled_color)
                } else {
                    ('━', self.filled_color)
                }
            } else if col == 0 {
                ('╶', self.dimmed_color)
            } else if col == width - 1 {
                ('╴', self.dimmed_color)
            } else {
                ('─', self.dimmed_color)
            };
            buf[(inner.x + col as u16, y)].set_char(ch).set_fg(fg).set_bg(Color::Reset);
        }

        if let Some(m) = self.marker {
            let col = ((m * width as f64) as usize).min(width - 1);
            buf[(inner.x + col as u16, y)].set_char('●').set_fg(self.marker_color);
        }
    }
}

/// Fraction of the gauge at terminal column `x`, or `None` outside it.
pub fn column_ratio(inner: Rect, x: u16) -> Option<f64> {
    if inner.width == 0 || x < inner.x || x >= inner.x + inner.width {
        return None;
    }
    if inner.width == 1 {
        return Some(0.0);
    }
    Some((x - inner.x) as f64 / (inner.width - 1) as f64)
}
