use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::{Block, Borders, Widget},
};

use crate::render::surface::{FrameBuffer, Rgb, Surface};

const UPPER_HALF_BLOCK: &str = "▀";

fn to_color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.r, rgb.g, rgb.b)
}

/// Terminal preview of a frame buffer: one cell per two pixel rows.
pub struct MatrixView<'a> {
    frame: &'a FrameBuffer,
}

impl<'a> MatrixView<'a> {
    pub fn new(frame: &'a FrameBuffer) -> Self {
        Self { frame }
    }
}

impl Widget for MatrixView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title(" Matrix ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray));
        let inner = block.inner(area);
        block.render(area, buf);

        let cols = (inner.width as usize).min(self.frame.width());
        let rows = (inner.height as usize).min(self.frame.height().div_ceil(2));

        for row in 0..rows {
            for col in 0..cols {
                let top = self.frame.pixel(col, row * 2).unwrap_or_default();
                let bottom = self.frame.pixel(col, row * 2 + 1).unwrap_or_default();
                buf.set_string(
                    inner.x + col as u16,
                    inner.y + row as u16,
                    UPPER_HALF_BLOCK,
                    Style::default().fg(to_color(top)).bg(to_color(bottom)),
                );
            }
        }

        for image in self.frame.images() {
            if image.x < cols && image.y / 2 < rows {
                let label = format!("[{}]", image.key);
                let max = cols - image.x;
                buf.set_string(
                    inner.x + image.x as u16,
                    inner.y + (image.y / 2) as u16,
                    label.chars().take(max).collect::<String>(),
                    Style::default().fg(Color::DarkGray),
                );
            }
        }

        for text in self.frame.texts() {
            if text.x < cols && text.y / 2 < rows {
                let max = cols - text.x;
                buf.set_string(
                    inner.x + text.x as u16,
                    inner.y + (text.y / 2) as u16,
                    text.text.chars().take(max).collect::<String>(),
                    Style::default().fg(to_color(text.color)),
                );
            }
        }
    }
}
