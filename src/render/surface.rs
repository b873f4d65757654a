#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn is_black(&self) -> bool {
        *self == Self::BLACK
    }
}

/// Pixel-addressable output. Text and image drawing are delegated to
/// the implementation; the board only decides where they go.
pub trait Surface {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    /// Out-of-range coordinates are ignored.
    fn set_pixel(&mut self, x: usize, y: usize, color: Rgb);
    fn clear(&mut self);
    fn draw_text(&mut self, x: usize, y: usize, text: &str, color: Rgb);
    fn draw_image(&mut self, x: usize, y: usize, key: &str, size: usize);

    fn clear_region(&mut self, x: usize, y: usize, width: usize, height: usize) {
        for yy in y..y.saturating_add(height).min(self.height()) {
            for xx in x..x.saturating_add(width).min(self.width()) {
                self.set_pixel(xx, yy, Rgb::BLACK);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub x: usize,
    pub y: usize,
    pub text: String,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpan {
    pub x: usize,
    pub y: usize,
    pub key: String,
    pub size: usize,
}

/// In-memory surface. Text and images are kept as spans for whoever
/// presents the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
    texts: Vec<TextSpan>,
    images: Vec<ImageSpan>,
}

impl FrameBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Rgb::BLACK; width * height],
            texts: Vec::new(),
            images: Vec::new(),
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }

    pub fn lit_pixels(&self) -> usize {
        self.pixels.iter().filter(|p| !p.is_black()).count()
    }

    pub fn texts(&self) -> &[TextSpan] {
        &self.texts
    }

    pub fn images(&self) -> &[ImageSpan] {
        &self.images
    }
}

impl Surface for FrameBuffer {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn set_pixel(&mut self, x: usize, y: usize, color: Rgb) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = color;
        }
    }

    fn clear(&mut self) {
        self.pixels.fill(Rgb::BLACK);
        self.texts.clear();
        self.images.clear();
    }

    fn draw_text(&mut self, x: usize, y: usize, text: &str, color: Rgb) {
        self.texts.retain(|t| !(t.x == x && t.y == y));
        self.texts.push(TextSpan {
            x,
            y,
            text: text.to_string(),
            color,
        });
    }

    fn draw_image(&mut self, x: usize, y: usize, key: &str, size: usize) {
        self.images.retain(|i| !(i.x == x && i.y == y));
        self.images.push(ImageSpan {
            x,
            y,
            key: key.to_string(),
            size,
        });
    }

    fn clear_region(&mut self, x: usize, y: usize, width: usize, height: usize) {
        let x_end = x.saturating_add(width);
        let y_end = y.saturating_add(height);
        for yy in y..y_end.min(self.height) {
            for xx in x..x_end.min(self.width) {
                self.pixels[yy * self.width + xx] = Rgb::BLACK;
            }
        }
        let inside = |sx: usize, sy: usize| sx >= x && sx < x_end && sy >= y && sy < y_end;
        self.texts.retain(|t| !inside(t.x, t.y));
        self.images.retain(|i| !inside(i.x, i.y));
    }
}
