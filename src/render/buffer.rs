//! Software back buffer
//!
//! 0x00RRGGBB pixels, rectangle fills and coverage-blended glyphs, with
//! a damage rectangle so presenting only uploads what changed.

use crate::font::RasterGlyph;
use crate::utils::color::Rgb;

/// Pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    fn right(&self) -> i32 {
        self.x + self.w as i32
    }

    fn bottom(&self) -> i32 {
        self.y + self.h as i32
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let r = self.right().min(other.right());
        let b = self.bottom().min(other.bottom());
        if r <= x || b <= y {
            return Rect::default();
        }
        Rect::new(x, y, (r - x) as u32, (b - y) as u32)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let r = self.right().max(other.right());
        let b = self.bottom().max(other.bottom());
        Rect::new(x, y, (r - x) as u32, (b - y) as u32)
    }
}

/// Back buffer the renderer draws into
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
    damage: Rect,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width * height) as usize],
            damage: Rect::new(0, 0, width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels[(y * self.width + x) as usize]
    }

    fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Reallocate; content is lost and the whole buffer is damaged
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0; (width * height) as usize];
        self.damage = self.bounds();
    }

    /// Region changed since the last call
    pub fn take_damage(&mut self) -> Rect {
        std::mem::take(&mut self.damage)
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Rgb) {
        let r = rect.intersect(&self.bounds());
        if r.is_empty() {
            return;
        }
        let pixel = color.to_pixel();
        for y in r.y..r.bottom() {
            let start = (y as u32 * self.width) as usize + r.x as usize;
            self.pixels[start..start + r.w as usize].fill(pixel);
        }
        self.damage = self.damage.union(&r);
    }

    /// Blend a coverage bitmap in `color`, pen at (`x`, `baseline`),
    /// touching only pixels inside `clip`
    pub fn draw_glyph(&mut self, glyph: &RasterGlyph, x: i32, baseline: i32, color: Rgb, clip: Rect) {
        let origin_x = x + glyph.left;
        let origin_y = baseline - glyph.top;
        let area = Rect::new(origin_x, origin_y, glyph.width as u32, glyph.height as u32)
            .intersect(&clip)
            .intersect(&self.bounds());
        if area.is_empty() {
            return;
        }

        for py in area.y..area.bottom() {
            let gy = (py - origin_y) as usize;
            for px in area.x..area.right() {
                let gx = (px - origin_x) as usize;
                let alpha = glyph.coverage[gy * glyph.width + gx];
                if alpha == 0 {
                    continue;
                }
                let idx = (py as u32 * self.width + px as u32) as usize;
                self.pixels[idx] = blend(self.pixels[idx], color, alpha);
            }
        }
        self.damage = self.damage.union(&area);
    }
}

/// Mix `color` over `dst` with 8-bit coverage
#[inline]
fn blend(dst: u32, color: Rgb, alpha: u8) -> u32 {
    if alpha == 255 {
        return color.to_pixel();
    }
    let a = alpha as u32;
    let mix = |d: u32, s: u8| (s as u32 * a + d * (255 - a) + 127) / 255;
    let r = mix((dst >> 16) & 0xff, color.r);
    let g = mix((dst >> 8) & 0xff, color.g);
    let b = mix(dst & 0xff, color.b);
    (r << 16) | (g << 8) | b
}
