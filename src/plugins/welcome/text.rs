use std::{borrow::Cow, path::Path};
use tiny_skia::PathBuilder;
use ttf_parser::{Face, GlyphId, OutlineBuilder};

use crate::error::{BotError, Result};

pub const ELLIPSIS: char = '\u{2026}';

static BUNDLED: &[u8] = include_bytes!("../../../assets/fonts/DejaVuSans-Bold.ttf");

/// Horizontal metrics needed to lay a line out.
pub trait Metrics {
    fn advance(&self, ch: char, size: f32) -> f32;
    fn ascent(&self, size: f32) -> f32;

    fn width(&self, text: &str, size: f32) -> f32 {
        text.chars().map(|ch| self.advance(ch, size)).sum()
    }
}

/// Fixed-ratio metrics for glyphs a face does not cover.
#[derive(Debug, Clone, Copy)]
pub struct Estimated;

impl Metrics for Estimated {
    fn advance(&self, ch: char, size: f32) -> f32 {
        if ch == ' ' {
            size * 0.3
        } else {
            size * 0.6
        }
    }
    fn ascent(&self, size: f32) -> f32 {
        size * 0.8
    }
}

/// Font file kept in memory; faces are parsed on demand since `Face` borrows.
#[derive(Debug, Clone)]
pub struct Typeface {
    data: Cow<'static, [u8]>,
}

impl Default for Typeface {
    fn default() -> Self {
        Self::bundled()
    }
}

impl Typeface {
    /// DejaVu Sans Bold, compiled into the binary.
    pub fn bundled() -> Self {
        Self {
            data: Cow::Borrowed(BUNDLED),
        }
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Face::parse(&data, 0).map_err(|e| BotError::Font(e.to_string()))?;
        Ok(Self {
            data: Cow::Owned(data),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, 0).ok()
    }

    /// Outline of a whole line as one path, `x` and `baseline` in canvas pixels.
    pub fn line_path(&self, text: &str, x: f32, baseline: f32, size: f32) -> Option<tiny_skia::Path> {
        let face = self.face()?;
        let scale = size / face.units_per_em() as f32;

        let mut converter = PathConverter {
            builder: PathBuilder::new(),
            scale,
            x,
            y: baseline,
        };

        for ch in text.chars() {
            let Some(glyph) = face.glyph_index(ch) else {
                converter.x += Estimated.advance(ch, size);
                continue;
            };
            face.outline_glyph(glyph, &mut converter);
            converter.x += advance_of(&face, glyph, scale, size);
        }

        converter.builder.finish()
    }
}

fn advance_of(face: &Face, glyph: GlyphId, scale: f32, size: f32) -> f32 {
    face.glyph_hor_advance(glyph)
        .map(|units| units as f32 * scale)
        .unwrap_or(size * 0.6)
}

impl Metrics for Typeface {
    fn advance(&self, ch: char, size: f32) -> f32 {
        let Some(face) = self.face() else {
            return Estimated.advance(ch, size);
        };
        let scale = size / face.units_per_em() as f32;
        match face.glyph_index(ch) {
            Some(glyph) => advance_of(&face, glyph, scale, size),
            None => Estimated.advance(ch, size),
        }
    }

    fn ascent(&self, size: f32) -> f32 {
        match self.face() {
            Some(face) => face.ascender() as f32 * size / face.units_per_em() as f32,
            None => Estimated.ascent(size),
        }
    }
}

struct PathConverter {
    builder: PathBuilder,
    scale: f32,
    x: f32,
    y: f32,
}

impl OutlineBuilder for PathConverter {
    fn move_to(&mut self, px: f32, py: f32) {
        self.builder
            .move_to(self.x + px * self.scale, self.y - py * self.scale);
    }

    fn line_to(&mut self, px: f32, py: f32) {
        self.builder
            .line_to(self.x + px * self.scale, self.y - py * self.scale);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, px: f32, py: f32) {
        self.builder.quad_to(
            self.x + x1 * self.scale,
            self.y - y1 * self.scale,
            self.x + px * self.scale,
            self.y - py * self.scale,
        );
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, px: f32, py: f32) {
        self.builder.cubic_to(
            self.x + x1 * self.scale,
            self.y - y1 * self.scale,
            self.x + x2 * self.scale,
            self.y - y2 * self.scale,
            self.x + px * self.scale,
            self.y - py * self.scale,
        );
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

/// Fits `text` on one line of `max_width`, cutting it and appending an
/// ellipsis when it overflows. Returns the line and its width.
pub fn fit_line(text: &str, max_width: f32, size: f32, metrics: &dyn Metrics) -> (String, f32) {
    let width = metrics.width(text, size);
    if width <= max_width {
        return (text.to_string(), width);
    }

    let ellipsis = metrics.advance(ELLIPSIS, size);
    let mut line = String::new();
    let mut line_width = 0.0;
    for ch in text.chars() {
        let advance = metrics.advance(ch, size);
        if line_width + advance + ellipsis > max_width {
            break;
        }
        line.push(ch);
        line_width += advance;
    }

    let keep = line.trim_end().len();
    line_width -= metrics.width(&line[keep..], size);
    line.truncate(keep);

    line.push(ELLIPSIS);
    (line, line_width + ellipsis)
}
