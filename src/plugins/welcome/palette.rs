//! Vibrant-style palette extraction.
//!
//! The image is downsampled, quantised with modified median cut over a 5 bit
//! per channel histogram, and the quantised colours are scored against six
//! targets (vibrant, light/dark vibrant, muted, light/dark muted). Light and
//! dark vibrant are always present afterwards: when no swatch qualifies they
//! are derived from the best remaining one by moving its lightness.

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use indexmap::IndexMap;
use std::fmt;

use crate::error::Result;

const SIGBITS: u32 = 5;
const RSHIFT: u32 = 8 - SIGBITS;
const MAX_COLORS: usize = 64;
const FRACT_BY_POPULATION: f64 = 0.75;
const SAMPLE_SIDE: u32 = 100;

const TARGET_DARK_LUMA: f64 = 0.26;
const MAX_DARK_LUMA: f64 = 0.45;
const MIN_LIGHT_LUMA: f64 = 0.55;
const TARGET_LIGHT_LUMA: f64 = 0.74;
const MIN_NORMAL_LUMA: f64 = 0.3;
const TARGET_NORMAL_LUMA: f64 = 0.5;
const MAX_NORMAL_LUMA: f64 = 0.7;
const TARGET_MUTED_SATURATION: f64 = 0.3;
const MAX_MUTED_SATURATION: f64 = 0.4;
const TARGET_VIBRANT_SATURATION: f64 = 1.0;
const MIN_VIBRANT_SATURATION: f64 = 0.35;

const WEIGHT_SATURATION: f64 = 3.0;
const WEIGHT_LUMA: f64 = 6.5;
const WEIGHT_POPULATION: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub fn hex(&self) -> String {
        let [r, g, b] = self.0;
        format!("#{r:02X}{g:02X}{b:02X}")
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        Some(Self([channel(0)?, channel(2)?, channel(4)?]))
    }

    pub fn hsl(&self) -> Hsl {
        let [r, g, b] = self.0.map(|c| c as f64 / 255.0);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;

        if max == min {
            return Hsl { h: 0.0, s: 0.0, l };
        }

        let d = max - min;
        let s = if l > 0.5 {
            d / (2.0 - max - min)
        } else {
            d / (max + min)
        };
        let h = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };

        Hsl { h: h / 6.0, s, l }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

/// Hue, saturation and lightness, all in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub h: f64,
    pub s: f64,
    pub l: f64,
}

impl Hsl {
    pub fn rgb(&self) -> Rgb {
        let Hsl { h, s, l } = *self;
        if s == 0.0 {
            let v = (l * 255.0).round() as u8;
            return Rgb([v, v, v]);
        }

        fn hue(p: f64, q: f64, mut t: f64) -> f64 {
            if t < 0.0 {
                t += 1.0;
            }
            if t > 1.0 {
                t -= 1.0;
            }
            if t < 1.0 / 6.0 {
                p + (q - p) * 6.0 * t
            } else if t < 0.5 {
                q
            } else if t < 2.0 / 3.0 {
                p + (q - p) * (2.0 / 3.0 - t) * 6.0
            } else {
                p
            }
        }

        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        let channel = |t: f64| (hue(p, q, t) * 255.0).round().clamp(0.0, 255.0) as u8;
        Rgb([channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0)])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwatchKind {
    Vibrant,
    LightVibrant,
    DarkVibrant,
    Muted,
    LightMuted,
    DarkMuted,
}

impl SwatchKind {
    const ALL: [SwatchKind; 6] = [
        SwatchKind::Vibrant,
        SwatchKind::LightVibrant,
        SwatchKind::DarkVibrant,
        SwatchKind::Muted,
        SwatchKind::LightMuted,
        SwatchKind::DarkMuted,
    ];

    // (target luma, min luma, max luma, target sat, min sat, max sat)
    fn target(self) -> (f64, f64, f64, f64, f64, f64) {
        use SwatchKind::*;
        let (tl, nl, xl) = match self {
            Vibrant | Muted => (TARGET_NORMAL_LUMA, MIN_NORMAL_LUMA, MAX_NORMAL_LUMA),
            LightVibrant | LightMuted => (TARGET_LIGHT_LUMA, MIN_LIGHT_LUMA, 1.0),
            DarkVibrant | DarkMuted => (TARGET_DARK_LUMA, 0.0, MAX_DARK_LUMA),
        };
        let (ts, ns, xs) = match self {
            Vibrant | LightVibrant | DarkVibrant => {
                (TARGET_VIBRANT_SATURATION, MIN_VIBRANT_SATURATION, 1.0)
            }
            Muted | LightMuted | DarkMuted => (TARGET_MUTED_SATURATION, 0.0, MAX_MUTED_SATURATION),
        };
        (tl, nl, xl, ts, ns, xs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Swatch {
    pub rgb: Rgb,
    pub population: u32,
}

impl Swatch {
    pub fn hex(&self) -> String {
        self.rgb.hex()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    swatches: IndexMap<SwatchKind, Swatch>,
}

impl Palette {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_image(&image::load_from_memory(bytes)?))
    }

    pub fn from_image(img: &DynamicImage) -> Self {
        let colors = quantize(&histogram(img), MAX_COLORS);
        Self::from_swatches(&colors)
    }

    fn from_swatches(colors: &[Swatch]) -> Self {
        let max_population = colors.iter().map(|s| s.population).max().unwrap_or(1);
        let mut swatches: IndexMap<SwatchKind, Swatch> = IndexMap::new();

        for kind in SwatchKind::ALL {
            let (tl, nl, xl, ts, ns, xs) = kind.target();
            let best = colors
                .iter()
                .filter(|swatch| !swatches.values().any(|taken| taken.rgb == swatch.rgb))
                .filter_map(|swatch| {
                    let Hsl { s, l, .. } = swatch.rgb.hsl();
                    let fits = (ns..=xs).contains(&s) && (nl..=xl).contains(&l);
                    fits.then(|| (score(s, ts, l, tl, swatch.population, max_population), swatch))
                })
                .max_by(|a, b| a.0.total_cmp(&b.0));

            if let Some((_, swatch)) = best {
                swatches.insert(kind, *swatch);
            }
        }

        let mut palette = Self { swatches };
        palette.fill_vibrant(colors);
        palette
    }

    fn fill_vibrant(&mut self, colors: &[Swatch]) {
        let base = [
            SwatchKind::Vibrant,
            SwatchKind::DarkVibrant,
            SwatchKind::LightVibrant,
            SwatchKind::Muted,
        ]
        .into_iter()
        .find_map(|kind| self.swatches.get(&kind).copied())
        .or_else(|| colors.iter().max_by_key(|s| s.population).copied())
        .unwrap_or(Swatch {
            rgb: Rgb([128, 128, 128]),
            population: 0,
        });

        for (kind, luma) in [
            (SwatchKind::LightVibrant, TARGET_LIGHT_LUMA),
            (SwatchKind::DarkVibrant, TARGET_DARK_LUMA),
        ] {
            if !self.swatches.contains_key(&kind) {
                let mut hsl = base.rgb.hsl();
                hsl.l = luma;
                self.swatches.insert(
                    kind,
                    Swatch {
                        rgb: hsl.rgb(),
                        population: 0,
                    },
                );
            }
        }
    }

    pub fn get(&self, kind: SwatchKind) -> Option<&Swatch> {
        self.swatches.get(&kind)
    }

    pub fn light_vibrant(&self) -> Rgb {
        self.swatches[&SwatchKind::LightVibrant].rgb
    }

    pub fn dark_vibrant(&self) -> Rgb {
        self.swatches[&SwatchKind::DarkVibrant].rgb
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SwatchKind, &Swatch)> {
        self.swatches.iter()
    }
}

fn score(sat: f64, target_sat: f64, luma: f64, target_luma: f64, pop: u32, max_pop: u32) -> f64 {
    let invert_diff = |value: f64, target: f64| 1.0 - (value - target).abs();
    let weighted = [
        (invert_diff(sat, target_sat), WEIGHT_SATURATION),
        (invert_diff(luma, target_luma), WEIGHT_LUMA),
        (pop as f64 / max_pop.max(1) as f64, WEIGHT_POPULATION),
    ];
    let total: f64 = weighted.iter().map(|(_, w)| w).sum();
    weighted.iter().map(|(v, w)| v * w).sum::<f64>() / total
}

fn index(r: u32, g: u32, b: u32) -> usize {
    ((r << (2 * SIGBITS)) + (g << SIGBITS) + b) as usize
}

fn histogram(img: &DynamicImage) -> Vec<u32> {
    let img = if img.width() > SAMPLE_SIDE || img.height() > SAMPLE_SIDE {
        img.resize(SAMPLE_SIDE, SAMPLE_SIDE, FilterType::Triangle)
    } else {
        img.clone()
    };

    let mut histo = vec![0u32; 1 << (3 * SIGBITS)];
    for (_, _, pixel) in img.pixels() {
        let [r, g, b, a] = pixel.0;
        // transparent and near white pixels carry no colour worth keeping
        if a < 125 || (r > 250 && g > 250 && b > 250) {
            continue;
        }
        let i = index(
            (r as u32) >> RSHIFT,
            (g as u32) >> RSHIFT,
            (b as u32) >> RSHIFT,
        );
        histo[i] += 1;
    }
    histo
}

#[derive(Debug, Clone, Copy)]
struct VBox {
    r: (u32, u32),
    g: (u32, u32),
    b: (u32, u32),
}

impl VBox {
    fn from_histogram(histo: &[u32]) -> Option<Self> {
        let max = (1 << SIGBITS) - 1;
        let mut vbox = VBox {
            r: (max, 0),
            g: (max, 0),
            b: (max, 0),
        };
        let mut any = false;
        for r in 0..=max {
            for g in 0..=max {
                for b in 0..=max {
                    if histo[index(r, g, b)] > 0 {
                        any = true;
                        vbox.r = (vbox.r.0.min(r), vbox.r.1.max(r));
                        vbox.g = (vbox.g.0.min(g), vbox.g.1.max(g));
                        vbox.b = (vbox.b.0.min(b), vbox.b.1.max(b));
                    }
                }
            }
        }
        any.then_some(vbox)
    }

    fn cells(&self) -> impl Iterator<Item = (u32, u32, u32)> + '_ {
        (self.r.0..=self.r.1).flat_map(move |r| {
            (self.g.0..=self.g.1).flat_map(move |g| (self.b.0..=self.b.1).map(move |b| (r, g, b)))
        })
    }

    fn count(&self, histo: &[u32]) -> u32 {
        self.cells().map(|(r, g, b)| histo[index(r, g, b)]).sum()
    }

    fn volume(&self) -> u64 {
        let side = |(lo, hi): (u32, u32)| (hi - lo + 1) as u64;
        side(self.r) * side(self.g) * side(self.b)
    }

    fn average(&self, histo: &[u32]) -> Rgb {
        let mult = 1 << RSHIFT;
        let (mut total, mut rs, mut gs, mut bs) = (0u64, 0f64, 0f64, 0f64);
        for (r, g, b) in self.cells() {
            let h = histo[index(r, g, b)] as u64;
            total += h;
            rs += h as f64 * (r as f64 + 0.5) * mult as f64;
            gs += h as f64 * (g as f64 + 0.5) * mult as f64;
            bs += h as f64 * (b as f64 + 0.5) * mult as f64;
        }
        if total == 0 {
            let mid = |(lo, hi): (u32, u32)| ((mult * (lo + hi + 1)) / 2).min(255) as u8;
            return Rgb([mid(self.r), mid(self.g), mid(self.b)]);
        }
        let avg = |sum: f64| (sum / total as f64).round().clamp(0.0, 255.0) as u8;
        Rgb([avg(rs), avg(gs), avg(bs)])
    }

    /// Splits along the longest axis at the population median.
    fn split(&self, histo: &[u32]) -> Option<(VBox, VBox)> {
        if self.volume() == 1 {
            return None;
        }
        let lengths = [
            self.r.1 - self.r.0,
            self.g.1 - self.g.0,
            self.b.1 - self.b.0,
        ];
        let axis = (0..3).max_by_key(|&i| lengths[i]).unwrap_or(0);
        let range = [self.r, self.g, self.b][axis];

        let slice_count = |v: u32| {
            let mut slice = *self;
            match axis {
                0 => slice.r = (v, v),
                1 => slice.g = (v, v),
                _ => slice.b = (v, v),
            }
            slice.count(histo)
        };
        let partial: Vec<u32> = (range.0..=range.1)
            .scan(0u32, |acc, v| {
                *acc += slice_count(v);
                Some(*acc)
            })
            .collect();
        let total = *partial.last()?;
        if total == 0 {
            return None;
        }

        let mut cut = range.0;
        for (i, acc) in partial.iter().enumerate() {
            if *acc > total / 2 {
                cut = range.0 + i as u32;
                break;
            }
        }
        // keep both halves non empty
        if cut == range.1 {
            cut = range.1 - 1;
        }

        let (mut lo, mut hi) = (*self, *self);
        match axis {
            0 => {
                lo.r.1 = cut;
                hi.r.0 = cut + 1;
            }
            1 => {
                lo.g.1 = cut;
                hi.g.0 = cut + 1;
            }
            _ => {
                lo.b.1 = cut;
                hi.b.0 = cut + 1;
            }
        }
        Some((lo, hi))
    }
}

fn quantize(histo: &[u32], max_colors: usize) -> Vec<Swatch> {
    let Some(first) = VBox::from_histogram(histo) else {
        return Vec::new();
    };

    let mut boxes = vec![first];
    let by_population = (FRACT_BY_POPULATION * max_colors as f64) as usize;
    split_boxes(&mut boxes, histo, by_population, |b| b.count(histo) as u64);
    split_boxes(&mut boxes, histo, max_colors, |b| {
        b.count(histo) as u64 * b.volume()
    });

    boxes
        .iter()
        .filter_map(|b| {
            let population = b.count(histo);
            (population > 0).then(|| Swatch {
                rgb: b.average(histo),
                population,
            })
        })
        .collect()
}

fn split_boxes(boxes: &mut Vec<VBox>, histo: &[u32], target: usize, key: impl Fn(&VBox) -> u64) {
    while boxes.len() < target {
        let Some((i, _)) = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.volume() > 1 && b.count(histo) > 0)
            .max_by_key(|(_, b)| key(b))
        else {
            return;
        };
        let Some((lo, hi)) = boxes[i].split(histo) else {
            return;
        };
        boxes[i] = lo;
        boxes.push(hi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid(rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 64, Rgba([rgb[0], rgb[1], rgb[2], 255])))
    }

    fn assert_valid(palette: &Palette) {
        let light = palette.light_vibrant().hex();
        let dark = palette.dark_vibrant().hex();
        assert_ne!(light, dark);
        for hex in [light, dark] {
            assert_eq!(hex.len(), 7);
            assert!(Rgb::from_hex(&hex).is_some(), "{hex}");
        }
    }

    #[test]
    fn hex_round_trips() {
        assert_eq!(Rgb([0x22, 0x9E, 0xD9]).hex(), "#229ED9");
        assert_eq!(Rgb::from_hex("#229ED9"), Some(Rgb([0x22, 0x9E, 0xD9])));
        assert_eq!(Rgb::from_hex("#229ED"), None);
        assert_eq!(Rgb::from_hex("#GG9ED9"), None);
    }

    #[test]
    fn hsl_conversion() {
        let rgb = Rgb([0x22, 0x9E, 0xD9]);
        let hsl = rgb.hsl();
        assert!((hsl.h * 360.0 - 199.0).abs() < 1.0);
        assert!((hsl.l - 0.492).abs() < 0.01);
        assert_eq!(hsl.rgb(), rgb);
    }

    #[test]
    fn fallback_colour_yields_blue_pair() {
        let palette = Palette::from_image(&solid([0x22, 0x9E, 0xD9]));
        assert_valid(&palette);
        assert_eq!(palette.get(SwatchKind::Vibrant).unwrap().population, 64 * 64);

        let light = palette.light_vibrant().hsl();
        let dark = palette.dark_vibrant().hsl();
        assert!((light.l - TARGET_LIGHT_LUMA).abs() < 0.01);
        assert!((dark.l - TARGET_DARK_LUMA).abs() < 0.01);
        assert!((light.h - dark.h).abs() < 0.01);
    }

    #[test]
    fn grey_and_white_images_still_get_a_palette() {
        assert_valid(&Palette::from_image(&solid([128, 128, 128])));
        assert_valid(&Palette::from_image(&solid([255, 255, 255])));
        assert_valid(&Palette::from_image(&solid([0, 0, 0])));

        let transparent = DynamicImage::ImageRgba8(RgbaImage::new(8, 8));
        assert_valid(&Palette::from_image(&transparent));
    }

    #[test]
    fn picks_light_and_dark_from_two_tone_image() {
        let mut img = RgbaImage::from_pixel(100, 100, Rgba([230, 120, 150, 255]));
        for (x, _, px) in img.enumerate_pixels_mut() {
            if x < 50 {
                *px = Rgba([20, 40, 120, 255]);
            }
        }
        let palette = Palette::from_image(&DynamicImage::ImageRgba8(img));
        assert_valid(&palette);
        assert!(palette.light_vibrant().hsl().l > MIN_LIGHT_LUMA);
        assert!(palette.dark_vibrant().hsl().l < MAX_DARK_LUMA);
        assert!(palette.get(SwatchKind::DarkVibrant).unwrap().population > 0);
    }

    #[test]
    fn extraction_is_deterministic() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(40, 30, |x, y| {
            Rgba([(x * 6) as u8, (y * 8) as u8, 200, 255])
        }));
        assert_eq!(Palette::from_image(&img), Palette::from_image(&img));
    }

    #[test]
    fn median_cut_respects_colour_budget() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(64, 64, |x, y| {
            Rgba([(x * 4) as u8, (y * 4) as u8, 100, 255])
        }));
        let colors = quantize(&histogram(&img), MAX_COLORS);
        assert!(!colors.is_empty());
        assert!(colors.len() <= MAX_COLORS);
        let total: u32 = colors.iter().map(|s| s.population).sum();
        assert_eq!(total, 64 * 64);
    }

    #[test]
    fn undecodable_bytes_error() {
        assert!(Palette::from_bytes(b"not an image").is_err());
    }
}
