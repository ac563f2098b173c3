use image::{DynamicImage, RgbaImage};

use super::palette::{Palette, Rgb};
use super::text::{fit_line, Metrics};

pub const WIDTH: u32 = 1024;
pub const HEIGHT: u32 = 330;

const W: f32 = WIDTH as f32;
const H: f32 = HEIGHT as f32;

const BLUR_RADIUS: f32 = 70.0;
const BORDER_WIDTH: f32 = 20.0;
const NAME_BOX_WIDTH: f32 = 500.0;
const WHITE: Rgb = Rgb([0xFF, 0xFF, 0xFF]);

#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub blur_radius: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Border {
    pub width: f32,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Rgb,
    pub alpha: u8,
}

/// Circle filled with a radial gradient, the avatar is then kept only where
/// the circle has coverage (source-in).
#[derive(Debug, Clone, PartialEq)]
pub struct AvatarMask {
    pub cx: f32,
    pub cy: f32,
    pub radius: f32,
    pub stops: Vec<GradientStop>,
    pub avatar_size: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shadow {
    pub color: Rgb,
    pub blur: f32,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLayer {
    pub text: String,
    /// Left edge of the laid out line.
    pub x: f32,
    /// Top of the text box.
    pub y: f32,
    pub baseline: f32,
    pub size: f32,
    pub width: f32,
    pub fill: Rgb,
    pub shadow: Shadow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub background: Background,
    pub border: Border,
    pub mask: AvatarMask,
    pub captions: Vec<TextLayer>,
}

/// A welcome card ready to be rasterised.
#[derive(Clone, PartialEq)]
pub struct Scene {
    pub layout: Layout,
    pub avatar: RgbaImage,
}

fn shadow() -> Shadow {
    Shadow {
        color: Rgb([0, 0, 0]),
        blur: 7.0,
        opacity: 0.6,
    }
}

fn caption(text: String, x: f32, y: f32, size: f32, metrics: &dyn Metrics) -> TextLayer {
    TextLayer {
        width: metrics.width(&text, size),
        baseline: y + metrics.ascent(size),
        text,
        x,
        y,
        size,
        fill: WHITE,
        shadow: shadow(),
    }
}

pub fn compose(
    avatar: &DynamicImage,
    palette: &Palette,
    name: &str,
    subtitle: &str,
    metrics: &dyn Metrics,
) -> Scene {
    let dark = palette.dark_vibrant();

    let (name_line, name_width) = fit_line(name, NAME_BOX_WIDTH, 40.0, metrics);
    let name_box_x = W / 2.6;
    let mut name_layer = caption(name_line, name_box_x, 70.0, 40.0, metrics);
    name_layer.x = name_box_x + (NAME_BOX_WIDTH - name_width) / 2.0;
    name_layer.width = name_width;

    let layout = Layout {
        width: WIDTH,
        height: HEIGHT,
        background: Background {
            x: -W / 3.0,
            y: -W * 0.6,
            size: W * 1.6,
            blur_radius: BLUR_RADIUS,
        },
        border: Border {
            width: BORDER_WIDTH,
            color: palette.light_vibrant(),
        },
        mask: AvatarMask {
            cx: H / 2.0,
            cy: H / 2.0,
            radius: H / 2.0,
            stops: vec![
                GradientStop {
                    offset: 0.0,
                    color: dark,
                    alpha: 255,
                },
                GradientStop {
                    offset: 0.3,
                    color: dark,
                    alpha: 255,
                },
                GradientStop {
                    offset: 1.0,
                    color: Rgb([0, 0, 0]),
                    alpha: 0,
                },
            ],
            avatar_size: H,
        },
        captions: vec![
            caption(
                "Welcome".to_uppercase(),
                W / 3.0 + 40.0,
                H - 100.0,
                40.0,
                metrics,
            ),
            caption(subtitle.to_uppercase(), W / 3.0 + 70.0, H - 50.0, 30.0, metrics),
            name_layer,
        ],
    };

    Scene {
        layout,
        avatar: avatar.to_rgba8(),
    }
}
