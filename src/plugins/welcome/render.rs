use image::{imageops, imageops::FilterType, DynamicImage, ImageOutputFormat, RgbaImage};
use std::io::Cursor;
use tiny_skia::{
    BlendMode, Color, ColorU8, FillRule, FilterQuality, GradientStop, IntSize, Paint, PathBuilder,
    Pixmap, PixmapPaint, Point, RadialGradient, Rect, SpreadMode, Stroke, Transform,
};

use super::palette::Rgb;
use super::scene::{AvatarMask, Background, Scene, TextLayer};
use super::text::Typeface;
use crate::error::{BotError, Result};

pub const FILENAME: &str = "welcome.png";
pub const FALLBACK_SIDE: u32 = 512;
pub const FALLBACK_COLOR: Rgb = Rgb([0x22, 0x9E, 0xD9]);

// the background is blurred at 1/8 scale and stretched back up
const BLUR_DOWNSCALE: f32 = 8.0;

/// Solid square used when a user has no avatar.
pub fn fallback_avatar() -> Result<Vec<u8>> {
    let img = image::RgbImage::from_pixel(FALLBACK_SIDE, FALLBACK_SIDE, image::Rgb(FALLBACK_COLOR.0));
    encode_png(&DynamicImage::ImageRgb8(img))
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageOutputFormat::Png)?;
    Ok(buf.into_inner())
}

fn render_error(what: &str) -> BotError {
    BotError::Render(format!("could not allocate {what}"))
}

fn to_pixmap(img: &RgbaImage) -> Result<Pixmap> {
    let mut pixmap = Pixmap::new(img.width(), img.height()).ok_or_else(|| render_error("image"))?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(img.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

fn blur_pixmap(pixmap: &Pixmap, sigma: f32) -> Result<Pixmap> {
    let (w, h) = (pixmap.width(), pixmap.height());
    let buffer = RgbaImage::from_raw(w, h, pixmap.data().to_vec()).ok_or_else(|| render_error("blur buffer"))?;
    let blurred = imageops::blur(&buffer, sigma);
    let size = IntSize::from_wh(w, h).ok_or_else(|| render_error("blur buffer"))?;
    Pixmap::from_vec(blurred.into_raw(), size).ok_or_else(|| render_error("blur buffer"))
}

/// Rasterises the scene and returns PNG bytes.
pub fn render(scene: &Scene, typeface: &Typeface) -> Result<Vec<u8>> {
    let layout = &scene.layout;
    let mut canvas = Pixmap::new(layout.width, layout.height).ok_or_else(|| render_error("canvas"))?;

    draw_background(&mut canvas, &scene.avatar, &layout.background)?;

    let border = Rect::from_xywh(0.0, 0.0, layout.width as f32, layout.height as f32)
        .ok_or_else(|| render_error("border"))?;
    let mut paint = Paint::default();
    let [r, g, b] = layout.border.color.0;
    paint.set_color_rgba8(r, g, b, 255);
    paint.anti_alias = true;
    let stroke = Stroke {
        width: layout.border.width,
        ..Default::default()
    };
    canvas.stroke_path(
        &PathBuilder::from_rect(border),
        &paint,
        &stroke,
        Transform::identity(),
        None,
    );

    draw_captions(&mut canvas, typeface, &layout.captions)?;

    let masked = mask_layer(&scene.avatar, &layout.mask, layout.width, layout.height)?;
    canvas.draw_pixmap(
        0,
        0,
        masked.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );

    canvas
        .encode_png()
        .map_err(|e| BotError::Render(e.to_string()))
}

fn draw_background(canvas: &mut Pixmap, avatar: &RgbaImage, bg: &Background) -> Result<()> {
    let side = (bg.size / BLUR_DOWNSCALE).round().max(1.0) as u32;
    let small = imageops::resize(avatar, side, side, FilterType::Triangle);
    // a stack blur of radius r is close to a gaussian with sigma r / 2
    let blurred = imageops::blur(&small, bg.blur_radius / 2.0 / BLUR_DOWNSCALE);
    let pixmap = to_pixmap(&blurred)?;

    let scale = bg.size / side as f32;
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..Default::default()
    };
    canvas.draw_pixmap(
        0,
        0,
        pixmap.as_ref(),
        &paint,
        Transform::from_row(scale, 0.0, 0.0, scale, bg.x, bg.y),
        None,
    );
    Ok(())
}

fn draw_captions(canvas: &mut Pixmap, typeface: &Typeface, captions: &[TextLayer]) -> Result<()> {
    let Some(style) = captions.first().map(|c| c.shadow.clone()) else {
        return Ok(());
    };

    // all captions share one shadow style, so they share one blurred layer
    let mut shadow = Pixmap::new(canvas.width(), canvas.height()).ok_or_else(|| render_error("shadow"))?;
    let mut shadow_paint = Paint::default();
    let [r, g, b] = style.color.0;
    shadow_paint.set_color_rgba8(r, g, b, 255);
    shadow_paint.anti_alias = true;

    let mut lines = Vec::new();
    for layer in captions {
        let Some(path) = typeface.line_path(&layer.text, layer.x, layer.baseline, layer.size) else {
            continue;
        };
        shadow.fill_path(&path, &shadow_paint, FillRule::Winding, Transform::identity(), None);
        lines.push((path, layer.fill));
    }

    let shadow = blur_pixmap(&shadow, style.blur / 2.0)?;
    let paint = PixmapPaint {
        opacity: style.opacity,
        ..Default::default()
    };
    canvas.draw_pixmap(0, 0, shadow.as_ref(), &paint, Transform::identity(), None);

    for (path, fill) in lines {
        let mut paint = Paint::default();
        let [r, g, b] = fill.0;
        paint.set_color_rgba8(r, g, b, 255);
        paint.anti_alias = true;
        canvas.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }
    Ok(())
}

fn mask_layer(avatar: &RgbaImage, mask: &AvatarMask, width: u32, height: u32) -> Result<Pixmap> {
    let mut layer = Pixmap::new(width, height).ok_or_else(|| render_error("mask layer"))?;

    let stops = mask
        .stops
        .iter()
        .map(|stop| {
            let [r, g, b] = stop.color.0;
            GradientStop::new(stop.offset, Color::from_rgba8(r, g, b, stop.alpha))
        })
        .collect();
    let centre = Point::from_xy(mask.cx, mask.cy);
    let shader = RadialGradient::new(
        centre,
        centre,
        mask.radius,
        stops,
        SpreadMode::Pad,
        Transform::identity(),
    )
    .ok_or_else(|| render_error("gradient"))?;

    let mut paint = Paint::default();
    paint.shader = shader;
    paint.anti_alias = true;
    let circle = PathBuilder::from_circle(mask.cx, mask.cy, mask.radius).ok_or_else(|| render_error("circle"))?;
    layer.fill_path(&circle, &paint, FillRule::Winding, Transform::identity(), None);

    let avatar = to_pixmap(avatar)?;
    let paint = PixmapPaint {
        blend_mode: BlendMode::SourceIn,
        quality: FilterQuality::Bilinear,
        ..Default::default()
    };
    let transform = Transform::from_scale(
        mask.avatar_size / avatar.width() as f32,
        mask.avatar_size / avatar.height() as f32,
    );
    layer.draw_pixmap(0, 0, avatar.as_ref(), &paint, transform, None);

    Ok(layer)
}
