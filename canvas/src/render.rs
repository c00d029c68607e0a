//! Layer compositing: rasterises a page and its annotation layers.
//!
//! This module is the only place that produces pixels. It receives read-only
//! views of page and layer state plus a view transform and returns a fresh
//! [`RgbaImage`]; it never mutates application state, so rendering the same
//! inputs twice yields identical buffers.
//!
//! Draw order:
//! 1. backdrop, then the page image (or a placeholder when it failed to load)
//! 2. visible background layers, ascending by `(created_at, owner_id)`
//! 3. the foreground layer
//! 4. the in-progress stroke preview, if any
//!
//! Each layer is rasterised into its own transparent pixmap and composited
//! source-over, so an eraser-tool stroke only clears pixels of its own layer.
//! Strokes are drawn with round caps and joins; a one-point stroke is a dot.

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;

use std::collections::HashSet;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use vello_cpu::kurbo::{Affine, BezPath, Cap, Circle, Join, Rect, Shape};
use vello_cpu::peniko::color::PremulRgba8;
use vello_cpu::peniko::{BlendMode, Color as Paint, Compose, ImageQuality, ImageSampler, Mix};
use vello_cpu::{Image, ImageSource, Pixmap, RenderContext};

use crate::consts::{BACKDROP_RGBA, DOT_TOLERANCE, PLACEHOLDER_RGBA};
use crate::error::CanvasError;
use crate::layer::{AnnotationLayer, OwnerId, Stroke, StrokeTool};
use crate::view::{Point, Size, ViewTransform};

/// Which background layers are shown. Pure view state; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerVisibility {
    hidden: HashSet<OwnerId>,
}

impl LayerVisibility {
    #[must_use]
    pub fn is_visible(&self, owner: &OwnerId) -> bool {
        !self.hidden.contains(owner)
    }

    pub fn set_visible(&mut self, owner: OwnerId, visible: bool) {
        if visible {
            self.hidden.remove(&owner);
        } else {
            self.hidden.insert(owner);
        }
    }

    /// Flip one layer's visibility. Returns the new state.
    pub fn toggle(&mut self, owner: OwnerId) -> bool {
        let visible = !self.is_visible(&owner);
        self.set_visible(owner, visible);
        visible
    }

    pub fn show_all(&mut self) {
        self.hidden.clear();
    }
}

/// Everything needed to draw one page.
#[derive(Debug, Clone, Copy)]
pub struct Scene<'a> {
    /// Decoded page image; `None` draws a placeholder of `image_size`.
    pub image: Option<&'a RgbaImage>,
    pub image_size: Size,
    pub background: &'a [Arc<AnnotationLayer>],
    pub foreground: &'a AnnotationLayer,
    pub preview: Option<&'a Stroke>,
    pub visibility: &'a LayerVisibility,
}

impl Scene<'_> {
    /// Image-space size of the page.
    #[must_use]
    pub fn page_size(&self) -> Size {
        match self.image {
            Some(image) => Size::new(f64::from(image.width()), f64::from(image.height())),
            None => self.image_size,
        }
    }
}

/// Visible background layers in draw order: ascending submission time, ties
/// broken by owner id. Independent of the order they were supplied in.
#[must_use]
pub fn draw_order<'a>(background: &'a [Arc<AnnotationLayer>], visibility: &LayerVisibility) -> Vec<&'a AnnotationLayer> {
    let mut layers: Vec<&AnnotationLayer> = background
        .iter()
        .map(AsRef::as_ref)
        .filter(|l| visibility.is_visible(&l.owner_id))
        .collect();
    layers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.owner_id.cmp(&b.owner_id)));
    layers
}

/// Render the scene into a `width` × `height` viewport through `view`.
pub fn render(scene: &Scene<'_>, view: &ViewTransform, width: u32, height: u32) -> Result<RgbaImage, CanvasError> {
    if width == 0 || height == 0 {
        return Ok(RgbaImage::from_pixel(width, height, Rgba(BACKDROP_RGBA)));
    }
    let (w, h) = surface_size(width, height)?;
    let transform = view_affine(view);

    let mut ctx = RenderContext::new(w, h);
    ctx.set_paint_transform(Affine::IDENTITY);
    ctx.set_paint(solid(BACKDROP_RGBA));
    ctx.fill_rect(&surface_rect(w, h));
    paint_page(&mut ctx, scene, transform)?;

    let mut scratch = RenderContext::new(w, h);
    for layer in draw_order(scene.background, scene.visibility) {
        composite_layer(&mut ctx, &mut scratch, &layer.strokes, transform);
    }
    composite_layer(&mut ctx, &mut scratch, &scene.foreground.strokes, transform);
    if let Some(preview) = scene.preview {
        composite_layer(&mut ctx, &mut scratch, std::slice::from_ref(preview), transform);
    }

    ctx.flush();
    let mut out = Pixmap::new(w, h);
    ctx.render_to_pixmap(&mut out);
    Ok(to_rgba_image(&out, width, height))
}

/// Render the page at native resolution with an identity transform, as used
/// for export. The output has exactly the page's pixel dimensions.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn render_page(scene: &Scene<'_>) -> Result<RgbaImage, CanvasError> {
    let size = scene.page_size();
    if size.is_empty() {
        return Ok(RgbaImage::new(0, 0));
    }
    let mut identity = ViewTransform::default();
    identity.set_view(Point::new(0.0, 0.0), 1.0);
    render(scene, &identity, size.width.ceil() as u32, size.height.ceil() as u32)
}

// =============================================================
// Page image
// =============================================================

fn paint_page(ctx: &mut RenderContext, scene: &Scene<'_>, transform: Affine) -> Result<(), CanvasError> {
    let size = scene.page_size();
    if size.is_empty() {
        return Ok(());
    }
    ctx.set_transform(transform);
    match scene.image {
        Some(image) => ctx.set_paint(Image {
            image: ImageSource::Pixmap(Arc::new(to_pixmap(image)?)),
            sampler: ImageSampler::default(),
        }),
        None => ctx.set_paint(solid(PLACEHOLDER_RGBA)),
    }
    ctx.fill_rect(&Rect::new(0.0, 0.0, size.width, size.height));
    ctx.set_transform(Affine::IDENTITY);
    Ok(())
}

// =============================================================
// Layers
// =============================================================

/// Draw `strokes` into `scratch`, then lay the result over `target`
/// pixel for pixel.
fn composite_layer(target: &mut RenderContext, scratch: &mut RenderContext, strokes: &[Stroke], transform: Affine) {
    if strokes.is_empty() {
        return;
    }
    scratch.reset();
    scratch.set_transform(transform);
    for stroke in strokes {
        paint_stroke(scratch, stroke);
    }
    scratch.flush();
    let (w, h) = (scratch.width(), scratch.height());
    let mut pixmap = Pixmap::new(w, h);
    scratch.render_to_pixmap(&mut pixmap);

    target.set_transform(Affine::IDENTITY);
    target.set_blend_mode(BlendMode::default());
    target.set_paint(Image {
        image: ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: ImageSampler { quality: ImageQuality::Low, ..ImageSampler::default() },
    });
    target.fill_rect(&surface_rect(w, h));
}

fn paint_stroke(ctx: &mut RenderContext, stroke: &Stroke) {
    match stroke.tool() {
        StrokeTool::Pen => {
            ctx.set_blend_mode(BlendMode::default());
            ctx.set_paint(solid(stroke.color().to_rgba()));
        }
        StrokeTool::Eraser => {
            ctx.set_blend_mode(BlendMode::new(Mix::Normal, Compose::DestOut));
            ctx.set_paint(solid([0, 0, 0, u8::MAX]));
        }
    }

    if let [only] = stroke.points() {
        let dot = Circle::new((only.x, only.y), stroke.width() / 2.0);
        ctx.fill_path(&dot.to_path(DOT_TOLERANCE));
        return;
    }
    let outline = vello_cpu::kurbo::Stroke::new(stroke.width()).with_caps(Cap::Round).with_join(Join::Round);
    ctx.set_stroke(outline);
    ctx.stroke_path(&polyline(stroke.points()));
}

fn polyline(points: &[Point]) -> BezPath {
    let mut path = BezPath::new();
    let mut rest = points.iter();
    if let Some(first) = rest.next() {
        path.move_to((first.x, first.y));
    }
    for p in rest {
        path.line_to((p.x, p.y));
    }
    path
}

// =============================================================
// Pixmap conversion
// =============================================================

fn surface_size(width: u32, height: u32) -> Result<(u16, u16), CanvasError> {
    match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(CanvasError::SurfaceTooLarge { width, height }),
    }
}

fn surface_rect(w: u16, h: u16) -> Rect {
    Rect::new(0.0, 0.0, f64::from(w), f64::from(h))
}

fn view_affine(view: &ViewTransform) -> Affine {
    let offset = view.offset();
    Affine::translate((offset.x, offset.y)) * Affine::scale(view.scale())
}

fn solid([r, g, b, a]: [u8; 4]) -> Paint {
    Paint::from_rgba8(r, g, b, a)
}

fn to_pixmap(image: &RgbaImage) -> Result<Pixmap, CanvasError> {
    let (w, h) = surface_size(image.width(), image.height())?;
    let pixels = image.pixels().map(|p| PremulRgba8::from_u8_array(premultiply(p.0))).collect();
    Ok(Pixmap::from_parts_with_opacity(pixels, w, h, true))
}

fn to_rgba_image(pixmap: &Pixmap, width: u32, height: u32) -> RgbaImage {
    let mut out = RgbaImage::new(width, height);
    for (dst, src) in out.pixels_mut().zip(pixmap.data_as_u8_slice().chunks_exact(4)) {
        dst.0 = unpremultiply([src[0], src[1], src[2], src[3]]);
    }
    out
}

#[allow(clippy::cast_possible_truncation)]
fn premultiply([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    let scale = |c: u8| ((u16::from(c) * u16::from(a) + 127) / 255) as u8;
    [scale(r), scale(g), scale(b), a]
}

#[allow(clippy::cast_possible_truncation)]
fn unpremultiply([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    match a {
        0 => [0, 0, 0, 0],
        u8::MAX => [r, g, b, a],
        _ => {
            let scale = |c: u8| ((u16::from(c) * 255 + u16::from(a) / 2) / u16::from(a)).min(255) as u8;
            [scale(r), scale(g), scale(b), a]
        }
    }
}
