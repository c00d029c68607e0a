//! Annotation model: strokes, per-owner layers, and pages.
//!
//! Committed [`Stroke`]s are immutable values; the only way to build one is
//! through [`Stroke::new`] (or deserialisation, which runs the same checks),
//! so an empty or non-finite stroke can never reach a layer. Background
//! layers are shared behind [`Arc`] and never handed out mutably.
//!
//! The serde shapes here are the ones exchanged with the annotation store
//! and the export manifests.

#[cfg(test)]
#[path = "layer_test.rs"]
mod layer_test;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::view::{Point, Size};

/// Identity of the marker who owns a layer.
pub type OwnerId = Uuid;

/// Identity of a scanned page.
pub type PageId = Uuid;

// =============================================================
// Colour
// =============================================================

/// Straight (non-premultiplied) RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    #[must_use]
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: u8::MAX }
    }

    #[must_use]
    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl FromStr for Color {
    type Err = ValidationError;

    /// Accepts `#rgb`, `#rrggbb`, and `#rrggbbaa`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidColor(raw.to_owned());
        let hex = raw.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let byte = |at: usize, len: usize| u8::from_str_radix(&hex[at..at + len], 16).map_err(|_| invalid());

        match hex.len() {
            3 => Ok(Self::rgb(byte(0, 1)? * 17, byte(1, 1)? * 17, byte(2, 1)? * 17)),
            6 => Ok(Self::rgb(byte(0, 2)?, byte(2, 2)?, byte(4, 2)?)),
            8 => Ok(Self { r: byte(0, 2)?, g: byte(2, 2)?, b: byte(4, 2)?, a: byte(6, 2)? }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.a != u8::MAX {
            write!(f, "{:02x}", self.a)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Color {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

// =============================================================
// Stroke
// =============================================================

/// How a stroke combines with the strokes beneath it in its own layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeTool {
    /// Paints its colour over the layer.
    #[default]
    Pen,
    /// Clears the layer's pixels along its path.
    Eraser,
}

/// One committed freehand path in image-space coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StrokeData")]
pub struct Stroke {
    points: Vec<Point>,
    color: Color,
    width: f64,
    tool: StrokeTool,
}

#[derive(Deserialize)]
struct StrokeData {
    points: Vec<Point>,
    color: Color,
    width: f64,
    #[serde(default)]
    tool: StrokeTool,
}

impl TryFrom<StrokeData> for Stroke {
    type Error = ValidationError;

    fn try_from(data: StrokeData) -> Result<Self, Self::Error> {
        Self::new(data.points, data.color, data.width, data.tool)
    }
}

impl Stroke {
    /// Build a stroke, rejecting empty paths, non-finite points, and
    /// non-positive widths.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn new(points: Vec<Point>, color: Color, width: f64, tool: StrokeTool) -> Result<Self, ValidationError> {
        if points.is_empty() {
            return Err(ValidationError::EmptyStroke);
        }
        if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
            return Err(ValidationError::NonFinite(*bad));
        }
        if !width.is_finite() || width <= 0.0 {
            return Err(ValidationError::InvalidWidth(width));
        }
        Ok(Self { points, color, width, tool })
    }

    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    #[must_use]
    pub fn color(&self) -> Color {
        self.color
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }

    #[must_use]
    pub fn tool(&self) -> StrokeTool {
        self.tool
    }

    /// A single-point stroke, drawn as a dot.
    #[must_use]
    pub fn is_dot(&self) -> bool {
        self.points.len() == 1
    }

    /// Check every point against the owning page's image size.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::OutOfBounds`] for the first point outside.
    pub fn check_bounds(&self, page: Size) -> Result<(), ValidationError> {
        match self.points.iter().find(|p| !page.contains(**p)) {
            Some(point) => Err(ValidationError::OutOfBounds { point: *point, width: page.width, height: page.height }),
            None => Ok(()),
        }
    }

    /// Axis-aligned bounds of the path as `(min, max)`, not including width.
    #[must_use]
    pub fn bounds(&self) -> (Point, Point) {
        let first = self.points[0];
        self.points.iter().fold((first, first), |(min, max), p| {
            (Point::new(min.x.min(p.x), min.y.min(p.y)), Point::new(max.x.max(p.x), max.y.max(p.y)))
        })
    }
}

// =============================================================
// Layers and pages
// =============================================================

/// All strokes one marker contributed to one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationLayer {
    pub owner_id: OwnerId,
    /// Submission time in milliseconds; background layers render in this order.
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub strokes: Vec<Stroke>,
}

impl AnnotationLayer {
    #[must_use]
    pub fn empty(owner_id: OwnerId) -> Self {
        Self { owner_id, created_at: 0, strokes: Vec::new() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }
}

/// A page as supplied by the annotation store, before it is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSupply {
    pub page_id: PageId,
    pub page_no: u32,
    pub image_url: String,
    #[serde(default)]
    pub layers: Vec<AnnotationLayer>,
}

impl PageSupply {
    /// Split the supplied layers into the session's foreground layer and the
    /// read-only background layers.
    ///
    /// With `owner = None` (exporting, or a viewer with no layer of its own)
    /// every supplied layer is background and the foreground is empty.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::PageNumber`] when `page_no` is zero.
    pub fn open(self, owner: Option<OwnerId>) -> Result<Page, ValidationError> {
        if self.page_no == 0 {
            return Err(ValidationError::PageNumber);
        }

        let mut foreground = None;
        let mut background = Vec::with_capacity(self.layers.len());
        for layer in self.layers {
            if foreground.is_none() && owner == Some(layer.owner_id) {
                foreground = Some(layer);
            } else {
                background.push(Arc::new(layer));
            }
        }

        let foreground_layer = foreground.unwrap_or_else(|| AnnotationLayer::empty(owner.unwrap_or_default()));
        Ok(Page {
            page_id: self.page_id,
            page_no: self.page_no,
            image_url: self.image_url,
            background_layers: background,
            foreground_layer,
        })
    }
}

/// An opened page: immutable image reference, shared background layers, and
/// the one layer the active session may edit.
#[derive(Debug, Clone)]
pub struct Page {
    pub page_id: PageId,
    /// 1-based position within the script; defines export order.
    pub page_no: u32,
    pub image_url: String,
    pub background_layers: Vec<Arc<AnnotationLayer>>,
    pub foreground_layer: AnnotationLayer,
}
