//! Error types for the canvas core.
//!
//! Nothing in this crate panics on bad input: malformed strokes come back as
//! [`ValidationError`], an unusable page image as [`CanvasError::Resource`].
//! The host decides how to surface them.

use crate::view::Point;

/// Malformed stroke, point, or style data. The offending stroke is discarded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("stroke has no points")]
    EmptyStroke,
    #[error("point {0:?} is not finite")]
    NonFinite(Point),
    #[error("point {point:?} lies outside the {width}x{height} page")]
    OutOfBounds { point: Point, width: f64, height: f64 },
    #[error("stroke width {0} must be positive and finite")]
    InvalidWidth(f64),
    #[error("invalid colour {0:?}")]
    InvalidColor(String),
    #[error("page number must be positive")]
    PageNumber,
}

/// Errors returned by [`crate::engine::Engine`] operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CanvasError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("page image unavailable: {reason}")]
    Resource { reason: String },
    #[error("canvas is read-only")]
    ReadOnly,
    #[error("no page is open")]
    NoPage,
    #[error("{width}x{height} exceeds the largest drawable surface")]
    SurfaceTooLarge { width: u32, height: u32 },
}
