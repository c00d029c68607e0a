//! Shared numeric constants for the canvas crate.

// ── View ────────────────────────────────────────────────────────

/// Smallest scale the view may hold.
pub const MIN_SCALE: f64 = 0.1;

/// Largest scale the view may hold.
pub const MAX_SCALE: f64 = 10.0;

/// Multiplicative factor applied by one zoom-in / zoom-out step.
pub const ZOOM_STEP: f64 = 1.1;

/// Zoom-button results are rounded to this granularity.
pub const ZOOM_ROUNDING: f64 = 0.1;

/// Height reserved for toolbar chrome above the page, in screen pixels.
pub const CHROME_ALLOWANCE_PX: f64 = 64.0;

// ── Tools ───────────────────────────────────────────────────────

/// Thinnest pen the toolbar allows, in image pixels.
pub const MIN_PEN_WIDTH: f64 = 1.0;

/// Thickest pen the toolbar allows, in image pixels.
pub const MAX_PEN_WIDTH: f64 = 10.0;

/// Pen width a fresh session starts with.
pub const DEFAULT_PEN_WIDTH: f64 = 3.0;

/// Pen colour a fresh session starts with.
pub const DEFAULT_PEN_COLOR: &str = "#ff0000";

/// Floor for the eraser reach so thin pens still erase comfortably.
pub const MIN_ERASER_RADIUS: f64 = 4.0;

// ── Rendering ───────────────────────────────────────────────────

/// Fill used in place of a page image that failed to load.
pub const PLACEHOLDER_RGBA: [u8; 4] = [0xE0, 0xE0, 0xE0, 0xFF];

/// Viewport background outside the page image.
pub const BACKDROP_RGBA: [u8; 4] = [0x5A, 0x5A, 0x5A, 0xFF];

/// Curve flattening tolerance for round dots, in image pixels.
pub const DOT_TOLERANCE: f64 = 0.1;
