//! View transform: pan/zoom state and screen ↔ image coordinate mapping.
//!
//! Image space is the pixel grid of the scanned page; every stored stroke
//! point lives there. Screen space is the CSS-pixel grid of the rendering
//! surface. The mapping is a uniform scale followed by a translation, so the
//! two conversions are exact inverses up to floating-point rounding.

#[cfg(test)]
#[path = "view_test.rs"]
mod view_test;

use serde::{Deserialize, Serialize};

use crate::consts::{CHROME_ALLOWANCE_PX, MAX_SCALE, MIN_SCALE, ZOOM_ROUNDING, ZOOM_STEP};

/// A point in either screen or image space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Both coordinates are finite numbers.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Width and height of a surface or image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero, negative, or not finite.
    #[must_use]
    pub fn is_empty(self) -> bool {
        !(self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0)
    }

    /// Whether `p` lies on or inside the `[0, width] x [0, height]` rectangle.
    #[must_use]
    pub fn contains(self, p: Point) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x <= self.width && p.y <= self.height
    }
}

/// Session-local pan/zoom state.
///
/// `scale` always lies in `[MIN_SCALE, MAX_SCALE]`. `offset` is the screen
/// position of the image origin and is deliberately unconstrained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub scale: f64,
    pub offset: Point,
}

/// Page-level defaults and the toolbar allowance used by fit-to-viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewConfig {
    /// Screen pixels reserved at the top for toolbar chrome.
    pub chrome_allowance: f64,
    /// Scale restored by [`ViewTransform::reset_view`].
    pub default_scale: f64,
    /// Offset restored by [`ViewTransform::reset_view`].
    pub default_offset: Point,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            chrome_allowance: CHROME_ALLOWANCE_PX,
            default_scale: 1.0,
            default_offset: Point::new(0.0, CHROME_ALLOWANCE_PX),
        }
    }
}

impl ViewConfig {
    #[must_use]
    pub fn default_state(&self) -> ViewState {
        ViewState { scale: clamp_scale(self.default_scale), offset: self.default_offset }
    }
}

/// Owns the [`ViewState`] for one canvas and every transition on it.
#[derive(Debug, Clone)]
pub struct ViewTransform {
    state: ViewState,
    config: ViewConfig,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::new(ViewConfig::default())
    }
}

impl ViewTransform {
    #[must_use]
    pub fn new(config: ViewConfig) -> Self {
        Self { state: config.default_state(), config }
    }

    #[must_use]
    pub fn state(&self) -> ViewState {
        self.state
    }

    #[must_use]
    pub fn scale(&self) -> f64 {
        self.state.scale
    }

    #[must_use]
    pub fn offset(&self) -> Point {
        self.state.offset
    }

    #[must_use]
    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    // --- Coordinate mapping ---

    /// Convert an image-space point to screen coordinates.
    #[must_use]
    pub fn to_screen(&self, image: Point) -> Point {
        Point {
            x: image.x * self.state.scale + self.state.offset.x,
            y: image.y * self.state.scale + self.state.offset.y,
        }
    }

    /// Convert a screen-space point to image coordinates.
    #[must_use]
    pub fn to_image(&self, screen: Point) -> Point {
        Point {
            x: (screen.x - self.state.offset.x) / self.state.scale,
            y: (screen.y - self.state.offset.y) / self.state.scale,
        }
    }

    // --- Transitions ---

    /// Store a new view. The scale is clamped; the offset is kept as given.
    ///
    /// Non-finite inputs are ignored component-wise so a bad gesture sample
    /// can never poison the transform.
    pub fn set_view(&mut self, offset: Point, raw_scale: f64) {
        if offset.is_finite() {
            self.state.offset = offset;
        }
        if !raw_scale.is_nan() {
            self.state.scale = clamp_scale(raw_scale);
        }
    }

    /// Shift the offset by a screen-space delta.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        let offset = Point::new(self.state.offset.x + dx, self.state.offset.y + dy);
        self.set_view(offset, self.state.scale);
    }

    /// One toolbar zoom-in step: scale × 1.1, rounded to 0.1, clamped.
    ///
    /// Below 0.5 the rounding would swallow the step entirely, so a step that
    /// rounds back to the current scale advances by one rounding unit instead.
    pub fn zoom_in(&mut self) {
        let current = self.state.scale;
        let mut next = round_to_step(current * ZOOM_STEP);
        if next <= current {
            next = round_to_step(current + ZOOM_ROUNDING);
        }
        self.state.scale = clamp_scale(next);
    }

    /// One toolbar zoom-out step: scale ÷ 1.1, rounded to 0.1, clamped.
    pub fn zoom_out(&mut self) {
        let current = self.state.scale;
        let mut next = round_to_step(current / ZOOM_STEP);
        if next >= current {
            next = round_to_step(current - ZOOM_ROUNDING);
        }
        self.state.scale = clamp_scale(next);
    }

    /// Multiply the scale by `factor`, keeping the image point under the
    /// screen-space `anchor` fixed.
    pub fn zoom_at(&mut self, anchor: Point, factor: f64) {
        if !anchor.is_finite() || !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let pinned = self.to_image(anchor);
        let scale = clamp_scale(self.state.scale * factor);
        let offset = Point::new(anchor.x - pinned.x * scale, anchor.y - pinned.y * scale);
        self.set_view(offset, scale);
    }

    /// "Contain" fit of `image` inside `container`, below the toolbar chrome.
    ///
    /// Returns `false` (and leaves the view untouched) while either size is
    /// still unknown or the container has no room below the chrome.
    pub fn fit_to_viewport(&mut self, container: Size, image: Size) -> bool {
        if container.is_empty() || image.is_empty() {
            return false;
        }
        let chrome = self.config.chrome_allowance;
        let usable_height = container.height - chrome;
        if usable_height <= 0.0 {
            return false;
        }

        let scale_by_width = container.width / image.width;
        let scale_by_height = usable_height / image.height;

        if scale_by_width < scale_by_height {
            let scale = clamp_scale(scale_by_width);
            let displayed_height = scale * image.height;
            self.state = ViewState { scale, offset: Point::new(0.0, chrome + (usable_height - displayed_height) / 2.0) };
        } else {
            let scale = clamp_scale(scale_by_height);
            let displayed_width = scale * image.width;
            self.state = ViewState { scale, offset: Point::new((container.width - displayed_width) / 2.0, chrome) };
        }
        true
    }

    /// Restore the page defaults.
    pub fn reset_view(&mut self) {
        self.state = self.config.default_state();
    }
}

/// Clamp a raw scale into the allowed range.
#[must_use]
pub fn clamp_scale(raw: f64) -> f64 {
    raw.clamp(MIN_SCALE, MAX_SCALE)
}

fn round_to_step(value: f64) -> f64 {
    let steps = (1.0 / ZOOM_ROUNDING).round();
    (value * steps).round() / steps
}
