//! Input model: canvas modes, tool settings, and the pointer state machine.
//!
//! Raw pointer events never touch the view or the layer directly. The
//! [`InputController`] translates each event into a small closed set of
//! [`Command`]s according to the active [`Mode`] and the gesture in
//! progress; [`crate::engine::Engine`] applies them. Keeping translation
//! separate makes the state machine testable without a rendering surface.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_PEN_COLOR, DEFAULT_PEN_WIDTH, MAX_PEN_WIDTH, MIN_PEN_WIDTH, ZOOM_STEP};
use crate::error::{CanvasError, ValidationError};
use crate::layer::Color;
use crate::view::{Point, ViewTransform};

/// Which tool the canvas is in. Changes only via explicit selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Pan and zoom; no editing.
    View,
    /// Freehand drawing into the foreground layer.
    Pen,
    /// Whole-stroke removal from the foreground layer.
    Eraser,
}

impl Mode {
    /// Whether this mode edits the foreground layer.
    #[must_use]
    pub fn is_editing(self) -> bool {
        matches!(self, Self::Pen | Self::Eraser)
    }
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    /// Left mouse button (or single-finger touch / pen contact).
    Primary,
    /// Middle mouse button.
    Middle,
    /// Right mouse button.
    Secondary,
}

/// Wheel / trackpad scroll delta.
#[derive(Debug, Clone, Copy)]
pub struct WheelDelta {
    /// Horizontal scroll amount in pixels.
    pub dx: f64,
    /// Vertical scroll amount in pixels (positive = down).
    pub dy: f64,
}

/// Session-scoped pen style. Changes apply to strokes begun afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolSettings {
    color: Color,
    width: f64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        let color = DEFAULT_PEN_COLOR.parse().unwrap_or(Color::rgb(255, 0, 0));
        Self { color, width: DEFAULT_PEN_WIDTH }
    }
}

impl ToolSettings {
    #[must_use]
    pub fn color(&self) -> Color {
        self.color
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Set the pen colour from a hex string.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidColor`] and keeps the old colour.
    pub fn set_color(&mut self, raw: &str) -> Result<Color, ValidationError> {
        self.color = raw.parse()?;
        Ok(self.color)
    }

    /// Set the pen width, clamped to the toolbar range.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidWidth`] for NaN.
    pub fn set_width(&mut self, width: f64) -> Result<f64, ValidationError> {
        if width.is_nan() {
            return Err(ValidationError::InvalidWidth(width));
        }
        self.width = width.clamp(MIN_PEN_WIDTH, MAX_PEN_WIDTH);
        Ok(self.width)
    }
}

/// Zoom requests understood by the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zoom {
    In,
    Out,
    Reset,
    Fit,
    /// Scale by `factor` keeping the screen point `anchor` fixed.
    Anchored { anchor: Point, factor: f64 },
}

/// The closed set of state changes an input event can cause.
///
/// Stroke coordinates are already in image space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    BeginStroke(Point),
    AppendPoint(Point),
    CommitStroke,
    EraseAt(Point),
    Pan { dx: f64, dy: f64 },
    Zoom(Zoom),
}

/// The gesture tracked between pointer-down and pointer-up.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Gesture {
    /// No pointer held.
    #[default]
    Idle,
    /// Dragging the view; carries the previous screen position.
    Panning { last_screen: Point },
    /// Drawing a stroke.
    Drawing,
    /// Sweeping the eraser.
    Erasing,
}

/// Mode state machine. Lives as long as the canvas; there is no terminal state.
#[derive(Debug, Clone)]
pub struct InputController {
    mode: Mode,
    gesture: Gesture,
    editable: bool,
}

impl InputController {
    /// Editable canvases start in `Pen`, read-only ones in `View`.
    #[must_use]
    pub fn new(editable: bool) -> Self {
        let mode = if editable { Mode::Pen } else { Mode::View };
        Self { mode, gesture: Gesture::Idle, editable }
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn gesture(&self) -> Gesture {
        self.gesture
    }

    #[must_use]
    pub fn editable(&self) -> bool {
        self.editable
    }

    /// Switch tools. Any gesture in progress is abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::ReadOnly`] when selecting an editing mode on a
    /// read-only canvas.
    pub fn select(&mut self, mode: Mode) -> Result<(), CanvasError> {
        if mode.is_editing() && !self.editable {
            return Err(CanvasError::ReadOnly);
        }
        self.mode = mode;
        self.gesture = Gesture::Idle;
        Ok(())
    }

    /// Forget the current gesture (page switch, image failure).
    pub fn reset_gesture(&mut self) {
        self.gesture = Gesture::Idle;
    }

    // --- Pointer translation ---

    pub fn pointer_down(&mut self, screen: Point, button: Button, view: &ViewTransform) -> Vec<Command> {
        if button != Button::Primary || !screen.is_finite() {
            return Vec::new();
        }
        let image = view.to_image(screen);
        match self.mode {
            Mode::View => {
                self.gesture = Gesture::Panning { last_screen: screen };
                Vec::new()
            }
            Mode::Pen => {
                self.gesture = Gesture::Drawing;
                vec![Command::BeginStroke(image)]
            }
            Mode::Eraser => {
                self.gesture = Gesture::Erasing;
                vec![Command::EraseAt(image)]
            }
        }
    }

    pub fn pointer_move(&mut self, screen: Point, view: &ViewTransform) -> Vec<Command> {
        if !screen.is_finite() {
            return Vec::new();
        }
        match self.gesture {
            Gesture::Idle => Vec::new(),
            Gesture::Panning { last_screen } => {
                self.gesture = Gesture::Panning { last_screen: screen };
                vec![Command::Pan { dx: screen.x - last_screen.x, dy: screen.y - last_screen.y }]
            }
            Gesture::Drawing => vec![Command::AppendPoint(view.to_image(screen))],
            Gesture::Erasing => vec![Command::EraseAt(view.to_image(screen))],
        }
    }

    pub fn pointer_up(&mut self, button: Button) -> Vec<Command> {
        if button != Button::Primary {
            return Vec::new();
        }
        let gesture = std::mem::take(&mut self.gesture);
        match gesture {
            Gesture::Drawing => vec![Command::CommitStroke],
            Gesture::Idle | Gesture::Panning { .. } | Gesture::Erasing => Vec::new(),
        }
    }

    /// Wheel zoom, anchored at the cursor. Only active in `View` mode.
    pub fn wheel(&self, screen: Point, delta: WheelDelta) -> Vec<Command> {
        if self.mode != Mode::View || !screen.is_finite() || delta.dy == 0.0 || !delta.dy.is_finite() {
            return Vec::new();
        }
        let factor = if delta.dy < 0.0 { ZOOM_STEP } else { 1.0 / ZOOM_STEP };
        vec![Command::Zoom(Zoom::Anchored { anchor: screen, factor })]
    }
}
