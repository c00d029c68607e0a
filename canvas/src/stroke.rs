//! Stroke recording: the in-progress builder and the committed foreground layer.
//!
//! DESIGN
//! ======
//! The in-progress stroke lives in a [`StrokeBuilder`] that is never visible
//! through [`StrokeRecorder::layer`]. `commit` validates the whole path and
//! promotes it in a single push, so the committed sequence only ever holds
//! complete strokes. The committed sequence is append-only apart from
//! eraser removal and clear-all.
//!
//! Every mutation bumps a revision counter. Saves snapshot the strokes
//! together with the revision they were taken at; `mark_saved` only clears
//! the dirty flag when nothing changed after the snapshot, so edits made
//! while a save is in flight stay dirty for the next one.

#[cfg(test)]
#[path = "stroke_test.rs"]
mod stroke_test;

use serde::Serialize;

use crate::error::ValidationError;
use crate::hit;
use crate::layer::{AnnotationLayer, Color, OwnerId, PageId, Stroke, StrokeTool};
use crate::view::{Point, Size};

/// Mutable buffer for the stroke under the pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeBuilder {
    points: Vec<Point>,
    color: Color,
    width: f64,
}

impl StrokeBuilder {
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

    /// The builder's current path as a stroke, for preview rendering.
    #[must_use]
    pub fn preview(&self) -> Option<Stroke> {
        match Stroke::new(self.points.clone(), self.color, self.width, StrokeTool::Pen) {
            Ok(stroke) => Some(stroke),
            Err(_) => None,
        }
    }
}

/// Foreground strokes captured for a save, tagged with the revision they
/// were taken at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveSnapshot {
    pub page_id: PageId,
    pub owner_id: OwnerId,
    #[serde(skip)]
    pub revision: u64,
    pub strokes: Vec<Stroke>,
}

/// Owns the foreground layer and the stroke being drawn into it.
#[derive(Debug, Clone)]
pub struct StrokeRecorder {
    layer: AnnotationLayer,
    in_progress: Option<StrokeBuilder>,
    bounds: Option<Size>,
    revision: u64,
    saved_revision: u64,
}

impl StrokeRecorder {
    /// Wrap a (possibly empty) foreground layer. The layer starts clean.
    #[must_use]
    pub fn new(layer: AnnotationLayer) -> Self {
        Self { layer, in_progress: None, bounds: None, revision: 0, saved_revision: 0 }
    }

    #[must_use]
    pub fn layer(&self) -> &AnnotationLayer {
        &self.layer
    }

    #[must_use]
    pub fn strokes(&self) -> &[Stroke] {
        &self.layer.strokes
    }

    #[must_use]
    pub fn in_progress(&self) -> Option<&StrokeBuilder> {
        self.in_progress.as_ref()
    }

    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.in_progress.is_some()
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    /// Page image size used to bound incoming points. `None` disables the
    /// bounds check.
    pub fn set_bounds(&mut self, bounds: Option<Size>) {
        self.bounds = bounds;
    }

    // --- Drawing ---

    /// Start a new stroke at `start`. Any unfinished stroke is dropped.
    ///
    /// # Errors
    ///
    /// Rejects a non-finite or out-of-bounds start point, or a bad width.
    pub fn begin(&mut self, start: Point, color: Color, width: f64) -> Result<(), ValidationError> {
        self.in_progress = None;
        if !width.is_finite() || width <= 0.0 {
            return Err(ValidationError::InvalidWidth(width));
        }
        self.check_point(start)?;
        self.in_progress = Some(StrokeBuilder { points: vec![start], color, width });
        Ok(())
    }

    /// Append a sampled point to the in-progress stroke.
    ///
    /// Returns `Ok(false)` when no stroke is in progress or the point repeats
    /// the previous sample.
    ///
    /// # Errors
    ///
    /// An invalid point discards the whole in-progress stroke.
    pub fn append(&mut self, point: Point) -> Result<bool, ValidationError> {
        if self.in_progress.is_none() {
            return Ok(false);
        }
        if let Err(e) = self.check_point(point) {
            self.in_progress = None;
            return Err(e);
        }
        let Some(builder) = self.in_progress.as_mut() else {
            return Ok(false);
        };
        if builder.points.last() == Some(&point) {
            return Ok(false);
        }
        builder.points.push(point);
        Ok(true)
    }

    /// Promote the in-progress stroke into the layer.
    ///
    /// Returns the committed stroke's index, or `None` when nothing was being
    /// drawn. A one-point tap commits as a dot.
    ///
    /// # Errors
    ///
    /// Returns the validation failure; the stroke is discarded either way.
    pub fn commit(&mut self) -> Result<Option<usize>, ValidationError> {
        let Some(builder) = self.in_progress.take() else {
            return Ok(None);
        };
        let stroke = Stroke::new(builder.points, builder.color, builder.width, StrokeTool::Pen)?;
        if let Some(bounds) = self.bounds {
            stroke.check_bounds(bounds)?;
        }
        self.layer.strokes.push(stroke);
        self.touch();
        Ok(Some(self.layer.strokes.len() - 1))
    }

    /// Drop the in-progress stroke without committing it.
    pub fn cancel(&mut self) -> bool {
        self.in_progress.take().is_some()
    }

    // --- Removal ---

    /// Remove every committed stroke the eraser at `point` touches.
    /// Strokes are removed whole. Returns how many were removed.
    pub fn erase_at(&mut self, point: Point, radius: f64) -> usize {
        if !point.is_finite() {
            return 0;
        }
        let before = self.layer.strokes.len();
        self.layer.strokes.retain(|s| !hit::stroke_hit(point, s, radius));
        let removed = before - self.layer.strokes.len();
        if removed > 0 {
            self.touch();
        }
        removed
    }

    /// Remove every committed stroke. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        self.in_progress = None;
        let removed = self.layer.strokes.len();
        if removed > 0 {
            self.layer.strokes.clear();
            self.touch();
        }
        removed
    }

    // --- Saving ---

    /// Snapshot the committed strokes for a save.
    #[must_use]
    pub fn snapshot(&self, page_id: PageId) -> SaveSnapshot {
        SaveSnapshot {
            page_id,
            owner_id: self.layer.owner_id,
            revision: self.revision,
            strokes: self.layer.strokes.clone(),
        }
    }

    /// Record that the snapshot taken at `revision` was persisted.
    ///
    /// Returns `true` if the layer is now clean.
    pub fn mark_saved(&mut self, revision: u64) -> bool {
        if revision > self.saved_revision && revision <= self.revision {
            self.saved_revision = revision;
        }
        !self.is_dirty()
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn check_point(&self, point: Point) -> Result<(), ValidationError> {
        if !point.is_finite() {
            return Err(ValidationError::NonFinite(point));
        }
        match self.bounds {
            Some(bounds) if !bounds.contains(point) => {
                Err(ValidationError::OutOfBounds { point, width: bounds.width, height: bounds.height })
            }
            _ => Ok(()),
        }
    }
}
