//! The canvas engine: one open page plus everything the active session owns.
//!
//! The engine is the only mutable entry point. Hosts feed it raw pointer
//! events and toolbar commands; it routes them through the
//! [`InputController`], applies the resulting [`Command`]s to the view or the
//! [`StrokeRecorder`], and answers with [`Action`]s describing what changed.
//! Every call runs to completion before the next one, so there is no
//! interleaving between input events.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::CanvasError;
use crate::hit;
use crate::input::{Button, Command, InputController, Mode, ToolSettings, WheelDelta, Zoom};
use crate::layer::{AnnotationLayer, Color, OwnerId, Page, PageId};
use crate::render::{self, LayerVisibility, Scene};
use crate::stroke::{SaveSnapshot, StrokeBuilder, StrokeRecorder};
use crate::view::{Point, Size, ViewConfig, ViewState, ViewTransform};

/// Actions returned from engine calls for the host to process.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    StrokeCommitted { index: usize },
    StrokesErased { count: usize },
    ForegroundCleared { count: usize },
    /// The foreground layer changed and has unsaved edits.
    ForegroundDirty { revision: u64 },
    ViewChanged(ViewState),
    ModeChanged(Mode),
    /// Push this snapshot to the annotation store.
    SaveRequested(SaveSnapshot),
    RenderNeeded,
}

/// Load state of the current page image.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageStatus {
    Loading,
    Ready(Size),
    /// Rendering shows a placeholder and drawing is disabled.
    Failed { reason: String },
}

#[derive(Debug, Clone)]
struct PageContext {
    page_id: PageId,
    page_no: u32,
    image_url: String,
    background: Vec<Arc<AnnotationLayer>>,
}

/// Canvas state for one session. Owns the view and the foreground layer
/// exclusively; background layers are shared read-only.
#[derive(Debug, Clone)]
pub struct Engine {
    view: ViewTransform,
    input: InputController,
    tools: ToolSettings,
    recorder: StrokeRecorder,
    page: Option<PageContext>,
    status: ImageStatus,
    image: Option<Arc<RgbaImage>>,
    visibility: LayerVisibility,
    viewport: Size,
}

impl Engine {
    #[must_use]
    pub fn new(editable: bool, config: ViewConfig) -> Self {
        Self {
            view: ViewTransform::new(config),
            input: InputController::new(editable),
            tools: ToolSettings::default(),
            recorder: StrokeRecorder::new(AnnotationLayer::empty(Uuid::nil())),
            page: None,
            status: ImageStatus::Loading,
            image: None,
            visibility: LayerVisibility::default(),
            viewport: Size::new(0.0, 0.0),
        }
    }

    // --- Page lifecycle ---

    /// Make `page` the active page.
    ///
    /// The view resets to its defaults, the in-progress stroke and layer
    /// visibility are dropped, and the image goes back to `Loading`. If the
    /// previous page had unsaved edits a [`Action::SaveRequested`] for it
    /// comes first.
    pub fn open_page(&mut self, page: Page) -> Vec<Action> {
        let mut actions = Vec::new();
        if let Some(snapshot) = self.dirty_snapshot() {
            actions.push(Action::SaveRequested(snapshot));
        }

        debug!(
            page_id = %page.page_id,
            page_no = page.page_no,
            background = page.background_layers.len(),
            strokes = page.foreground_layer.strokes.len(),
            "page opened"
        );

        self.recorder = StrokeRecorder::new(page.foreground_layer);
        self.page = Some(PageContext {
            page_id: page.page_id,
            page_no: page.page_no,
            image_url: page.image_url,
            background: page.background_layers,
        });
        self.status = ImageStatus::Loading;
        self.image = None;
        self.visibility.show_all();
        self.input.reset_gesture();
        self.view.reset_view();

        actions.push(Action::ViewChanged(self.view.state()));
        actions.push(Action::RenderNeeded);
        actions
    }

    /// The page image finished decoding. Enables drawing and fits the view.
    ///
    /// # Errors
    ///
    /// [`CanvasError::NoPage`] without an open page; [`CanvasError::Resource`]
    /// for an image with no pixels, which also marks the page as failed.
    pub fn image_loaded(&mut self, image: Arc<RgbaImage>) -> Result<Vec<Action>, CanvasError> {
        if self.page.is_none() {
            return Err(CanvasError::NoPage);
        }
        let size = Size::new(f64::from(image.width()), f64::from(image.height()));
        if size.is_empty() {
            let reason = "page image has no pixels".to_owned();
            self.image_failed(&reason);
            return Err(CanvasError::Resource { reason });
        }

        self.status = ImageStatus::Ready(size);
        self.image = Some(image);
        self.recorder.set_bounds(Some(size));

        Ok(self.fit_or_render())
    }

    /// The page image could not be fetched or decoded.
    pub fn image_failed(&mut self, reason: &str) -> Vec<Action> {
        warn!(page_id = ?self.page_id(), reason, "page image failed; drawing disabled");
        self.status = ImageStatus::Failed { reason: reason.to_owned() };
        self.image = None;
        self.recorder.set_bounds(None);
        self.recorder.cancel();
        self.input.reset_gesture();
        vec![Action::RenderNeeded]
    }

    /// The rendering surface was resized. Refits once the image is known.
    pub fn set_viewport(&mut self, width: f64, height: f64) -> Vec<Action> {
        self.viewport = Size::new(width, height);
        self.fit_or_render()
    }

    // --- Toolbar ---

    /// Switch tools. Any stroke in progress is discarded. Leaving an editing
    /// tool with unsaved edits requests a save.
    ///
    /// # Errors
    ///
    /// [`CanvasError::ReadOnly`] for an editing tool on a read-only canvas.
    pub fn select_tool(&mut self, mode: Mode) -> Result<Vec<Action>, CanvasError> {
        let previous = self.input.mode();
        self.input.select(mode)?;
        let dropped = self.recorder.cancel();

        let mut actions = Vec::new();
        if previous != mode {
            debug!(?previous, ?mode, "tool selected");
            actions.push(Action::ModeChanged(mode));
            if previous.is_editing() && !mode.is_editing() {
                if let Some(snapshot) = self.dirty_snapshot() {
                    actions.push(Action::SaveRequested(snapshot));
                }
            }
        }
        if dropped {
            actions.push(Action::RenderNeeded);
        }
        Ok(actions)
    }

    /// Set the pen colour for strokes begun afterwards.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed colour string.
    pub fn set_color(&mut self, raw: &str) -> Result<Color, CanvasError> {
        Ok(self.tools.set_color(raw)?)
    }

    /// Set the pen width for strokes begun afterwards. Returns the clamped width.
    ///
    /// # Errors
    ///
    /// Returns a validation error for NaN.
    pub fn set_width(&mut self, width: f64) -> Result<f64, CanvasError> {
        Ok(self.tools.set_width(width)?)
    }

    pub fn zoom_in(&mut self) -> Vec<Action> {
        self.zoom(Zoom::In)
    }

    pub fn zoom_out(&mut self) -> Vec<Action> {
        self.zoom(Zoom::Out)
    }

    pub fn reset_view(&mut self) -> Vec<Action> {
        self.zoom(Zoom::Reset)
    }

    /// Fit the page into the viewport. Does nothing until both sizes are known.
    pub fn fit_to_viewport(&mut self) -> Vec<Action> {
        self.zoom(Zoom::Fit)
    }

    /// Remove every stroke from the foreground layer.
    ///
    /// # Errors
    ///
    /// [`CanvasError::ReadOnly`] on a read-only canvas, [`CanvasError::NoPage`]
    /// without an open page.
    pub fn clear_all(&mut self) -> Result<Vec<Action>, CanvasError> {
        if !self.input.editable() {
            return Err(CanvasError::ReadOnly);
        }
        if self.page.is_none() {
            return Err(CanvasError::NoPage);
        }
        self.input.reset_gesture();
        let count = self.recorder.clear();
        if count == 0 {
            return Ok(Vec::new());
        }
        debug!(count, "foreground cleared");
        Ok(vec![
            Action::ForegroundCleared { count },
            Action::ForegroundDirty { revision: self.recorder.revision() },
            Action::RenderNeeded,
        ])
    }

    /// Flip a background layer's visibility. Unknown owners are ignored.
    pub fn toggle_layer(&mut self, owner: OwnerId) -> Vec<Action> {
        let known = self.background_layers().iter().any(|l| l.owner_id == owner);
        if !known {
            return Vec::new();
        }
        let visible = self.visibility.toggle(owner);
        debug!(%owner, visible, "background layer toggled");
        vec![Action::RenderNeeded]
    }

    // --- Input events ---

    /// # Errors
    ///
    /// Propagates the failure of the command the event produced. The gesture
    /// is abandoned so later moves of the same drag stay silent.
    pub fn pointer_down(&mut self, screen: Point, button: Button) -> Result<Vec<Action>, CanvasError> {
        let commands = self.input.pointer_down(screen, button, &self.view);
        self.dispatch(commands)
    }

    /// # Errors
    ///
    /// See [`Engine::pointer_down`].
    pub fn pointer_move(&mut self, screen: Point) -> Result<Vec<Action>, CanvasError> {
        let commands = self.input.pointer_move(screen, &self.view);
        self.dispatch(commands)
    }

    /// # Errors
    ///
    /// See [`Engine::pointer_down`].
    pub fn pointer_up(&mut self, button: Button) -> Result<Vec<Action>, CanvasError> {
        let commands = self.input.pointer_up(button);
        self.dispatch(commands)
    }

    pub fn wheel(&mut self, screen: Point, delta: WheelDelta) -> Vec<Action> {
        let mut actions = Vec::new();
        for command in self.input.wheel(screen, delta) {
            if let Command::Zoom(zoom) = command {
                actions.extend(self.zoom(zoom));
            }
        }
        actions
    }

    /// Apply one command. Stroke coordinates are in image space.
    ///
    /// # Errors
    ///
    /// Drawing commands fail with [`CanvasError::ReadOnly`],
    /// [`CanvasError::NoPage`] or [`CanvasError::Resource`] when the page
    /// cannot be drawn on, and with a validation error for a bad point.
    pub fn apply(&mut self, command: Command) -> Result<Vec<Action>, CanvasError> {
        match command {
            Command::BeginStroke(at) => {
                self.require_drawable()?;
                self.recorder.begin(at, self.tools.color(), self.tools.width())?;
                Ok(vec![Action::RenderNeeded])
            }
            Command::AppendPoint(at) => {
                self.require_drawable()?;
                if self.recorder.append(at)? { Ok(vec![Action::RenderNeeded]) } else { Ok(Vec::new()) }
            }
            Command::CommitStroke => {
                self.require_drawable()?;
                let Some(index) = self.recorder.commit()? else {
                    return Ok(Vec::new());
                };
                let revision = self.recorder.revision();
                debug!(index, revision, "stroke committed");
                Ok(vec![
                    Action::StrokeCommitted { index },
                    Action::ForegroundDirty { revision },
                    Action::RenderNeeded,
                ])
            }
            Command::EraseAt(at) => {
                self.require_drawable()?;
                let count = self.recorder.erase_at(at, hit::eraser_radius(self.tools.width()));
                if count == 0 {
                    return Ok(Vec::new());
                }
                let revision = self.recorder.revision();
                debug!(count, revision, "strokes erased");
                Ok(vec![
                    Action::StrokesErased { count },
                    Action::ForegroundDirty { revision },
                    Action::RenderNeeded,
                ])
            }
            Command::Pan { dx, dy } => {
                self.view.pan_by(dx, dy);
                Ok(self.view_changed())
            }
            Command::Zoom(zoom) => Ok(self.zoom(zoom)),
        }
    }

    fn dispatch(&mut self, commands: Vec<Command>) -> Result<Vec<Action>, CanvasError> {
        let mut actions = Vec::new();
        for command in commands {
            match self.apply(command) {
                Ok(more) => actions.extend(more),
                Err(e) => {
                    self.input.reset_gesture();
                    self.recorder.cancel();
                    return Err(e);
                }
            }
        }
        Ok(actions)
    }

    // --- Saving ---

    /// Snapshot the foreground layer for an explicit save.
    ///
    /// # Errors
    ///
    /// [`CanvasError::NoPage`] without an open page.
    pub fn save_snapshot(&self) -> Result<SaveSnapshot, CanvasError> {
        let page = self.page.as_ref().ok_or(CanvasError::NoPage)?;
        Ok(self.recorder.snapshot(page.page_id))
    }

    /// Record a successful save. Snapshots of a page that is no longer open
    /// are ignored. Returns `true` when the foreground is now clean.
    pub fn mark_saved(&mut self, page_id: PageId, revision: u64) -> bool {
        if self.page_id() != Some(page_id) {
            return false;
        }
        self.recorder.mark_saved(revision)
    }

    fn dirty_snapshot(&self) -> Option<SaveSnapshot> {
        let page = self.page.as_ref()?;
        if !self.input.editable() || !self.recorder.is_dirty() {
            return None;
        }
        Some(self.recorder.snapshot(page.page_id))
    }

    // --- Render ---

    /// Composite the current page into a viewport-sized buffer.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn render(&self) -> Result<RgbaImage, CanvasError> {
        let (width, height) = if self.viewport.is_empty() {
            (0, 0)
        } else {
            (self.viewport.width.ceil() as u32, self.viewport.height.ceil() as u32)
        };
        let preview = self.recorder.in_progress().and_then(StrokeBuilder::preview);
        let mut scene = self.scene();
        scene.preview = preview.as_ref();
        render::render(&scene, &self.view, width, height)
    }

    /// The page at native resolution with every visible layer, no preview.
    pub fn render_page(&self) -> Result<RgbaImage, CanvasError> {
        render::render_page(&self.scene())
    }

    fn scene(&self) -> Scene<'_> {
        Scene {
            image: self.image.as_deref(),
            image_size: self.image_size(),
            background: self.background_layers(),
            foreground: self.recorder.layer(),
            preview: None,
            visibility: &self.visibility,
        }
    }

    /// Page size for rendering. A failed image is replaced by a placeholder
    /// filling the viewport below the chrome.
    fn image_size(&self) -> Size {
        match &self.status {
            ImageStatus::Ready(size) => *size,
            ImageStatus::Loading => Size::new(0.0, 0.0),
            ImageStatus::Failed { .. } => {
                let scale = self.view.scale();
                let usable = self.viewport.height - self.view.config().chrome_allowance;
                Size::new(self.viewport.width / scale, usable.max(0.0) / scale)
            }
        }
    }

    // --- Queries ---

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.input.mode()
    }

    #[must_use]
    pub fn editable(&self) -> bool {
        self.input.editable()
    }

    #[must_use]
    pub fn view(&self) -> ViewState {
        self.view.state()
    }

    #[must_use]
    pub fn view_transform(&self) -> &ViewTransform {
        &self.view
    }

    #[must_use]
    pub fn tools(&self) -> ToolSettings {
        self.tools
    }

    #[must_use]
    pub fn image_status(&self) -> &ImageStatus {
        &self.status
    }

    #[must_use]
    pub fn page_id(&self) -> Option<PageId> {
        self.page.as_ref().map(|p| p.page_id)
    }

    #[must_use]
    pub fn page_no(&self) -> Option<u32> {
        self.page.as_ref().map(|p| p.page_no)
    }

    #[must_use]
    pub fn image_url(&self) -> Option<&str> {
        self.page.as_ref().map(|p| p.image_url.as_str())
    }

    #[must_use]
    pub fn foreground(&self) -> &AnnotationLayer {
        self.recorder.layer()
    }

    #[must_use]
    pub fn background_layers(&self) -> &[Arc<AnnotationLayer>] {
        self.page.as_ref().map(|p| p.background.as_slice()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_layer_visible(&self, owner: &OwnerId) -> bool {
        self.visibility.is_visible(owner)
    }

    #[must_use]
    pub fn in_progress(&self) -> Option<&StrokeBuilder> {
        self.recorder.in_progress()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.recorder.is_dirty()
    }

    // --- Internals ---

    fn require_drawable(&self) -> Result<(), CanvasError> {
        if !self.input.editable() {
            return Err(CanvasError::ReadOnly);
        }
        if self.page.is_none() {
            return Err(CanvasError::NoPage);
        }
        match &self.status {
            ImageStatus::Ready(_) => Ok(()),
            ImageStatus::Loading => Err(CanvasError::Resource { reason: "page image is still loading".to_owned() }),
            ImageStatus::Failed { reason } => Err(CanvasError::Resource { reason: reason.clone() }),
        }
    }

    fn zoom(&mut self, zoom: Zoom) -> Vec<Action> {
        match zoom {
            Zoom::In => self.view.zoom_in(),
            Zoom::Out => self.view.zoom_out(),
            Zoom::Reset => self.view.reset_view(),
            Zoom::Anchored { anchor, factor } => self.view.zoom_at(anchor, factor),
            Zoom::Fit => return self.fit(),
        }
        self.view_changed()
    }

    fn fit(&mut self) -> Vec<Action> {
        let ImageStatus::Ready(image) = &self.status else {
            return Vec::new();
        };
        if self.view.fit_to_viewport(self.viewport, *image) {
            self.view_changed()
        } else {
            Vec::new()
        }
    }

    fn fit_or_render(&mut self) -> Vec<Action> {
        let actions = self.fit();
        if actions.is_empty() { vec![Action::RenderNeeded] } else { actions }
    }

    fn view_changed(&self) -> Vec<Action> {
        vec![Action::ViewChanged(self.view.state()), Action::RenderNeeded]
    }
}
