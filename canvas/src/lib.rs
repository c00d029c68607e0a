//! Annotation canvas core for the paper-grading tool.
//!
//! This crate owns everything that happens on one scanned page while a marker
//! works on it: mapping between screen and image coordinates, translating
//! pointer input into drawing commands, recording the marker's own strokes,
//! and compositing every marker's layer over the page image. It performs no
//! I/O; page images arrive already decoded and saves leave as
//! [`engine::Action::SaveRequested`] snapshots for the host to persist.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Top-level [`engine::Engine`] for one open page |
//! | [`view`] | Pan/zoom state, fit-to-viewport, coordinate conversions |
//! | [`input`] | Modes, tool settings, and the pointer state machine |
//! | [`stroke`] | In-progress stroke buffering and the foreground layer |
//! | [`layer`] | Strokes, layers, pages and their serialised shape |
//! | [`hit`] | Eraser hit-testing against committed strokes |
//! | [`render`] | Deterministic layer compositing into RGBA buffers |
//! | [`error`] | Validation and canvas errors |
//! | [`consts`] | Shared numeric constants (zoom limits, pen widths, colours) |

pub mod consts;
pub mod engine;
pub mod error;
pub mod hit;
pub mod input;
pub mod layer;
pub mod render;
pub mod stroke;
pub mod view;

pub use engine::{Action, Engine, ImageStatus};
pub use error::{CanvasError, ValidationError};
pub use layer::{AnnotationLayer, Color, OwnerId, Page, PageId, PageSupply, Stroke, StrokeTool};
pub use view::{Point, Size, ViewConfig, ViewState};
