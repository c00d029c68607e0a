//! Asynchronous boundary around the canvas core.
//!
//! The canvas crate is synchronous and does no I/O. This crate supplies what
//! it needs from the outside world and carries its results back out: page
//! images, whole-script export to an ordered multi-page document, and
//! per-page save coordination.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`export`] | [`export::ExportPipeline`]: bounded, order-preserving rasterisation |
//! | [`document`] | The exported [`document::Document`] and its PDF form |
//! | [`source`] | [`source::PageSource`] seam and the HTTP/filesystem implementation |
//! | [`save`] | [`save::SaveQueue`]: one in-flight save per page |
//! | [`config`] | [`config::ExportConfig`] from environment variables |
//! | [`error`] | Export, save, source and PDF errors |

pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod save;
pub mod source;

pub use config::ExportConfig;
pub use document::{Document, DocumentPage};
pub use error::{ExportError, PageError, PdfError, SaveError, SourceError};
pub use export::{CancelToken, ExportPipeline};
pub use save::{AnnotationStore, SaveOutcome, SaveQueue, SaveRequest};
pub use source::{ImageSource, PageSource};
