//! Error types for the export and save boundary.
//!
//! Every failure here is recoverable by the caller: an export error names the
//! page that broke it, a save error leaves the local layer untouched.

use std::time::Duration;

use canvas::{CanvasError, PageId, ValidationError};

/// Fetching or decoding a page image failed.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("decoding page image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("page image not ready after {0:?}")]
    Timeout(Duration),
}

/// Why a single page could not be rasterised.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Raster(#[from] CanvasError),
    #[error("rasteriser stopped: {0}")]
    Render(String),
}

/// Export of one script failed; no document was produced.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("page {page_no} (index {index}) failed: {source}")]
    PageFailed {
        index: usize,
        page_no: u32,
        #[source]
        source: PageError,
    },
    #[error("export cancelled")]
    Cancelled,
    #[error("page number {0} appears more than once")]
    DuplicatePageNo(u32),
    #[error("page at index {0} has page number 0")]
    InvalidPageNo(usize),
    #[error("script has no pages")]
    Empty,
}

impl ExportError {
    /// Supplied index of the failing page, when one page is to blame.
    #[must_use]
    pub fn page_index(&self) -> Option<usize> {
        match self {
            Self::PageFailed { index, .. } | Self::InvalidPageNo(index) => Some(*index),
            Self::Cancelled | Self::DuplicatePageNo(_) | Self::Empty => None,
        }
    }
}

/// Pushing a foreground layer to the annotation store failed.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("save of page {page_id} rejected: {reason}")]
    Rejected { page_id: PageId, reason: String },
    #[error("save transport failed: {0}")]
    Transport(String),
    #[error("page {page_id} stored up to revision {saved_revision}, then a queued save failed: {source}")]
    QueuedFailed {
        page_id: PageId,
        saved_revision: u64,
        #[source]
        source: Box<SaveError>,
    },
}

impl SaveError {
    /// Newest revision that did reach the store before the failure, if any.
    #[must_use]
    pub fn persisted_revision(&self) -> Option<u64> {
        match self {
            Self::QueuedFailed { saved_revision, .. } => Some(*saved_revision),
            Self::Rejected { .. } | Self::Transport(_) => None,
        }
    }
}

/// Writing the assembled document as PDF failed.
#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("pdf: {0}")]
    Lopdf(#[from] lopdf::Error),
    #[error("pdf io: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding page {page_no}: {source}")]
    Encode {
        page_no: u32,
        #[source]
        source: image::ImageError,
    },
    #[error("document has no pages")]
    Empty,
}
