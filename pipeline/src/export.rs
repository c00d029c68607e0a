//! Order-preserving multi-page export.
//!
//! DESIGN
//! ======
//! Every page becomes its own task: fetch the image through the
//! [`PageSource`], then composite all its layers at native resolution on the
//! blocking pool. A semaphore caps how many tasks hold a permit at once.
//! Results are collected into slots keyed by the page's supplied index as
//! they finish, in whatever order that is, and the document is assembled
//! from the slots by ascending `page_no` only after every task succeeded.
//!
//! FAILURE AND CANCELLATION
//! ========================
//! The first failed page ends the export: outstanding tasks are aborted and
//! finished rasters are dropped with the slots. Cancellation behaves the same
//! but reports [`ExportError::Cancelled`]. Nothing outlives one `export`
//! call, so the same pipeline can run the next script immediately.

#[cfg(test)]
#[path = "export_test.rs"]
mod export_test;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use canvas::render::{self, LayerVisibility, Scene};
use canvas::{PageSupply, Size};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::sync::{Semaphore, watch};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::config::ExportConfig;
use crate::document::{Document, DocumentPage};
use crate::error::{ExportError, PageError};
use crate::source::PageSource;

/// Cooperative cancellation signal shared between an export and its caller.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Aborts every task it tracks when dropped.
#[derive(Default)]
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Rasterises scripts page by page and assembles them into [`Document`]s.
#[derive(Debug)]
pub struct ExportPipeline<S> {
    source: Arc<S>,
    config: ExportConfig,
}

impl<S: PageSource + 'static> ExportPipeline<S> {
    #[must_use]
    pub fn new(source: S, config: ExportConfig) -> Self {
        Self { source: Arc::new(source), config }
    }

    #[must_use]
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export one script.
    ///
    /// `pages` may arrive in any order; the document is ordered by `page_no`.
    /// Every supplied layer is drawn; there is no foreground for an export.
    ///
    /// # Errors
    ///
    /// [`ExportError::PageFailed`] names the first page that failed, by its
    /// index in `pages` and its page number. [`ExportError::Cancelled`] when
    /// `cancel` fires first. Page-number problems are reported before any
    /// work starts.
    pub async fn export(&self, pages: Vec<PageSupply>, cancel: &CancelToken) -> Result<Document, ExportError> {
        let order = plan(&pages)?;
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        let started = Instant::now();
        let total = pages.len();
        let page_nos: Vec<u32> = pages.iter().map(|p| p.page_no).collect();
        info!(pages = total, max_concurrency = self.config.max_concurrency, "export started");

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut guard = AbortOnDrop::default();
        let mut pending = FuturesUnordered::new();

        for (index, supply) in pages.into_iter().enumerate() {
            let page_no = supply.page_no;
            let source = Arc::clone(&self.source);
            let semaphore = Arc::clone(&semaphore);
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|e| PageError::Render(e.to_string()))?;
                rasterize(source.as_ref(), supply).await
            });
            guard.0.push(handle.abort_handle());
            pending.push(async move { (index, page_no, handle.await) });
        }

        let mut slots: Vec<Option<DocumentPage>> = (0..total).map(|_| None).collect();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    warn!(elapsed_ms = elapsed_ms(started), "export cancelled");
                    return Err(ExportError::Cancelled);
                }
                next = pending.next() => match next {
                    None => break,
                    Some((index, page_no, Ok(Ok(page)))) => {
                        debug!(index, page_no, "page rasterised");
                        slots[index] = Some(page);
                    }
                    Some((index, page_no, Ok(Err(source)))) => {
                        warn!(index, page_no, error = %source, "page failed; export aborted");
                        return Err(ExportError::PageFailed { index, page_no, source });
                    }
                    Some((index, page_no, Err(join))) => {
                        warn!(index, page_no, error = %join, "page task died; export aborted");
                        return Err(ExportError::PageFailed { index, page_no, source: PageError::Render(join.to_string()) });
                    }
                },
            }
        }

        let mut document = Document { pages: Vec::with_capacity(total) };
        for index in order {
            let page = slots[index].take().ok_or_else(|| ExportError::PageFailed {
                index,
                page_no: page_nos[index],
                source: PageError::Render("raster missing after completion".to_owned()),
            })?;
            document.pages.push(page);
        }

        info!(pages = document.len(), elapsed_ms = elapsed_ms(started), "export finished");
        Ok(document)
    }
}

/// Validate page numbers and return supplied indices in ascending `page_no`.
fn plan(pages: &[PageSupply]) -> Result<Vec<usize>, ExportError> {
    if pages.is_empty() {
        return Err(ExportError::Empty);
    }
    let mut seen = HashSet::with_capacity(pages.len());
    for (index, page) in pages.iter().enumerate() {
        if page.page_no == 0 {
            return Err(ExportError::InvalidPageNo(index));
        }
        if !seen.insert(page.page_no) {
            return Err(ExportError::DuplicatePageNo(page.page_no));
        }
    }
    let mut order: Vec<usize> = (0..pages.len()).collect();
    order.sort_by_key(|&i| pages[i].page_no);
    Ok(order)
}

/// Fetch one page image and composite every layer over it.
async fn rasterize<S: PageSource + ?Sized>(source: &S, supply: PageSupply) -> Result<DocumentPage, PageError> {
    let page = supply.open(None)?;
    let image = source.fetch(&page.image_url).await?;

    let page_no = page.page_no;
    let raster = tokio::task::spawn_blocking(move || {
        let visibility = LayerVisibility::default();
        let scene = Scene {
            image: Some(&image),
            image_size: Size::new(f64::from(image.width()), f64::from(image.height())),
            background: &page.background_layers,
            foreground: &page.foreground_layer,
            preview: None,
            visibility: &visibility,
        };
        render::render_page(&scene)
    })
    .await
    .map_err(|e| PageError::Render(e.to_string()))??;

    Ok(DocumentPage { page_no, raster })
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
