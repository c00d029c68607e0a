use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use canvas::{AnnotationLayer, Color, Point, Stroke, StrokeTool};
use image::{Rgba, RgbaImage};
use uuid::Uuid;

use super::*;
use crate::error::SourceError;

// =============================================================
// Helpers
// =============================================================

#[derive(Clone, Copy)]
struct Plan {
    delay_ms: u64,
    size: (u32, u32),
    fail: bool,
}

impl Default for Plan {
    fn default() -> Self {
        Self { delay_ms: 0, size: (8, 8), fail: false }
    }
}

/// In-memory page source with per-image delay, size and failure.
#[derive(Default)]
struct FakeSource {
    plans: HashMap<String, Plan>,
    completed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeSource {
    fn with(mut self, url: &str, plan: Plan) -> Self {
        self.plans.insert(url.to_owned(), plan);
        self
    }
}

#[async_trait]
impl PageSource for FakeSource {
    async fn fetch(&self, image_url: &str) -> Result<RgbaImage, SourceError> {
        let plan = self.plans.get(image_url).copied().unwrap_or_default();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(plan.delay_ms)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.lock().unwrap().push(image_url.to_owned());

        if plan.fail {
            return Err(SourceError::Io {
                path: image_url.to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            });
        }
        Ok(RgbaImage::from_pixel(plan.size.0, plan.size.1, Rgba([255, 255, 255, 255])))
    }
}

fn supply(page_no: u32) -> PageSupply {
    PageSupply { page_id: Uuid::new_v4(), page_no, image_url: format!("p{page_no}"), layers: Vec::new() }
}

fn pipeline(source: FakeSource, max_concurrency: usize) -> ExportPipeline<FakeSource> {
    ExportPipeline::new(source, ExportConfig::default().with_max_concurrency(max_concurrency))
}

fn delayed(ms: u64) -> Plan {
    Plan { delay_ms: ms, ..Plan::default() }
}

// =============================================================
// Ordering
// =============================================================

#[tokio::test]
async fn reverse_completion_still_yields_ascending_pages() {
    let source = FakeSource::default().with("p1", delayed(120)).with("p2", delayed(60)).with("p3", delayed(0));
    let pipeline = pipeline(source, 4);

    let doc = pipeline.export(vec![supply(1), supply(2), supply(3)], &CancelToken::new()).await.unwrap();

    assert_eq!(doc.page_numbers(), vec![1, 2, 3]);
    let completed = pipeline.source.completed.lock().unwrap().clone();
    assert_eq!(completed, vec!["p3", "p2", "p1"]);
}

#[tokio::test]
async fn supplied_order_does_not_matter() {
    let pipeline = pipeline(FakeSource::default(), 2);
    let doc = pipeline.export(vec![supply(3), supply(1), supply(2)], &CancelToken::new()).await.unwrap();
    assert_eq!(doc.page_numbers(), vec![1, 2, 3]);
}

#[tokio::test]
async fn each_page_keeps_its_raster_size() {
    let source = FakeSource::default()
        .with("p1", Plan { size: (30, 40), ..Plan::default() })
        .with("p2", Plan { size: (50, 20), ..Plan::default() });
    let doc = pipeline(source, 4).export(vec![supply(2), supply(1)], &CancelToken::new()).await.unwrap();
    assert_eq!(doc.pages[0].raster.dimensions(), (30, 40));
    assert_eq!(doc.pages[1].raster.dimensions(), (50, 20));
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let mut source = FakeSource::default();
    for n in 1..=6 {
        source = source.with(&format!("p{n}"), delayed(20));
    }
    let pipeline = pipeline(source, 2);
    let pages = (1..=6).map(supply).collect();
    pipeline.export(pages, &CancelToken::new()).await.unwrap();
    assert!(pipeline.source.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn layers_are_composited_into_the_raster() {
    let stroke = Stroke::new(
        vec![Point::new(0.0, 4.0), Point::new(8.0, 4.0)],
        Color::rgb(0, 0, 255),
        2.0,
        StrokeTool::Pen,
    )
    .unwrap();
    let mut page = supply(1);
    page.layers.push(AnnotationLayer { owner_id: Uuid::new_v4(), created_at: 1, strokes: vec![stroke] });

    let doc = pipeline(FakeSource::default(), 1).export(vec![page], &CancelToken::new()).await.unwrap();
    let raster = &doc.pages[0].raster;
    assert_eq!(raster.get_pixel(4, 4).0, [0, 0, 255, 255]);
    assert_eq!(raster.get_pixel(4, 0).0, [255, 255, 255, 255]);
}

// =============================================================
// Failure
// =============================================================

#[tokio::test]
async fn failing_page_aborts_whole_export() {
    let source = FakeSource::default()
        .with("p1", delayed(10))
        .with("p2", Plan { delay_ms: 20, fail: true, ..Plan::default() })
        .with("p3", delayed(0));
    let err = pipeline(source, 4).export(vec![supply(1), supply(2), supply(3)], &CancelToken::new()).await.unwrap_err();

    let ExportError::PageFailed { index, page_no, source } = err else {
        panic!("expected page failure, got {err:?}");
    };
    assert_eq!(index, 1);
    assert_eq!(page_no, 2);
    assert!(matches!(source, PageError::Source(SourceError::Io { .. })));
}

#[tokio::test]
async fn failure_reports_supplied_index() {
    let source = FakeSource::default().with("p2", Plan { fail: true, ..Plan::default() });
    let err = pipeline(source, 4).export(vec![supply(3), supply(2), supply(1)], &CancelToken::new()).await.unwrap_err();
    assert_eq!(err.page_index(), Some(1));
}

#[tokio::test]
async fn page_number_problems_are_caught_up_front() {
    let pipeline = pipeline(FakeSource::default(), 4);
    let cancel = CancelToken::new();

    assert!(matches!(pipeline.export(Vec::new(), &cancel).await, Err(ExportError::Empty)));
    assert!(matches!(
        pipeline.export(vec![supply(1), supply(2), supply(1)], &cancel).await,
        Err(ExportError::DuplicatePageNo(1))
    ));
    assert!(matches!(pipeline.export(vec![supply(1), supply(0)], &cancel).await, Err(ExportError::InvalidPageNo(1))));
    assert!(pipeline.source.completed.lock().unwrap().is_empty());
}

// =============================================================
// Cancellation and reuse
// =============================================================

#[tokio::test]
async fn cancellation_is_reported_distinctly() {
    let source = FakeSource::default().with("p1", delayed(2_000)).with("p2", delayed(2_000));
    let pipeline = pipeline(source, 2);
    let cancel = CancelToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = pipeline.export(vec![supply(1), supply(2)], &cancel).await.unwrap_err();
    assert!(matches!(err, ExportError::Cancelled));
    assert!(started.elapsed() < Duration::from_millis(1_500));
}

#[tokio::test]
async fn cancelled_token_never_starts_work() {
    let pipeline = pipeline(FakeSource::default(), 2);
    let cancel = CancelToken::new();
    cancel.cancel();
    assert!(cancel.is_cancelled());
    assert!(matches!(pipeline.export(vec![supply(1)], &cancel).await, Err(ExportError::Cancelled)));
    assert!(pipeline.source.completed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn pipeline_is_reusable_after_failure() {
    let source = FakeSource::default().with("p9", Plan { fail: true, ..Plan::default() });
    let pipeline = pipeline(source, 2);
    let cancel = CancelToken::new();

    assert!(pipeline.export(vec![supply(9)], &cancel).await.is_err());
    let first = pipeline.export(vec![supply(1), supply(2)], &cancel).await.unwrap();
    let second = pipeline.export(vec![supply(2), supply(1)], &cancel).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(second.len(), 2);
}
