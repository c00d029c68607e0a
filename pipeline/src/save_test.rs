use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use canvas::{Color, Point, StrokeTool};
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::*;

/// Store whose pushes wait on a gate and can be told to fail.
struct GatedStore {
    gate: Semaphore,
    fail_calls: Vec<usize>,
    calls: AtomicUsize,
    received: StdMutex<Vec<SaveRequest>>,
}

impl GatedStore {
    fn open() -> Self {
        Self::new(Semaphore::MAX_PERMITS, Vec::new())
    }

    fn new(permits: usize, fail_calls: Vec<usize>) -> Self {
        Self { gate: Semaphore::new(permits), fail_calls, calls: AtomicUsize::new(0), received: StdMutex::new(Vec::new()) }
    }

    fn received(&self) -> Vec<SaveRequest> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnnotationStore for GatedStore {
    async fn save(&self, request: &SaveRequest) -> Result<(), SaveError> {
        self.gate.acquire().await.unwrap().forget();
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().unwrap().push(request.clone());
        if self.fail_calls.contains(&call) {
            return Err(SaveError::Rejected { page_id: request.page_id, reason: "conflict".into() });
        }
        Ok(())
    }
}

fn snapshot(page_id: PageId, revision: u64, stroke_count: usize) -> SaveSnapshot {
    let strokes = (0..stroke_count)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let x = i as f64;
            Stroke::new(vec![Point::new(x, x)], Color::rgb(255, 0, 0), 3.0, StrokeTool::Pen).unwrap()
        })
        .collect();
    SaveSnapshot { page_id, owner_id: Uuid::nil(), revision, strokes }
}

async fn wait_until_saving<T: AnnotationStore + 'static>(queue: &SaveQueue<T>, page_id: PageId) {
    while !queue.is_saving(page_id).await {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn single_save_reports_its_revision() {
    let queue = SaveQueue::new(GatedStore::open());
    let page = Uuid::new_v4();
    let outcome = queue.submit(snapshot(page, 4, 2)).await.unwrap();
    assert_eq!(outcome, SaveOutcome::Saved { page_id: page, revision: 4 });
    assert_eq!(queue.store.received()[0].strokes.len(), 2);
    assert!(!queue.is_saving(page).await);
}

#[tokio::test]
async fn saves_during_flight_are_parked_and_latest_wins() {
    let queue = SaveQueue::new(GatedStore::new(0, Vec::new()));
    let page = Uuid::new_v4();

    let q = queue.clone();
    let first = tokio::spawn(async move { q.submit(snapshot(page, 1, 1)).await });
    wait_until_saving(&queue, page).await;

    assert_eq!(queue.submit(snapshot(page, 2, 2)).await.unwrap(), SaveOutcome::Queued);
    assert_eq!(queue.submit(snapshot(page, 3, 3)).await.unwrap(), SaveOutcome::Queued);

    queue.store.gate.add_permits(2);
    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome, SaveOutcome::Saved { page_id: page, revision: 3 });

    let sent: Vec<usize> = queue.store.received().iter().map(|r| r.strokes.len()).collect();
    assert_eq!(sent, vec![1, 3]);
    assert!(!queue.is_saving(page).await);
}

#[tokio::test]
async fn failure_drops_parked_snapshot_and_frees_the_page() {
    let queue = SaveQueue::new(GatedStore::new(0, vec![0]));
    let page = Uuid::new_v4();

    let q = queue.clone();
    let first = tokio::spawn(async move { q.submit(snapshot(page, 1, 1)).await });
    wait_until_saving(&queue, page).await;
    assert_eq!(queue.submit(snapshot(page, 2, 2)).await.unwrap(), SaveOutcome::Queued);

    queue.store.gate.add_permits(10);
    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(err, SaveError::Rejected { page_id, .. } if page_id == page));
    assert_eq!(queue.store.received().len(), 1);
    assert!(!queue.is_saving(page).await);

    let outcome = queue.submit(snapshot(page, 2, 2)).await.unwrap();
    assert_eq!(outcome, SaveOutcome::Saved { page_id: page, revision: 2 });
}

#[tokio::test]
async fn queued_failure_reports_the_revision_already_stored() {
    let queue = SaveQueue::new(GatedStore::new(0, vec![1]));
    let page = Uuid::new_v4();

    let q = queue.clone();
    let first = tokio::spawn(async move { q.submit(snapshot(page, 1, 1)).await });
    wait_until_saving(&queue, page).await;
    assert_eq!(queue.submit(snapshot(page, 2, 2)).await.unwrap(), SaveOutcome::Queued);

    queue.store.gate.add_permits(10);
    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(
        &err,
        SaveError::QueuedFailed { page_id, saved_revision: 1, source }
            if *page_id == page && matches!(**source, SaveError::Rejected { .. })
    ));
    assert_eq!(err.persisted_revision(), Some(1));
    assert_eq!(queue.store.received().len(), 2);
    assert!(!queue.is_saving(page).await);
}

#[tokio::test]
async fn abandoned_submit_still_finishes_and_frees_the_page() {
    let queue = SaveQueue::new(GatedStore::new(0, Vec::new()));
    let page = Uuid::new_v4();

    let abandoned = tokio::time::timeout(Duration::from_millis(20), queue.submit(snapshot(page, 1, 1))).await;
    assert!(abandoned.is_err());
    assert!(queue.is_saving(page).await);

    queue.store.gate.add_permits(10);
    while queue.is_saving(page).await {
        tokio::task::yield_now().await;
    }
    assert_eq!(queue.store.received().len(), 1);

    let outcome = queue.submit(snapshot(page, 2, 2)).await.unwrap();
    assert_eq!(outcome, SaveOutcome::Saved { page_id: page, revision: 2 });
    let sent: Vec<usize> = queue.store.received().iter().map(|r| r.strokes.len()).collect();
    assert_eq!(sent, vec![1, 2]);
}

#[tokio::test]
async fn pages_save_independently() {
    let queue = SaveQueue::new(GatedStore::new(0, Vec::new()));
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let q = queue.clone();
    let first = tokio::spawn(async move { q.submit(snapshot(a, 1, 1)).await });
    wait_until_saving(&queue, a).await;

    let q = queue.clone();
    let second = tokio::spawn(async move { q.submit(snapshot(b, 1, 1)).await });
    wait_until_saving(&queue, b).await;

    queue.store.gate.add_permits(2);
    assert!(matches!(first.await.unwrap().unwrap(), SaveOutcome::Saved { .. }));
    assert!(matches!(second.await.unwrap().unwrap(), SaveOutcome::Saved { .. }));
}

#[test]
fn request_serialises_in_persisted_shape() {
    let page = Uuid::new_v4();
    let request = SaveRequest::from(&snapshot(page, 9, 1));
    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(json["page_id"], serde_json::json!(page));
    assert_eq!(json["owner_id"], serde_json::json!(Uuid::nil()));
    assert_eq!(json["strokes"][0]["tool"], "pen");
    assert!(json.get("revision").is_none());

    let back: SaveRequest = serde_json::from_value(json).unwrap();
    assert_eq!(back, request);
}
