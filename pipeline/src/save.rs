//! Save coordination between the canvas and the annotation store.
//!
//! DESIGN
//! ======
//! At most one save is in flight per page. A snapshot submitted while its
//! page is already saving is parked instead of sent; a newer one replaces it,
//! since each snapshot carries the whole layer. When the in-flight push
//! succeeds the parked snapshot goes out next, on the same call. When it
//! fails, the parked snapshot is dropped and the error goes back to the
//! caller, whose retry will carry the full layer again. There is no
//! automatic retry.
//!
//! The pushes run on a spawned task. Dropping a `submit` future mid-flight
//! does not cancel them, and the page is released once they finish.

#[cfg(test)]
#[path = "save_test.rs"]
mod save_test;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use canvas::stroke::SaveSnapshot;
use canvas::{OwnerId, PageId, Stroke};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::SaveError;

/// Wire payload for one foreground-layer save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub page_id: PageId,
    pub owner_id: OwnerId,
    pub strokes: Vec<Stroke>,
}

impl From<&SaveSnapshot> for SaveRequest {
    fn from(snapshot: &SaveSnapshot) -> Self {
        Self { page_id: snapshot.page_id, owner_id: snapshot.owner_id, strokes: snapshot.strokes.clone() }
    }
}

/// Where foreground layers are persisted.
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`SaveError`] when the layer was not stored.
    async fn save(&self, request: &SaveRequest) -> Result<(), SaveError>;
}

/// What happened to a submitted snapshot.
///
/// Only the call that started the in-flight save learns how the parked
/// snapshots fared: it returns `Saved` with the newest stored revision, or
/// an error. If its own snapshot was stored and a parked one then failed,
/// the error is [`SaveError::QueuedFailed`] carrying the stored revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Stored. `revision` is the newest revision persisted by this call,
    /// for [`canvas::Engine::mark_saved`].
    Saved { page_id: PageId, revision: u64 },
    /// Another save of the page is in flight; this snapshot goes out after
    /// it and the result is reported to that save's caller. The host learns
    /// of it through the engine's dirty flag: a later save carries the
    /// same strokes again.
    Queued,
}

#[derive(Debug, Default)]
struct Slot {
    parked: Option<SaveSnapshot>,
}

/// Serialises saves per page over an [`AnnotationStore`].
pub struct SaveQueue<T> {
    store: Arc<T>,
    slots: Arc<Mutex<HashMap<PageId, Slot>>>,
}

impl<T> Clone for SaveQueue<T> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store), slots: Arc::clone(&self.slots) }
    }
}

impl<T: AnnotationStore + 'static> SaveQueue<T> {
    #[must_use]
    pub fn new(store: T) -> Self {
        Self { store: Arc::new(store), slots: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Whether a save of `page_id` is currently in flight.
    pub async fn is_saving(&self, page_id: PageId) -> bool {
        self.slots.lock().await.contains_key(&page_id)
    }

    /// Submit a snapshot.
    ///
    /// # Errors
    ///
    /// Returns the store's [`SaveError`]; the caller's layer is untouched.
    pub async fn submit(&self, snapshot: SaveSnapshot) -> Result<SaveOutcome, SaveError> {
        let page_id = snapshot.page_id;
        {
            let mut slots = self.slots.lock().await;
            if let Some(slot) = slots.get_mut(&page_id) {
                debug!(%page_id, revision = snapshot.revision, "save in flight; snapshot parked");
                slot.parked = Some(snapshot);
                return Ok(SaveOutcome::Queued);
            }
            slots.insert(page_id, Slot::default());
        }

        let queue = self.clone();
        match tokio::spawn(async move { queue.drain(snapshot).await }).await {
            Ok(result) => result,
            Err(join) => {
                self.slots.lock().await.remove(&page_id);
                error!(%page_id, error = %join, "save task died");
                Err(SaveError::Transport(join.to_string()))
            }
        }
    }

    /// Push `first`, then whatever gets parked behind it, until the page
    /// has nothing left to send. Always removes the page's slot on return.
    async fn drain(&self, first: SaveSnapshot) -> Result<SaveOutcome, SaveError> {
        let page_id = first.page_id;
        let mut current = first;
        let mut stored: Option<u64> = None;
        loop {
            let request = SaveRequest::from(&current);
            if let Err(e) = self.store.save(&request).await {
                let dropped = self.slots.lock().await.remove(&page_id).and_then(|s| s.parked).is_some();
                error!(%page_id, revision = current.revision, dropped_parked = dropped, error = %e, "save failed");
                return Err(match stored {
                    Some(saved_revision) => SaveError::QueuedFailed { page_id, saved_revision, source: Box::new(e) },
                    None => e,
                });
            }
            info!(%page_id, revision = current.revision, strokes = request.strokes.len(), "layer saved");
            stored = Some(current.revision);

            let mut slots = self.slots.lock().await;
            match slots.get_mut(&page_id).and_then(|slot| slot.parked.take()) {
                Some(next) => current = next,
                None => {
                    slots.remove(&page_id);
                    return Ok(SaveOutcome::Saved { page_id, revision: current.revision });
                }
            }
        }
    }
}
