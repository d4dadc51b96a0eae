use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::{debug, info, warn};

use crate::console::{Console, Slice};
use crate::error::StoreError;
use crate::storage::{Storage, StorageEvent};

/// One tab's copy of the console, kept in step with a shared [`Storage`].
///
/// Local mutations are persisted by [`Replica::commit`], one key per dirty
/// slice. Changes written by other replicas are pulled in by
/// [`Replica::refresh`] or [`Replica::next_change`], which replace the
/// affected slices wholesale. Concurrent writers to the same slice resolve
/// last-writer-wins; nothing is merged.
pub struct Replica {
    storage: Arc<dyn Storage>,
    namespace: String,
    console: Console,
    events: broadcast::Receiver<StorageEvent>,
}

impl Replica {
    /// Subscribe first, then load every slice, so no write between the two
    /// steps goes unnoticed.
    pub async fn open(
        storage: Arc<dyn Storage>,
        namespace: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let events = storage.subscribe();
        let mut replica = Self {
            storage,
            namespace: namespace.into(),
            console: Console::new(),
            events,
        };
        replica.hydrate().await?;
        Ok(replica)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self, slice: Slice) -> String {
        format!("{}{}", self.namespace, slice.suffix())
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut Console {
        &mut self.console
    }

    /// Reload every slice from storage.
    pub async fn hydrate(&mut self) -> Result<(), StoreError> {
        for slice in Slice::ALL {
            self.load(slice).await?;
        }
        debug!(namespace = %self.namespace, "replica hydrated");
        Ok(())
    }

    /// Persist the slices touched since the last commit. A failed write leaves
    /// the unwritten slices dirty.
    pub async fn commit(&mut self) -> Result<Vec<Slice>, StoreError> {
        let dirty = self.console.take_dirty();
        for (index, slice) in dirty.iter().enumerate() {
            if let Err(err) = self.persist(*slice).await {
                for pending in &dirty[index..] {
                    self.console.touch(*pending);
                }
                return Err(err);
            }
        }
        if !dirty.is_empty() {
            debug!(slices = dirty.len(), "replica committed");
        }
        Ok(dirty)
    }

    /// Apply every change event received so far without waiting. Returns the
    /// slices that were reloaded. Slices with uncommitted local edits keep
    /// them; the next commit overwrites the stored value.
    pub async fn refresh(&mut self) -> Result<Vec<Slice>, StoreError> {
        let mut changed = BTreeSet::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    if let Some(slice) = self.slice_for(&event.key) {
                        changed.insert(slice);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "change events lagged, reloading everything");
                    changed.extend(Slice::ALL);
                }
            }
        }
        self.reload_clean(changed).await
    }

    /// Wait for the next change to a clean slice of this namespace and apply
    /// it. Returns `None` once the store stops publishing.
    pub async fn next_change(&mut self) -> Result<Option<Vec<Slice>>, StoreError> {
        loop {
            let candidates: Vec<Slice> = match self.events.recv().await {
                Ok(event) => self.slice_for(&event.key).into_iter().collect(),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "change events lagged, reloading everything");
                    Slice::ALL.to_vec()
                }
                Err(RecvError::Closed) => {
                    info!("change feed closed");
                    return Ok(None);
                }
            };
            let reloaded = self.reload_clean(candidates).await?;
            if !reloaded.is_empty() {
                return Ok(Some(reloaded));
            }
        }
    }

    async fn reload_clean(
        &mut self,
        slices: impl IntoIterator<Item = Slice>,
    ) -> Result<Vec<Slice>, StoreError> {
        let mut reloaded = Vec::new();
        for slice in slices {
            if self.console.is_slice_dirty(slice) {
                debug!(slice = slice.suffix(), "keeping uncommitted local slice");
                continue;
            }
            self.load(slice).await?;
            reloaded.push(slice);
        }
        Ok(reloaded)
    }

    fn slice_for(&self, key: &str) -> Option<Slice> {
        key.strip_prefix(self.namespace.as_str())
            .and_then(Slice::from_suffix)
    }

    async fn load(&mut self, slice: Slice) -> Result<(), StoreError> {
        let raw = self.storage.read(&self.key(slice)).await?;
        self.console.decode(slice, raw.as_deref());
        Ok(())
    }

    async fn persist(&self, slice: Slice) -> Result<(), StoreError> {
        let value = self.console.encode(slice)?;
        self.storage.write(&self.key(slice), &value).await
    }
}
