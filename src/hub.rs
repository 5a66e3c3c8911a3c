//! Fans state snapshots out to observers.
//!
//! Delivery is best effort: an observer which has gone away, or which has
//! fallen so far behind that its queue is full, is dropped from the hub
//! instead of holding up the publisher.

use std::{collections::HashMap, fmt::Display, sync::Arc};

use tokio::sync::{
    mpsc::{self, error::TrySendError},
    Mutex,
};
use tracing::debug;
use uuid::Uuid;

use crate::state::RuntimeState;

/// How many snapshots an observer may have waiting before it is considered gone.
pub const OBSERVER_CAPACITY: usize = 32;

/// Identifies an observer within a [`Hub`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The receiving end of a subscription.
/// Dropping it unsubscribes (at the next publish).
#[derive(Debug)]
pub struct Observer {
    id: ObserverId,
    receiver: mpsc::Receiver<RuntimeState>,
}

impl Observer {
    /// This observer's id.
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Wait for the next snapshot.
    /// `None` if the hub dropped this observer.
    pub async fn recv(&mut self) -> Option<RuntimeState> {
        self.receiver.recv().await
    }

    /// The next snapshot, if one is waiting.
    pub fn try_recv(&mut self) -> Option<RuntimeState> {
        self.receiver.try_recv().ok()
    }
}

/// Registry of [`Observer`]s.
#[derive(Debug, Clone, Default)]
pub struct Hub {
    observers: Arc<Mutex<HashMap<ObserverId, mpsc::Sender<RuntimeState>>>>,
}

impl Hub {
    /// An empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer. It will receive `initial` before anything else.
    pub async fn subscribe(&self, initial: RuntimeState) -> Observer {
        let (sender, receiver) = mpsc::channel(OBSERVER_CAPACITY);
        let id = ObserverId(Uuid::new_v4());

        // A fresh channel always has room.
        if sender.try_send(initial).is_err() {
            debug!(%id, "Could not queue initial snapshot");
        }

        self.observers.lock().await.insert(id, sender);
        debug!(%id, "Observer subscribed");

        Observer { id, receiver }
    }

    /// Hand a copy of `snapshot` to every observer without waiting on any of them.
    ///
    /// Returns how many observers remain.
    pub async fn publish(&self, snapshot: &RuntimeState) -> usize {
        let mut observers = self.observers.lock().await;

        observers.retain(|id, sender| match sender.try_send(snapshot.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(%id, "Observer is not keeping up, dropping it");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%id, "Observer left");
                false
            }
        });

        observers.len()
    }

    /// Number of observers currently registered.
    pub async fn len(&self) -> usize {
        self.observers.lock().await.len()
    }

    /// True if there are no observers.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
