//! The observable status of the bridge.
//!
//! There is exactly one [`RuntimeState`] per bridge, owned by a [`StateStore`].
//! Every mutation goes through [`StateStore::update`], which publishes the
//! full resulting snapshot to all observers before releasing the lock.
//! Since subscribing takes the same lock, a new observer always sees its
//! initial snapshot before any change made after it subscribed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::trace;

use crate::hub::{Hub, Observer};

/// What observers see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeState {
    /// A relay client is connected.
    pub client_connected: bool,

    /// A job is believed to be running.
    pub streaming: bool,

    /// The air-assist valve is open.
    /// Never true while the valve is disabled by configuration.
    pub air_state: bool,

    /// Automatic air control is turned off by configuration.
    pub air_override_force: bool,

    /// The motion controller's serial device.
    pub serial_device: String,
}

impl RuntimeState {
    /// Disconnected and idle, with the air off.
    pub fn new(serial_device: &str, air_override_force: bool) -> Self {
        Self {
            client_connected: false,
            streaming: false,
            air_state: false,
            air_override_force,
            serial_device: serial_device.to_owned(),
        }
    }

    /// What a bridge in the middle of a job looks like.
    pub fn example() -> Self {
        Self {
            client_connected: true,
            streaming: true,
            air_state: true,
            air_override_force: false,
            serial_device: "/dev/ttyUSB0".into(),
        }
    }
}

/// Shared handle to the one [`RuntimeState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    state: Arc<Mutex<RuntimeState>>,
    hub: Hub,
}

impl StateStore {
    /// Create a store with no observers.
    pub fn new(initial: RuntimeState) -> Self {
        Self {
            state: Arc::new(Mutex::new(initial)),
            hub: Hub::new(),
        }
    }

    /// A copy of the current state.
    pub async fn snapshot(&self) -> RuntimeState {
        self.state.lock().await.clone()
    }

    /// Modify the state and publish the result.
    ///
    /// Publishing happens even if `change` left the state as it was.
    pub async fn update<F, R>(&self, change: F) -> R
    where
        F: FnOnce(&mut RuntimeState) -> R,
    {
        let mut state = self.state.lock().await;
        let outcome = change(&mut state);

        let observers = self.hub.publish(&state).await;
        trace!(?state, %observers, "State published");

        outcome
    }

    /// Start observing. The current state is the first thing the observer gets.
    pub async fn subscribe(&self) -> Observer {
        let state = self.state.lock().await;

        self.hub.subscribe(state.clone()).await
    }

    /// The hub observers are kept in.
    pub fn hub(&self) -> &Hub {
        &self.hub
    }
}
