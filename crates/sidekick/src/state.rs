//
// state.rs
//
// Observable worker state: readiness and the synthesized declarations
//

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::watch;

/// Snapshot of the worker state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerState {
    /// False while a patch is being applied
    pub ready: bool,
    /// Declaration fragments keyed by the identifier they describe, in load order
    pub loaded_declarations: IndexMap<String, String>,
}

/// A single state mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateUpdate {
    Ready(bool),
    Declaration { identifier: String, fragment: String },
}

type Listener = Box<dyn Fn(&WorkerState, &StateUpdate) + Send + Sync>;

/// Single state object with synchronous listener notification.
///
/// Async observers subscribe to a `watch` channel; synchronous observers
/// register listeners, each isolated from the others' panics.
pub struct StateStore {
    sender: watch::Sender<WorkerState>,
    listeners: Mutex<Vec<Listener>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(WorkerState::default());
        Self {
            sender,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Current state snapshot
    pub fn get_state(&self) -> WorkerState {
        self.sender.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.sender.borrow().ready
    }

    pub fn is_loaded(&self, identifier: &str) -> bool {
        self.sender.borrow().loaded_declarations.contains_key(identifier)
    }

    /// Identifiers with a loaded fragment, in load order
    pub fn loaded_identifiers(&self) -> Vec<String> {
        self.sender
            .borrow()
            .loaded_declarations
            .keys()
            .cloned()
            .collect()
    }

    /// Apply one mutation and notify every observer
    pub fn set_state(&self, update: StateUpdate) {
        self.sender.send_modify(|state| match &update {
            StateUpdate::Ready(ready) => state.ready = *ready,
            StateUpdate::Declaration {
                identifier,
                fragment,
            } => {
                state
                    .loaded_declarations
                    .insert(identifier.clone(), fragment.clone());
            }
        });

        let snapshot = self.get_state();
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        for (index, listener) in listeners.iter().enumerate() {
            let result = catch_unwind(AssertUnwindSafe(|| listener(&snapshot, &update)));
            if result.is_err() {
                log::error!("State listener {} panicked while handling {:?}", index, update);
            }
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.set_state(StateUpdate::Ready(ready));
    }

    /// Register a synchronous listener called after every mutation
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&WorkerState, &StateUpdate) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(listener));
    }

    /// Receiver notified on every mutation
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.sender.subscribe()
    }

    /// Wait until `ready`, at most `interval * attempts`.
    ///
    /// Returns false when the bound elapsed; the caller proceeds anyway
    /// against whatever state the environment is in.
    pub async fn wait_until_ready(&self, interval: Duration, attempts: u32) -> bool {
        if self.is_ready() {
            return true;
        }

        let ceiling = interval * attempts;
        let mut receiver = self.subscribe();
        let outcome = tokio::time::timeout(ceiling, receiver.wait_for(|state| state.ready))
            .await
            .map(|ready| ready.is_ok());
        match outcome {
            Ok(ready) => ready,
            Err(_) => {
                log::warn!(
                    "Worker not ready after {:?}; answering from the current file set",
                    ceiling
                );
                false
            }
        }
    }
}
