//! Thread registry: per-thread state documents and the active-run slot.
//!
//! A thread's [`StateHandle`] is created on first use and shared by every
//! run on that thread. At most one run per thread is active at a time;
//! [`ThreadRegistry::begin_run`] rejects a second one with
//! [`RelayError::ThreadBusy`] instead of queueing it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::RelayError;
use crate::reducer::StateHandle;

#[derive(Debug, Default)]
struct ThreadEntry {
    state: StateHandle,
    active_run: Mutex<Option<String>>,
}

/// In-memory registry of threads keyed by `thread_id`.
#[derive(Debug, Clone, Default)]
pub struct ThreadRegistry {
    threads: Arc<Mutex<HashMap<String, Arc<ThreadEntry>>>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, thread_id: &str) -> Arc<ThreadEntry> {
        let mut threads = self.threads.lock();
        threads
            .entry(thread_id.to_string())
            .or_insert_with(|| {
                debug!(thread_id, "creating thread");
                Arc::new(ThreadEntry::default())
            })
            .clone()
    }

    /// The thread's state handle, creating the thread if needed.
    pub fn state(&self, thread_id: &str) -> StateHandle {
        self.entry(thread_id).state.clone()
    }

    /// Seed a thread's state from a run request.
    ///
    /// Only applies to a document that has never been written; returns
    /// whether the seed took. `null` never seeds.
    pub fn seed_state(&self, thread_id: &str, value: serde_json::Value) -> bool {
        if value.is_null() {
            return false;
        }
        let seeded = self.state(thread_id).seed(value);
        if seeded {
            debug!(thread_id, "seeded thread state from request");
        }
        seeded
    }

    /// A consistent copy of the thread's state, if the thread exists.
    pub fn snapshot(&self, thread_id: &str) -> Option<serde_json::Value> {
        let threads = self.threads.lock();
        threads.get(thread_id).map(|entry| entry.state.snapshot())
    }

    /// Ids of all known threads.
    pub fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.threads.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The active run on a thread, if any.
    pub fn active_run(&self, thread_id: &str) -> Option<String> {
        let threads = self.threads.lock();
        threads
            .get(thread_id)
            .and_then(|entry| entry.active_run.lock().clone())
    }

    /// Claim the thread's run slot.
    ///
    /// The slot is released when the returned guard drops, including when a
    /// run is cancelled mid-stream.
    pub fn begin_run(&self, thread_id: &str, run_id: &str) -> Result<RunGuard, RelayError> {
        let entry = self.entry(thread_id);
        {
            let mut active = entry.active_run.lock();
            if let Some(active_run_id) = active.as_ref() {
                return Err(RelayError::ThreadBusy {
                    thread_id: thread_id.to_string(),
                    active_run_id: active_run_id.clone(),
                });
            }
            *active = Some(run_id.to_string());
        }
        info!(thread_id, run_id, "run slot acquired");

        Ok(RunGuard {
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
            entry,
        })
    }
}

/// Holds a thread's run slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct RunGuard {
    thread_id: String,
    run_id: String,
    entry: Arc<ThreadEntry>,
}

impl RunGuard {
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The thread's state handle.
    pub fn state(&self) -> StateHandle {
        self.entry.state.clone()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut active = self.entry.active_run.lock();
        if active.as_deref() == Some(self.run_id.as_str()) {
            *active = None;
        }
        debug!(thread_id = %self.thread_id, run_id = %self.run_id, "run slot released");
    }
}

#[cfg(test)]
#[path = "thread_tests.rs"]
mod tests;
