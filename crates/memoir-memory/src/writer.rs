// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write serialisation for the store.
//!
//! Every mutating store entry point acquires the queue before touching the
//! engine and holds it across the whole critical section. `tokio::sync::Mutex`
//! queues waiters in FIFO order, so writers observe every mutation that began
//! before them and there is no priority inversion between ingestion,
//! retrieval-side access bumps, and user mutations.
//!
//! Delete-then-insert operations (update, access bump) materialise the
//! original row as a rollback image before the delete; on insert failure the
//! image is re-inserted and the original error surfaced. The rollback is
//! in-process: a crash between delete and re-insert loses the row.

use tokio::sync::{Mutex, MutexGuard};

/// FIFO write queue. One per store handle.
#[derive(Debug, Default)]
pub(crate) struct WriteQueue {
    lock: Mutex<()>,
}

impl WriteQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Waits for every earlier write to complete, then enters the critical
    /// section. The guard is held until the mutation completes or fails.
    pub(crate) async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}
