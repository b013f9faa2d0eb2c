//! Expiry Reaper
//!
//! A background task that proactively evicts keys whose deadline has
//! passed, so memory is reclaimed even for keys that are never read
//! again (lazy expiry alone would leave those behind forever).
//!
//! ## How It Waits
//!
//! The reaper does not poll on an interval. Each turn of its loop it asks
//! the engine for the earliest deadline and parks until one of:
//!
//! 1. that deadline arrives (`sleep_until`),
//! 2. the engine signals that the earliest deadline moved earlier or the
//!    head record was removed (`Notify`),
//! 3. shutdown is requested (`watch` channel).
//!
//! It then drains every overdue key and goes back to sleep. A signal sent
//! while the reaper is between the deadline peek and the wait is not
//! lost: `Notify` stores the permit and the next `notified()` returns
//! immediately. Spurious wake-ups only cost an empty drain.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// A handle to the running expiry reaper.
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct ExpiryReaper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpiryReaper {
    /// Spawns the reaper for `engine` on the current Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use quartzkv::storage::{ExpiryReaper, StorageEngine};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let reaper = ExpiryReaper::start(Arc::clone(&engine));
    ///
    /// // ... keys with TTLs are evicted as their deadlines pass ...
    ///
    /// drop(reaper); // stops the task
    /// ```
    pub fn start(engine: Arc<StorageEngine>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(reaper_loop(engine, shutdown_rx));
        info!("expiry reaper started");

        Self { shutdown_tx }
    }

    /// Stops the reaper. Called automatically when the handle is dropped.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ExpiryReaper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn reaper_loop(engine: Arc<StorageEngine>, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        // Reading the deadline before waiting is what makes the wait
        // safe: any operation that moves the head earlier after this
        // read also signals, and Notify keeps that permit for us.
        let next = engine.next_deadline();

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("expiry reaper shutting down");
                    return;
                }
            }
            _ = engine.expiry_wake().notified() => {
                trace!("expiry reaper woken by deadline change");
            }
            _ = sleep_until_deadline(next) => {}
        }

        let reaped = engine.drain_expired();
        if reaped > 0 {
            debug!(
                reaped = reaped,
                keys_remaining = engine.db_size(),
                "expired keys evicted"
            );
        }
    }
}

/// Sleeps until `deadline`, or forever when there is none — in that case
/// only a signal or shutdown ends the wait.
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await
        }
        None => std::future::pending::<()>().await,
    }
}

/// Starts the expiry reaper with the given engine.
///
/// Convenience wrapper over [`ExpiryReaper::start`].
pub fn start_expiry_reaper(engine: Arc<StorageEngine>) -> ExpiryReaper {
    ExpiryReaper::start(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    fn key(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[tokio::test]
    async fn test_reaper_evicts_without_access() {
        let engine = Arc::new(StorageEngine::new());
        let _reaper = ExpiryReaper::start(Arc::clone(&engine));

        for i in 0..10 {
            engine.set_with_ttl(
                key(&format!("key{i}")),
                key("value"),
                Duration::from_millis(30),
            );
        }
        engine.set(key("persistent"), key("value"));
        assert_eq!(engine.db_size(), 11);

        // No reads of the expiring keys: only the reaper can evict them.
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(engine.db_size(), 1);
        assert!(engine.exists(b"persistent"));
    }

    #[tokio::test]
    async fn test_reaper_wakes_for_an_earlier_deadline() {
        let engine = Arc::new(StorageEngine::new());
        let _reaper = ExpiryReaper::start(Arc::clone(&engine));

        // Park the reaper on a distant deadline, then slot in a near one.
        engine.set_with_ttl(key("late"), key("v"), Duration::from_secs(300));
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.set_with_ttl(key("soon"), key("v"), Duration::from_millis(30));

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(!engine.exists(b"soon"));
        assert!(engine.exists(b"late"));
    }

    #[tokio::test]
    async fn test_staggered_deadlines_evict_in_order() {
        let engine = Arc::new(StorageEngine::new());
        let _reaper = ExpiryReaper::start(Arc::clone(&engine));

        engine.set_with_ttl(key("first"), key("v"), Duration::from_millis(20));
        engine.set_with_ttl(key("second"), key("v"), Duration::from_millis(80));
        engine.set(key("third"), key("v"));

        tokio::time::sleep(Duration::from_millis(45)).await;
        assert!(!engine.exists(b"first"));
        assert!(engine.exists(b"second"));
        assert!(engine.exists(b"third"));
        assert_eq!(engine.db_size(), 2);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!engine.exists(b"second"));
        assert_eq!(engine.db_size(), 1);
    }

    #[tokio::test]
    async fn test_reaper_stops_on_drop() {
        let engine = Arc::new(StorageEngine::new());

        {
            let _reaper = ExpiryReaper::start(Arc::clone(&engine));
            tokio::time::sleep(Duration::from_millis(10)).await;
            // Handle dropped here; the task shuts down.
        }

        engine.set_with_ttl(key("k"), key("v"), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;

        // No reaper, so the entry lingers until a lazy read finds it.
        assert_eq!(engine.db_size(), 1);
        assert_eq!(engine.get(b"k"), Ok(None));
        assert_eq!(engine.db_size(), 0);
    }

    #[tokio::test]
    async fn test_flush_releases_a_parked_reaper() {
        let engine = Arc::new(StorageEngine::new());
        let _reaper = ExpiryReaper::start(Arc::clone(&engine));

        engine.set_with_ttl(key("k"), key("v"), Duration::from_secs(300));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Flush empties the TTL index and signals; the reaper must not
        // stay parked on the stale 300s deadline.
        engine.flush();
        tokio::time::sleep(Duration::from_millis(20)).await;

        engine.set_with_ttl(key("quick"), key("v"), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!engine.exists(b"quick"));
    }
}
