//! Periodic maintenance tasks.
//!
//! Four interval-driven loops over the shared engine: the mempool memory
//! monitor, expired-transaction cleanup, spam-state cleanup, and the
//! validator rate-window reset. Each takes the write lock briefly per tick;
//! all are aborted by dropping the returned handles.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::ChainEngine;

/// Handles for the spawned maintenance loops.
pub struct MaintenanceTasks {
    handles: Vec<JoinHandle<()>>,
}

impl MaintenanceTasks {
    /// Spawn all maintenance loops with intervals from the engine's config.
    pub fn spawn(engine: Arc<RwLock<ChainEngine>>) -> Self {
        let (monitor_secs, reset_secs, cleanup_secs) = {
            let e = engine.read();
            let cfg = e.config();
            (
                cfg.memory.cpu_protection.monitoring_interval.max(1),
                cfg.memory.cpu_protection.cleanup_interval.max(1),
                cfg.batch_processing.cleanup_interval.max(1),
            )
        };

        let mut handles = Vec::new();

        handles.push(spawn_loop(
            Arc::clone(&engine),
            Duration::from_secs(monitor_secs),
            "memory-monitor",
            |e| e.monitor_memory(),
        ));
        handles.push(spawn_loop(
            Arc::clone(&engine),
            Duration::from_secs(cleanup_secs),
            "mempool-cleanup",
            |e| {
                let removed = e.cleanup_mempool();
                if removed > 0 {
                    debug!(removed, "mempool cleanup tick");
                }
            },
        ));
        handles.push(spawn_loop(
            Arc::clone(&engine),
            Duration::from_secs(cleanup_secs),
            "spam-cleanup",
            |e| e.cleanup_spam_state(),
        ));
        handles.push(spawn_loop(
            engine,
            Duration::from_secs(reset_secs),
            "rate-window-reset",
            |e| e.reset_validation_window(),
        ));

        Self { handles }
    }

    /// Abort every loop.
    pub fn shutdown(self) {
        for handle in &self.handles {
            handle.abort();
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

fn spawn_loop(
    engine: Arc<RwLock<ChainEngine>>,
    period: Duration,
    name: &'static str,
    tick: impl Fn(&mut ChainEngine) + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so a fresh node does not
        // run maintenance before serving anything.
        interval.tick().await;
        loop {
            interval.tick().await;
            debug!(task = name, "maintenance tick");
            tick(&mut engine.write());
        }
    })
}
