//! Hot-swappable routing snapshot.
//!
//! # Responsibilities
//! - Hold the currently active compiled [`RoutingTable`]
//! - Replace it wholesale when a new raw table compiles
//! - Keep the last good table when a new one is rejected
//!
//! # Memory Ordering
//! Publishing is a single `ArcSwap::store`. A request that calls
//! [`RoutingSnapshot::load`] gets an `Arc` to one complete table and keeps
//! using it even if a newer table is published meanwhile; it can never
//! observe a partially built table. Readers never block.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;

use crate::observability::metrics;
use crate::routing::table::{CompileError, RawRoutingTable, RoutingTable};

/// Single-writer, many-reader holder of the active routing table.
#[derive(Debug)]
pub struct RoutingSnapshot {
    current: ArcSwap<RoutingTable>,
    generation: AtomicU64,
}

impl RoutingSnapshot {
    /// Start with an empty table that routes nothing.
    pub fn new() -> Self {
        Self::with_table(RoutingTable::empty())
    }

    pub fn with_table(table: RoutingTable) -> Self {
        Self {
            current: ArcSwap::from_pointee(table),
            generation: AtomicU64::new(0),
        }
    }

    /// The active table. Lock-free.
    pub fn load(&self) -> Arc<RoutingTable> {
        self.current.load_full()
    }

    /// Number of tables published so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Publish an already compiled table.
    pub fn publish(&self, table: RoutingTable) -> u64 {
        self.current.store(Arc::new(table));
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::record_table_generation(generation);
        generation
    }

    /// Compile `raw` and publish it. On error the active table is untouched.
    pub fn apply(&self, raw: &RawRoutingTable) -> Result<u64, CompileError> {
        match RoutingTable::compile(raw) {
            Ok(table) => {
                let services = table.service_count();
                let rewrites = table.rewrites().len();
                let generation = self.publish(table);
                metrics::record_table_reload(true);
                tracing::info!(generation, services, rewrites, "Routing table published");
                Ok(generation)
            }
            Err(e) => {
                metrics::record_table_reload(false);
                tracing::error!(error = %e, "Routing table rejected, keeping current table");
                Err(e)
            }
        }
    }

    /// Consume raw tables until the sender side closes.
    pub async fn follow(self: Arc<Self>, mut updates: mpsc::UnboundedReceiver<RawRoutingTable>) {
        while let Some(raw) = updates.recv().await {
            // Rejections are logged inside `apply`.
            let _ = self.apply(&raw);
        }
        tracing::info!("Routing table updates closed");
    }
}

impl Default for RoutingSnapshot {
    fn default() -> Self {
        Self::new()
    }
}
