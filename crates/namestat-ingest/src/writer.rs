//! Batched persistence of newly discovered entities
//!
//! Entities are buffered per kind and written once a buffer reaches the batch
//! size. Referential order is kept on every flush: names before the stats that
//! point at them, stats before breakdowns. Each flush is its own store call, so
//! batches written before a failure stay written.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::config::MAX_BATCH_SIZE;
use crate::error::Result;
use crate::models::{Name, StateBreakdown, YearlyStat};
use crate::store::NameStore;

/// Entities flushed so far, per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteCounters {
    pub names: u64,
    pub stats: u64,
    pub breakdowns: u64,
}

pub struct BatchWriter {
    store: Arc<dyn NameStore>,
    batch_size: usize,
    names: Vec<Name>,
    stats: Vec<YearlyStat>,
    breakdowns: Vec<StateBreakdown>,
    counters: WriteCounters,
}

impl BatchWriter {
    /// `batch_size` is clamped to `1..=10_000`.
    pub fn new(store: Arc<dyn NameStore>, batch_size: usize) -> Self {
        let batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        Self {
            store,
            batch_size,
            names: Vec::with_capacity(batch_size),
            stats: Vec::with_capacity(batch_size),
            breakdowns: Vec::with_capacity(batch_size),
            counters: WriteCounters::default(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn counters(&self) -> WriteCounters {
        self.counters
    }

    pub async fn push_name(&mut self, name: Name) -> Result<()> {
        self.names.push(name);
        if self.names.len() >= self.batch_size {
            self.flush_names().await?;
        }
        Ok(())
    }

    pub async fn push_stat(&mut self, stat: YearlyStat) -> Result<()> {
        self.stats.push(stat);
        if self.stats.len() >= self.batch_size {
            self.flush_stats().await?;
        }
        Ok(())
    }

    pub async fn push_breakdown(&mut self, breakdown: StateBreakdown) -> Result<()> {
        self.breakdowns.push(breakdown);
        if self.breakdowns.len() >= self.batch_size {
            self.flush_breakdowns().await?;
        }
        Ok(())
    }

    /// Drain every buffer (names, stats, breakdowns) and return the totals.
    pub async fn finish(mut self) -> Result<WriteCounters> {
        self.flush_breakdowns().await?;
        Ok(self.counters)
    }

    async fn flush_names(&mut self) -> Result<()> {
        if self.names.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.names);
        self.store.insert_names(&batch).await?;
        self.counters.names += batch.len() as u64;
        debug!(batch = batch.len(), total = self.counters.names, "Flushed names");
        Ok(())
    }

    async fn flush_stats(&mut self) -> Result<()> {
        self.flush_names().await?;
        if self.stats.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.stats);
        self.store.insert_yearly_stats(&batch).await?;
        self.counters.stats += batch.len() as u64;
        debug!(batch = batch.len(), total = self.counters.stats, "Flushed yearly stats");
        Ok(())
    }

    async fn flush_breakdowns(&mut self) -> Result<()> {
        self.flush_stats().await?;
        if self.breakdowns.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.breakdowns);
        self.store.insert_state_breakdowns(&batch).await?;
        self.counters.breakdowns += batch.len() as u64;
        debug!(
            batch = batch.len(),
            total = self.counters.breakdowns,
            "Flushed state breakdowns"
        );
        Ok(())
    }
}
