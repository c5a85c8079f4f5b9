//! Per-run dedup cache
//!
//! Maps natural keys to identities that already exist in the store or were
//! created earlier in the same run. One cache belongs to one import
//! invocation and is dropped with it.

use std::collections::{HashMap, HashSet};
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{DatasetKind, Name, Sex, YearRange};
use crate::store::NameStore;

/// `UPPERCASE(name)|sex`
pub fn name_key(name: &str, sex: Sex) -> String {
    format!("{}|{}", name.to_uppercase(), sex.as_str())
}

#[derive(Debug, Default)]
pub struct DedupCache {
    names: HashMap<String, Uuid>,
    stats: HashMap<(Uuid, i32), Uuid>,
    breakdowns: HashSet<(Uuid, String)>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the store: every name, plus stats (and for state imports,
    /// breakdowns) inside `window`.
    pub async fn preload(
        store: &dyn NameStore,
        kind: DatasetKind,
        window: YearRange,
    ) -> Result<Self> {
        let mut cache = Self::new();

        for name in store.load_names().await? {
            cache.names.insert(name_key(&name.name, name.sex), name.id);
        }
        info!(names = cache.names.len(), "Loaded existing names into cache");

        for key in store.load_stat_keys(window).await? {
            cache.stats.insert((key.name_id, key.year), key.stat_id);
        }
        info!(
            stats = cache.stats.len(),
            window = %window,
            "Loaded existing yearly stats into cache"
        );

        if kind == DatasetKind::State {
            for key in store.load_breakdown_keys(window).await? {
                cache.breakdowns.insert((key.yearly_stat_id, key.state_code));
            }
            info!(
                breakdowns = cache.breakdowns.len(),
                "Loaded existing state breakdowns into cache"
            );
        }

        Ok(cache)
    }

    pub fn name_id(&self, name: &str, sex: Sex) -> Option<Uuid> {
        self.names.get(&name_key(name, sex)).copied()
    }

    pub fn insert_name(&mut self, name: &Name) {
        self.names.insert(name_key(&name.name, name.sex), name.id);
    }

    pub fn stat_id(&self, name_id: Uuid, year: i32) -> Option<Uuid> {
        self.stats.get(&(name_id, year)).copied()
    }

    pub fn insert_stat(&mut self, name_id: Uuid, year: i32, stat_id: Uuid) {
        self.stats.insert((name_id, year), stat_id);
    }

    pub fn has_breakdown(&self, stat_id: Uuid, state_code: &str) -> bool {
        self.breakdowns.contains(&(stat_id, state_code.to_string()))
    }

    pub fn insert_breakdown(&mut self, stat_id: Uuid, state_code: &str) {
        self.breakdowns.insert((stat_id, state_code.to_string()));
    }

    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    pub fn stat_count(&self) -> usize {
        self.stats.len()
    }
}
