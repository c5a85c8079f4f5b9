//! Shared helpers for namestat-ingest integration tests
//!
//! - archive fixtures written as real zip files
//! - service and orchestrator builders over [`MemoryNameStore`]
//! - a PostgreSQL container with migrations applied (requires Docker)

#![allow(dead_code)]

use anyhow::Result;
use namestat_common::ChecksumAlgorithm;
use namestat_ingest::config::HttpConfig;
use namestat_ingest::fetch::ArchiveFetcher;
use namestat_ingest::{ImportOrchestrator, IngestConfig, MemoryNameStore, NamesService, PgNameStore};
use sqlx::postgres::PgPoolOptions;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

/// Initialize tracing for tests
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,namestat_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Archive fixtures
// ============================================================================

/// Zip bytes with one stored (uncompressed) entry per `(name, body)` pair.
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, body) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// National archive bytes: one `yobYYYY.txt` entry per year.
pub fn national_zip(years: &[(i32, &str)]) -> Vec<u8> {
    let names: Vec<String> = years.iter().map(|(year, _)| format!("yob{}.txt", year)).collect();
    let entries: Vec<(&str, &str)> = names
        .iter()
        .zip(years)
        .map(|(name, (_, body))| (name.as_str(), *body))
        .collect();
    zip_bytes(&entries)
}

/// State archive bytes: one `XX.TXT` entry per state.
pub fn state_zip(states: &[(&str, &str)]) -> Vec<u8> {
    let names: Vec<String> = states.iter().map(|(code, _)| format!("{}.TXT", code)).collect();
    let entries: Vec<(&str, &str)> = names
        .iter()
        .zip(states)
        .map(|(name, (_, body))| (name.as_str(), *body))
        .collect();
    zip_bytes(&entries)
}

/// Flip one byte of the first occurrence of `marker` so the entry holding it
/// fails its CRC check. Only works on stored entries.
pub fn corrupt_marker(bytes: &mut [u8], marker: &str) {
    let needle = marker.as_bytes();
    let pos = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("marker not found in archive");
    bytes[pos] ^= 0x20;
}

/// Temporary directory holding fixture archives
pub struct Fixtures {
    dir: tempfile::TempDir,
}

impl Fixtures {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `bytes` to `file_name` and return the path as a source string.
    pub fn write(&self, file_name: &str, bytes: &[u8]) -> String {
        let path: PathBuf = self.dir.path().join(file_name);
        std::fs::write(&path, bytes).unwrap();
        path.display().to_string()
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn memory_service() -> (Arc<MemoryNameStore>, NamesService) {
    let store = Arc::new(MemoryNameStore::new());
    let service = NamesService::new(store.clone(), IngestConfig::default()).unwrap();
    (store, service)
}

pub fn memory_orchestrator(batch_size: usize) -> (Arc<MemoryNameStore>, ImportOrchestrator) {
    let store = Arc::new(MemoryNameStore::new());
    let fetcher = ArchiveFetcher::new(&HttpConfig::default(), ChecksumAlgorithm::Md5).unwrap();
    let orchestrator = ImportOrchestrator::new(store.clone(), fetcher, batch_size);
    (store, orchestrator)
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with migrations applied
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    store: PgNameStore,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        let container = Postgres::default().with_tag("16-alpine").start().await?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(5432).await?;
        let conn_string = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&conn_string)
            .await?;

        let store = PgNameStore::new(pool);
        store.migrate().await?;

        Ok(Self {
            _container: container,
            store,
        })
    }

    pub fn store(&self) -> PgNameStore {
        self.store.clone()
    }
}
