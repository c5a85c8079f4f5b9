//! Archive fetcher tests against a mock HTTP server

mod common;

use common::{init_test_tracing, national_zip};
use namestat_common::checksum::compute_checksum;
use namestat_common::ChecksumAlgorithm;
use namestat_ingest::config::{HttpConfig, IngestConfig, DEFAULT_REFERER};
use namestat_ingest::fetch::ArchiveFetcher;
use namestat_ingest::{IngestError, MemoryNameStore, NamesService, YearRange};
use std::io::Cursor;
use std::sync::Arc;
use wiremock::matchers::{header, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_download_streams_to_temp_file() {
    init_test_tracing();
    let server = MockServer::start().await;
    let bytes = national_zip(&[(2023, "Liam,M,20000\n")]);

    Mock::given(method("GET"))
        .and(path("/oact/babynames/names.zip"))
        .and(header_regex("user-agent", r"^Mozilla/5\.0 .*Chrome/"))
        .and(header("referer", DEFAULT_REFERER))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ArchiveFetcher::new(&HttpConfig::default(), ChecksumAlgorithm::Sha256).unwrap();
    let url = format!("{}/oact/babynames/names.zip", server.uri());
    let fetched = fetcher.fetch(&url).await.unwrap();

    let expected =
        compute_checksum(&mut Cursor::new(bytes.clone()), ChecksumAlgorithm::Sha256).unwrap();
    assert!(fetched.is_download());
    assert_eq!(fetched.size(), bytes.len() as u64);
    assert_eq!(fetched.checksum(), expected);
    assert_eq!(std::fs::read(fetched.path()).unwrap(), bytes);

    let temp_path = fetched.path().to_path_buf();
    drop(fetched);
    assert!(!temp_path.exists());
}

#[tokio::test]
async fn test_http_error_is_transport_error() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = ArchiveFetcher::new(&HttpConfig::default(), ChecksumAlgorithm::Md5).unwrap();
    let url = format!("{}/missing.zip", server.uri());
    let err = fetcher.fetch(&url).await.unwrap_err();

    match err {
        IngestError::Transport { source_url, reason } => {
            assert_eq!(source_url, url);
            assert!(reason.contains("404"), "unexpected reason: {}", reason);
        },
        other => panic!("expected transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_referer_can_be_disabled() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("referer", DEFAULT_REFERER))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"zip".to_vec()))
        .mount(&server)
        .await;

    let http = HttpConfig {
        referer: None,
        ..HttpConfig::default()
    };
    let fetcher = ArchiveFetcher::new(&http, ChecksumAlgorithm::Md5).unwrap();
    let fetched = fetcher.fetch(&format!("{}/names.zip", server.uri())).await.unwrap();
    assert_eq!(fetched.size(), 3);
}

#[tokio::test]
async fn test_import_from_url() {
    init_test_tracing();
    let server = MockServer::start().await;
    let bytes = national_zip(&[(2023, "Liam,M,20000\nOlivia,F,16000\n")]);
    Mock::given(method("GET"))
        .and(path("/names.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
        .mount(&server)
        .await;

    let config = IngestConfig {
        national_url: format!("{}/names.zip", server.uri()),
        ..IngestConfig::default()
    };
    let store = Arc::new(MemoryNameStore::new());
    let service = NamesService::new(store.clone(), config).unwrap();

    let summary = service.import_national(None, YearRange::all(), false).await.unwrap();
    assert_eq!(summary.record_count, 2);
    assert_eq!(store.names().len(), 2);

    let runs = service.import_history().await.unwrap();
    assert_eq!(runs[0].source, format!("{}/names.zip", server.uri()));
}
