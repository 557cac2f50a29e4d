// SPDX-License-Identifier: Apache-2.0

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use axum::routing::get;
use axum::Router;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uidai_insights_ingest::NormalizationTables;
use uidai_insights_model::{DatasetKind, YearScope};
use uidai_insights_server::{
    InsightsConfig, InsightsErrorCode, InsightsService, SourceResolver, TEMP_FILE_PREFIX,
};

const DEMOGRAPHIC_2024: &str = "date,state,district,pincode,demo_age_5_17,demo_age_17_
03-01-2024,Tamilnadu,Chennai,600001,3,4
19-02-2024,XYZ123,Nowhere,,9,9
";

async fn serve_archive(files: &[(&'static str, &'static str)]) -> SocketAddr {
    let mut app = Router::new();
    for (name, body) in files.iter().copied() {
        app = app.route(&format!("/{name}"), get(move || async move { body }));
    }
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve archive") });
    addr
}

// Answers one request with `rows` body lines, pausing `gap` before each
// line, then closes the connection to end the body.
async fn serve_trickle(
    header: &'static str,
    row: &'static str,
    rows: usize,
    gap: Duration,
) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = [0_u8; 4096];
        let _ = socket.read(&mut request).await.expect("read request");
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: text/csv\r\nconnection: close\r\n\r\n",
            )
            .await
            .expect("write status");
        socket.write_all(header.as_bytes()).await.expect("write header");
        for _ in 0..rows {
            tokio::time::sleep(gap).await;
            socket.write_all(row.as_bytes()).await.expect("write row");
        }
        socket.shutdown().await.expect("shutdown");
    });
    addr
}

fn age_file(path: &Path, age: Duration) {
    let file = std::fs::File::options()
        .write(true)
        .open(path)
        .expect("open");
    file.set_modified(SystemTime::now() - age).expect("set mtime");
}

fn remote_config(addr: SocketAddr, local_root: &Path, temp: &Path) -> InsightsConfig {
    InsightsConfig {
        local_roots: vec![local_root.to_path_buf()],
        remote_base_url: Some(format!("http://{addr}/")),
        temp_root: temp.to_path_buf(),
        ..InsightsConfig::default()
    }
}

fn transient_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(TEMP_FILE_PREFIX))
        })
        .collect()
}

#[tokio::test]
async fn remote_fallback_downloads_into_transient_file() {
    let addr = serve_archive(&[("demographic_2024.csv", DEMOGRAPHIC_2024)]).await;
    let local = tempdir().expect("tempdir");
    let temp = tempdir().expect("tempdir");
    let resolver =
        SourceResolver::new(&remote_config(addr, local.path(), temp.path())).expect("resolver");

    let source = resolver
        .resolve(DatasetKind::Demographic, YearScope::Year(2024))
        .await
        .expect("downloaded");
    assert!(source.is_transient());
    assert!(source.path().starts_with(temp.path()));
    assert_eq!(
        std::fs::read_to_string(source.path()).expect("read download"),
        DEMOGRAPHIC_2024
    );

    let path = source.path().to_path_buf();
    source.release();
    assert!(!path.exists());
}

#[tokio::test]
async fn failed_download_is_resolution_error_and_leaves_no_file() {
    let addr = serve_archive(&[("enrolment_full.csv", "date\n")]).await;
    let local = tempdir().expect("tempdir");
    let temp = tempdir().expect("tempdir");
    let resolver =
        SourceResolver::new(&remote_config(addr, local.path(), temp.path())).expect("resolver");

    let err = resolver
        .resolve(DatasetKind::Enrolment, YearScope::Year(2031))
        .await
        .expect_err("archive has no such file");
    assert_eq!(err.code, InsightsErrorCode::Resolution);
    assert!(err.message.contains("404"));
    assert!(transient_files(temp.path()).is_empty());
}

#[tokio::test]
async fn unreachable_archive_is_resolution_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let local = tempdir().expect("tempdir");
    let temp = tempdir().expect("tempdir");
    let resolver =
        SourceResolver::new(&remote_config(addr, local.path(), temp.path())).expect("resolver");

    let err = resolver
        .resolve(DatasetKind::Biometric, YearScope::All)
        .await
        .expect_err("connection refused");
    assert_eq!(err.code, InsightsErrorCode::Resolution);
    assert!(transient_files(temp.path()).is_empty());
}

#[tokio::test]
async fn downloaded_source_is_aggregated_then_removed() {
    let addr = serve_archive(&[("demographic_2024.csv", DEMOGRAPHIC_2024)]).await;
    let local = tempdir().expect("tempdir");
    let temp = tempdir().expect("tempdir");
    let service = InsightsService::new(
        &remote_config(addr, local.path(), temp.path()),
        NormalizationTables::builtin(),
        None,
    )
    .expect("service");

    let got = service
        .aggregate_insights("demographic", "2024")
        .await
        .expect("aggregated download");
    assert_eq!(got.total_updates, 7);
    assert_eq!(got.by_state.get("Tamil Nadu"), Some(&7));
    assert_eq!(got.by_month.get("01"), Some(&7));
    assert_eq!(service.engine_runs(), 1);
    assert!(transient_files(temp.path()).is_empty());
}

#[tokio::test]
async fn local_copy_shadows_remote_archive() {
    let addr = serve_archive(&[("demographic_2024.csv", DEMOGRAPHIC_2024)]).await;
    let local = tempdir().expect("tempdir");
    let temp = tempdir().expect("tempdir");
    std::fs::write(
        local.path().join("demographic_2024.csv"),
        "date,state,district,pincode,demo_age_5_17,demo_age_17_\n01-01-2024,Goa,North Goa,403001,1,1\n",
    )
    .expect("write local copy");
    let service = InsightsService::new(
        &remote_config(addr, local.path(), temp.path()),
        NormalizationTables::builtin(),
        None,
    )
    .expect("service");

    let got = service
        .insights_for(DatasetKind::Demographic, YearScope::Year(2024))
        .await
        .expect("local copy");
    assert_eq!(got.by_state.get("Goa"), Some(&2));
    assert!(got.by_state.get("Tamil Nadu").is_none());
}

#[tokio::test]
async fn slow_but_steady_download_outlives_the_idle_timeout() {
    let addr = serve_trickle(
        "date,state,district,pincode,demo_age_5_17,demo_age_17_\n",
        "01-01-2024,Goa,North Goa,403001,1,1\n",
        20,
        Duration::from_millis(100),
    )
    .await;
    let local = tempdir().expect("tempdir");
    let temp = tempdir().expect("tempdir");
    let cfg = InsightsConfig {
        download_timeout: Duration::from_millis(800),
        ..remote_config(addr, local.path(), temp.path())
    };
    let service =
        InsightsService::new(&cfg, NormalizationTables::builtin(), None).expect("service");

    let got = service
        .aggregate_insights("demographic", "2024")
        .await
        .expect("streamed download completes");
    assert_eq!(got.total_updates, 40);
    assert_eq!(got.by_district["Goa"]["North Goa"], 40);
    assert!(transient_files(temp.path()).is_empty());
}

#[tokio::test]
async fn downloaded_file_missing_a_column_is_processing_error_and_removed() {
    let addr = serve_archive(&[(
        "biometric_2025.csv",
        "date,state,district,pincode,bio_age_5_17\n01-01-2025,Goa,North Goa,403001,4\n",
    )])
    .await;
    let local = tempdir().expect("tempdir");
    let temp = tempdir().expect("tempdir");
    let service = InsightsService::new(
        &remote_config(addr, local.path(), temp.path()),
        NormalizationTables::builtin(),
        None,
    )
    .expect("service");

    let err = service
        .aggregate_insights("biometric", "2025")
        .await
        .expect_err("required column missing");
    assert_eq!(err.code, InsightsErrorCode::Processing);
    assert!(err.message.contains("bio_age_17_"), "{}", err.message);
    assert!(transient_files(temp.path()).is_empty());
}

#[tokio::test]
async fn resolve_sweeps_stale_transient_files_first() {
    let addr = serve_archive(&[("demographic_2024.csv", DEMOGRAPHIC_2024)]).await;
    let local = tempdir().expect("tempdir");
    let temp = tempdir().expect("tempdir");
    let stale = temp.path().join(format!("{TEMP_FILE_PREFIX}abandoned.csv"));
    std::fs::write(&stale, "date\n").expect("write stale file");
    age_file(&stale, Duration::from_secs(3600));
    let cfg = InsightsConfig {
        temp_max_age: Duration::from_secs(60),
        ..remote_config(addr, local.path(), temp.path())
    };
    let resolver = SourceResolver::new(&cfg).expect("resolver");

    let source = resolver
        .resolve(DatasetKind::Demographic, YearScope::Year(2024))
        .await
        .expect("downloaded");
    assert!(!stale.exists(), "stale transient file survived resolve");
    assert_eq!(transient_files(temp.path()), vec![source.path().to_path_buf()]);
    source.release();
}
