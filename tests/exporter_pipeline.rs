use std::io;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use nbresuse::collector::mock::{MockProcessTable, NOTEBOOK_KERNEL_A, NOTEBOOK_KERNEL_B};
use nbresuse::collector::{CollectorConfig, MetricsCollector, MockFs, ProcfsTable};
use nbresuse::export::router;
use nbresuse::metrics::PrometheusSink;
use nbresuse::session::{Session, StaticSessionRegistry};

async fn scrape(registry: prometheus::Registry) -> String {
    let response = router(registry)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn kernel_and_server_memory_reach_metrics_endpoint() {
    let mut table = MockProcessTable::new().with_total_memory(17_179_869_184);
    table
        .add_process(100, 1, &["jupyter-notebook"], 10_000_000)
        .add_process(
            101,
            100,
            &[
                "/usr/bin/python3",
                "-m",
                "ipykernel_launcher",
                "-f",
                "/run/K1-connfile.json",
            ],
            50_000_000,
        );
    let sink = PrometheusSink::new().unwrap();
    let registry = sink.registry().clone();
    let config = CollectorConfig {
        root_pid: 100,
        ..CollectorConfig::default()
    };
    let sessions = StaticSessionRegistry::new(vec![Session::new("a", "K1")]);
    let mut collector = MetricsCollector::new(sessions, table, sink, config);

    collector.tick().await;
    let body = scrape(registry).await;

    assert!(body.contains("kernel_memory_usage{kernel_id=\"K1\"} 50000000"));
    assert!(body.contains("total_memory_usage 60000000"));
    assert!(body.contains("max_memory_usage 17179869184"));
}

#[tokio::test]
async fn unavailable_registry_still_exports_server_memory() {
    let mut table = MockProcessTable::new().with_total_memory(17_179_869_184);
    table
        .add_process(100, 1, &["jupyter-notebook"], 10_000_000)
        .add_process(101, 100, &["child"], 5_000_000);
    let sink = PrometheusSink::new().unwrap();
    let registry = sink.registry().clone();
    let config = CollectorConfig {
        root_pid: 100,
        ..CollectorConfig::default()
    };
    let sessions = StaticSessionRegistry::new(Vec::new());
    sessions.set_unavailable("server restarting");
    let mut collector = MetricsCollector::new(sessions, table, sink, config);

    let report = collector.tick().await;
    let body = scrape(registry).await;

    assert!(report.registry_failed);
    assert!(body.contains("total_memory_usage 15000000"));
    assert!(body.contains("max_memory_usage 17179869184"));
    assert!(!body.contains("kernel_memory_usage{"));
}

#[tokio::test]
async fn proc_tree_with_vanishing_process() {
    let mut fs = MockFs::notebook_server();
    fs.fail_path("/proc/2002/status", io::ErrorKind::NotFound);
    let table = ProcfsTable::new(fs, "/proc");
    let sink = PrometheusSink::new().unwrap();
    let registry = sink.registry().clone();
    let config = CollectorConfig {
        root_pid: 2000,
        ..CollectorConfig::default()
    };
    let sessions = StaticSessionRegistry::new(vec![
        Session::new("a", NOTEBOOK_KERNEL_A),
        Session::new("b", NOTEBOOK_KERNEL_B),
    ]);
    let mut collector = MetricsCollector::new(sessions, table, sink, config);

    let report = collector.tick().await;
    let body = scrape(registry).await;

    // Kernel B exited mid-tick: no series for it, and it is left out of the total.
    assert_eq!(report.kernels_resolved, 1);
    assert!(body.contains(&format!(
        "kernel_memory_usage{{kernel_id=\"{NOTEBOOK_KERNEL_A}\"}} {}",
        48_000 * 1024
    )));
    assert!(!body.contains(NOTEBOOK_KERNEL_B));
    assert!(body.contains(&format!(
        "total_memory_usage {}",
        (80_000 + 48_000 + 2_000) * 1024
    )));
}
