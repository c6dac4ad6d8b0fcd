use pretty_assertions::assert_eq;
use qlog_inspector::commands::{execute_scan, ScanArgs};
use qlog_inspector::output::{Anomaly, CollectingSink, ReportSink};
use qlog_inspector::pipeline::{Role, ScanOptions, Scheduler};
use qlog_inspector::utils::ScanError;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn trace(close_code: u64) -> String {
    format!(
        r#"{{"traces": [{{
            "vantage_point": {{"type": "server"}},
            "common_fields": {{"reference_time": 1625000000000000.0}},
            "event_fields": ["relative_time", "category", "event", "data"],
            "events": [
                [0, "connectivity", "connection_started",
                    {{"src_ip": "127.0.0.1", "src_port": 1}}],
                [5, "transport", "packet_sent", {{"frames": [
                    {{"frame_type": "connection_close", "error_space": "transport",
                      "raw_error_code": {}}}
                ]}}]
            ]
        }}]}}"#,
        close_code
    )
}

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

fn options(workers: usize) -> ScanOptions {
    ScanOptions {
        workers,
        ..Default::default()
    }
}

/// Holds every report until opened, keeping its file in flight
#[derive(Default)]
struct GatedSink {
    open: Mutex<bool>,
    opened: Condvar,
    reports: AtomicU64,
}

impl GatedSink {
    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }
}

impl ReportSink for GatedSink {
    fn report(&self, _anomaly: &Anomaly) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
        self.reports.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_many_files_default_workers() {
    let dir = TempDir::new().unwrap();
    for i in 0..200 {
        write(dir.path(), &format!("conn{:03}_server.qlog", i), &trace(0x0c));
    }
    let sink = Arc::new(CollectingSink::new());
    let scheduler = Scheduler::new(ScanOptions::default(), sink.clone());

    let summary = scheduler.run(dir.path()).await.unwrap();

    assert_eq!(summary.files, 200);
    assert_eq!(summary.succeeded + summary.failed, 200);
    assert_eq!(summary.succeeded, 200);
    assert_eq!(summary.events, 400);
    assert_eq!(summary.anomalies, 0);
    assert!(!summary.cancelled);
    assert_eq!(scheduler.stats().snapshot().files_started, 200);
}

// Every file blocks a runtime thread in its report until the gate opens,
// so without the worker limit more than 128 files would be in flight.
#[tokio::test(flavor = "multi_thread", worker_threads = 144)]
async fn test_worker_limit_holds_under_pressure() {
    let dir = TempDir::new().unwrap();
    for i in 0..200 {
        write(dir.path(), &format!("conn{:03}_server.qlog", i), &trace(1));
    }
    let sink = Arc::new(GatedSink::default());
    let scheduler = Scheduler::new(ScanOptions::default(), sink.clone());

    let stats = scheduler.stats();
    let gate = Arc::clone(&sink);
    let watcher = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(20);
        while stats.snapshot().in_flight < 128 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        // give a runaway dispatcher the chance to overshoot
        thread::sleep(Duration::from_millis(100));
        let held = stats.snapshot().in_flight;
        gate.open();
        held
    });

    let summary = scheduler.run(dir.path()).await.unwrap();
    let held = watcher.join().unwrap();

    assert_eq!(held, 128);
    assert_eq!(summary.files, 200);
    assert_eq!(summary.succeeded, 200);
    assert_eq!(summary.anomalies, 200);
    assert_eq!(sink.reports.load(Ordering::SeqCst), 200);

    let stats = scheduler.stats().snapshot();
    assert_eq!(stats.peak_in_flight, 128);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_limit_is_respected() {
    let dir = TempDir::new().unwrap();
    for i in 0..40 {
        write(dir.path(), &format!("conn{:02}.qlog", i), &trace(1));
    }
    let sink = Arc::new(CollectingSink::new());
    let scheduler = Scheduler::new(options(3), sink.clone());

    let summary = scheduler.run(dir.path()).await.unwrap();

    assert_eq!(summary.succeeded, 40);
    assert_eq!(summary.anomalies, 40);
    assert_eq!(sink.reports().len(), 40);
    let stats = scheduler.stats().snapshot();
    assert!(stats.peak_in_flight >= 1);
    assert!(stats.peak_in_flight <= 3);
}

#[tokio::test]
async fn test_role_filter_and_suffixes() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a_client.qlog", &trace(1));
    write(dir.path(), "b_server.qlog", &trace(1));
    write(dir.path(), "c_server.json", &trace(1));
    write(dir.path(), "notes.txt", "not a trace");
    let sink = Arc::new(CollectingSink::new());
    let scheduler = Scheduler::new(
        ScanOptions {
            role: Some(Role::Server),
            ..Default::default()
        },
        sink.clone(),
    );

    let summary = scheduler.run(dir.path()).await.unwrap();

    assert_eq!(summary.files, 1);
    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].path, dir.path().join("b_server.qlog"));
}

#[tokio::test]
async fn test_nested_directories_are_walked() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("2021").join("06");
    fs::create_dir_all(&nested).unwrap();
    write(dir.path(), "top.qlog", &trace(0));
    write(&nested, "deep.qlog", &trace(0));
    let scheduler = Scheduler::new(options(2), Arc::new(CollectingSink::new()));

    let summary = scheduler.run(dir.path()).await.unwrap();

    assert_eq!(summary.files, 2);
    assert_eq!(summary.succeeded, 2);
}

#[tokio::test]
async fn test_failed_file_does_not_stop_scan() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.qlog", &trace(1));
    write(dir.path(), "b.qlog", r#"{"traces": []}"#);
    write(dir.path(), "c.qlog.gz", "not gzip");
    write(dir.path(), "d.qlog", &trace(2));
    let sink = Arc::new(CollectingSink::new());
    let scheduler = Scheduler::new(options(4), sink.clone());

    let summary = scheduler.run(dir.path()).await.unwrap();

    assert_eq!(summary.files, 4);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(sink.reports().len(), 2);
    assert_eq!(scheduler.stats().snapshot().files_failed, 2);
}

#[tokio::test]
async fn test_truncated_file_counts_as_success() {
    let dir = TempDir::new().unwrap();
    let doc = trace(1);
    write(dir.path(), "cut.qlog", &doc[..doc.len() / 2]);
    let scheduler = Scheduler::new(options(1), Arc::new(CollectingSink::new()));

    let summary = scheduler.run(dir.path()).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.truncated, 1);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn test_invalid_root() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "file.qlog", &trace(1));
    let scheduler = Scheduler::new(options(1), Arc::new(CollectingSink::new()));

    let missing = scheduler.run(&dir.path().join("missing")).await.unwrap_err();
    assert!(matches!(missing, ScanError::InvalidRoot { .. }));

    let not_dir = scheduler.run(&dir.path().join("file.qlog")).await.unwrap_err();
    assert!(matches!(not_dir, ScanError::InvalidRoot { .. }));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let dir = TempDir::new().unwrap();
    for i in 0..5 {
        write(dir.path(), &format!("{}.qlog", i), &trace(1));
    }
    let cancel = CancellationToken::new();
    cancel.cancel();
    let scheduler =
        Scheduler::new(options(2), Arc::new(CollectingSink::new())).with_cancellation(cancel);

    let summary = scheduler.run(dir.path()).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.files, 0);
}

#[tokio::test]
async fn test_empty_directory() {
    let dir = TempDir::new().unwrap();
    let scheduler = Scheduler::new(ScanOptions::default(), Arc::new(CollectingSink::new()));

    let summary = scheduler.run(dir.path()).await.unwrap();

    assert_eq!(summary.files, 0);
    assert!(!summary.cancelled);
}

#[tokio::test]
async fn test_execute_scan_with_diagnostics() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a_client.qlog", &trace(0x15a));
    write(dir.path(), "b_server.qlog", &trace(0x12a));

    let summary = execute_scan(ScanArgs {
        root: dir.path().to_path_buf(),
        role: Some(Role::Client),
        diagnostics: Some("127.0.0.1:0".to_string()),
        ..Default::default()
    })
    .await
    .unwrap();

    assert_eq!(summary.files, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.anomalies, 0);
}

#[tokio::test]
async fn test_execute_scan_rejects_missing_root() {
    let dir = TempDir::new().unwrap();

    let err = execute_scan(ScanArgs {
        root: dir.path().join("nope"),
        ..Default::default()
    })
    .await
    .unwrap_err();

    assert!(err.to_string().contains("Processing"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_directory_aborts_after_draining() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.qlog", &trace(1));
    let locked = dir.path().join("b_locked");
    fs::create_dir(&locked).unwrap();
    write(&locked, "inner.qlog", &trace(1));
    write(dir.path(), "c.qlog", &trace(1));

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(&locked).is_ok() {
        // permission bits are not enforced (e.g. running as root)
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let sink = Arc::new(CollectingSink::new());
    let scheduler = Scheduler::new(options(4), sink.clone());
    let result = scheduler.run(dir.path()).await;
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    match result {
        Err(ScanError::Traversal { path, .. }) => assert_eq!(path, locked),
        other => panic!("expected a traversal error, got {:?}", other),
    }

    // a.qlog was dispatched before the walk failed and still completed;
    // nothing after the unreadable directory was dispatched
    let stats = scheduler.stats().snapshot();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.files_started, 1);
    assert_eq!(stats.files_succeeded, 1);
    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].path, dir.path().join("a.qlog"));
}
