//! End-to-end supervisor runs against a fake worker script.

#![cfg(unix)]

use bizfinder::config::{ConfigLocator, SettingsStore};
use bizfinder::error::SupervisorError;
use bizfinder::model::{OutputFormat, SearchRequest, StatusEvent};
use bizfinder::supervisor::WorkerSupervisor;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Write an executable fake worker. The preamble locates the `-o` argument
/// so scripts can write a result file where the supervisor expects one.
fn write_worker(dir: &Path, body: &str) -> PathBuf {
    let script = format!(
        "#!/bin/sh\nout=\"\"\nfor a in \"$@\"; do\n  if [ \"$prev\" = \"-o\" ]; then out=\"$a\"; fi\n  prev=\"$a\"\ndone\n{}\n",
        body
    );
    let path = dir.join("fake-worker.sh");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

struct Fixture {
    _tmp: TempDir,
    locator: ConfigLocator,
    request: SearchRequest,
    worker_dir: PathBuf,
}

/// A temp sandbox with a writable config candidate holding a config file,
/// unless `with_config` is false.
fn fixture(with_config: bool) -> Fixture {
    let tmp = TempDir::new().unwrap();
    let config_dir = tmp.path().join("config");
    let worker_dir = tmp.path().join("worker");
    let output_dir = tmp.path().join("output");
    std::fs::create_dir_all(&worker_dir).unwrap();
    let store = SettingsStore::new(tmp.path().join("settings.json"));
    let mut locator = ConfigLocator::with_candidates(vec![config_dir], store);
    if with_config {
        locator.save("test-api-key").unwrap();
    }
    let request = SearchRequest {
        keyword: "plumbers".into(),
        location: "Austin, TX".into(),
        max_results: 5,
        output_format: OutputFormat::Csv,
        output_directory: output_dir,
        enable_web_scraping: true,
    };
    Fixture {
        _tmp: tmp,
        locator,
        request,
        worker_dir,
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

#[tokio::test]
async fn embedded_table_run_streams_events_in_order() {
    let mut fx = fixture(true);
    let worker = write_worker(
        &fx.worker_dir,
        r#"echo "Searching for plumbers in Austin, TX..."
echo "Found 2 businesses."
echo "Processing: Joe's Pizza..."
echo "Processing: Acme Plumbing..."
echo "--- CSV_DATA_START ---"
echo "Name,Phone Number"
echo "Joe's Pizza,555-0001"
echo "Acme Plumbing,555-0002"
echo "--- CSV_DATA_END ---""#,
    );
    let supervisor = WorkerSupervisor::new(worker);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = supervisor
        .run(&mut fx.locator, &fx.request, &tx)
        .await
        .unwrap();

    assert!(outcome.success());
    let table = outcome.table.expect("embedded table parsed");
    assert_eq!(table.len(), 2);
    assert_eq!(table[0].name, "Joe's Pizza");
    assert_eq!(table[1].phone, "555-0002");

    let events = drain(&mut rx);
    assert_eq!(events[0], StatusEvent::SearchingMaps);
    assert_eq!(events[1], StatusEvent::MapsFound { count: 2 });
    assert_eq!(
        events[2],
        StatusEvent::ScrapingProgress {
            current: 1,
            total: 2,
            label: Some("Joe's Pizza".into()),
        }
    );
    // The terminal Completed event comes after every classified line.
    assert_eq!(events.last(), Some(&StatusEvent::Completed));
}

#[tokio::test]
async fn result_file_is_the_fallback_when_markers_are_absent() {
    let mut fx = fixture(true);
    let worker = write_worker(
        &fx.worker_dir,
        r#"echo "Found 1 businesses."
printf 'Name,Phone Number\nJoe,555-0001\n' > "$out"
echo "Results saved to: $out""#,
    );
    let supervisor = WorkerSupervisor::new(worker);
    let (tx, _rx) = mpsc::unbounded_channel();

    let outcome = supervisor
        .run(&mut fx.locator, &fx.request, &tx)
        .await
        .unwrap();

    let table = outcome.table.expect("fallback file parsed");
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].name, "Joe");
}

#[tokio::test]
async fn missing_table_everywhere_yields_none_not_an_error() {
    let mut fx = fixture(true);
    let worker = write_worker(&fx.worker_dir, r#"echo "Found 0 businesses.""#);
    let supervisor = WorkerSupervisor::new(worker);
    let (tx, _rx) = mpsc::unbounded_channel();

    let outcome = supervisor
        .run(&mut fx.locator, &fx.request, &tx)
        .await
        .unwrap();

    assert!(outcome.success());
    assert!(outcome.table.is_none());
}

#[tokio::test]
async fn nonzero_exit_carries_stderr_and_partial_events() {
    let mut fx = fixture(true);
    let worker = write_worker(
        &fx.worker_dir,
        r#"echo "Searching for plumbers in Austin, TX..."
echo "quota exhausted" >&2
exit 3"#,
    );
    let supervisor = WorkerSupervisor::new(worker);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = supervisor
        .run(&mut fx.locator, &fx.request, &tx)
        .await
        .unwrap();

    assert_eq!(outcome.exit_code, 3);
    assert!(!outcome.success());
    assert!(outcome.table.is_none());
    assert!(outcome.failure_diagnostic().contains("quota exhausted"));

    // Partial progress was still forwarded before the failure.
    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&StatusEvent::SearchingMaps));
    assert!(!events.contains(&StatusEvent::Completed));
}

#[tokio::test]
async fn empty_stderr_gets_a_generic_diagnostic() {
    let mut fx = fixture(true);
    let worker = write_worker(&fx.worker_dir, "exit 7");
    let supervisor = WorkerSupervisor::new(worker);
    let (tx, _rx) = mpsc::unbounded_channel();

    let outcome = supervisor
        .run(&mut fx.locator, &fx.request, &tx)
        .await
        .unwrap();

    assert_eq!(outcome.exit_code, 7);
    assert!(outcome.failure_diagnostic().contains("exit"));
}

#[tokio::test]
async fn unstartable_worker_is_a_spawn_failure() {
    let mut fx = fixture(true);
    let supervisor = WorkerSupervisor::new(fx.worker_dir.join("does-not-exist"));
    let (tx, _rx) = mpsc::unbounded_channel();

    let err = supervisor
        .run(&mut fx.locator, &fx.request, &tx)
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::SpawnFailure { .. }));
}

#[tokio::test]
async fn missing_config_blocks_before_any_spawn() {
    let mut fx = fixture(false);
    let sentinel = fx.worker_dir.join("spawned");
    let worker = write_worker(&fx.worker_dir, &format!("touch {}", sentinel.display()));
    let supervisor = WorkerSupervisor::new(worker);
    let (tx, _rx) = mpsc::unbounded_channel();

    let err = supervisor
        .run(&mut fx.locator, &fx.request, &tx)
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::ConfigMissing));
    assert!(!sentinel.exists(), "worker must not have been spawned");
}

#[tokio::test]
async fn config_is_copied_into_the_working_directory_once() {
    let mut fx = fixture(true);
    let worker = write_worker(&fx.worker_dir, "exit 0");
    let supervisor = WorkerSupervisor::new(worker);
    let (tx, _rx) = mpsc::unbounded_channel();

    supervisor
        .run(&mut fx.locator, &fx.request, &tx)
        .await
        .unwrap();

    let copy = fx.worker_dir.join("config.ini");
    let text = std::fs::read_to_string(&copy).unwrap();
    assert!(text.contains("test-api-key"));

    // A pre-existing copy is never overwritten.
    std::fs::write(&copy, "[API]\ngoogle_maps_api_key = local-override\n").unwrap();
    supervisor
        .run(&mut fx.locator, &fx.request, &tx)
        .await
        .unwrap();
    let text = std::fs::read_to_string(&copy).unwrap();
    assert!(text.contains("local-override"));
}
