//! End-to-end tests for the sync engine against its own file server.

use devsync_core::project::FileContent;
use devsync_daemon::{EngineOptions, EngineState, FileServerClient, SyncEngine};
use devsync_proto::{event_types, Initiator, UpsertFileRequest, WireContent};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const DEADLINE: Duration = Duration::from_secs(10);

fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("package.json"), r#"{"dependencies":{"@tsci/led":"1.0.0"}}"#).unwrap();
    fs::write(
        root.join("index.tsx"),
        "import { Led } from \"@tsci/led\"\nimport { helper } from \"./lib/helper\"\n",
    )
    .unwrap();
    fs::create_dir_all(root.join("lib")).unwrap();
    fs::write(root.join("lib/helper.ts"), "export const helper = 1\n").unwrap();
    fs::create_dir_all(root.join("dist")).unwrap();
    fs::write(root.join("dist/bundle.js"), "// build output\n").unwrap();

    let pkg = root.join("node_modules/@tsci/led");
    fs::create_dir_all(&pkg).unwrap();
    fs::write(
        pkg.join("package.json"),
        r#"{"name":"@tsci/led","main":"index.js"}"#,
    )
    .unwrap();
    fs::write(pkg.join("index.js"), "export const Led = () => null\n").unwrap();
    dir
}

fn options(root: &Path) -> EngineOptions {
    EngineOptions {
        root: root.to_path_buf(),
        entry: "index.tsx".into(),
        ignored_dirs: vec!["dist".to_string()],
        runtime_provided: vec!["react".to_string()],
        poll_interval: Duration::from_millis(50),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        type_registry: None,
    }
}

fn text(path: &str, content: &str, initiator: Option<Initiator>) -> UpsertFileRequest {
    UpsertFileRequest {
        file_path: path.to_string(),
        content: WireContent::Text {
            text_content: content.to_string(),
        },
        initiator,
    }
}

async fn remote_text(client: &FileServerClient, path: &str) -> Option<String> {
    let record = client.get_file(path).await.unwrap()?;
    let content = FileContent::from_wire(&record.content).unwrap();
    content.as_text().map(ToString::to_string)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_uploads_project_and_closure() {
    let dir = project();
    let mut engine = SyncEngine::new(options(dir.path()));

    let summary = engine.start().await.unwrap();
    assert_eq!(engine.state(), EngineState::Watching);
    assert_eq!(summary.packages, 1);

    let client = FileServerClient::new(&engine.base_url().unwrap()).unwrap();
    let paths: Vec<String> = client
        .list_files()
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.file_path)
        .collect();
    assert!(paths.contains(&"index.tsx".to_string()));
    assert!(paths.contains(&"lib/helper.ts".to_string()));
    assert!(paths.contains(&"node_modules/@tsci/led/index.js".to_string()));
    assert!(!paths.iter().any(|p| p.starts_with("dist/")));

    let events = client.list_events(None).await.unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.event_type, event_types::INITIAL_FILES_UPLOADED);
    assert!(events[..events.len() - 1]
        .iter()
        .all(|e| e.event_type == event_types::FILE_UPDATED
            && e.initiator() == Some(Initiator::FilesystemChange)));

    engine.stop().await.unwrap();
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(engine.base_url().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_twice_is_rejected() {
    let dir = project();
    let mut engine = SyncEngine::new(options(dir.path()));
    engine.start().await.unwrap();
    assert!(engine.start().await.is_err());
    engine.stop().await.unwrap();
    assert!(engine.stop().await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remote_edit_is_written_to_disk() {
    let dir = project();
    let mut engine = SyncEngine::new(options(dir.path()));
    engine.start().await.unwrap();
    let client = FileServerClient::new(&engine.base_url().unwrap()).unwrap();

    client
        .upsert_file(&text("manual-edits.json", "{\"pcb_placements\":[]}", None))
        .await
        .unwrap();

    let target = dir.path().join("manual-edits.json");
    let started = Instant::now();
    while fs::read_to_string(&target).ok().as_deref() != Some("{\"pcb_placements\":[]}") {
        assert!(started.elapsed() < DEADLINE, "remote edit never reached disk");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    // Manual edits flow one way; the write must not come back as an upload.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let uploads = client
        .list_events(None)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == event_types::FILE_UPDATED)
        .filter(|e| e.file_path() == Some("manual-edits.json"))
        .filter(|e| e.initiator() == Some(Initiator::FilesystemChange))
        .count();
    assert_eq!(uploads, 0);

    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remote_write_is_not_echoed_back() {
    let dir = project();
    let mut engine = SyncEngine::new(options(dir.path()));
    engine.start().await.unwrap();
    let client = FileServerClient::new(&engine.base_url().unwrap()).unwrap();

    client
        .upsert_file(&text("lib/helper.ts", "export const helper = 2\n", Some(Initiator::Server)))
        .await
        .unwrap();

    let target = dir.path().join("lib/helper.ts");
    let started = Instant::now();
    while fs::read_to_string(&target).unwrap() != "export const helper = 2\n" {
        assert!(started.elapsed() < DEADLINE, "remote edit never reached disk");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    // Give the watcher time to report the write.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let echoes = client
        .list_events(None)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.file_path() == Some("lib/helper.ts"))
        .filter(|e| e.initiator() == Some(Initiator::FilesystemChange))
        .count();
    assert_eq!(echoes, 1, "only the initial upload is tagged as a local change");

    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_local_edit_reaches_server() {
    let dir = project();
    let mut engine = SyncEngine::new(options(dir.path()));
    engine.start().await.unwrap();
    let client = FileServerClient::new(&engine.base_url().unwrap()).unwrap();

    fs::write(dir.path().join("lib/helper.ts"), "export const helper = 3\n").unwrap();

    let started = Instant::now();
    while remote_text(&client, "lib/helper.ts").await.as_deref() != Some("export const helper = 3\n") {
        assert!(started.elapsed() < DEADLINE, "local edit never reached the server");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    fs::remove_file(dir.path().join("lib/helper.ts")).unwrap();
    let started = Instant::now();
    while remote_text(&client, "lib/helper.ts").await.is_some() {
        assert!(started.elapsed() < DEADLINE, "local removal never reached the server");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    engine.stop().await.unwrap();
}
