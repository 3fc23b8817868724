use log_tail::{
    BroadcastRegistry, LineStream, LineSubscriber, TailConfig, TailEngine, TailState, read_last_lines,
    tail_log,
};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_stream::StreamExt;

const POLL: Duration = Duration::from_millis(20);

fn append(path: &Path, content: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
}

fn log_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("app.log")
}

fn fast_config(path: &Path) -> TailConfig {
    TailConfig::new(path).poll_interval(POLL).watch_events(false)
}

/// Helper function to collect items from a stream with a timeout
async fn collect_stream_items<T>(
    mut stream: impl StreamExt<Item = T> + Unpin,
    timeout: Duration,
) -> Vec<T> {
    let mut items = Vec::new();
    let timeout_future = tokio::time::sleep(timeout);
    tokio::pin!(timeout_future);

    loop {
        tokio::select! {
            item = stream.next() => {
                match item {
                    Some(item) => items.push(item),
                    None => break,
                }
            }
            _ = &mut timeout_future => break,
        }
    }

    items
}

async fn wait_until_tailing(engine: &TailEngine) {
    let mut states = engine.state_changes();
    tokio::time::timeout(
        Duration::from_secs(2),
        states.wait_for(|state| *state == TailState::Tailing),
    )
    .await
    .expect("Engine never started tailing")
    .expect("State channel closed");
}

#[derive(Default)]
struct Recorder {
    lines: Mutex<Vec<String>>,
}

impl LineSubscriber for Recorder {
    fn on_line(&self, line: &str) -> log_tail::Result<()> {
        self.lines.lock().unwrap().push(line.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_snapshot_then_live_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    append(&path, "a\nb\nc\n");

    let engine = tail_log(fast_config(&path)).await.unwrap();
    wait_until_tailing(&engine).await;

    assert_eq!(engine.read_last_lines(2).await.unwrap(), vec!["b", "c"]);

    let recorder = Arc::new(Recorder::default());
    engine.subscribe_with(recorder.clone());
    let stream = engine.stream();

    append(&path, "d\n");
    assert_eq!(engine.read_last_lines(2).await.unwrap(), vec!["c", "d"]);

    let items = collect_stream_items(stream, Duration::from_millis(300)).await;
    assert_eq!(items, vec!["d"]);
    assert_eq!(*recorder.lines.lock().unwrap(), vec!["d"]);

    engine.stop().await;
}

#[tokio::test]
async fn test_many_subscribers_receive_ordered_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    File::create(&path).unwrap();

    let engine = tail_log(fast_config(&path).read_chunk_size(64)).await.unwrap();
    wait_until_tailing(&engine).await;

    let streams: Vec<LineStream> = (0..5).map(|_| engine.stream()).collect();

    let expected: Vec<String> = (0..500).map(|i| format!("entry {:04}", i)).collect();
    for chunk in expected.chunks(50) {
        let mut batch = chunk.join("\n");
        batch.push('\n');
        append(&path, &batch);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    for stream in streams {
        let items = collect_stream_items(stream, Duration::from_millis(500)).await;
        assert_eq!(items, expected);
    }

    engine.stop().await;
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    File::create(&path).unwrap();

    let engine = tail_log(fast_config(&path)).await.unwrap();
    wait_until_tailing(&engine).await;

    let recorder = Arc::new(Recorder::default());
    let id = engine.subscribe_with(recorder.clone());
    let mut stream = engine.stream();

    append(&path, "kept\n");
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(2), stream.next()).await.unwrap(),
        Some("kept".to_string())
    );

    engine.unsubscribe(id);
    engine.unsubscribe(id);

    append(&path, "not delivered\n");
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(2), stream.next()).await.unwrap(),
        Some("not delivered".to_string())
    );
    assert_eq!(*recorder.lines.lock().unwrap(), vec!["kept"]);

    engine.stop().await;
}

#[tokio::test]
async fn test_rotation_does_not_replay_old_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    append(&path, "old history\n");

    let engine = tail_log(fast_config(&path)).await.unwrap();
    wait_until_tailing(&engine).await;
    let stream = engine.stream();

    append(&path, "pre-rotation line that is fairly long\n");
    tokio::time::sleep(POLL * 3).await;

    File::create(&path).unwrap();
    tokio::time::sleep(POLL * 3).await;
    append(&path, "post 1\npost 2\n");

    let items = collect_stream_items(stream, Duration::from_millis(300)).await;
    assert_eq!(
        items,
        vec!["pre-rotation line that is fairly long", "post 1", "post 2"]
    );
    assert_eq!(engine.state(), TailState::Tailing);

    engine.stop().await;
}

#[tokio::test]
async fn test_shared_registry_across_engine_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    File::create(&path).unwrap();

    let registry = Arc::new(BroadcastRegistry::new());
    let stream = LineStream::subscribe(&registry);

    let first = TailEngine::with_registry(fast_config(&path), registry.clone())
        .await
        .unwrap();
    wait_until_tailing(&first).await;
    append(&path, "from first\n");
    tokio::time::sleep(POLL * 3).await;
    first.stop().await;
    assert_eq!(first.state(), TailState::Stopped);

    let second = TailEngine::with_registry(fast_config(&path), registry.clone())
        .await
        .unwrap();
    wait_until_tailing(&second).await;
    append(&path, "from second\n");

    let items = collect_stream_items(stream, Duration::from_millis(300)).await;
    assert_eq!(items, vec!["from first", "from second"]);

    second.stop().await;
}

#[tokio::test]
async fn test_read_last_lines_without_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);

    assert!(read_last_lines(&path, 3).await.unwrap().is_empty());

    append(&path, "x\ny\nz");
    assert_eq!(read_last_lines(&path, 2).await.unwrap(), vec!["y", "z"]);
    assert!(read_last_lines(&path, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_watch_fixture_history() {
    let fixture_path = Path::new("fixtures/simple_append.log");

    // Skip test if fixture doesn't exist
    if !fixture_path.exists() {
        eprintln!(
            "Skipping test: fixture file '{}' doesn't exist",
            fixture_path.display()
        );
        return;
    }

    let engine = tail_log(TailConfig::new(fixture_path).initial_lines(2))
        .await
        .unwrap();
    let (history, _stream) = engine.attach().await.unwrap();

    assert_eq!(
        history,
        vec![
            "2023-01-01 10:00:08 DEBUG Cache hit for key=user_data_123",
            "2023-01-01 10:00:09 INFO User authenticated successfully",
        ]
    );
    engine.stop().await;
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let result = tail_log(TailConfig::new("app.log").block_size(0)).await;
    assert!(matches!(result, Err(log_tail::Error::InvalidConfig { .. })));
}
