// Log follower tests: existing content, appends, partial lines, truncation, rotation

use phpfpm_log_exporter::follower::{FollowError, FollowerConfig, LogFollower};
use std::io::Write;
use std::time::Duration;
use tokio::time::timeout;

fn fast_config() -> FollowerConfig {
    FollowerConfig {
        poll_interval: Duration::from_millis(10),
        from_start: true,
    }
}

async fn next(follower: &mut LogFollower) -> String {
    timeout(Duration::from_secs(5), follower.next_line())
        .await
        .expect("timed out waiting for line")
}

fn append(path: &std::path::Path, s: &str) {
    let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    f.write_all(s.as_bytes()).unwrap();
}

#[tokio::test]
async fn open_missing_file_is_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = LogFollower::open(dir.path().join("nope.log"), fast_config())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, FollowError::Open { .. }));
    assert!(err.to_string().contains("nope.log"));
}

#[tokio::test]
async fn open_directory_is_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = LogFollower::open(dir.path(), fast_config())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, FollowError::NotAFile { .. }));
}

#[tokio::test]
async fn reads_existing_then_appended_lines() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("access.log");
    std::fs::write(&path, "first\nsecond\r\n").unwrap();

    let mut follower = LogFollower::open(&path, fast_config()).await.unwrap();
    assert_eq!(next(&mut follower).await, "first");
    assert_eq!(next(&mut follower).await, "second");

    append(&path, "third\n");
    assert_eq!(next(&mut follower).await, "third");
}

#[tokio::test]
async fn from_end_skips_existing_content() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("access.log");
    std::fs::write(&path, "old\n").unwrap();

    let config = FollowerConfig {
        from_start: false,
        ..fast_config()
    };
    let mut follower = LogFollower::open(&path, config).await.unwrap();
    append(&path, "new\n");
    assert_eq!(next(&mut follower).await, "new");
}

#[tokio::test]
async fn partial_line_held_until_newline() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("access.log");
    std::fs::write(&path, "hel").unwrap();

    let mut follower = LogFollower::open(&path, fast_config()).await.unwrap();
    let pending = timeout(Duration::from_millis(100), follower.next_line()).await;
    assert!(pending.is_err(), "partial line must not be emitted");

    append(&path, "lo\n");
    assert_eq!(next(&mut follower).await, "hello");
}

#[tokio::test]
async fn truncation_restarts_from_top() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("access.log");
    std::fs::write(&path, "a fairly long first line\n").unwrap();

    let mut follower = LogFollower::open(&path, fast_config()).await.unwrap();
    assert_eq!(next(&mut follower).await, "a fairly long first line");

    std::fs::write(&path, "short\n").unwrap();
    assert_eq!(next(&mut follower).await, "short");
}

#[cfg(unix)]
#[tokio::test]
async fn rotation_reopens_new_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("access.log");
    std::fs::write(&path, "before\n").unwrap();

    let mut follower = LogFollower::open(&path, fast_config()).await.unwrap();
    assert_eq!(next(&mut follower).await, "before");

    std::fs::rename(&path, dir.path().join("access.log.1")).unwrap();
    std::fs::write(&path, "after rotation line\n").unwrap();
    assert_eq!(next(&mut follower).await, "after rotation line");
}

#[tokio::test]
async fn spawn_forwards_lines_into_stream() {
    use futures_util::StreamExt;

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("access.log");
    std::fs::write(&path, "one\ntwo\n").unwrap();

    let follower = LogFollower::open(&path, fast_config()).await.unwrap();
    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let handle = follower.spawn(tx);
    let lines = phpfpm_log_exporter::follower::lines(rx);
    let got: Vec<String> = timeout(Duration::from_secs(5), lines.take(2).collect())
        .await
        .unwrap();
    assert_eq!(got, vec!["one", "two"]);
    handle.await.unwrap();
}
