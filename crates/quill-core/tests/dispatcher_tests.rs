//! Behavioral tests for the dispatcher and its channels
//!
//! These tests drive the public surface the way a host process would:
//! durable and buffered emits, batch-triggered flushes, flush_all and
//! shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use quill_core::{Config, Dispatcher};

fn test_config(base: &Path) -> Config {
    Config {
        base_dir: base.to_path_buf(),
        // Timer disabled; tests trigger every flush themselves.
        flush_interval: Duration::ZERO,
        ..Config::default()
    }
}

fn day_file(base: &Path, channel: &str) -> PathBuf {
    let day = chrono::Local::now().format("%Y%m%d");
    base.join(channel).join(format!("{day}.log"))
}

async fn wait_for_content(path: &Path, needle: &str) -> String {
    for _ in 0..200 {
        if let Ok(content) = std::fs::read_to_string(path) {
            if content.contains(needle) {
                return content;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {needle:?} in {}", path.display());
}

// ============================================================================
// Lazy Open / Ordering
// ============================================================================

/// Two immediate emits on a fresh channel create exactly one file for the
/// day, holding both lines in call order.
#[tokio::test]
async fn test_lazy_open_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let logs = Dispatcher::new(test_config(dir.path()));

    logs.info("first", true).await.unwrap();
    logs.info("second", true).await.unwrap();

    let info_dir = dir.path().join("info");
    let entries: Vec<_> = std::fs::read_dir(&info_dir).unwrap().collect();
    assert_eq!(entries.len(), 1, "expected exactly one day file");

    let content = std::fs::read_to_string(day_file(dir.path(), "info")).unwrap();
    let first = content.find("first").unwrap();
    let second = content.find("second").unwrap();
    assert!(first < second, "lines out of order: {content}");
}

// ============================================================================
// Batch Flush
// ============================================================================

/// In development mode the 5th buffered emit flushes the whole batch with
/// no timer and no durable call involved.
#[tokio::test]
async fn test_batch_threshold_flushes_without_timer() {
    let dir = tempfile::tempdir().unwrap();
    let logs = Dispatcher::new(test_config(dir.path()));

    for i in 0..5 {
        logs.trace(&format!("step {i}"), false).await.unwrap();
    }

    let content = wait_for_content(&day_file(dir.path(), "trace"), "step 4").await;
    for i in 0..5 {
        assert!(content.contains(&format!("step {i}")), "missing step {i}");
    }
}

/// Below the batch threshold buffered lines stay in memory.
#[tokio::test]
async fn test_below_threshold_nothing_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let logs = Dispatcher::new(test_config(dir.path()));

    for i in 0..3 {
        logs.info(&format!("pending {i}"), false).await.unwrap();
    }

    assert!(!day_file(dir.path(), "info").exists());
}

// ============================================================================
// flush_all
// ============================================================================

/// flush_all lands every pending line and leaves the buffers empty, so a
/// second flush_all writes nothing more.
#[tokio::test]
async fn test_flush_all_drains_every_channel() {
    let dir = tempfile::tempdir().unwrap();
    let logs = Dispatcher::new(test_config(dir.path()));

    logs.info("info pending", false).await.unwrap();
    logs.error("error pending", false).await.unwrap();
    logs.trace("trace pending", false).await.unwrap();

    logs.flush_all().await.unwrap();

    let info = std::fs::read_to_string(day_file(dir.path(), "info")).unwrap();
    let error = std::fs::read_to_string(day_file(dir.path(), "error")).unwrap();
    let trace = std::fs::read_to_string(day_file(dir.path(), "trace")).unwrap();
    assert!(info.contains("info pending"));
    assert!(error.contains("error pending"));
    assert!(trace.contains("trace pending"));

    // Buffers are empty now; flushing again must not duplicate anything.
    logs.flush_all().await.unwrap();
    assert_eq!(
        info,
        std::fs::read_to_string(day_file(dir.path(), "info")).unwrap()
    );
}

// ============================================================================
// Concurrency
// ============================================================================

/// N concurrent emits on one channel produce exactly N complete lines,
/// never interleaved fragments.
#[tokio::test]
async fn test_concurrent_emits_never_interleave() {
    let dir = tempfile::tempdir().unwrap();
    let logs = Arc::new(Dispatcher::new(test_config(dir.path())));

    let mut handles = Vec::new();
    for i in 0..32 {
        let logs = Arc::clone(&logs);
        handles.push(tokio::spawn(async move {
            logs.info(&format!("worker {i} reporting in"), true)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let content = std::fs::read_to_string(day_file(dir.path(), "info")).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 32);
    for line in &lines {
        assert!(line.contains("[info]"), "mangled line: {line}");
        assert!(line.ends_with("reporting in"), "mangled line: {line}");
    }
    for i in 0..32 {
        assert!(
            content.contains(&format!("worker {i} reporting in")),
            "missing worker {i}"
        );
    }
}

// ============================================================================
// Background Failure Relay
// ============================================================================

/// A failing background flush is re-logged to the error channel instead of
/// surfacing anywhere or crashing anything.
#[tokio::test]
async fn test_background_flush_failure_lands_on_error_channel() {
    let dir = tempfile::tempdir().unwrap();
    // Squat on the info channel's directory with a plain file so the
    // flush cannot open its day file.
    std::fs::write(dir.path().join("info"), b"squatter").unwrap();
    let logs = Dispatcher::new(test_config(dir.path()));

    // Buffered emits still succeed; the failure only happens at flush time.
    for i in 0..5 {
        logs.info(&format!("doomed {i}"), false).await.unwrap();
    }

    let content =
        wait_for_content(&day_file(dir.path(), "error"), "info channel flush failed").await;
    assert!(content.contains("[error]"));
}

// ============================================================================
// Shutdown
// ============================================================================

/// close() lands whatever is still buffered.
#[tokio::test]
async fn test_close_flushes_pending_lines() {
    let dir = tempfile::tempdir().unwrap();
    let logs = Dispatcher::new(test_config(dir.path()));

    logs.info("going down", false).await.unwrap();
    logs.error("last error", false).await.unwrap();
    logs.close().await.unwrap();

    let info = std::fs::read_to_string(day_file(dir.path(), "info")).unwrap();
    let error = std::fs::read_to_string(day_file(dir.path(), "error")).unwrap();
    assert!(info.contains("going down"));
    assert!(error.contains("last error"));
}

/// Durable emits surface filesystem problems to the caller.
#[tokio::test]
async fn test_durable_emit_surfaces_errors() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        max_file_size: 16,
        ..test_config(dir.path())
    };
    let logs = Dispatcher::new(config);

    // The formatted line is far larger than the 16-byte cap, so it can
    // never fit and the durable caller must see the failure.
    let result = logs.info("this line cannot possibly fit the cap", true).await;
    assert!(result.is_err());
}
