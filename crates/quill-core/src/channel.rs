//! Per-severity channel writer with batching and date rotation.
//!
//! A [`ChannelWriter`] owns everything one severity stream needs: the line
//! buffer, the active [`FileSink`], the name of the day file currently in
//! use, and a lazily started flush timer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  ChannelWriter (one per severity)                            │
//! │  ├── state: Arc<Mutex<ChannelState>>                         │
//! │  │   ├── buffer: Vec<String>      (batch-size bound)         │
//! │  │   ├── sink: Option<FileSink>   (today's file)             │
//! │  │   └── current_file             (date the sink targets)    │
//! │  ├── ticker: JoinHandle           (periodic flush, lazy)     │
//! │  └── failure_relay: Weak          (error channel, for        │
//! │                                    background failures)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Durable emits bypass the buffer and await the write on the blocking
//! pool. Asynchronous emits only enqueue under the lock; the actual I/O of
//! a full batch, a timer tick or a date rollover runs on its own spawned
//! unit, which re-acquires the lock on a blocking thread. The lock is never
//! held across an await point.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use crate::config::ChannelConfig;
use crate::error::QuillError;
use crate::sink::FileSink;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const FILENAME_FORMAT: &str = "%Y%m%d";

/// Severity of a log line; selects the channel it lands on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    /// Informational messages.
    Info,
    /// Failures worth an operator's attention.
    Error,
    /// Fine-grained diagnostic messages.
    Trace,
}

impl Level {
    /// Lowercase name used in line tags and directory names.
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Error => "error",
            Level::Trace => "trace",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared mutable state of one channel. Only ever touched while holding
/// the channel's lock.
struct ChannelState {
    sink: Option<FileSink>,
    current_file: Option<PathBuf>,
    buffer: Vec<String>,
}

impl ChannelState {
    /// Drain the buffer into the sink. Empty buffer is a no-op.
    fn flush_buffered(&mut self) -> Result<(), QuillError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let lines = std::mem::take(&mut self.buffer);
        self.write_lines(&lines)
    }

    /// Write `lines` as one batch: joined by newlines, one trailing
    /// newline. Skipped when no sink has been opened yet.
    fn write_lines(&mut self, lines: &[String]) -> Result<(), QuillError> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        let mut batch = lines.join("\n");
        batch.push('\n');
        sink.write(batch.as_bytes())?;
        Ok(())
    }
}

/// Buffered writer for a single severity channel.
pub struct ChannelWriter {
    config: ChannelConfig,
    state: Arc<Mutex<ChannelState>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    failure_relay: Mutex<Option<Weak<ChannelWriter>>>,
}

impl ChannelWriter {
    /// Create a writer for one channel. No file is touched until the first
    /// emit.
    pub fn new(config: ChannelConfig) -> Self {
        let buffer = Vec::with_capacity(config.batch_size);
        Self {
            config,
            state: Arc::new(Mutex::new(ChannelState {
                sink: None,
                current_file: None,
                buffer,
            })),
            ticker: Mutex::new(None),
            failure_relay: Mutex::new(None),
        }
    }

    /// Severity this channel writes.
    pub fn level(&self) -> Level {
        self.config.level
    }

    /// Wire the channel that receives reports of background flush
    /// failures. The error channel points at itself.
    pub(crate) fn set_failure_relay(&self, relay: Weak<ChannelWriter>) {
        *self.failure_relay.lock() = Some(relay);
    }

    /// Write one line to this channel.
    ///
    /// With `durable` set the call awaits until the write syscall has
    /// returned and surfaces any failure. Otherwise the line is only
    /// queued: it reaches disk when the batch fills, the flush timer
    /// fires, or [`flush_pending`](Self::flush_pending) runs — and any
    /// failure on those paths is reported to the error channel instead of
    /// a caller.
    pub async fn emit(&self, message: &str, durable: bool) -> Result<(), QuillError> {
        self.emit_at(message, durable, Local::now()).await
    }

    /// Emit with an explicit timestamp. Seam for date-rollover tests.
    pub(crate) async fn emit_at(
        &self,
        message: &str,
        durable: bool,
        now: DateTime<Local>,
    ) -> Result<(), QuillError> {
        let line = format_line(now, self.config.level, message);
        let target = day_file(&self.config.dir, now);

        if !durable {
            self.start_ticker();
            let overflow = {
                let mut state = self.state.lock();
                let rotated = self.roll_if_needed(&mut state, &target);
                state.buffer.push(line);
                // A rollover already scheduled a flush of the old file;
                // the fresh buffer holds just this line.
                !rotated && state.buffer.len() >= self.config.batch_size
            };
            if overflow {
                self.spawn_background_flush();
            }
            return Ok(());
        }

        {
            let mut state = self.state.lock();
            self.roll_if_needed(&mut state, &target);
        }
        let state = Arc::clone(&self.state);
        run_blocking(move || {
            let mut state = state.lock();
            state.write_lines(std::slice::from_ref(&line))?;
            Ok(())
        })
        .await
    }

    /// Durably drain whatever is buffered, without closing the sink.
    pub async fn flush_pending(&self) -> Result<(), QuillError> {
        let state = Arc::clone(&self.state);
        run_blocking(move || state.lock().flush_buffered()).await
    }

    /// Stop the flush timer, drain the buffer and close the sink.
    pub async fn close(&self) -> Result<(), QuillError> {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.abort();
        }
        let state = Arc::clone(&self.state);
        run_blocking(move || {
            let mut state = state.lock();
            let flushed = state.flush_buffered();
            let closed = match state.sink.as_mut() {
                Some(sink) => sink.close(),
                None => Ok(()),
            };
            state.sink = None;
            flushed.and(closed)
        })
        .await
    }

    /// Ensure the sink targets `target`, retiring the previous day's sink
    /// to a background flush-and-close when the date rolled over. Returns
    /// whether a rollover happened.
    fn roll_if_needed(&self, state: &mut ChannelState, target: &Path) -> bool {
        if state.sink.is_none() {
            state.sink = Some(self.new_sink(target));
            state.current_file = Some(target.to_path_buf());
            return false;
        }
        if state.current_file.as_deref() == Some(target) {
            return false;
        }

        debug!(channel = %self.config.level, to = %target.display(), "date rollover");
        let retired = state.sink.replace(self.new_sink(target));
        let lines = std::mem::take(&mut state.buffer);
        state.current_file = Some(target.to_path_buf());
        if let Some(sink) = retired {
            self.spawn_retiring_flush(sink, lines);
        }
        true
    }

    fn new_sink(&self, target: &Path) -> FileSink {
        FileSink::with_limits(
            target,
            self.config.max_file_size,
            self.config.truncate_on_full,
        )
    }

    /// Start the periodic flush task on first use. Subsequent calls are
    /// no-ops; the handle is aborted by [`close`](Self::close).
    fn start_ticker(&self) {
        if self.config.flush_interval.is_zero() {
            return;
        }
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return;
        }

        let level = self.config.level;
        let period = self.config.flush_interval;
        let state = Arc::clone(&self.state);
        let relay = self.failure_relay.lock().clone();
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately; the real cadence
            // starts after it.
            interval.tick().await;
            loop {
                interval.tick().await;
                let state = Arc::clone(&state);
                let outcome = tokio::task::spawn_blocking(move || {
                    let mut state = state.lock();
                    state.flush_buffered()
                })
                .await;
                report_background_outcome(level, relay.clone(), outcome);
            }
        }));
    }

    /// Flush the buffer on its own unit of execution. The caller returns
    /// immediately; failures go to the error channel.
    fn spawn_background_flush(&self) {
        let level = self.config.level;
        let state = Arc::clone(&self.state);
        let relay = self.failure_relay.lock().clone();
        tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || {
                let mut state = state.lock();
                state.flush_buffered()
            })
            .await;
            report_background_outcome(level, relay, outcome);
        });
    }

    /// Write `lines` through a sink that has been swapped out by a date
    /// rollover, then close it. Runs on its own unit of execution; the
    /// sink is owned by the task, so the channel lock is not involved.
    fn spawn_retiring_flush(&self, mut sink: FileSink, lines: Vec<String>) {
        let level = self.config.level;
        let relay = self.failure_relay.lock().clone();
        tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || {
                if !lines.is_empty() {
                    let mut batch = lines.join("\n");
                    batch.push('\n');
                    sink.write(batch.as_bytes())?;
                }
                sink.close()
            })
            .await;
            report_background_outcome(level, relay, outcome);
        });
    }

    /// Synchronously record a background failure on this channel's sink.
    /// Never propagates; a second-order failure only leaves a tracing
    /// breadcrumb.
    pub(crate) fn report_failure(&self, failure: &str) {
        let now = Local::now();
        let line = format_line(now, self.config.level, failure);
        let target = day_file(&self.config.dir, now);

        let mut state = self.state.lock();
        self.roll_if_needed(&mut state, &target);
        if let Err(err) = state.write_lines(std::slice::from_ref(&line)) {
            warn!(error = %err, "failed to record background flush failure");
        }
    }
}

/// Convert the outcome of a background flush into an error-channel line.
/// A panic inside the flush surfaces here as a `JoinError` and is treated
/// the same as an I/O failure.
fn report_background_outcome(
    level: Level,
    relay: Option<Weak<ChannelWriter>>,
    outcome: Result<Result<(), QuillError>, JoinError>,
) {
    let failure = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(err)) => format!("{level} channel flush failed: {err}"),
        Err(join) if join.is_panic() => format!(
            "{level} channel flush panicked: {}",
            panic_message(join.into_panic())
        ),
        Err(join) => format!("{level} channel flush aborted: {join}"),
    };
    warn!(channel = %level, %failure, "background flush did not complete");
    if let Some(error_channel) = relay.and_then(|weak| weak.upgrade()) {
        error_channel.report_failure(&failure);
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run blocking file work off the async executor, mapping a lost worker
/// to an I/O error for durable callers.
async fn run_blocking<F>(task: F) -> Result<(), QuillError>
where
    F: FnOnce() -> Result<(), QuillError> + Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(result) => result,
        Err(join) => Err(QuillError::Io(io::Error::new(io::ErrorKind::Other, join))),
    }
}

fn format_line(now: DateTime<Local>, level: Level, message: &str) -> String {
    format!("{} [{}] {}", now.format(TIMESTAMP_FORMAT), level, message)
}

fn day_file(dir: &Path, now: DateTime<Local>) -> PathBuf {
    dir.join(format!("{}.log", now.format(FILENAME_FORMAT)))
}
