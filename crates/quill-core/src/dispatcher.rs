//! Routing front door over the three severity channels.
//!
//! A [`Dispatcher`] is constructed exactly once at process start from a
//! [`Config`] and handed to whoever needs to log; there is no global
//! registry. It owns the three [`ChannelWriter`]s exclusively and is torn
//! down with [`close`](Dispatcher::close), which stops the flush timers,
//! drains every buffer and releases every file handle.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::channel::{ChannelWriter, Level};
use crate::config::Config;
use crate::error::QuillError;

/// Owner of the info, error and trace channels.
pub struct Dispatcher {
    info: Arc<ChannelWriter>,
    error: Arc<ChannelWriter>,
    trace: Arc<ChannelWriter>,
}

impl Dispatcher {
    /// Build the three channels from one configuration.
    ///
    /// Background flush failures on any channel are re-logged onto the
    /// error channel, which reports its own failures to itself.
    pub fn new(config: Config) -> Self {
        let info = Arc::new(ChannelWriter::new(config.channel(Level::Info)));
        let error = Arc::new(ChannelWriter::new(config.channel(Level::Error)));
        let trace = Arc::new(ChannelWriter::new(config.channel(Level::Trace)));

        let relay = Arc::downgrade(&error);
        info.set_failure_relay(relay.clone());
        error.set_failure_relay(relay.clone());
        trace.set_failure_relay(relay);

        info!(base_dir = %config.base_dir.display(), mode = ?config.mode, "log dispatcher ready");
        Self { info, error, trace }
    }

    /// Write a line to the info channel.
    pub async fn info(&self, message: &str, durable: bool) -> Result<(), QuillError> {
        self.info.emit(message, durable).await
    }

    /// Write an error value to the error channel. Anything `Display` is
    /// accepted and stringified into the message.
    pub async fn error(&self, error: impl fmt::Display, durable: bool) -> Result<(), QuillError> {
        self.error.emit(&error.to_string(), durable).await
    }

    /// Write a line to the trace channel.
    pub async fn trace(&self, message: &str, durable: bool) -> Result<(), QuillError> {
        self.trace.emit(message, durable).await
    }

    /// Durably flush every channel's buffer without closing any sink.
    ///
    /// Channels are locked one at a time in a fixed order (info, error,
    /// trace), never two at once. Every channel is attempted even when an
    /// earlier one fails; the first failure is returned.
    pub async fn flush_all(&self) -> Result<(), QuillError> {
        let mut first_failure = None;
        for channel in [&self.info, &self.error, &self.trace] {
            if let Err(err) = channel.flush_pending().await {
                warn!(channel = %channel.level(), error = %err, "flush failed");
                first_failure.get_or_insert(err);
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Gracefully shut the dispatcher down.
    ///
    /// Stops each channel's flush timer, drains its buffer and closes its
    /// sink. Every channel is attempted even when an earlier one fails;
    /// the first failure is returned.
    pub async fn close(self) -> Result<(), QuillError> {
        let mut first_failure = None;
        for channel in [&self.info, &self.error, &self.trace] {
            if let Err(err) = channel.close().await {
                warn!(channel = %channel.level(), error = %err, "close failed");
                first_failure.get_or_insert(err);
            }
        }
        info!("log dispatcher closed");
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
