//! Quill Core Library
//!
//! Buffered, size-and-date-rotating log writing over three fixed severity
//! channels (info, error, trace).
//!
//! ## Overview
//!
//! Each channel batches formatted lines in memory and flushes them to a
//! per-day file under its own directory. Callers choose per line whether
//! to wait for durability:
//!
//! - **Durable emit** bypasses the buffer and awaits the write; every
//!   failure surfaces to the caller.
//! - **Buffered emit** only queues the line. It reaches disk when the
//!   batch fills, when the channel's flush timer fires, or on an explicit
//!   flush; failures on those paths are re-logged to the error channel
//!   instead of crashing anything.
//!
//! Files rotate on date change (`<dir>/<YYYYMMDD>.log`) and, when a size
//! cap is configured, on size — either truncating in place or renaming
//! the full file to a numbered backup.
//!
//! ## Quick Start
//!
//! ```ignore
//! use quill_core::{Config, Dispatcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let logs = Dispatcher::new(Config::from_env("./logs"));
//!
//!     logs.info("service started", true).await?;
//!     logs.trace("cache warmed", false).await?;
//!     logs.error("listener lost its socket", false).await?;
//!
//!     logs.flush_all().await?;
//!     logs.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod sink;

// Re-exports
pub use channel::{ChannelWriter, Level};
pub use config::{ChannelConfig, Config, Mode};
pub use dispatcher::Dispatcher;
pub use error::QuillError;
pub use sink::FileSink;
