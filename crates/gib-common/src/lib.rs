//! GIB Sync Common Library
//!
//! Pieces shared by every binary in the workspace.
//!
//! - **Logging**: `tracing` subscriber setup driven by `LogConfig`
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel, LogOutput, LoggingGuard};
