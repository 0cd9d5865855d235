//! tilt-mcp Core Library
//!
//! Bridges MCP tools to a running Tilt instance. Provides functionality to:
//! - Resolve the Tilt config file to the instance's internal API port
//! - Transparently relay traffic across network namespaces via socat
//! - List resources, fetch filtered logs, trigger, enable, and disable
//! - Wait for resource conditions without blocking on dead-end states
//!
//! Tilt itself does all the orchestration; this crate only observes and
//! steers it through the `tilt` CLI.

pub mod client;
pub mod config;
pub mod error;
pub mod forward;
pub mod logs;
pub mod models;
pub mod probe;
pub mod waiter;

// Re-export commonly used types
pub use client::TiltClient;
pub use config::{ConfigLocator, DEFAULT_WEB_PORT};
pub use error::{ConfigError, Error, Result};
pub use forward::{ForwardPolicy, ForwardSettings, ForwardingSession};
pub use models::{
    ConditionState, ResourceStatusSnapshot, ResourceSummary, RuntimeStatus, UpdateStatus,
    WaitOutcome,
};
pub use waiter::{StatusSource, DEFAULT_CONDITION};
