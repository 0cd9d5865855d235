//! Tilt CLI client.
//!
//! Every operation follows the same shape: resolve the config file to the
//! internal API port, establish a scoped forwarding session, run one `tilt`
//! subcommand against the (possibly forwarded) web port, and tear the
//! session down on every exit path. Nothing is cached between operations.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::ConfigLocator;
use crate::error::{Error, Result};
use crate::forward::{ForwardSettings, ForwardingSession};
use crate::logs;
use crate::models::{
    ResourceStatusSnapshot, ResourceSummary, UiResource, UiResourceList, WaitOutcome,
};
use crate::waiter::{self, BlockOutcome, StatusSource};

/// Default paths to search for the tilt binary.
const TILT_PATHS: &[&str] = &[
    "/opt/homebrew/bin/tilt", // Apple Silicon
    "/usr/local/bin/tilt",    // Intel Mac / Homebrew
    "/usr/bin/tilt",          // System
];

/// Default paths to search for socat.
const SOCAT_PATHS: &[&str] = &[
    "/opt/homebrew/bin/socat",
    "/usr/local/bin/socat",
    "/usr/bin/socat",
];

/// Execution deadline for ordinary tilt commands.
const TILT_TIMEOUT: Duration = Duration::from_secs(30);

/// Headroom added to a blocking wait's own timeout before we cut it off.
const WAIT_DEADLINE_MARGIN: Duration = Duration::from_secs(10);

// Tilt's error vocabulary is not formally specified; these patterns are the
// observed contract, kept in one place so a vocabulary change is a one-line
// fix.
const NOT_FOUND_PATTERNS: &[&str] = &["not found", "no such resource"];
const WAIT_TIMEOUT_PATTERNS: &[&str] = &["timed out", "timeout"];

// ============================================================================
// Failure Classification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    NotFound,
    WaitTimeout,
    Other,
}

/// A non-zero tilt exit, classified against the pattern lists above.
#[derive(Debug)]
struct TiltFailure {
    kind: FailureKind,
    stderr: String,
}

impl TiltFailure {
    fn classify(stderr: String) -> Self {
        let lower = stderr.to_lowercase();
        let kind = if NOT_FOUND_PATTERNS.iter().any(|p| lower.contains(p)) {
            FailureKind::NotFound
        } else if WAIT_TIMEOUT_PATTERNS.iter().any(|p| lower.contains(p)) {
            FailureKind::WaitTimeout
        } else {
            FailureKind::Other
        };
        Self {
            kind,
            stderr: stderr.trim().to_string(),
        }
    }

    /// Converts to an error for an operation targeting a named resource.
    fn into_error_for(self, resource: &str) -> Error {
        match self.kind {
            FailureKind::NotFound => Error::ResourceNotFound(resource.to_string()),
            _ => Error::CommandFailed(self.stderr),
        }
    }

    fn into_error(self) -> Error {
        Error::CommandFailed(self.stderr)
    }
}

// ============================================================================
// Client
// ============================================================================

/// Client for a single Tilt instance, addressed by its web port.
pub struct TiltClient {
    tilt_path: PathBuf,
    socat_path: Option<PathBuf>,
    web_port: u16,
    locator: ConfigLocator,
}

impl TiltClient {
    /// Creates a client for the given web port, discovering binaries on the
    /// usual paths (falling back to PATH resolution for tilt).
    pub fn new(web_port: u16) -> Result<Self> {
        Ok(Self {
            tilt_path: find_executable(TILT_PATHS).unwrap_or_else(|| PathBuf::from("tilt")),
            socat_path: find_executable(SOCAT_PATHS),
            web_port,
            locator: ConfigLocator::new()?,
        })
    }

    /// Creates a client with explicit binary paths and config locator.
    pub fn with_paths(
        tilt_path: PathBuf,
        socat_path: Option<PathBuf>,
        web_port: u16,
        locator: ConfigLocator,
    ) -> Self {
        Self {
            tilt_path,
            socat_path,
            web_port,
            locator,
        }
    }

    /// Returns the web port this client talks to.
    pub fn web_port(&self) -> u16 {
        self.web_port
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Lists enabled resources.
    pub async fn resources(&self) -> Result<Vec<ResourceSummary>> {
        let out = self
            .invoke(&["get", "uiresource", "-o", "json"])
            .await?
            .map_err(TiltFailure::into_error)?;
        let list: UiResourceList =
            serde_json::from_str(&out).map_err(|e| Error::ParseFailed(e.to_string()))?;
        Ok(list.into_summaries())
    }

    /// Fetches logs for one resource, optionally filtered by a
    /// case-insensitive regex, tail-truncated to `tail` lines (0 = all).
    ///
    /// The filter is validated before any tilt call.
    pub async fn logs(&self, name: &str, filter: Option<&str>, tail: usize) -> Result<String> {
        let filter = filter.map(logs::build_filter).transpose()?;
        let out = self
            .invoke(&["logs", name])
            .await?
            .map_err(|f| f.into_error_for(name))?;
        Ok(logs::select_lines(&out, filter.as_ref(), tail))
    }

    /// Describes one resource in tilt's human-readable format.
    pub async fn describe(&self, name: &str) -> Result<String> {
        self.invoke(&["describe", "uiresource", name])
            .await?
            .map_err(|f| f.into_error_for(name))
    }

    /// Triggers a rebuild/update of one resource. Returns tilt's output.
    pub async fn trigger(&self, name: &str) -> Result<String> {
        self.invoke(&["trigger", name])
            .await?
            .map_err(|f| f.into_error_for(name))
    }

    /// Enables resources; with `only`, disables every other resource.
    pub async fn enable(&self, names: &[String], only: bool) -> Result<String> {
        require_names(names)?;
        let mut args = vec!["enable"];
        if only {
            args.push("--only");
        }
        args.extend(names.iter().map(String::as_str));
        self.invoke(&args).await?.map_err(TiltFailure::into_error)
    }

    /// Disables resources.
    pub async fn disable(&self, names: &[String]) -> Result<String> {
        require_names(names)?;
        let mut args = vec!["disable"];
        args.extend(names.iter().map(String::as_str));
        self.invoke(&args).await?.map_err(TiltFailure::into_error)
    }

    /// Waits for a resource to reach a condition. See [`waiter::wait`].
    pub async fn wait_for(
        &self,
        name: &str,
        condition: &str,
        timeout_secs: u64,
    ) -> Result<WaitOutcome> {
        waiter::wait(self, name, condition, timeout_secs).await
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    async fn invoke(&self, args: &[&str]) -> Result<std::result::Result<String, TiltFailure>> {
        self.invoke_with_deadline(args, TILT_TIMEOUT).await
    }

    /// Resolves config, establishes scoped forwarding, runs tilt, and tears
    /// the session down regardless of how the command went.
    async fn invoke_with_deadline(
        &self,
        args: &[&str],
        deadline: Duration,
    ) -> Result<std::result::Result<String, TiltFailure>> {
        let (context, api_port) = self.locator.resolve(self.web_port)?;
        let settings = ForwardSettings::from_env();
        let mut session =
            ForwardingSession::establish(self.socat_path.as_deref(), &settings, self.web_port, api_port)
                .await?;

        tracing::debug!(
            context = %context,
            forwarding = session.is_forwarding(),
            command = ?args,
            "invoking tilt"
        );
        let result = self.execute(args, deadline).await;
        session.shutdown().await;
        result
    }

    async fn execute(
        &self,
        args: &[&str],
        deadline: Duration,
    ) -> Result<std::result::Result<String, TiltFailure>> {
        let port = self.web_port.to_string();
        let result = timeout(deadline, async {
            let output = Command::new(&self.tilt_path)
                .args(args)
                .args(["--host", "127.0.0.1", "--port", &port])
                .output()
                .await?;
            Ok::<_, std::io::Error>(output)
        })
        .await;

        match result {
            Ok(Ok(output)) => {
                if output.status.success() {
                    String::from_utf8(output.stdout)
                        .map(Ok)
                        .map_err(|e| Error::ParseFailed(e.to_string()))
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                    Ok(Err(TiltFailure::classify(stderr)))
                }
            }
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Timeout),
        }
    }
}

#[async_trait]
impl StatusSource for TiltClient {
    /// One status query per call; never cached. Query failures and
    /// malformed output both collapse to `None`, with the underlying cause
    /// logged so the two remain distinguishable in the logs.
    async fn read_status(&self, name: &str) -> Result<Option<ResourceStatusSnapshot>> {
        let out = match self.invoke(&["get", "uiresource", name, "-o", "json"]).await? {
            Ok(out) => out,
            Err(failure) => {
                tracing::warn!(resource = name, stderr = %failure.stderr, "status read failed");
                return Ok(None);
            }
        };
        match serde_json::from_str::<UiResource>(&out) {
            Ok(resource) => Ok(Some(resource.into_snapshot())),
            Err(e) => {
                tracing::warn!(resource = name, error = %e, "status output unparseable");
                Ok(None)
            }
        }
    }

    async fn block_until(
        &self,
        name: &str,
        condition: &str,
        timeout_secs: u64,
    ) -> Result<BlockOutcome> {
        let selector = format!("uiresource/{name}");
        let for_flag = format!("--for=condition={condition}");
        let timeout_flag = format!("--timeout={timeout_secs}s");
        // timeout_secs is caller-supplied and unbounded; keep the addition
        // from overflowing.
        let deadline = Duration::from_secs(timeout_secs).saturating_add(WAIT_DEADLINE_MARGIN);

        match self
            .invoke_with_deadline(&["wait", &selector, &for_flag, &timeout_flag], deadline)
            .await?
        {
            Ok(_) => Ok(BlockOutcome::Reached),
            Err(failure) => match failure.kind {
                FailureKind::NotFound => Err(Error::ResourceNotFound(name.to_string())),
                FailureKind::WaitTimeout => Ok(BlockOutcome::TimedOut),
                FailureKind::Other => Err(Error::CommandFailed(failure.stderr)),
            },
        }
    }
}

fn require_names(names: &[String]) -> Result<()> {
    if names.is_empty() {
        return Err(Error::InvalidArgument(
            "at least one resource name must be provided".to_string(),
        ));
    }
    Ok(())
}

/// Finds an executable in the given paths.
fn find_executable(paths: &[&str]) -> Option<PathBuf> {
    paths.iter().map(PathBuf::from).find(|p| p.exists())
}
