//! Port forwarding via socat relay processes.
//!
//! When the MCP server runs in a different network namespace than tilt
//! (typically: the server inside a container, tilt on the host), localhost
//! ports are not shared. This module bridges them by spawning one socat
//! relay per port, listening locally and forwarding to a remote host. Relays
//! live strictly for the span of one operation.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::probe;

/// Bound on the reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Delay before checking that a freshly spawned relay is still alive.
const STARTUP_CHECK_DELAY: Duration = Duration::from_millis(200);

/// Grace period between SIGTERM and SIGKILL on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Environment variable forcing forwarding on or off ("on" | "off" | "auto").
pub const PORT_FORWARD_ENV: &str = "TILT_MCP_PORT_FORWARD";

/// Environment variable marking an isolated network namespace.
pub const IN_CONTAINER_ENV: &str = "TILT_MCP_IN_CONTAINER";

/// Environment variable overriding the remote host relays forward to.
pub const REMOTE_HOST_ENV: &str = "TILT_MCP_REMOTE_HOST";

/// Loopback alias container runtimes expose for the host.
const DEFAULT_REMOTE_HOST: &str = "host.docker.internal";

/// Forwarding policy for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardPolicy {
    /// Always forward, regardless of environment and probe.
    On,
    /// Never forward, regardless of environment and probe.
    Off,
    /// Forward only when isolated and the port is unreachable.
    Auto,
}

impl ForwardPolicy {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "on" | "true" | "1" | "yes" => Self::On,
            "off" | "false" | "0" | "no" => Self::Off,
            _ => Self::Auto,
        }
    }
}

/// Environment-driven forwarding settings for one operation.
///
/// Read fresh per operation, never cached process-wide.
#[derive(Debug, Clone)]
pub struct ForwardSettings {
    pub policy: ForwardPolicy,
    pub in_container: bool,
    pub remote_host: String,
}

impl ForwardSettings {
    /// Reads the three recognized toggles from the environment.
    pub fn from_env() -> Self {
        let policy = std::env::var(PORT_FORWARD_ENV)
            .map(|v| ForwardPolicy::parse(&v))
            .unwrap_or(ForwardPolicy::Auto);
        let in_container = std::env::var(IN_CONTAINER_ENV)
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let remote_host =
            std::env::var(REMOTE_HOST_ENV).unwrap_or_else(|_| DEFAULT_REMOTE_HOST.to_string());

        Self {
            policy,
            in_container,
            remote_host,
        }
    }
}

/// Decides whether forwarding is used for this operation.
///
/// Forced policies ignore the environment flag and probe result entirely;
/// Auto forwards only when the caller is isolated and the port is not
/// already reachable.
pub fn should_forward(policy: ForwardPolicy, in_container: bool, reachable: bool) -> bool {
    match policy {
        ForwardPolicy::On => true,
        ForwardPolicy::Off => false,
        ForwardPolicy::Auto => in_container && !reachable,
    }
}

/// One live socat relay.
#[derive(Debug)]
struct Relay {
    port: u16,
    child: Child,
}

/// The live relay processes backing one forwarded operation.
///
/// Owns its process handles exclusively. Once the session is gone — via
/// [`shutdown`](Self::shutdown), drop, or error unwinding — no relay process
/// remains running. Two concurrent sessions for the same ports may race to
/// bind the same listen address; relays use `reuseaddr` and tilt serializes
/// conflicting operations, so this is accepted rather than locked against.
#[derive(Debug)]
pub struct ForwardingSession {
    relays: Vec<Relay>,
}

impl ForwardingSession {
    /// Establishes forwarding for `web_port` and `api_port` if the settings
    /// and probe call for it; otherwise returns an empty session so the
    /// caller's code path is identical either way.
    ///
    /// On a relay start failure, whatever was already started is torn down
    /// before the error is returned.
    pub async fn establish(
        socat_path: Option<&Path>,
        settings: &ForwardSettings,
        web_port: u16,
        api_port: u16,
    ) -> Result<Self> {
        // The probe only matters for Auto inside an isolated namespace;
        // forced policies and non-isolated callers never consult it.
        let reachable = match settings.policy {
            ForwardPolicy::On | ForwardPolicy::Off => false,
            ForwardPolicy::Auto => {
                settings.in_container
                    && probe::is_reachable("127.0.0.1", web_port, PROBE_TIMEOUT).await
            }
        };

        if !should_forward(settings.policy, settings.in_container, reachable) {
            return Ok(Self { relays: Vec::new() });
        }

        let socat = socat_path.ok_or(Error::SocatNotFound)?;
        tracing::debug!(web_port, api_port, remote = %settings.remote_host, "starting port forward relays");

        let mut session = Self { relays: Vec::new() };
        for port in [web_port, api_port] {
            match spawn_relay(socat, port, &settings.remote_host).await {
                Ok(child) => session.relays.push(Relay { port, child }),
                Err(e) => {
                    session.shutdown().await;
                    return Err(e);
                }
            }
        }
        Ok(session)
    }

    /// Whether this session actually runs relays.
    pub fn is_forwarding(&self) -> bool {
        !self.relays.is_empty()
    }

    /// Process IDs of the live relays.
    pub fn relay_pids(&self) -> Vec<u32> {
        self.relays.iter().filter_map(|r| r.child.id()).collect()
    }

    /// Terminates every relay: graceful signal, bounded wait, then kill.
    ///
    /// Each relay is handled independently; one stubborn process never
    /// short-circuits cleanup of the others.
    pub async fn shutdown(&mut self) {
        for mut relay in self.relays.drain(..) {
            terminate(&mut relay.child).await;
            match timeout(SHUTDOWN_GRACE, relay.child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::warn!(port = relay.port, "relay ignored termination, killing");
                    let _ = relay.child.kill().await;
                }
            }
        }
    }
}

impl Drop for ForwardingSession {
    fn drop(&mut self) {
        // Safety net for cancellation and panics; the normal path drains
        // relays in shutdown(). kill_on_drop on the Command is the backstop
        // for children we never get to signal.
        for relay in &mut self.relays {
            let _ = relay.child.start_kill();
        }
    }
}

/// Sends a graceful termination signal to a relay.
#[cfg(unix)]
async fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    } else {
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

/// Spawns one socat relay bridging localhost:`port` to `remote_host`:`port`
/// and verifies it survives startup.
async fn spawn_relay(socat: &Path, port: u16, remote_host: &str) -> Result<Child> {
    let mut child = Command::new(socat)
        .arg(format!("TCP-LISTEN:{port},fork,reuseaddr"))
        .arg(format!("TCP:{remote_host}:{port}"))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::ForwardStartFailed {
            port,
            detail: format!("failed to spawn socat: {e}"),
        })?;

    // A bad listen address or missing remote makes socat exit immediately;
    // catch that here instead of failing on the first tilt call.
    tokio::time::sleep(STARTUP_CHECK_DELAY).await;
    if let Some(status) = child.try_wait()? {
        let mut detail = String::new();
        if let Some(mut stderr) = child.stderr.take() {
            let _ = stderr.read_to_string(&mut detail).await;
        }
        if detail.trim().is_empty() {
            detail = format!("exited during startup with {status}");
        }
        return Err(Error::ForwardStartFailed {
            port,
            detail: detail.trim().to_string(),
        });
    }

    tracing::debug!(port, remote_host, "relay started");
    Ok(child)
}
