//! Best-effort TCP reachability probe.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

/// Checks whether `host:port` accepts a TCP connection within `deadline`.
///
/// Refused, timed out, and unresolvable all fold into `false`; a successful
/// connection is dropped immediately. This is a heuristic, not a guarantee:
/// the port can change state between the probe and the actual use.
pub async fn is_reachable(host: &str, port: u16, deadline: Duration) -> bool {
    matches!(timeout(deadline, TcpStream::connect((host, port))).await, Ok(Ok(_)))
}
