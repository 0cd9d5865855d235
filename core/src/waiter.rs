//! Condition-wait state machine.
//!
//! Waiting on `tilt wait` alone is a trap: a resource that is disabled or
//! permanently failed never reaches its condition, so the caller would block
//! for the full timeout and learn nothing. The waiter classifies a fresh
//! status snapshot first and only falls through to the blocking wait when
//! the resource can still converge.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{ResourceStatusSnapshot, RuntimeStatus, UpdateStatus, WaitOutcome};

/// Condition waited on when the caller does not name one.
pub const DEFAULT_CONDITION: &str = "Ready";

/// Condition reasons that cannot clear without operator intervention.
const TERMINAL_REASONS: &[&str] = &["UpdateError", "RuntimeError", "Error"];

/// Where the control plane's status reads and blocking waits come from.
///
/// `TiltClient` is the production implementation; tests substitute a stub so
/// the state machine runs without a control plane.
#[async_trait]
pub trait StatusSource {
    /// Reads a fresh snapshot; `None` when the resource cannot be read.
    async fn read_status(&self, name: &str) -> Result<Option<ResourceStatusSnapshot>>;

    /// Blocks until the condition holds or the timeout expires.
    async fn block_until(
        &self,
        name: &str,
        condition: &str,
        timeout_secs: u64,
    ) -> Result<BlockOutcome>;
}

/// Result of the control plane's native blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Reached,
    TimedOut,
}

/// Pre-check verdict for one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    AlreadyMet,
    Disabled,
    TerminalFailure(String),
    Proceed,
}

/// Classifies a snapshot against the wait condition.
///
/// Rules apply in fixed priority order: disabled short-circuits everything
/// (a disabled resource can never converge, whatever else its status says),
/// then an already-met condition, then terminal update/runtime failures.
/// An absent condition is treated exactly like an unmet one.
pub fn classify(snapshot: &ResourceStatusSnapshot, condition: &str) -> Disposition {
    if snapshot.is_disabled {
        return Disposition::Disabled;
    }

    let state = snapshot.conditions.get(condition);
    if state.map(|c| c.met).unwrap_or(false) {
        return Disposition::AlreadyMet;
    }

    let terminal_reason = state
        .and_then(|c| c.reason.as_deref())
        .map(|r| TERMINAL_REASONS.contains(&r))
        .unwrap_or(false);
    if terminal_reason || snapshot.update_status == UpdateStatus::Error {
        let reason = snapshot.last_build_error.clone().unwrap_or_else(|| {
            format!("update status is {}", snapshot.update_status.as_str())
        });
        return Disposition::TerminalFailure(reason);
    }

    if snapshot.runtime_status == RuntimeStatus::Error {
        return Disposition::TerminalFailure(format!(
            "resource {} runtime is in error state",
            snapshot.name
        ));
    }

    Disposition::Proceed
}

/// Waits for `name` to reach `condition`, bounded by `timeout_secs`.
///
/// A resource that cannot be read at all is a hard error, not an outcome.
/// On a blocking-wait timeout the snapshot is re-read so the caller sees the
/// final state instead of a bare timeout.
pub async fn wait<S: StatusSource + Sync>(
    source: &S,
    name: &str,
    condition: &str,
    timeout_secs: u64,
) -> Result<WaitOutcome> {
    let snapshot = source
        .read_status(name)
        .await?
        .ok_or_else(|| Error::ResourceNotFound(name.to_string()))?;

    match classify(&snapshot, condition) {
        Disposition::Disabled => Ok(WaitOutcome::Disabled),
        Disposition::AlreadyMet => Ok(WaitOutcome::AlreadyMet),
        Disposition::TerminalFailure(reason) => Ok(WaitOutcome::TerminalFailure { reason }),
        Disposition::Proceed => match source.block_until(name, condition, timeout_secs).await? {
            BlockOutcome::Reached => Ok(WaitOutcome::Reached),
            BlockOutcome::TimedOut => {
                let last = source.read_status(name).await?;
                Ok(WaitOutcome::TimedOut { last })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConditionState;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(name: &str) -> ResourceStatusSnapshot {
        ResourceStatusSnapshot {
            name: name.to_string(),
            runtime_status: RuntimeStatus::Ok,
            update_status: UpdateStatus::Ok,
            conditions: HashMap::new(),
            last_build_error: None,
            is_disabled: false,
        }
    }

    fn with_condition(
        mut snap: ResourceStatusSnapshot,
        condition: &str,
        met: bool,
        reason: Option<&str>,
    ) -> ResourceStatusSnapshot {
        snap.conditions.insert(
            condition.to_string(),
            ConditionState {
                met,
                reason: reason.map(String::from),
            },
        );
        snap
    }

    struct StubSource {
        snapshot: Option<ResourceStatusSnapshot>,
        block_outcome: BlockOutcome,
        read_calls: AtomicUsize,
        block_calls: AtomicUsize,
    }

    impl StubSource {
        fn new(snapshot: Option<ResourceStatusSnapshot>, block_outcome: BlockOutcome) -> Self {
            Self {
                snapshot,
                block_outcome,
                read_calls: AtomicUsize::new(0),
                block_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StatusSource for StubSource {
        async fn read_status(&self, _name: &str) -> Result<Option<ResourceStatusSnapshot>> {
            self.read_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.snapshot.clone())
        }

        async fn block_until(
            &self,
            _name: &str,
            _condition: &str,
            _timeout_secs: u64,
        ) -> Result<BlockOutcome> {
            self.block_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.block_outcome)
        }
    }

    #[tokio::test]
    async fn test_already_met_is_idempotent_and_never_blocks() {
        let snap = with_condition(snapshot("api"), "Ready", true, None);
        let source = StubSource::new(Some(snap), BlockOutcome::Reached);

        for _ in 0..2 {
            let outcome = wait(&source, "api", "Ready", 30).await.unwrap();
            assert_eq!(outcome, WaitOutcome::AlreadyMet);
        }
        assert_eq!(source.block_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_takes_priority_over_terminal_failure() {
        let mut snap = with_condition(snapshot("api"), "Ready", false, Some("UpdateError"));
        snap.update_status = UpdateStatus::Error;
        snap.is_disabled = true;
        let source = StubSource::new(Some(snap), BlockOutcome::Reached);

        let outcome = wait(&source, "api", "Ready", 30).await.unwrap();
        assert_eq!(outcome, WaitOutcome::Disabled);
        assert_eq!(source.block_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_error_fails_fast() {
        let mut snap = with_condition(snapshot("api"), "Ready", false, Some("UpdateError"));
        snap.update_status = UpdateStatus::Error;
        snap.last_build_error = Some("step 3 failed".to_string());
        let source = StubSource::new(Some(snap), BlockOutcome::Reached);

        let outcome = wait(&source, "api", "Ready", 30).await.unwrap();
        assert_eq!(
            outcome,
            WaitOutcome::TerminalFailure {
                reason: "step 3 failed".to_string()
            }
        );
        assert_eq!(source.block_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_status_error_without_reason_fails_fast() {
        let mut snap = snapshot("api");
        snap.update_status = UpdateStatus::Error;
        let source = StubSource::new(Some(snap), BlockOutcome::Reached);

        let outcome = wait(&source, "api", "Ready", 30).await.unwrap();
        assert_eq!(
            outcome,
            WaitOutcome::TerminalFailure {
                reason: "update status is error".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_runtime_error_fails_fast() {
        let mut snap = snapshot("api");
        snap.runtime_status = RuntimeStatus::Error;
        let source = StubSource::new(Some(snap), BlockOutcome::Reached);

        let outcome = wait(&source, "api", "Ready", 30).await.unwrap();
        assert!(matches!(outcome, WaitOutcome::TerminalFailure { .. }));
    }

    #[tokio::test]
    async fn test_converging_resource_blocks_and_reaches() {
        let snap = with_condition(snapshot("api"), "Ready", false, None);
        let source = StubSource::new(Some(snap), BlockOutcome::Reached);

        let outcome = wait(&source, "api", "Ready", 30).await.unwrap();
        assert_eq!(outcome, WaitOutcome::Reached);
        assert_eq!(source.block_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_rereads_snapshot() {
        let snap = with_condition(snapshot("api"), "Ready", false, None);
        let source = StubSource::new(Some(snap.clone()), BlockOutcome::TimedOut);

        let outcome = wait(&source, "api", "Ready", 5).await.unwrap();
        match outcome {
            WaitOutcome::TimedOut { last } => assert_eq!(last, Some(snap)),
            other => panic!("unexpected outcome: {other:?}"),
        }
        // One read for the pre-check, one to enrich the timeout.
        assert_eq!(source.read_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unreadable_resource_is_a_hard_error() {
        let source = StubSource::new(None, BlockOutcome::Reached);
        let err = wait(&source, "ghost", "Ready", 30).await.unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn test_absent_condition_proceeds_like_unmet() {
        // Snapshot has no "Ready" key at all; that must behave exactly like
        // an unmet condition with no terminal reason.
        let source = StubSource::new(Some(snapshot("api")), BlockOutcome::Reached);
        let outcome = wait(&source, "api", "Ready", 30).await.unwrap();
        assert_eq!(outcome, WaitOutcome::Reached);
    }

    #[test]
    fn test_non_terminal_reason_proceeds() {
        let snap = with_condition(snapshot("api"), "Ready", false, Some("Building"));
        assert_eq!(classify(&snap, "Ready"), Disposition::Proceed);
    }
}
