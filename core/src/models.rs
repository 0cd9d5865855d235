//! Data models for Tilt resources, status snapshots, and wait outcomes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Disable state marker emitted by Tilt for switched-off resources.
const DISABLED_STATE: &str = "Disabled";

/// Condition status marker Tilt uses for a satisfied condition.
const CONDITION_TRUE: &str = "True";

// ============================================================================
// Resource Status Vocabulary
// ============================================================================

/// Runtime status of a Tilt resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeStatus {
    Ok,
    Error,
    Pending,
    NotApplicable,
    None,
    #[serde(other)]
    Unknown,
}

impl RuntimeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Pending => "pending",
            Self::NotApplicable => "not_applicable",
            Self::None => "none",
            Self::Unknown => "unknown",
        }
    }
}

/// Update (build/deploy) status of a Tilt resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Ok,
    Error,
    Pending,
    InProgress,
    None,
    NotApplicable,
    #[serde(other)]
    Unknown,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::None => "none",
            Self::NotApplicable => "not_applicable",
            Self::Unknown => "unknown",
        }
    }
}

// ============================================================================
// Resource Views
// ============================================================================

/// One row of a resource listing, as exposed to MCP callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub status: String,
    #[serde(rename = "updateStatus")]
    pub update_status: String,
}

/// State of one named readiness condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionState {
    pub met: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Normalized view of one resource's status, produced fresh on every read.
///
/// A snapshot has no identity beyond the read that produced it; it is never
/// cached across calls. Conditions Tilt did not report are simply missing
/// keys, which callers must treat the same as "not met".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatusSnapshot {
    pub name: String,
    pub runtime_status: RuntimeStatus,
    pub update_status: UpdateStatus,
    pub conditions: HashMap<String, ConditionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_build_error: Option<String>,
    pub is_disabled: bool,
}

/// Result of one condition-wait invocation. Exactly one variant per call.
///
/// `Disabled` and `TerminalFailure` are expected steady-state outcomes, not
/// errors: a disabled or permanently failed resource can never converge, so
/// the waiter reports that instead of blocking for the full timeout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WaitOutcome {
    /// The condition was already satisfied; no blocking happened.
    AlreadyMet,
    /// The resource is disabled and cannot converge.
    Disabled,
    /// The resource is in a state it cannot leave without intervention.
    TerminalFailure { reason: String },
    /// The condition became true within the timeout.
    Reached,
    /// The blocking wait expired; `last` is the state seen after expiry.
    TimedOut { last: Option<ResourceStatusSnapshot> },
}

// ============================================================================
// tilt CLI JSON Response Parsing
// ============================================================================

/// Response structure for `tilt get uiresource -o json`.
#[derive(Debug, Deserialize)]
pub struct UiResourceList {
    #[serde(default)]
    pub items: Vec<UiResource>,
}

/// A single UIResource object as emitted by the tilt CLI.
#[derive(Debug, Deserialize)]
pub struct UiResource {
    pub metadata: UiResourceMetadata,
    #[serde(default)]
    pub status: UiResourceStatus,
}

#[derive(Debug, Deserialize)]
pub struct UiResourceMetadata {
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiResourceStatus {
    #[serde(default)]
    pub runtime_status: Option<RuntimeStatus>,
    #[serde(default)]
    pub update_status: Option<UpdateStatus>,
    #[serde(default)]
    pub conditions: Vec<UiResourceCondition>,
    #[serde(default)]
    pub disable_status: Option<DisableStatus>,
    #[serde(default)]
    pub build_history: Vec<BuildRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiResourceCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisableStatus {
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BuildRecord {
    #[serde(default)]
    pub error: Option<String>,
}

impl UiResource {
    /// Whether the resource is currently disabled in Tilt.
    pub fn is_disabled(&self) -> bool {
        self.status
            .disable_status
            .as_ref()
            .and_then(|d| d.state.as_deref())
            .map(|s| s == DISABLED_STATE)
            .unwrap_or(false)
    }

    /// Converts the raw object into the normalized status snapshot.
    pub fn into_snapshot(self) -> ResourceStatusSnapshot {
        let is_disabled = self.is_disabled();
        let conditions = self
            .status
            .conditions
            .into_iter()
            .map(|c| {
                (
                    c.condition_type,
                    ConditionState {
                        met: c.status == CONDITION_TRUE,
                        reason: c.reason,
                    },
                )
            })
            .collect();
        // buildHistory is newest-first; the head carries the latest error.
        let last_build_error = self
            .status
            .build_history
            .into_iter()
            .next()
            .and_then(|b| b.error);

        ResourceStatusSnapshot {
            name: self.metadata.name,
            runtime_status: self.status.runtime_status.unwrap_or(RuntimeStatus::Unknown),
            update_status: self.status.update_status.unwrap_or(UpdateStatus::Unknown),
            conditions,
            last_build_error,
            is_disabled,
        }
    }
}

impl UiResourceList {
    /// Converts the tilt response to listing rows, skipping disabled resources.
    pub fn into_summaries(self) -> Vec<ResourceSummary> {
        self.items
            .into_iter()
            .filter(|item| !item.is_disabled())
            .map(|item| ResourceSummary {
                resource_type: item
                    .metadata
                    .labels
                    .get("type")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                name: item.metadata.name,
                status: item
                    .status
                    .runtime_status
                    .unwrap_or(RuntimeStatus::Unknown)
                    .as_str()
                    .to_string(),
                update_status: item
                    .status
                    .update_status
                    .unwrap_or(UpdateStatus::Unknown)
                    .as_str()
                    .to_string(),
            })
            .collect()
    }
}
