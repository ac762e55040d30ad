//! Shared CRD value types: cluster/update states, conditions, instance specs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Affinity, Toleration};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Coarse phase of the whole cluster
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ClusterState {
    /// Resource was created; components are converging for the first time
    #[default]
    Created,
    /// Steady state: all components reconciled and ready
    Running,
    /// A cluster-wide rolling update is in progress
    Updating,
}

impl ClusterState {
    /// True when starting a disruptive update is permitted from this state.
    ///
    /// Updates are only started from steady state; a cluster that is still
    /// bootstrapping applies spec changes directly.
    pub fn permits_update(&self) -> bool {
        matches!(self, ClusterState::Running)
    }
}

impl std::fmt::Display for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::Updating => write!(f, "Updating"),
        }
    }
}

/// Sub-phase of a cluster-wide update, meaningful only while
/// `ClusterState::Updating`
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum UpdateState {
    /// Stale pods of updatable components are being scaled away
    WaitingForPodsRemoval,
    /// Workloads are being re-applied and pods recreated
    WaitingForPodsCreation,
    /// Master quorums must exit read-only mode before the update finishes
    WaitingForMasterExitReadOnly,
}

impl std::fmt::Display for UpdateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WaitingForPodsRemoval => write!(f, "WaitingForPodsRemoval"),
            Self::WaitingForPodsCreation => write!(f, "WaitingForPodsCreation"),
            Self::WaitingForMasterExitReadOnly => write!(f, "WaitingForMasterExitReadOnly"),
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

/// Kubernetes-style condition for status reporting
///
/// Conditions are the only durable cross-pass state the orchestrator relies
/// on. They are read back from the resource on every pass and written with
/// read-modify-write upsert semantics keyed by `type`.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., MasterExitedReadOnly)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// Convenience constructor for a True condition
    pub fn true_(type_: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let message = reason.clone();
        Self::new(type_, ConditionStatus::True, reason, message)
    }

    /// Convenience constructor for a False condition
    pub fn false_(type_: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let message = reason.clone();
        Self::new(type_, ConditionStatus::False, reason, message)
    }
}

/// Upsert a condition into an ordered condition list, keyed by `type`.
///
/// The list order is preserved and unknown condition types are left
/// untouched. The transition timestamp is only refreshed when the status
/// actually changes, so repeated identical writes do not churn the resource.
pub fn upsert_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status {
                existing.reason = condition.reason;
                existing.message = condition.message;
            } else {
                *existing = condition;
            }
        }
        None => conditions.push(condition),
    }
}

/// True when the list contains `type_` with status True
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    conditions
        .iter()
        .any(|c| c.type_ == type_ && c.status == ConditionStatus::True)
}

/// Per-role instance configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    /// Desired number of instances
    pub replicas: i32,

    /// Image override for this role; defaults to `spec.coreImage`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Node selector applied to the pod template
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Tolerations applied to the pod template
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    /// Affinity applied to the pod template; placement pinning is merged
    /// into this, never replacing it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Extra labels added to pods of this role
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_pod_labels: BTreeMap<String, String>,

    /// Extra annotations added to pods of this role
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_pod_annotations: BTreeMap<String, String>,
}

/// Master cell specification (primary or secondary)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MastersSpec {
    /// Cell tag distinguishing this master cell in the quorum topology
    pub cell_tag: u16,

    /// Instance configuration
    pub instance: InstanceSpec,

    /// Physical hosts the cell members must schedule onto. Masters are
    /// addressed by fixed network identity across restarts; pinning keeps
    /// each replica on a stable host. Empty list disables pinning.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_addresses: Vec<String>,

    /// Placement-label key used to match `host_addresses`; defaults to the
    /// cluster-wide setting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_address_label: Option<String>,
}

/// Master cache specification
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MasterCachesSpec {
    /// Instance configuration
    pub instance: InstanceSpec,

    /// Optional host pinning, same semantics as masters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_addresses: Vec<String>,

    /// Placement-label key override for `host_addresses`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_address_label: Option<String>,
}

/// A named pool of node instances (data/exec/tablet)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpec {
    /// Pool name; omitted for the default pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Instance configuration
    pub instance: InstanceSpec,
}

/// Topology awareness configuration
///
/// Presence of this block enables the rack/datacenter synchronizer.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RackAwarenessSpec {
    /// Pod label carrying the rack name (propagated from the physical node)
    pub rack_label: String,

    /// Pod label carrying the datacenter name; optional
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter_label: Option<String>,
}
