//! StrataCluster Custom Resource Definition
//!
//! A StrataCluster declares one complete storage-and-compute cluster: the
//! master quorum, caches, node pools, proxies and agents. The operator
//! reconciles every declared role as an independent component.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    is_condition_true, upsert_condition, ClusterState, Condition, InstanceSpec, MasterCachesSpec,
    MastersSpec, PoolSpec, RackAwarenessSpec, UpdateState,
};

/// Specification for a StrataCluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "strata.io",
    version = "v1alpha1",
    kind = "StrataCluster",
    plural = "strataclusters",
    shortname = "sc",
    status = "StrataClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.clusterState"}"#,
    printcolumn = r#"{"name":"UpdateState","type":"string","jsonPath":".status.updateState"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StrataClusterSpec {
    /// Image used for all server roles unless overridden per instance spec
    pub core_image: String,

    /// Primary master cell (the quorum that owns the metadata catalog root)
    pub masters: MastersSpec,

    /// Additional master cells
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_masters: Vec<MastersSpec>,

    /// Master caches offloading read traffic from the quorum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_caches: Option<MasterCachesSpec>,

    /// Data node pools (chunk storage)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_nodes: Vec<PoolSpec>,

    /// Exec node pools (job execution)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exec_nodes: Vec<PoolSpec>,

    /// Tablet node pools (dynamic tables)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tablet_nodes: Vec<PoolSpec>,

    /// HTTP proxies (user-facing API endpoint)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxies: Option<InstanceSpec>,

    /// RPC proxies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_proxies: Option<InstanceSpec>,

    /// Controller agents (operation scheduling)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents: Option<InstanceSpec>,

    /// Topology awareness; presence enables the rack/datacenter synchronizer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack_awareness: Option<RackAwarenessSpec>,

    /// Cluster-wide default placement-label key for host pinning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_address_label: Option<String>,
}

impl StrataClusterSpec {
    /// Validate the cluster specification
    pub fn validate(&self, cluster_name: &str) -> Result<(), crate::Error> {
        if self.core_image.is_empty() {
            return Err(crate::Error::validation_for_field(
                cluster_name,
                "spec.coreImage",
                "coreImage cannot be empty",
            ));
        }

        if self.masters.instance.replicas < 1 {
            return Err(crate::Error::validation_for_field(
                cluster_name,
                "spec.masters.instance.replicas",
                "master quorum needs at least one replica",
            ));
        }

        if !self.masters.host_addresses.is_empty()
            && self.masters.host_addresses.len() < self.masters.instance.replicas as usize
        {
            return Err(crate::Error::validation_for_field(
                cluster_name,
                "spec.masters.hostAddresses",
                "pinned host list is shorter than the replica count",
            ));
        }

        let mut cell_tags = vec![self.masters.cell_tag];
        for sm in &self.secondary_masters {
            if cell_tags.contains(&sm.cell_tag) {
                return Err(crate::Error::validation_for_field(
                    cluster_name,
                    "spec.secondaryMasters",
                    format!("duplicate cell tag {}", sm.cell_tag),
                ));
            }
            cell_tags.push(sm.cell_tag);
        }

        Ok(())
    }
}

/// Status for a StrataCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StrataClusterStatus {
    /// Coarse phase of the whole cluster
    #[serde(default)]
    pub cluster_state: ClusterState,

    /// Sub-phase of a cluster-wide update; set only while Updating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_state: Option<UpdateState>,

    /// Conditions: the only durable cross-pass coordination state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// The generation of the spec last processed by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StrataClusterStatus {
    /// Upsert a condition by type, preserving order and foreign types
    pub fn set_condition(&mut self, condition: Condition) {
        upsert_condition(&mut self.conditions, condition);
    }

    /// True when the given condition type is present with status True
    pub fn is_condition_true(&self, type_: &str) -> bool {
        is_condition_true(&self.conditions, type_)
    }
}
