//! Per-pass view of one StrataCluster resource.
//!
//! A [`ClusterScope`] is constructed from a freshly fetched resource at the
//! start of every reconcile pass and shared by all components of that pass.
//! Conditions are written read-modify-write: the scope keeps the full
//! condition list fetched at pass start, upserts into it, and writes the
//! whole set back, so condition types owned by other writers survive.

use std::sync::{Arc, RwLock};

use kube::ResourceExt;
use tracing::debug;

use strata_common::crd::{
    ClusterState, Condition, StrataCluster, StrataClusterSpec, StrataClusterStatus, UpdateState,
};
use strata_common::Result;

use crate::platform::PlatformClient;

/// Shared, pass-scoped handle to the cluster resource and its status.
pub struct ClusterScope {
    name: String,
    namespace: String,
    spec: StrataClusterSpec,
    generation: Option<i64>,
    status: RwLock<StrataClusterStatus>,
    platform: Arc<dyn PlatformClient>,
}

impl ClusterScope {
    /// Build a scope from a freshly fetched resource.
    pub fn new(cluster: &StrataCluster, platform: Arc<dyn PlatformClient>) -> Self {
        Self {
            name: cluster.name_any(),
            namespace: cluster.namespace().unwrap_or_else(|| "default".to_string()),
            spec: cluster.spec.clone(),
            generation: cluster.metadata.generation,
            status: RwLock::new(cluster.status.clone().unwrap_or_default()),
            platform,
        }
    }

    /// Cluster resource name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace all owned objects live in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The declared spec for this pass
    pub fn spec(&self) -> &StrataClusterSpec {
        &self.spec
    }

    /// Current coarse cluster state
    pub fn state(&self) -> ClusterState {
        self.status.read().expect("status lock").cluster_state
    }

    /// Current update sub-phase, if any
    pub fn update_state(&self) -> Option<UpdateState> {
        self.status.read().expect("status lock").update_state
    }

    /// True when starting a disruptive update is permitted
    pub fn update_permitted(&self) -> bool {
        self.state().permits_update()
    }

    /// True when the given condition type is currently True
    pub fn is_condition_true(&self, type_: &str) -> bool {
        self.status
            .read()
            .expect("status lock")
            .is_condition_true(type_)
    }

    /// Upsert a condition and persist the full status.
    ///
    /// The local copy is updated first so later steps of the same pass
    /// observe the write; the next pass re-reads it from the resource.
    pub async fn set_condition(&self, condition: Condition) -> Result<()> {
        debug!(
            cluster = %self.name,
            condition = %condition.type_,
            status = ?condition.status,
            "setting cluster condition"
        );
        let status = {
            let mut status = self.status.write().expect("status lock");
            status.set_condition(condition);
            status.clone()
        };
        self.platform
            .patch_cluster_status(&self.namespace, &self.name, &status)
            .await
    }

    /// Transition the cluster/update state and persist the full status.
    pub async fn set_state(
        &self,
        cluster_state: ClusterState,
        update_state: Option<UpdateState>,
        message: impl Into<String>,
    ) -> Result<()> {
        let status = {
            let mut status = self.status.write().expect("status lock");
            status.cluster_state = cluster_state;
            status.update_state = update_state;
            status.message = Some(message.into());
            status.observed_generation = self.generation;
            status.clone()
        };
        self.platform
            .patch_cluster_status(&self.namespace, &self.name, &status)
            .await
    }

    /// Persist only the human-readable message and observed generation.
    pub async fn set_message(&self, message: impl Into<String>) -> Result<()> {
        let status = {
            let mut status = self.status.write().expect("status lock");
            status.message = Some(message.into());
            status.observed_generation = self.generation;
            status.clone()
        };
        self.platform
            .patch_cluster_status(&self.namespace, &self.name, &status)
            .await
    }

    /// Snapshot of the current (locally updated) status
    pub fn status(&self) -> StrataClusterStatus {
        self.status.read().expect("status lock").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MockPlatformClient;
    use strata_common::crd::ConditionStatus;

    fn cluster() -> StrataCluster {
        let mut cluster = StrataCluster::new("demo", StrataClusterSpec::default());
        cluster.metadata.namespace = Some("strata".to_string());
        cluster
    }

    #[tokio::test]
    async fn set_condition_persists_full_condition_set() {
        let mut resource = cluster();
        resource.status = Some(StrataClusterStatus {
            conditions: vec![Condition::true_("ForeignCondition", "Foreign")],
            ..Default::default()
        });

        let mut platform = MockPlatformClient::new();
        platform
            .expect_patch_cluster_status()
            .withf(|ns, name, status| {
                ns == "strata"
                    && name == "demo"
                    && status.is_condition_true("ForeignCondition")
                    && status.is_condition_true("MasterExitedReadOnly")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let scope = ClusterScope::new(&resource, Arc::new(platform));
        scope
            .set_condition(Condition::true_("MasterExitedReadOnly", "Test"))
            .await
            .unwrap();

        // Later steps of the same pass observe the write
        assert!(scope.is_condition_true("MasterExitedReadOnly"));
    }

    #[tokio::test]
    async fn set_state_updates_local_view() {
        let mut platform = MockPlatformClient::new();
        platform
            .expect_patch_cluster_status()
            .returning(|_, _, _| Ok(()));

        let scope = ClusterScope::new(&cluster(), Arc::new(platform));
        assert_eq!(scope.state(), ClusterState::Created);

        scope
            .set_state(
                ClusterState::Updating,
                Some(UpdateState::WaitingForPodsRemoval),
                "update started",
            )
            .await
            .unwrap();

        assert_eq!(scope.state(), ClusterState::Updating);
        assert_eq!(
            scope.update_state(),
            Some(UpdateState::WaitingForPodsRemoval)
        );
        assert!(!scope.update_permitted());
    }

    #[test]
    fn condition_status_false_is_not_true() {
        let mut resource = cluster();
        resource.status = Some(StrataClusterStatus {
            conditions: vec![Condition::new(
                "MasterExitReadOnlyPrepared",
                ConditionStatus::False,
                "Reset",
                "armed for next cycle",
            )],
            ..Default::default()
        });
        let scope = ClusterScope::new(&resource, Arc::new(MockPlatformClient::new()));
        assert!(!scope.is_condition_true("MasterExitReadOnlyPrepared"));
    }
}
