//! Cluster-wide rolling-update orchestration.
//!
//! The orchestrator owns two things: the per-component behavior while the
//! cluster is Updating (`handle_updating_state`, delegated to from the
//! shared evaluation ladder) and the pass-level sub-phase advancement
//! (`reconcile_cluster_update`). Both are driven purely by freshly-read
//! Conditions and freshly-computed statuses; nothing survives in memory
//! between passes.
//!
//! Sub-phase flow:
//! WaitingForPodsRemoval -> WaitingForPodsCreation ->
//! WaitingForMasterExitReadOnly -> Running.

use tracing::info;

use strata_common::consts::CONDITION_MASTER_EXITED_READ_ONLY;
use strata_common::crd::{ClusterState, Condition, UpdateState};
use strata_common::Result;

use crate::cluster::ClusterScope;
use crate::components::{ComponentStatus, SyncStatus};
use crate::platform::PlatformClient;
use crate::workload::Workload;

/// Pass-level view of one component, as the orchestrator needs it.
pub struct ComponentSummary {
    /// Component name
    pub name: String,
    /// Participates in cluster-wide updates
    pub updatable: bool,
    /// Condition type recording this component's pods-removed progress
    pub pods_removed_condition: String,
    /// Freshly computed dry-run status
    pub status: SyncStatus,
}

/// What the orchestrator did this pass, for events/logging.
#[derive(Debug, PartialEq, Eq)]
pub enum UpdateTransition {
    /// A cluster-wide update was started
    Started,
    /// The update advanced to a new sub-phase
    Advanced(UpdateState),
    /// The update finished; the cluster is Running again
    Finished,
}

/// Per-component behavior while `ClusterState::Updating`.
///
/// Returns a terminal status to propagate, or `None` when this component
/// has no special update behavior in the current sub-phase and evaluation
/// falls through to the normal ladder. Components that don't participate in
/// updates always fall through.
pub async fn handle_updating_state(
    scope: &ClusterScope,
    platform: &dyn PlatformClient,
    updatable: bool,
    workload: &Workload,
    dry: bool,
) -> Result<Option<ComponentStatus>> {
    if !updatable {
        return Ok(None);
    }

    match scope.update_state() {
        Some(UpdateState::WaitingForPodsRemoval) => {
            if workload.pods_exist() {
                if !dry {
                    workload.remove_pods(platform).await?;
                }
                return Ok(Some(ComponentStatus::waiting(
                    SyncStatus::Updating,
                    "pods removal",
                )));
            }
            let condition = workload.labels().pods_removed_condition();
            if !dry && !scope.is_condition_true(&condition) {
                scope
                    .set_condition(Condition::true_(&condition, "PodsRemoved"))
                    .await?;
            }
            Ok(Some(ComponentStatus::waiting(
                SyncStatus::Updating,
                "pods creation",
            )))
        }
        // Fall through: the normal ladder re-applies the workload and
        // observes pod readiness
        Some(UpdateState::WaitingForPodsCreation) => Ok(None),
        // Non-master components hold here; masters branch into the
        // handshake before reaching this handler
        Some(UpdateState::WaitingForMasterExitReadOnly) => Ok(Some(ComponentStatus::waiting(
            SyncStatus::Updating,
            "master read-only exit",
        ))),
        None => Ok(None),
    }
}

/// Pass-level update orchestration: enter, advance or finish the update.
///
/// Called once per reconcile pass with every component's fresh dry-run
/// status. Returns the transition taken, if any.
pub async fn reconcile_cluster_update(
    scope: &ClusterScope,
    summaries: &[ComponentSummary],
) -> Result<Option<UpdateTransition>> {
    match scope.state() {
        state if state.permits_update() => {
            let needs_update = summaries
                .iter()
                .any(|c| c.updatable && c.status == SyncStatus::NeedFullUpdate);
            if !needs_update {
                return Ok(None);
            }

            // Arm the update: reset progress conditions from any prior cycle
            for component in summaries.iter().filter(|c| c.updatable) {
                scope
                    .set_condition(Condition::false_(
                        &component.pods_removed_condition,
                        "UpdateStarted",
                    ))
                    .await?;
            }
            scope
                .set_condition(Condition::false_(
                    CONDITION_MASTER_EXITED_READ_ONLY,
                    "UpdateStarted",
                ))
                .await?;
            scope
                .set_state(
                    ClusterState::Updating,
                    Some(UpdateState::WaitingForPodsRemoval),
                    "cluster update started",
                )
                .await?;
            info!(cluster = %scope.name(), "cluster update started");
            Ok(Some(UpdateTransition::Started))
        }

        ClusterState::Updating => match scope.update_state() {
            Some(UpdateState::WaitingForPodsRemoval) => {
                let all_removed = summaries
                    .iter()
                    .filter(|c| c.updatable)
                    .all(|c| scope.is_condition_true(&c.pods_removed_condition));
                if !all_removed {
                    return Ok(None);
                }
                scope
                    .set_state(
                        ClusterState::Updating,
                        Some(UpdateState::WaitingForPodsCreation),
                        "stale pods removed; recreating workloads",
                    )
                    .await?;
                Ok(Some(UpdateTransition::Advanced(
                    UpdateState::WaitingForPodsCreation,
                )))
            }

            Some(UpdateState::WaitingForPodsCreation) => {
                let all_recreated = summaries
                    .iter()
                    .filter(|c| c.updatable)
                    .all(|c| c.status == SyncStatus::Ready);
                if !all_recreated {
                    return Ok(None);
                }
                scope
                    .set_state(
                        ClusterState::Updating,
                        Some(UpdateState::WaitingForMasterExitReadOnly),
                        "workloads recreated; waiting for masters to exit read-only mode",
                    )
                    .await?;
                Ok(Some(UpdateTransition::Advanced(
                    UpdateState::WaitingForMasterExitReadOnly,
                )))
            }

            Some(UpdateState::WaitingForMasterExitReadOnly) => {
                if !scope.is_condition_true(CONDITION_MASTER_EXITED_READ_ONLY) {
                    return Ok(None);
                }
                // Reset progress conditions so the next cycle starts clean
                scope
                    .set_condition(Condition::false_(
                        CONDITION_MASTER_EXITED_READ_ONLY,
                        "UpdateFinished",
                    ))
                    .await?;
                for component in summaries.iter().filter(|c| c.updatable) {
                    scope
                        .set_condition(Condition::false_(
                            &component.pods_removed_condition,
                            "UpdateFinished",
                        ))
                        .await?;
                }
                scope
                    .set_state(ClusterState::Running, None, "cluster update finished")
                    .await?;
                info!(cluster = %scope.name(), "cluster update finished");
                Ok(Some(UpdateTransition::Finished))
            }

            // Updating without a sub-phase: repair by restarting the flow
            None => {
                scope
                    .set_state(
                        ClusterState::Updating,
                        Some(UpdateState::WaitingForPodsRemoval),
                        "resuming interrupted cluster update",
                    )
                    .await?;
                Ok(Some(UpdateTransition::Advanced(
                    UpdateState::WaitingForPodsRemoval,
                )))
            }
        },

        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MockPlatformClient;
    use std::sync::Arc;
    use strata_common::crd::{StrataCluster, StrataClusterSpec, StrataClusterStatus};

    fn scope(
        state: ClusterState,
        update_state: Option<UpdateState>,
        conditions: Vec<Condition>,
    ) -> ClusterScope {
        let mut cluster = StrataCluster::new("demo", StrataClusterSpec::default());
        cluster.metadata.namespace = Some("strata".to_string());
        cluster.status = Some(StrataClusterStatus {
            cluster_state: state,
            update_state,
            conditions,
            ..Default::default()
        });
        let mut platform = MockPlatformClient::new();
        platform
            .expect_patch_cluster_status()
            .returning(|_, _, _| Ok(()));
        ClusterScope::new(&cluster, Arc::new(platform))
    }

    fn summary(name: &str, updatable: bool, status: SyncStatus) -> ComponentSummary {
        ComponentSummary {
            name: name.to_string(),
            updatable,
            pods_removed_condition: format!("{name}PodsRemoved"),
            status,
        }
    }

    /// Entering an update requires steady state AND a component asking.
    #[tokio::test]
    async fn update_starts_only_from_running_state() {
        let summaries = vec![summary("Master", true, SyncStatus::NeedFullUpdate)];

        let created = scope(ClusterState::Created, None, vec![]);
        let transition = reconcile_cluster_update(&created, &summaries).await.unwrap();
        assert_eq!(transition, None);

        let running = scope(ClusterState::Running, None, vec![]);
        let transition = reconcile_cluster_update(&running, &summaries).await.unwrap();
        assert_eq!(transition, Some(UpdateTransition::Started));
        assert_eq!(running.state(), ClusterState::Updating);
        assert_eq!(
            running.update_state(),
            Some(UpdateState::WaitingForPodsRemoval)
        );
    }

    #[tokio::test]
    async fn no_update_without_a_requesting_component() {
        let running = scope(ClusterState::Running, None, vec![]);
        let summaries = vec![
            summary("Master", true, SyncStatus::Ready),
            summary("DataNode", true, SyncStatus::Pending),
        ];
        let transition = reconcile_cluster_update(&running, &summaries).await.unwrap();
        assert_eq!(transition, None);
        assert_eq!(running.state(), ClusterState::Running);
    }

    /// Non-updatable components asking for a full update are ignored.
    #[tokio::test]
    async fn non_updatable_components_cannot_start_updates() {
        let running = scope(ClusterState::Running, None, vec![]);
        let summaries = vec![summary("Fixed", false, SyncStatus::NeedFullUpdate)];
        let transition = reconcile_cluster_update(&running, &summaries).await.unwrap();
        assert_eq!(transition, None);
    }

    #[tokio::test]
    async fn pods_removal_advances_when_all_conditions_observed() {
        let summaries = vec![
            summary("Master", true, SyncStatus::Updating),
            summary("DataNode", true, SyncStatus::Updating),
        ];

        // Only one component done: no advancement
        let partial = scope(
            ClusterState::Updating,
            Some(UpdateState::WaitingForPodsRemoval),
            vec![Condition::true_("MasterPodsRemoved", "PodsRemoved")],
        );
        let transition = reconcile_cluster_update(&partial, &summaries).await.unwrap();
        assert_eq!(transition, None);

        // Both done: advance
        let complete = scope(
            ClusterState::Updating,
            Some(UpdateState::WaitingForPodsRemoval),
            vec![
                Condition::true_("MasterPodsRemoved", "PodsRemoved"),
                Condition::true_("DataNodePodsRemoved", "PodsRemoved"),
            ],
        );
        let transition = reconcile_cluster_update(&complete, &summaries).await.unwrap();
        assert_eq!(
            transition,
            Some(UpdateTransition::Advanced(
                UpdateState::WaitingForPodsCreation
            ))
        );
    }

    #[tokio::test]
    async fn pods_creation_advances_when_all_components_ready() {
        let waiting = scope(
            ClusterState::Updating,
            Some(UpdateState::WaitingForPodsCreation),
            vec![],
        );

        let converging = vec![
            summary("Master", true, SyncStatus::Ready),
            summary("DataNode", true, SyncStatus::Blocked),
        ];
        let transition = reconcile_cluster_update(&waiting, &converging).await.unwrap();
        assert_eq!(transition, None);

        let ready = vec![
            summary("Master", true, SyncStatus::Ready),
            summary("DataNode", true, SyncStatus::Ready),
        ];
        let transition = reconcile_cluster_update(&waiting, &ready).await.unwrap();
        assert_eq!(
            transition,
            Some(UpdateTransition::Advanced(
                UpdateState::WaitingForMasterExitReadOnly
            ))
        );
    }

    /// Finishing requires the handshake's MasterExitedReadOnly condition
    /// and resets it for the next cycle.
    #[tokio::test]
    async fn update_finishes_after_masters_exit_read_only() {
        let summaries = vec![summary("Master", true, SyncStatus::Updating)];

        let waiting = scope(
            ClusterState::Updating,
            Some(UpdateState::WaitingForMasterExitReadOnly),
            vec![],
        );
        let transition = reconcile_cluster_update(&waiting, &summaries).await.unwrap();
        assert_eq!(transition, None);

        let exited = scope(
            ClusterState::Updating,
            Some(UpdateState::WaitingForMasterExitReadOnly),
            vec![Condition::true_(
                CONDITION_MASTER_EXITED_READ_ONLY,
                "MasterExitedReadOnly",
            )],
        );
        let transition = reconcile_cluster_update(&exited, &summaries).await.unwrap();
        assert_eq!(transition, Some(UpdateTransition::Finished));
        assert_eq!(exited.state(), ClusterState::Running);
        assert_eq!(exited.update_state(), None);
        assert!(!exited.is_condition_true(CONDITION_MASTER_EXITED_READ_ONLY));
        assert!(!exited.is_condition_true("MasterPodsRemoved"));
    }

    #[tokio::test]
    async fn missing_substate_is_repaired() {
        let broken = scope(ClusterState::Updating, None, vec![]);
        let transition = reconcile_cluster_update(&broken, &[]).await.unwrap();
        assert_eq!(
            transition,
            Some(UpdateTransition::Advanced(
                UpdateState::WaitingForPodsRemoval
            ))
        );
        assert_eq!(
            broken.update_state(),
            Some(UpdateState::WaitingForPodsRemoval)
        );
    }
}
