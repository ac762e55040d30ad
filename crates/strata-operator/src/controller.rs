//! StrataCluster controller.
//!
//! One reconcile pass: rebuild every component from the declared spec,
//! fetch observed state, compute all dry-run statuses in dependency order,
//! run the update orchestrator, then sync whatever is not Ready. The pass
//! holds no state of its own; re-entering at any point is safe.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{info, instrument, warn};

use strata_common::consts::DEFAULT_CLUSTER_DOMAIN;
use strata_common::crd::{ClusterState, StrataCluster};
use strata_common::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use strata_common::{Error, Result};

use strata_cluster::catalog::{CatalogClient, HttpCatalogClient};
use strata_cluster::cluster::ClusterScope;
use strata_cluster::components::{
    agent, data_node, exec_node, http_proxy, master_cache, master_cell, rpc_proxy,
    secondary_master, tablet_node, Component, PassState,
};
use strata_cluster::config::ConfigGenerator;
use strata_cluster::platform::{KubePlatform, PlatformClient};
use strata_cluster::update::{reconcile_cluster_update, ComponentSummary, UpdateTransition};

/// Requeue cadence while components are converging
const REQUEUE_CONVERGING: Duration = Duration::from_secs(15);
/// Requeue cadence while an update sub-phase is in flight
const REQUEUE_UPDATING: Duration = Duration::from_secs(5);
/// Requeue cadence for a healthy, steady-state cluster
const REQUEUE_STEADY: Duration = Duration::from_secs(300);

/// Factory producing a catalog client for a cluster's admin endpoint.
pub type CatalogFactory = Box<dyn Fn(&str) -> Arc<dyn CatalogClient> + Send + Sync>;

/// Shared context for the StrataCluster controller.
pub struct Context {
    /// Orchestration-platform client (trait object for testability)
    pub platform: Arc<dyn PlatformClient>,
    /// Kubernetes Event publisher
    pub events: Arc<dyn EventPublisher>,
    /// Kubernetes cluster domain for pod FQDNs
    pub cluster_domain: String,
    /// Builds a catalog client for a cluster's admin endpoint
    pub catalog_factory: CatalogFactory,
}

impl Context {
    /// Production context wrapping a kube client.
    pub fn new(client: Client) -> Self {
        Self {
            platform: Arc::new(KubePlatform::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(client, "strata-operator")),
            cluster_domain: std::env::var("CLUSTER_DOMAIN")
                .unwrap_or_else(|_| DEFAULT_CLUSTER_DOMAIN.to_string()),
            catalog_factory: Box::new(|endpoint| Arc::new(HttpCatalogClient::new(endpoint))),
        }
    }

    /// Context with injected collaborators, for tests.
    pub fn with_collaborators(
        platform: Arc<dyn PlatformClient>,
        events: Arc<dyn EventPublisher>,
        catalog_factory: CatalogFactory,
    ) -> Self {
        Self {
            platform,
            events,
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
            catalog_factory,
        }
    }
}

/// Build every component the spec declares, in dependency order.
///
/// The primary master cell comes first: node pools, proxies and agents
/// declare it as their dependency, and dependency checks read the statuses
/// recorded earlier in the same pass.
pub fn build_components(
    scope: &Arc<ClusterScope>,
    ctx: &Context,
    cfgen: &Arc<ConfigGenerator>,
    catalog: Option<Arc<dyn CatalogClient>>,
) -> Vec<Box<dyn Component>> {
    let platform = ctx.platform.clone();
    let spec = scope.spec().clone();
    let mut components: Vec<Box<dyn Component>> = Vec::new();

    components.push(Box::new(master_cell(
        scope.clone(),
        platform.clone(),
        cfgen.clone(),
    )));

    for cell in &spec.secondary_masters {
        components.push(Box::new(secondary_master(
            scope.clone(),
            platform.clone(),
            cfgen.clone(),
            cell.clone(),
        )));
    }

    if spec.master_caches.is_some() {
        components.push(Box::new(master_cache(
            scope.clone(),
            platform.clone(),
            cfgen.clone(),
        )));
    }

    for pool in &spec.data_nodes {
        components.push(Box::new(data_node(
            scope.clone(),
            platform.clone(),
            cfgen.clone(),
            catalog.clone(),
            pool.clone(),
        )));
    }

    for pool in &spec.exec_nodes {
        components.push(Box::new(exec_node(
            scope.clone(),
            platform.clone(),
            cfgen.clone(),
            pool.clone(),
        )));
    }

    for pool in &spec.tablet_nodes {
        components.push(Box::new(tablet_node(
            scope.clone(),
            platform.clone(),
            cfgen.clone(),
            pool.clone(),
        )));
    }

    if spec.http_proxies.is_some() {
        components.push(Box::new(http_proxy(
            scope.clone(),
            platform.clone(),
            cfgen.clone(),
        )));
    }

    if spec.rpc_proxies.is_some() {
        components.push(Box::new(rpc_proxy(
            scope.clone(),
            platform.clone(),
            cfgen.clone(),
        )));
    }

    if spec.agents.is_some() {
        components.push(Box::new(agent(scope.clone(), platform, cfgen.clone())));
    }

    components
}

/// Reconcile one StrataCluster resource.
#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name_any()))]
pub async fn reconcile(cluster: Arc<StrataCluster>, ctx: Arc<Context>) -> Result<Action> {
    let name = cluster.name_any();
    info!("reconciling cluster");

    if let Err(e) = cluster.spec.validate(&name) {
        ctx.events
            .publish(
                &cluster.object_ref(&()),
                EventType::Warning,
                reasons::VALIDATION_FAILED,
                actions::RECONCILE,
                Some(e.to_string()),
            )
            .await;
        return Err(e);
    }

    let scope = Arc::new(ClusterScope::new(&cluster, ctx.platform.clone()));
    let cfgen = Arc::new(ConfigGenerator::new(
        scope.name(),
        scope.namespace(),
        ctx.cluster_domain.clone(),
        cluster.spec.clone(),
    ));
    let catalog = cfgen
        .admin_endpoint()
        .map(|endpoint| (ctx.catalog_factory)(&endpoint));

    let mut components = build_components(&scope, &ctx, &cfgen, catalog);

    // All reads happen before any write of this pass
    for component in &mut components {
        component.fetch().await?;
    }

    // Dry-run statuses in dependency order; later components observe
    // earlier ones through the pass state
    let mut pass = PassState::default();
    let mut summaries = Vec::with_capacity(components.len());
    for component in &mut components {
        let status = component.status(&pass).await?;
        summaries.push(ComponentSummary {
            name: component.name().to_string(),
            updatable: component.is_updatable(),
            pods_removed_condition: component.pods_removed_condition(),
            status: status.status,
        });
        pass.record(component.name().to_string(), status);
    }

    // Cluster-wide update orchestration
    if let Some(transition) = reconcile_cluster_update(&scope, &summaries).await? {
        let (reason, note) = match &transition {
            UpdateTransition::Started => (reasons::UPDATE_STARTED, "cluster update started".to_string()),
            UpdateTransition::Advanced(state) => {
                (reasons::UPDATE_ADVANCED, format!("update advanced to {state}"))
            }
            UpdateTransition::Finished => {
                (reasons::UPDATE_FINISHED, "cluster update finished".to_string())
            }
        };
        ctx.events
            .publish(
                &cluster.object_ref(&()),
                EventType::Normal,
                reason,
                actions::UPDATE,
                Some(note),
            )
            .await;
        return Ok(Action::requeue(REQUEUE_UPDATING));
    }

    // Sync everything that is not Ready
    let mut ready = 0usize;
    for component in &mut components {
        if pass.is_ready(component.name()) {
            ready += 1;
            continue;
        }
        let status = component.sync(&pass).await?;
        if status.is_ready() {
            ready += 1;
        }
    }

    let total = components.len();
    if ready == total {
        match scope.state() {
            ClusterState::Created => {
                scope
                    .set_state(ClusterState::Running, None, "all components ready")
                    .await?;
                ctx.events
                    .publish(
                        &cluster.object_ref(&()),
                        EventType::Normal,
                        reasons::CLUSTER_RUNNING,
                        actions::RECONCILE,
                        Some(format!("{total} components ready")),
                    )
                    .await;
                info!("cluster is running");
            }
            ClusterState::Running => {
                scope.set_message("all components ready").await?;
            }
            // Still mid-update: the orchestrator advances on a later pass
            ClusterState::Updating => return Ok(Action::requeue(REQUEUE_UPDATING)),
        }
        return Ok(Action::requeue(REQUEUE_STEADY));
    }

    scope
        .set_message(format!("{ready} of {total} components ready"))
        .await?;
    let cadence = if scope.state() == ClusterState::Updating {
        REQUEUE_UPDATING
    } else {
        REQUEUE_CONVERGING
    };
    Ok(Action::requeue(cadence))
}

/// Decide how to retry after a failed reconcile pass.
///
/// Transient errors retry quickly; validation and config errors wait for a
/// spec change instead of spinning.
pub fn error_policy(cluster: Arc<StrataCluster>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(cluster = %cluster.name_any(), error = %error, "reconciliation failed");
    if error.is_retryable() {
        Action::requeue(Duration::from_secs(5))
    } else {
        Action::await_change()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strata_cluster::catalog::MockCatalogClient;
    use strata_cluster::platform::MockPlatformClient;
    use strata_common::crd::{
        InstanceSpec, MastersSpec, PoolSpec, StrataClusterSpec, StrataClusterStatus,
    };
    use strata_common::events::NoopEventPublisher;

    fn full_spec() -> StrataClusterSpec {
        StrataClusterSpec {
            core_image: "strata/core:24.1".to_string(),
            masters: MastersSpec {
                cell_tag: 1,
                instance: InstanceSpec {
                    replicas: 3,
                    ..Default::default()
                },
                ..Default::default()
            },
            secondary_masters: vec![MastersSpec {
                cell_tag: 2,
                instance: InstanceSpec {
                    replicas: 1,
                    ..Default::default()
                },
                ..Default::default()
            }],
            master_caches: Some(Default::default()),
            data_nodes: vec![
                PoolSpec {
                    name: None,
                    instance: InstanceSpec {
                        replicas: 3,
                        ..Default::default()
                    },
                },
                PoolSpec {
                    name: Some("ssd".to_string()),
                    instance: InstanceSpec {
                        replicas: 2,
                        ..Default::default()
                    },
                },
            ],
            exec_nodes: vec![PoolSpec::default()],
            tablet_nodes: vec![PoolSpec::default()],
            http_proxies: Some(Default::default()),
            rpc_proxies: Some(Default::default()),
            agents: Some(Default::default()),
            ..Default::default()
        }
    }

    fn cluster_with(spec: StrataClusterSpec) -> StrataCluster {
        let mut cluster = StrataCluster::new("demo", spec);
        cluster.metadata.namespace = Some("strata".to_string());
        cluster.status = Some(StrataClusterStatus::default());
        cluster
    }

    fn test_context(platform: MockPlatformClient) -> Arc<Context> {
        Arc::new(Context::with_collaborators(
            Arc::new(platform),
            Arc::new(NoopEventPublisher),
            Box::new(|_| Arc::new(MockCatalogClient::new())),
        ))
    }

    #[test]
    fn build_components_covers_every_declared_role() {
        let cluster = cluster_with(full_spec());
        let platform = MockPlatformClient::new();
        let ctx = test_context(platform);
        let scope = Arc::new(ClusterScope::new(&cluster, ctx.platform.clone()));
        let cfgen = Arc::new(ConfigGenerator::new(
            "demo",
            "strata",
            "cluster.local",
            cluster.spec.clone(),
        ));

        let components = build_components(&scope, &ctx, &cfgen, None);
        let names: Vec<&str> = components.iter().map(|c| c.name()).collect();

        assert_eq!(
            names,
            vec![
                "master",
                "secondary-master-2",
                "master-cache",
                "data-node",
                "data-node-ssd",
                "exec-node",
                "tablet-node",
                "http-proxy",
                "rpc-proxy",
                "agent",
            ]
        );
        // The master comes first so dependants can observe its status
        assert_eq!(names[0], "master");
    }

    /// Story: a fresh cluster gets its workloads applied on the first pass
    /// and reports a short requeue while converging.
    #[tokio::test]
    async fn fresh_cluster_converges_with_short_requeue() {
        let mut platform = MockPlatformClient::new();
        platform.expect_get_stateful_set().returning(|_, _| Ok(None));
        platform.expect_get_job().returning(|_, _| Ok(None));
        platform.expect_apply_config_map().returning(|_| Ok(()));
        platform.expect_apply_service().returning(|_| Ok(()));
        platform.expect_apply_stateful_set().returning(|_| Ok(()));
        platform
            .expect_patch_cluster_status()
            .returning(|_, _, _| Ok(()));

        let ctx = test_context(platform);
        let cluster = Arc::new(cluster_with(full_spec()));

        let action = reconcile(cluster, ctx).await.unwrap();
        assert_eq!(action, Action::requeue(REQUEUE_CONVERGING));
    }

    /// Story: an invalid spec is surfaced as a non-retryable error before
    /// anything touches the platform.
    #[tokio::test]
    async fn invalid_spec_fails_without_platform_writes() {
        let mut spec = full_spec();
        spec.core_image = String::new();

        // No expectations: any platform call panics
        let ctx = test_context(MockPlatformClient::new());
        let cluster = Arc::new(cluster_with(spec));

        let result = reconcile(cluster, ctx).await;
        let err = result.unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("coreImage"));
    }

    /// Story: platform read failures abort the pass and propagate for retry.
    #[tokio::test]
    async fn platform_errors_propagate() {
        let mut platform = MockPlatformClient::new();
        platform.expect_get_stateful_set().returning(|_, _| {
            Err(Error::internal_with_context("platform", "connection refused"))
        });

        let ctx = test_context(platform);
        let cluster = Arc::new(cluster_with(full_spec()));

        let result = reconcile(cluster, ctx).await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("connection refused"));
    }

    #[rstest]
    #[case::transient(Error::internal("temporary"), Action::requeue(Duration::from_secs(5)))]
    #[case::validation(Error::validation("bad spec"), Action::await_change())]
    #[case::config(Error::config("master", "no members"), Action::await_change())]
    fn error_policy_matches_retryability(#[case] error: Error, #[case] expected: Action) {
        let cluster = Arc::new(cluster_with(full_spec()));
        let ctx = test_context(MockPlatformClient::new());
        assert_eq!(error_policy(cluster, &error, ctx), expected);
    }
}
