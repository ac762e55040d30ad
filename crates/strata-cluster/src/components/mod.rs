//! Components and the shared lifecycle state machine.
//!
//! Every operational unit of the cluster (master cell, data node pool,
//! proxy, ...) is a [`Component`]: independently reconciled, stateless
//! across passes, rebuilt from the declared spec every pass. One shared
//! evaluation routine implements the whole decision ladder; `Status` is the
//! dry run of exactly the code path `Sync` effects, so the probe and the
//! action can never drift apart.

mod agent;
mod data_node;
mod exec_node;
mod http_proxy;
mod master_cache;
mod master_cell;
mod rpc_proxy;
mod secondary_master;
mod tablet_node;

pub use agent::agent;
pub use data_node::data_node;
pub use exec_node::exec_node;
pub use http_proxy::http_proxy;
pub use master_cache::master_cache;
pub use master_cell::master_cell;
pub use rpc_proxy::rpc_proxy;
pub use secondary_master::secondary_master;
pub use tablet_node::tablet_node;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use strata_common::consts::{
    CONDITION_MASTER_EXITED_READ_ONLY, CONDITION_MASTER_EXIT_READ_ONLY_PREPARED,
};
use strata_common::crd::{ClusterState, Condition, ConditionStatus, UpdateState};
use strata_common::Result;

use crate::catalog::CatalogClient;
use crate::cluster::ClusterScope;
use crate::init_job::InitJob;
use crate::platform::PlatformClient;
use crate::topology::TopologySync;
use crate::update;
use crate::workload::Workload;

/// Reason-coded synchronization status of one component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// Nothing to do
    Ready,
    /// Workload objects were just written; waiting for the platform to converge
    Pending,
    /// Waiting on a named external dependency or precondition
    Blocked,
    /// Participating in a cluster-wide update
    Updating,
    /// A disruptive spec change needs cluster-level permission to proceed
    NeedFullUpdate,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "Ready"),
            Self::Pending => write!(f, "Pending"),
            Self::Blocked => write!(f, "Blocked"),
            Self::Updating => write!(f, "Updating"),
            Self::NeedFullUpdate => write!(f, "NeedFullUpdate"),
        }
    }
}

/// Status + detail message. Recomputed every pass, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentStatus {
    /// The reason-coded status
    pub status: SyncStatus,
    /// Human-readable detail
    pub message: String,
}

impl ComponentStatus {
    /// Nothing to do
    pub fn ready() -> Self {
        Self::simple(SyncStatus::Ready)
    }

    /// A status with no detail beyond its own name
    pub fn simple(status: SyncStatus) -> Self {
        Self {
            status,
            message: status.to_string(),
        }
    }

    /// A status waiting on something nameable
    pub fn waiting(status: SyncStatus, reason: &str) -> Self {
        Self {
            status,
            message: format!("waiting for {reason}"),
        }
    }

    /// True iff the status is Ready
    pub fn is_ready(&self) -> bool {
        self.status == SyncStatus::Ready
    }
}

/// Dry-run statuses computed so far in the current reconcile pass.
///
/// Dependency checks consult this instead of reaching into sibling
/// components: the controller evaluates components in dependency order and
/// records each fresh status here.
#[derive(Default)]
pub struct PassState {
    statuses: BTreeMap<String, ComponentStatus>,
}

impl PassState {
    /// Record a component's freshly computed dry-run status
    pub fn record(&mut self, name: impl Into<String>, status: ComponentStatus) {
        self.statuses.insert(name.into(), status);
    }

    /// The recorded status for a component, if evaluated this pass
    pub fn get(&self, name: &str) -> Option<&ComponentStatus> {
        self.statuses.get(name)
    }

    /// True iff the named component was evaluated this pass and is Ready
    pub fn is_ready(&self, name: &str) -> bool {
        self.statuses
            .get(name)
            .map(ComponentStatus::is_ready)
            .unwrap_or(false)
    }
}

/// One independently reconciled operational unit of the cluster.
#[async_trait]
pub trait Component: Send + Sync {
    /// Component name (unique within the cluster)
    fn name(&self) -> &str;

    /// True when this component participates in cluster-wide updates
    fn is_updatable(&self) -> bool;

    /// Condition type recording this component's pods-removed progress
    fn pods_removed_condition(&self) -> String;

    /// Read current state from the platform. All reads happen here, before
    /// any write of the same pass.
    async fn fetch(&mut self) -> Result<()>;

    /// Side-effect-free status probe (dry evaluation)
    async fn status(&mut self, pass: &PassState) -> Result<ComponentStatus>;

    /// Effectful reconcile step (non-dry evaluation)
    async fn sync(&mut self, pass: &PassState) -> Result<ComponentStatus>;
}

/// Closure rebuilding an init script from current connection parameters.
pub type ScriptFn = Box<dyn Fn() -> Result<String> + Send + Sync>;

/// The one concrete component implementation, parameterized per role.
///
/// Role constructors (see the sibling modules) assemble the workload handle
/// and the optional collaborators; the evaluation ladder below is shared by
/// every role.
pub struct RoleComponent {
    name: String,
    updatable: bool,
    scope: Arc<ClusterScope>,
    platform: Arc<dyn PlatformClient>,
    workload: Workload,
    depends_on: Option<String>,
    handshake: bool,
    bootstrap: Option<InitJob>,
    init_script_fn: Option<ScriptFn>,
    exit_read_only_job: Option<InitJob>,
    topology: Option<TopologySync>,
    catalog: Option<Arc<dyn CatalogClient>>,
}

impl RoleComponent {
    /// Create a component wrapping the given workload.
    pub fn new(
        name: impl Into<String>,
        updatable: bool,
        scope: Arc<ClusterScope>,
        platform: Arc<dyn PlatformClient>,
        workload: Workload,
    ) -> Self {
        Self {
            name: name.into(),
            updatable,
            scope,
            platform,
            workload,
            depends_on: None,
            handshake: false,
            bootstrap: None,
            init_script_fn: None,
            exit_read_only_job: None,
            topology: None,
            catalog: None,
        }
    }

    /// Require another component to be Ready before this one can be
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.depends_on = Some(name.into());
        self
    }

    /// Attach a bootstrap job whose script is rebuilt on every sync
    pub fn with_bootstrap(mut self, job: InitJob, script_fn: ScriptFn) -> Self {
        self.bootstrap = Some(job);
        self.init_script_fn = Some(script_fn);
        self
    }

    /// Participate in the master read-only-exit handshake
    pub fn with_handshake(mut self, exit_job: InitJob) -> Self {
        self.handshake = true;
        self.exit_read_only_job = Some(exit_job);
        self
    }

    /// Attach the topology synchronizer
    pub fn with_topology(mut self, topology: TopologySync, catalog: Arc<dyn CatalogClient>) -> Self {
        self.topology = Some(topology);
        self.catalog = Some(catalog);
        self
    }

    /// The shared evaluation ladder. First applicable step wins; `dry`
    /// suppresses every write while leaving the decision path identical.
    async fn evaluate(&mut self, dry: bool, pass: &PassState) -> Result<ComponentStatus> {
        // 1. Disruptive spec change: needs cluster-level permission, no mutation
        if self.scope.update_permitted() && self.workload.needs_full_update() {
            return Ok(ComponentStatus::simple(SyncStatus::NeedFullUpdate));
        }

        // 2. Cluster-wide update in progress
        if self.scope.state() == ClusterState::Updating {
            if self.handshake
                && self.scope.update_state() == Some(UpdateState::WaitingForMasterExitReadOnly)
            {
                return self.exit_read_only(dry).await;
            }
            if let Some(status) = update::handle_updating_state(
                &self.scope,
                self.platform.as_ref(),
                self.updatable,
                &self.workload,
                dry,
            )
            .await?
            {
                return Ok(status);
            }
        }

        // 3. Structural divergence: apply and observe convergence later
        if self.workload.needs_sync() {
            if !dry {
                self.workload.sync(self.platform.as_ref()).await?;
            }
            return Ok(ComponentStatus::waiting(SyncStatus::Pending, "components"));
        }

        // 4. Instances not fully up yet
        if !self.workload.pods_ready() {
            return Ok(ComponentStatus::waiting(SyncStatus::Blocked, "pods"));
        }

        // 5. Declared dependency not Ready
        if let Some(dependency) = &self.depends_on {
            if !pass.is_ready(dependency) {
                return Ok(ComponentStatus::waiting(SyncStatus::Blocked, dependency));
            }
        }

        // Topology facts follow readiness; per-item failures never block
        if let (Some(topology), Some(catalog)) = (&self.topology, &self.catalog) {
            if let Some(rack_spec) = self.scope.spec().rack_awareness.clone() {
                if !dry {
                    let summary = topology
                        .sync(self.platform.as_ref(), catalog.as_ref(), &rack_spec)
                        .await?;
                    if !summary.failures.is_empty() {
                        warn!(
                            component = %self.name,
                            failures = summary.failures.len(),
                            "topology synchronization partially failed; will retry next pass"
                        );
                    }
                }
            }
        }

        // 6. Bootstrap job drives the remainder of initialization
        if let Some(job) = &mut self.bootstrap {
            if !dry {
                if let Some(script_fn) = &self.init_script_fn {
                    job.set_init_script(script_fn()?);
                }
            }
            return job
                .evaluate(&self.scope, self.platform.as_ref(), dry)
                .await;
        }

        // 7. Converged
        Ok(ComponentStatus::ready())
    }

    /// Master read-only-exit handshake (one participant).
    ///
    /// Forward-only, coordinated purely through persisted Conditions:
    ///
    /// * Prepared absent/false: run phase-1 prepare (idempotent), then
    ///   record Prepared=true.
    /// * Prepared true: record ExitedReadOnly=true for the orchestrator and
    ///   reset Prepared=false, arming the handshake for the next update.
    async fn exit_read_only(&mut self, dry: bool) -> Result<ComponentStatus> {
        let job = self.exit_read_only_job.as_mut().ok_or_else(|| {
            strata_common::Error::internal_with_context(
                "handshake",
                format!("{} participates in the handshake without an exit job", self.name),
            )
        })?;

        if !self
            .scope
            .is_condition_true(CONDITION_MASTER_EXIT_READ_ONLY_PREPARED)
        {
            if !job.is_restart_prepared(&self.scope) {
                job.prepare_restart(&self.scope, self.platform.as_ref(), dry)
                    .await?;
            }
            if !dry {
                self.scope
                    .set_condition(Condition::new(
                        CONDITION_MASTER_EXIT_READ_ONLY_PREPARED,
                        ConditionStatus::True,
                        "MasterExitReadOnlyPrepared",
                        "masters are ready to exit read-only mode",
                    ))
                    .await?;
            }
            return Ok(ComponentStatus::simple(SyncStatus::Updating));
        }

        if !dry {
            self.scope
                .set_condition(Condition::new(
                    CONDITION_MASTER_EXITED_READ_ONLY,
                    ConditionStatus::True,
                    "MasterExitedReadOnly",
                    "masters exited read-only mode",
                ))
                .await?;
            self.scope
                .set_condition(Condition::new(
                    CONDITION_MASTER_EXIT_READ_ONLY_PREPARED,
                    ConditionStatus::False,
                    "MasterExitReadOnlyPrepared",
                    "armed for the next update cycle",
                ))
                .await?;
            debug!(component = %self.name, "master read-only exit recorded");
        }
        Ok(ComponentStatus::simple(SyncStatus::Updating))
    }
}

#[async_trait]
impl Component for RoleComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_updatable(&self) -> bool {
        self.updatable
    }

    fn pods_removed_condition(&self) -> String {
        self.workload.labels().pods_removed_condition()
    }

    async fn fetch(&mut self) -> Result<()> {
        self.workload.fetch(self.platform.as_ref()).await?;
        if let Some(job) = &mut self.bootstrap {
            job.fetch(self.platform.as_ref()).await?;
        }
        if let Some(job) = &mut self.exit_read_only_job {
            job.fetch(self.platform.as_ref()).await?;
        }
        Ok(())
    }

    async fn status(&mut self, pass: &PassState) -> Result<ComponentStatus> {
        self.evaluate(true, pass).await
    }

    async fn sync(&mut self, pass: &PassState) -> Result<ComponentStatus> {
        self.evaluate(false, pass).await
    }
}

/// Init script pushing the current cluster connection into the catalog.
///
/// Rebuilt from the declared spec on every non-dry pass, so address or
/// topology changes reach the catalog without operator restarts. The
/// prologue materializes the native client config the admin CLI needs.
pub(crate) fn cluster_connection_script(
    cfgen: &crate::config::ConfigGenerator,
) -> Result<String> {
    let client_config = String::from_utf8(cfgen.client_config()?)
        .map_err(|e| strata_common::Error::config("client", e.to_string()))?;
    let connection = serde_json::to_string(&cfgen.cluster_connection())
        .map_err(|e| strata_common::Error::config("client", e.to_string()))?;
    Ok(format!(
        "set -e\n\
         cat >/tmp/client.json <<'EOF'\n\
         {client_config}\n\
         EOF\n\
         export STRATA_CLIENT_CONFIG=/tmp/client.json\n\
         /usr/bin/strata-admin set /config/cluster_connection '{connection}'"
    ))
}
