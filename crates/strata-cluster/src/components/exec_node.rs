//! Exec node pool driver.

use std::sync::Arc;

use strata_common::consts::{COMPONENT_EXEC_NODE, EXEC_NODE_RPC_PORT};
use strata_common::crd::PoolSpec;
use strata_common::labels::ComponentLabels;

use crate::cluster::ClusterScope;
use crate::config::ConfigGenerator;
use crate::platform::PlatformClient;
use crate::workload::Workload;

use super::RoleComponent;

/// Build one exec node pool component.
pub fn exec_node(
    scope: Arc<ClusterScope>,
    platform: Arc<dyn PlatformClient>,
    cfgen: Arc<ConfigGenerator>,
    pool: PoolSpec,
) -> RoleComponent {
    let pool_name = pool.name.as_deref();
    let labels = ComponentLabels::for_pool(
        scope.name(),
        scope.namespace(),
        COMPONENT_EXEC_NODE,
        "ExecNode",
        pool_name,
    )
    .with_extras(
        &pool.instance.extra_pod_labels,
        &pool.instance.extra_pod_annotations,
    );

    let image = pool
        .instance
        .image
        .clone()
        .unwrap_or_else(|| scope.spec().core_image.clone());

    let config_gen = cfgen.clone();
    let pool_spec = pool.clone();
    let workload = Workload::new(
        labels,
        cfgen.pool_stateful_set_name("exec-node", pool_name),
        cfgen.pool_service_name("exec-node", pool_name),
        "/usr/bin/strata-node",
        "exec-node.json",
        image,
        EXEC_NODE_RPC_PORT,
        pool.instance.clone(),
        Box::new(move || config_gen.exec_node_config(&pool_spec)),
    );

    let name = match pool_name {
        Some(pool) => format!("exec-node-{pool}"),
        None => "exec-node".to_string(),
    };
    RoleComponent::new(name, true, scope, platform, workload).with_dependency("master")
}
