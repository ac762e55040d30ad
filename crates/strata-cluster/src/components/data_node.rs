//! Data node pool driver.
//!
//! Data nodes store chunks and register with the masters; each declared
//! pool reconciles as its own component. Once a pool's pods are ready, the
//! topology synchronizer mirrors their physical placement into the catalog.

use std::sync::Arc;

use strata_common::consts::{COMPONENT_DATA_NODE, DATA_NODE_RPC_PORT};
use strata_common::crd::PoolSpec;
use strata_common::labels::ComponentLabels;

use crate::catalog::CatalogClient;
use crate::cluster::ClusterScope;
use crate::config::ConfigGenerator;
use crate::platform::PlatformClient;
use crate::topology::TopologySync;
use crate::workload::Workload;

use super::RoleComponent;

/// Build one data node pool component.
pub fn data_node(
    scope: Arc<ClusterScope>,
    platform: Arc<dyn PlatformClient>,
    cfgen: Arc<ConfigGenerator>,
    catalog: Option<Arc<dyn CatalogClient>>,
    pool: PoolSpec,
) -> RoleComponent {
    let pool_name = pool.name.as_deref();
    let labels = ComponentLabels::for_pool(
        scope.name(),
        scope.namespace(),
        COMPONENT_DATA_NODE,
        "DataNode",
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
    let sts_name = cfgen.pool_stateful_set_name("data-node", pool_name);
    let service_name = cfgen.pool_service_name("data-node", pool_name);

    let config_gen = cfgen.clone();
    let pool_spec = pool.clone();
    let workload = Workload::new(
        labels.clone(),
        sts_name,
        service_name.clone(),
        "/usr/bin/strata-node",
        "data-node.json",
        image,
        DATA_NODE_RPC_PORT,
        pool.instance.clone(),
        Box::new(move || config_gen.data_node_config(&pool_spec)),
    );

    let name = match pool_name {
        Some(pool) => format!("data-node-{pool}"),
        None => "data-node".to_string(),
    };
    let mut component =
        RoleComponent::new(name, true, scope, platform, workload).with_dependency("master");

    if let Some(catalog) = catalog {
        let topology = TopologySync::new(
            labels,
            cfgen.pod_fqdn_suffix(&service_name),
            DATA_NODE_RPC_PORT,
        );
        component = component.with_topology(topology, catalog);
    }

    component
}
