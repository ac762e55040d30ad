//! Master cache driver.
//!
//! Caches offload read traffic from the master quorum. Like masters they
//! can be host-pinned and bootstrap the catalog connection, but they take
//! no part in the read-only-exit handshake.

use std::sync::Arc;

use strata_common::consts::{
    COMPONENT_MASTER_CACHE, DEFAULT_HOST_ADDRESS_LABEL, MASTER_CACHE_RPC_PORT,
};
use strata_common::labels::ComponentLabels;

use crate::cluster::ClusterScope;
use crate::config::ConfigGenerator;
use crate::init_job::InitJob;
use crate::platform::PlatformClient;
use crate::workload::Workload;

use super::{cluster_connection_script, RoleComponent};

/// Build the master cache component. Callers only invoke this when the
/// spec declares master caches.
pub fn master_cache(
    scope: Arc<ClusterScope>,
    platform: Arc<dyn PlatformClient>,
    cfgen: Arc<ConfigGenerator>,
) -> RoleComponent {
    let spec = scope
        .spec()
        .master_caches
        .clone()
        .unwrap_or_default();
    let labels = ComponentLabels::new(
        scope.name(),
        scope.namespace(),
        COMPONENT_MASTER_CACHE,
        "MasterCache",
    )
    .with_extras(
        &spec.instance.extra_pod_labels,
        &spec.instance.extra_pod_annotations,
    );

    let image = spec
        .instance
        .image
        .clone()
        .unwrap_or_else(|| scope.spec().core_image.clone());
    let host_label = spec
        .host_address_label
        .clone()
        .or_else(|| scope.spec().host_address_label.clone())
        .unwrap_or_else(|| DEFAULT_HOST_ADDRESS_LABEL.to_string());

    let config_gen = cfgen.clone();
    let workload = Workload::new(
        labels.clone(),
        cfgen.master_cache_stateful_set_name(),
        cfgen.master_cache_service_name(),
        "/usr/bin/strata-master-cache",
        "master-cache.json",
        image.clone(),
        MASTER_CACHE_RPC_PORT,
        spec.instance.clone(),
        Box::new(move || config_gen.master_cache_config()),
    )
    .with_pinned_hosts(spec.host_addresses.clone(), host_label);

    let init_job = InitJob::new(labels, "default", image);

    let script_gen = cfgen;
    RoleComponent::new("master-cache", true, scope, platform, workload).with_bootstrap(
        init_job,
        Box::new(move || cluster_connection_script(&script_gen)),
    )
}
