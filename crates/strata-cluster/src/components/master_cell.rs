//! Primary master cell driver.
//!
//! The quorum that owns the metadata catalog root. Masters are pinned to
//! stable hosts when the spec lists them, bootstrap the catalog connection
//! through an init job, and participate in the read-only-exit handshake
//! during cluster updates.

use std::sync::Arc;

use strata_common::consts::{COMPONENT_MASTER, DEFAULT_HOST_ADDRESS_LABEL, MASTER_RPC_PORT};
use strata_common::labels::ComponentLabels;

use crate::cluster::ClusterScope;
use crate::config::ConfigGenerator;
use crate::init_job::InitJob;
use crate::platform::PlatformClient;
use crate::workload::Workload;

use super::{cluster_connection_script, RoleComponent};

/// Build the primary master cell component.
pub fn master_cell(
    scope: Arc<ClusterScope>,
    platform: Arc<dyn PlatformClient>,
    cfgen: Arc<ConfigGenerator>,
) -> RoleComponent {
    let spec = scope.spec().masters.clone();
    let labels = ComponentLabels::new(
        scope.name(),
        scope.namespace(),
        COMPONENT_MASTER,
        "Master",
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
    let cell = spec.clone();
    let workload = Workload::new(
        labels.clone(),
        cfgen.master_stateful_set_name(spec.cell_tag),
        cfgen.master_service_name(spec.cell_tag),
        "/usr/bin/strata-master",
        "master.json",
        image.clone(),
        MASTER_RPC_PORT,
        spec.instance.clone(),
        Box::new(move || config_gen.master_config(&cell)),
    )
    .with_pinned_hosts(spec.host_addresses.clone(), host_label);

    let init_job = InitJob::new(labels.clone(), "default", image.clone());
    let exit_job = InitJob::new(labels, "exit-read-only", image);

    let script_gen = cfgen;
    RoleComponent::new("master", true, scope, platform, workload)
        .with_bootstrap(
            init_job,
            Box::new(move || cluster_connection_script(&script_gen)),
        )
        .with_handshake(exit_job)
}
