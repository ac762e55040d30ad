//! Secondary master cell driver.
//!
//! Each additional master cell is its own independently reconciled
//! component: own statefulset, own pinning, own handshake participation.

use std::sync::Arc;

use strata_common::consts::{
    COMPONENT_SECONDARY_MASTER, DEFAULT_HOST_ADDRESS_LABEL, MASTER_RPC_PORT,
};
use strata_common::crd::MastersSpec;
use strata_common::labels::ComponentLabels;

use crate::cluster::ClusterScope;
use crate::config::ConfigGenerator;
use crate::init_job::InitJob;
use crate::platform::PlatformClient;
use crate::workload::Workload;

use super::{cluster_connection_script, RoleComponent};

/// Build one secondary master cell component.
pub fn secondary_master(
    scope: Arc<ClusterScope>,
    platform: Arc<dyn PlatformClient>,
    cfgen: Arc<ConfigGenerator>,
    spec: MastersSpec,
) -> RoleComponent {
    let tag = spec.cell_tag.to_string();
    let labels = ComponentLabels::for_pool(
        scope.name(),
        scope.namespace(),
        COMPONENT_SECONDARY_MASTER,
        "SecondaryMaster",
        Some(&tag),
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
    RoleComponent::new(
        format!("secondary-master-{tag}"),
        true,
        scope,
        platform,
        workload,
    )
    .with_bootstrap(
        init_job,
        Box::new(move || cluster_connection_script(&script_gen)),
    )
    .with_handshake(exit_job)
}
