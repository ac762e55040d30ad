//! Controller agent driver.
//!
//! Agents schedule operations across exec nodes; they only need the master
//! quorum to be reachable.

use std::sync::Arc;

use strata_common::consts::{AGENT_RPC_PORT, COMPONENT_AGENT};
use strata_common::labels::ComponentLabels;

use crate::cluster::ClusterScope;
use crate::config::ConfigGenerator;
use crate::platform::PlatformClient;
use crate::workload::Workload;

use super::RoleComponent;

/// Build the controller agent component. Callers only invoke this when the
/// spec declares agents.
pub fn agent(
    scope: Arc<ClusterScope>,
    platform: Arc<dyn PlatformClient>,
    cfgen: Arc<ConfigGenerator>,
) -> RoleComponent {
    let instance = scope.spec().agents.clone().unwrap_or_default();
    let labels = ComponentLabels::new(scope.name(), scope.namespace(), COMPONENT_AGENT, "Agent")
        .with_extras(&instance.extra_pod_labels, &instance.extra_pod_annotations);

    let image = instance
        .image
        .clone()
        .unwrap_or_else(|| scope.spec().core_image.clone());

    let config_gen = cfgen.clone();
    let workload = Workload::new(
        labels,
        "agent",
        "agents",
        "/usr/bin/strata-agent",
        "agent.json",
        image,
        AGENT_RPC_PORT,
        instance,
        Box::new(move || config_gen.agent_config()),
    );

    RoleComponent::new("agent", true, scope, platform, workload).with_dependency("master")
}
