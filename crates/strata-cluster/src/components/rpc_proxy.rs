//! RPC proxy driver.

use std::sync::Arc;

use strata_common::consts::{COMPONENT_RPC_PROXY, RPC_PROXY_PORT};
use strata_common::labels::ComponentLabels;

use crate::cluster::ClusterScope;
use crate::config::ConfigGenerator;
use crate::platform::PlatformClient;
use crate::workload::Workload;

use super::RoleComponent;

/// Build the RPC proxy component. Callers only invoke this when the spec
/// declares RPC proxies.
pub fn rpc_proxy(
    scope: Arc<ClusterScope>,
    platform: Arc<dyn PlatformClient>,
    cfgen: Arc<ConfigGenerator>,
) -> RoleComponent {
    let instance = scope.spec().rpc_proxies.clone().unwrap_or_default();
    let labels = ComponentLabels::new(
        scope.name(),
        scope.namespace(),
        COMPONENT_RPC_PROXY,
        "RpcProxy",
    )
    .with_extras(&instance.extra_pod_labels, &instance.extra_pod_annotations);

    let image = instance
        .image
        .clone()
        .unwrap_or_else(|| scope.spec().core_image.clone());

    let config_gen = cfgen.clone();
    let workload = Workload::new(
        labels,
        "rpc-proxy",
        "rpc-proxies",
        "/usr/bin/strata-proxy",
        "rpc-proxy.json",
        image,
        RPC_PROXY_PORT,
        instance,
        Box::new(move || config_gen.rpc_proxy_config()),
    );

    RoleComponent::new("rpc-proxy", true, scope, platform, workload).with_dependency("master")
}
