//! HTTP proxy driver.
//!
//! HTTP proxies are the user-facing API endpoint; besides the headless
//! service they get a ClusterIP balancer service, which is also where the
//! operator's own catalog client connects.

use std::sync::Arc;

use strata_common::consts::{COMPONENT_HTTP_PROXY, HTTP_PROXY_PORT};
use strata_common::labels::ComponentLabels;

use crate::cluster::ClusterScope;
use crate::config::ConfigGenerator;
use crate::platform::PlatformClient;
use crate::workload::Workload;

use super::RoleComponent;

/// Build the HTTP proxy component. Callers only invoke this when the spec
/// declares HTTP proxies.
pub fn http_proxy(
    scope: Arc<ClusterScope>,
    platform: Arc<dyn PlatformClient>,
    cfgen: Arc<ConfigGenerator>,
) -> RoleComponent {
    let instance = scope.spec().http_proxies.clone().unwrap_or_default();
    let labels = ComponentLabels::new(
        scope.name(),
        scope.namespace(),
        COMPONENT_HTTP_PROXY,
        "HttpProxy",
    )
    .with_extras(&instance.extra_pod_labels, &instance.extra_pod_annotations);

    let image = instance
        .image
        .clone()
        .unwrap_or_else(|| scope.spec().core_image.clone());

    let config_gen = cfgen.clone();
    let workload = Workload::new(
        labels,
        "http-proxy",
        "http-proxies",
        "/usr/bin/strata-proxy",
        "http-proxy.json",
        image,
        HTTP_PROXY_PORT,
        instance,
        Box::new(move || config_gen.http_proxy_config()),
    )
    .with_balancer(cfgen.http_proxy_balancer_name(), HTTP_PROXY_PORT);

    RoleComponent::new("http-proxy", true, scope, platform, workload).with_dependency("master")
}
