//! Topology synchronizer.
//!
//! Mirrors physical placement (host/rack/datacenter) from running instances
//! into the cluster's own metadata catalog, so the storage engine can make
//! failure-domain-aware placement decisions. The catalog is the system of
//! record; facts are re-derived from pod placement labels on every pass.
//!
//! Every per-item catalog operation is independently fallible: failures are
//! collected and logged, never aborting the remaining items. Partial
//! convergence self-heals on the next pass; nothing is retried in-pass.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use strata_common::crd::RackAwarenessSpec;
use strata_common::labels::ComponentLabels;
use strata_common::Result;

use crate::catalog::{CatalogClient, CatalogKind};
use crate::platform::PlatformClient;

/// Outcome of one synchronizer run: which items failed, if any.
#[derive(Debug, Default)]
pub struct TopologySummary {
    /// Racks and datacenters touched this pass
    pub racks: usize,
    /// Per-item failures ("ensure rack r1: ..."), logged by the caller
    pub failures: Vec<String>,
}

/// Synchronizes rack/datacenter facts for one component's instances.
pub struct TopologySync {
    labels: ComponentLabels,
    /// FQDN suffix joined with a pod's hostname to form its stable address
    service_fqdn_suffix: String,
    node_port: u16,
}

impl TopologySync {
    /// Create a synchronizer for the pods selected by `labels`.
    pub fn new(labels: ComponentLabels, service_fqdn_suffix: String, node_port: u16) -> Self {
        Self {
            labels,
            service_fqdn_suffix,
            node_port,
        }
    }

    /// Derive topology facts from running pods and push them to the catalog.
    ///
    /// A pod participates when it carries the configured rack label; its
    /// physical host comes from the pod's node assignment, its stable
    /// address from the pod hostname joined with the governing service.
    pub async fn sync(
        &self,
        platform: &dyn PlatformClient,
        catalog: &dyn CatalogClient,
        spec: &RackAwarenessSpec,
    ) -> Result<TopologySummary> {
        info!(
            component = %self.labels.component_name,
            rack_label = %spec.rack_label,
            datacenter_label = ?spec.datacenter_label,
            "synchronizing topology"
        );

        let pods = platform
            .list_pods(&self.labels.namespace, &self.labels.selector())
            .await?;

        // rack -> set of physical hosts
        let mut rack_hosts: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        // rack -> set of node addresses (host:port)
        let mut rack_addresses: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        // datacenter -> set of racks
        let mut dc_racks: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for pod in &pods {
            let labels = pod.metadata.labels.clone().unwrap_or_default();
            let Some(rack) = labels.get(&spec.rack_label) else {
                continue;
            };

            if let Some(host) = pod.spec.as_ref().and_then(|s| s.node_name.clone()) {
                if !host.is_empty() {
                    rack_hosts.entry(rack.clone()).or_default().insert(host);
                }
            }

            let hostname = pod
                .spec
                .as_ref()
                .and_then(|s| s.hostname.clone())
                .or_else(|| pod.metadata.name.clone());
            if let Some(hostname) = hostname {
                let address = format!(
                    "{}.{}:{}",
                    hostname, self.service_fqdn_suffix, self.node_port
                );
                rack_addresses.entry(rack.clone()).or_default().insert(address);
            }

            if let Some(dc_label) = &spec.datacenter_label {
                if let Some(dc) = labels.get(dc_label) {
                    dc_racks.entry(dc.clone()).or_default().insert(rack.clone());
                }
            }
        }

        let mut summary = TopologySummary {
            racks: rack_hosts.len(),
            ..Default::default()
        };

        for (rack, hosts) in &rack_hosts {
            if let Err(e) = self.ensure_object(catalog, CatalogKind::Rack, rack).await {
                warn!(rack = %rack, error = %e, "ensure rack failed");
                summary.failures.push(format!("ensure rack {rack}: {e}"));
                continue;
            }

            for host in hosts {
                if let Err(e) = catalog
                    .set_attribute(&format!("/hosts/{host}"), "rack", rack)
                    .await
                {
                    warn!(host = %host, rack = %rack, error = %e, "set host rack failed");
                    summary.failures.push(format!("set rack of host {host}: {e}"));
                }
            }

            for address in rack_addresses.get(rack).into_iter().flatten() {
                if let Err(e) = catalog
                    .set_attribute(&format!("/nodes/{address}"), "rack", rack)
                    .await
                {
                    warn!(node = %address, rack = %rack, error = %e, "set node rack failed");
                    summary
                        .failures
                        .push(format!("set rack of node {address}: {e}"));
                }
            }
        }

        for (dc, racks) in &dc_racks {
            if let Err(e) = self
                .ensure_object(catalog, CatalogKind::Datacenter, dc)
                .await
            {
                warn!(datacenter = %dc, error = %e, "ensure datacenter failed");
                summary.failures.push(format!("ensure datacenter {dc}: {e}"));
                continue;
            }

            for rack in racks {
                if let Err(e) = catalog
                    .set_attribute(&format!("/racks/{rack}"), "datacenter", dc)
                    .await
                {
                    warn!(rack = %rack, datacenter = %dc, error = %e, "set rack datacenter failed");
                    summary
                        .failures
                        .push(format!("set datacenter of rack {rack}: {e}"));
                    continue;
                }

                for host in rack_hosts.get(rack).into_iter().flatten() {
                    if let Err(e) = catalog
                        .set_attribute(&format!("/hosts/{host}"), "datacenter", dc)
                        .await
                    {
                        warn!(host = %host, datacenter = %dc, error = %e, "set host datacenter failed");
                        summary
                            .failures
                            .push(format!("set datacenter of host {host}: {e}"));
                    }
                }

                for address in rack_addresses.get(rack).into_iter().flatten() {
                    if let Err(e) = catalog
                        .set_attribute(&format!("/nodes/{address}"), "datacenter", dc)
                        .await
                    {
                        warn!(node = %address, datacenter = %dc, error = %e, "set node datacenter failed");
                        summary
                            .failures
                            .push(format!("set datacenter of node {address}: {e}"));
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Idempotently ensure a catalog object exists. Creation races are
    /// success: a concurrent pass may have created it first.
    async fn ensure_object(
        &self,
        catalog: &dyn CatalogClient,
        kind: CatalogKind,
        name: &str,
    ) -> Result<()> {
        let path = format!("{}/{}", kind.directory(), name);
        if catalog.exists(&path).await? {
            debug!(path = %path, "catalog object already exists");
            return Ok(());
        }
        match catalog.create(kind, name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MockCatalogClient;
    use crate::platform::MockPlatformClient;
    use k8s_openapi::api::core::v1::{Pod, PodSpec};
    use std::collections::BTreeMap as Map;
    use std::sync::Mutex;
    use strata_common::Error;

    fn pod(name: &str, host: &str, rack: &str, dc: Option<&str>) -> Pod {
        let mut labels = Map::from([("topology.strata.io/rack".to_string(), rack.to_string())]);
        if let Some(dc) = dc {
            labels.insert("topology.strata.io/datacenter".to_string(), dc.to_string());
        }
        Pod {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some(host.to_string()),
                hostname: Some(name.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn spec() -> RackAwarenessSpec {
        RackAwarenessSpec {
            rack_label: "topology.strata.io/rack".to_string(),
            datacenter_label: Some("topology.strata.io/datacenter".to_string()),
        }
    }

    fn synchronizer() -> TopologySync {
        TopologySync::new(
            ComponentLabels::new("demo", "strata", "strata-data-node", "DataNode"),
            "data-nodes.strata.svc.cluster.local".to_string(),
            9012,
        )
    }

    fn platform_with_pods(pods: Vec<Pod>) -> MockPlatformClient {
        let mut platform = MockPlatformClient::new();
        platform
            .expect_list_pods()
            .returning(move |_, _| Ok(pods.clone()));
        platform
    }

    /// Recording catalog: remembers every operation for assertions.
    #[derive(Default)]
    struct RecordingCatalog {
        created: Mutex<Vec<String>>,
        attributes: Mutex<Vec<(String, String, String)>>,
        fail_on: Option<(String, String)>,
    }

    #[async_trait::async_trait]
    impl CatalogClient for RecordingCatalog {
        async fn exists(&self, _path: &str) -> strata_common::Result<bool> {
            Ok(false)
        }

        async fn create(&self, kind: CatalogKind, name: &str) -> strata_common::Result<()> {
            self.created
                .lock()
                .unwrap()
                .push(format!("{}/{}", kind.directory(), name));
            Ok(())
        }

        async fn set_attribute(
            &self,
            path: &str,
            attribute: &str,
            value: &str,
        ) -> strata_common::Result<()> {
            if let Some((fail_path, fail_attr)) = &self.fail_on {
                if path == fail_path && attribute == fail_attr {
                    return Err(Error::catalog(path, "injected failure"));
                }
            }
            self.attributes.lock().unwrap().push((
                path.to_string(),
                attribute.to_string(),
                value.to_string(),
            ));
            Ok(())
        }
    }

    /// Story: three pods in two racks and two datacenters converge the
    /// catalog in a single pass.
    #[tokio::test]
    async fn topology_converges_in_one_pass() {
        let platform = platform_with_pods(vec![
            pod("data-node-0", "h1", "r1", Some("d1")),
            pod("data-node-1", "h2", "r1", Some("d1")),
            pod("data-node-2", "h3", "r2", Some("d2")),
        ]);
        let catalog = RecordingCatalog::default();

        let summary = synchronizer()
            .sync(&platform, &catalog, &spec())
            .await
            .unwrap();

        assert!(summary.failures.is_empty());
        assert_eq!(summary.racks, 2);

        let created = catalog.created.lock().unwrap().clone();
        assert_eq!(
            created,
            vec!["/racks/r1", "/racks/r2", "/datacenters/d1", "/datacenters/d2"]
        );

        let attributes = catalog.attributes.lock().unwrap().clone();
        let has = |path: &str, attr: &str, value: &str| {
            attributes
                .iter()
                .any(|(p, a, v)| p == path && a == attr && v == value)
        };
        assert!(has("/hosts/h1", "rack", "r1"));
        assert!(has("/hosts/h2", "rack", "r1"));
        assert!(has("/hosts/h3", "rack", "r2"));
        assert!(has(
            "/nodes/data-node-0.data-nodes.strata.svc.cluster.local:9012",
            "rack",
            "r1"
        ));
        assert!(has("/racks/r1", "datacenter", "d1"));
        assert!(has("/racks/r2", "datacenter", "d2"));
        assert!(has("/hosts/h1", "datacenter", "d1"));
        assert!(has("/hosts/h3", "datacenter", "d2"));
        assert!(has(
            "/nodes/data-node-2.data-nodes.strata.svc.cluster.local:9012",
            "datacenter",
            "d2"
        ));
    }

    /// Story: one host failing to tag must not stop the remaining hosts,
    /// racks or datacenters from converging.
    #[tokio::test]
    async fn per_item_failures_are_isolated() {
        let platform = platform_with_pods(vec![
            pod("data-node-0", "h1", "r1", Some("d1")),
            pod("data-node-1", "h2", "r1", Some("d1")),
            pod("data-node-2", "h3", "r2", Some("d2")),
        ]);
        let catalog = RecordingCatalog {
            fail_on: Some(("/hosts/h2".to_string(), "rack".to_string())),
            ..Default::default()
        };

        let summary = synchronizer()
            .sync(&platform, &catalog, &spec())
            .await
            .unwrap();

        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].contains("h2"));

        // h1 was still tagged, r2 and d2 still created
        let created = catalog.created.lock().unwrap().clone();
        assert!(created.contains(&"/racks/r2".to_string()));
        assert!(created.contains(&"/datacenters/d2".to_string()));
        let attributes = catalog.attributes.lock().unwrap().clone();
        assert!(attributes
            .iter()
            .any(|(p, a, _)| p == "/hosts/h1" && a == "rack"));
        assert!(attributes
            .iter()
            .any(|(p, a, _)| p == "/hosts/h3" && a == "rack"));
    }

    /// Pods without the rack label don't participate.
    #[tokio::test]
    async fn unlabelled_pods_are_skipped() {
        let mut unlabelled = pod("data-node-9", "h9", "r9", None);
        unlabelled.metadata.labels = Some(Map::new());
        let platform = platform_with_pods(vec![unlabelled]);
        let catalog = RecordingCatalog::default();

        let summary = synchronizer()
            .sync(&platform, &catalog, &spec())
            .await
            .unwrap();
        assert_eq!(summary.racks, 0);
        assert!(catalog.created.lock().unwrap().is_empty());
    }

    /// Already-exists creation races are success, not failures.
    #[tokio::test]
    async fn creation_races_count_as_success() {
        let platform = platform_with_pods(vec![pod("data-node-0", "h1", "r1", None)]);

        let mut catalog = MockCatalogClient::new();
        catalog.expect_exists().returning(|_| Ok(false));
        catalog
            .expect_create()
            .returning(|_, name| Err(Error::catalog_already_exists(format!("/racks/{name}"))));
        catalog.expect_set_attribute().returning(|_, _, _| Ok(()));

        let summary = synchronizer()
            .sync(&platform, &catalog, &spec())
            .await
            .unwrap();
        assert!(summary.failures.is_empty());
    }

    /// A failing pod list aborts the whole run (transient platform error).
    #[tokio::test]
    async fn list_failure_propagates() {
        let mut platform = MockPlatformClient::new();
        platform.expect_list_pods().returning(|_, _| {
            Err(Error::internal_with_context("platform", "connection reset"))
        });
        let catalog = RecordingCatalog::default();

        let result = synchronizer().sync(&platform, &catalog, &spec()).await;
        assert!(result.is_err());
    }
}
