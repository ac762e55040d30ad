//! Config artifact generation.
//!
//! `generate(role, spec) -> bytes` is a pure function of the declared
//! cluster spec: no I/O, deterministic output. Each role's config carries
//! the quorum peer addresses and the shared cluster-connection block, so a
//! spec change that moves addresses or ports shows up as a config checksum
//! change on the owning workload.
//!
//! Object naming also lives here: statefulset, service and pod names are
//! derived in one place so config addresses and built objects agree.

use serde_json::json;

use strata_common::consts::{
    AGENT_RPC_PORT, DATA_NODE_RPC_PORT, EXEC_NODE_RPC_PORT, HTTP_PROXY_PORT,
    MASTER_CACHE_RPC_PORT, MASTER_RPC_PORT, MONITORING_PORT, RPC_PROXY_PORT, TABLET_NODE_RPC_PORT,
};
use strata_common::crd::{MastersSpec, PoolSpec, StrataClusterSpec};
use strata_common::{Error, Result};

/// Generates config artifacts and object names for one cluster.
pub struct ConfigGenerator {
    cluster_name: String,
    namespace: String,
    cluster_domain: String,
    spec: StrataClusterSpec,
}

impl ConfigGenerator {
    /// Create a generator for the given cluster
    pub fn new(
        cluster_name: impl Into<String>,
        namespace: impl Into<String>,
        cluster_domain: impl Into<String>,
        spec: StrataClusterSpec,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            namespace: namespace.into(),
            cluster_domain: cluster_domain.into(),
            spec,
        }
    }

    // ---- object naming -------------------------------------------------

    /// StatefulSet name for a master cell
    pub fn master_stateful_set_name(&self, cell_tag: u16) -> String {
        format!("master-{cell_tag}")
    }

    /// Headless service name for a master cell
    pub fn master_service_name(&self, cell_tag: u16) -> String {
        format!("masters-{cell_tag}")
    }

    /// StatefulSet name for the master caches
    pub fn master_cache_stateful_set_name(&self) -> String {
        "master-cache".to_string()
    }

    /// Headless service name for the master caches
    pub fn master_cache_service_name(&self) -> String {
        "master-caches".to_string()
    }

    /// StatefulSet name for a node pool ("data-node", "data-node-ssd", ...)
    pub fn pool_stateful_set_name(&self, role: &str, pool: Option<&str>) -> String {
        match pool {
            Some(pool) if !pool.is_empty() => format!("{role}-{pool}"),
            _ => role.to_string(),
        }
    }

    /// Headless service name for a node pool
    pub fn pool_service_name(&self, role: &str, pool: Option<&str>) -> String {
        match pool {
            Some(pool) if !pool.is_empty() => format!("{role}s-{pool}"),
            _ => format!("{role}s"),
        }
    }

    /// Name of the HTTP proxies' balancer (ClusterIP) service
    pub fn http_proxy_balancer_name(&self) -> String {
        "http-proxies-lb".to_string()
    }

    /// FQDN suffix for pods governed by the given headless service
    pub fn pod_fqdn_suffix(&self, service_name: &str) -> String {
        format!(
            "{}.{}.svc.{}",
            service_name, self.namespace, self.cluster_domain
        )
    }

    /// Stable pod FQDNs for a statefulset of `replicas` instances
    pub fn pod_fqdns(&self, sts_name: &str, service_name: &str, replicas: i32) -> Vec<String> {
        let suffix = self.pod_fqdn_suffix(service_name);
        (0..replicas.max(0))
            .map(|idx| format!("{sts_name}-{idx}.{suffix}"))
            .collect()
    }

    /// Administrative endpoint served by the HTTP proxies, if any
    pub fn admin_endpoint(&self) -> Option<String> {
        self.spec.http_proxies.as_ref().map(|_| {
            format!(
                "http://{}.{}.svc.{}:{}",
                self.http_proxy_balancer_name(),
                self.namespace,
                self.cluster_domain,
                HTTP_PROXY_PORT,
            )
        })
    }

    // ---- addresses -----------------------------------------------------

    /// RPC addresses of one master cell's members.
    ///
    /// Pinned host addresses take precedence: pinned masters are reachable
    /// on the host network identity rather than the pod FQDN.
    pub fn master_addresses(&self, cell: &MastersSpec) -> Vec<String> {
        let hosts = if cell.host_addresses.is_empty() {
            self.pod_fqdns(
                &self.master_stateful_set_name(cell.cell_tag),
                &self.master_service_name(cell.cell_tag),
                cell.instance.replicas,
            )
        } else {
            cell.host_addresses.clone()
        };
        hosts
            .into_iter()
            .map(|host| format!("{host}:{MASTER_RPC_PORT}"))
            .collect()
    }

    fn master_cache_addresses(&self) -> Vec<String> {
        let Some(caches) = &self.spec.master_caches else {
            return Vec::new();
        };
        let hosts = if caches.host_addresses.is_empty() {
            self.pod_fqdns(
                &self.master_cache_stateful_set_name(),
                &self.master_cache_service_name(),
                caches.instance.replicas,
            )
        } else {
            caches.host_addresses.clone()
        };
        hosts
            .into_iter()
            .map(|host| format!("{host}:{MASTER_CACHE_RPC_PORT}"))
            .collect()
    }

    /// The shared cluster-connection block embedded in every role config
    /// and pushed into the catalog by the master init script.
    pub fn cluster_connection(&self) -> serde_json::Value {
        let mut connection = json!({
            "cluster_name": self.cluster_name,
            "primary_master": {
                "cell_tag": self.spec.masters.cell_tag,
                "addresses": self.master_addresses(&self.spec.masters),
            },
            "secondary_masters": self
                .spec
                .secondary_masters
                .iter()
                .map(|cell| json!({
                    "cell_tag": cell.cell_tag,
                    "addresses": self.master_addresses(cell),
                }))
                .collect::<Vec<_>>(),
        });
        let caches = self.master_cache_addresses();
        if !caches.is_empty() {
            connection["master_cache"] = json!({ "addresses": caches });
        }
        connection
    }

    // ---- role configs --------------------------------------------------

    /// Config artifact for a master cell
    pub fn master_config(&self, cell: &MastersSpec) -> Result<Vec<u8>> {
        let peers = self.master_addresses(cell);
        if peers.is_empty() {
            return Err(Error::config("master", "master cell has no members"));
        }
        to_bytes(
            "master",
            json!({
                "rpc_port": MASTER_RPC_PORT,
                "monitoring_port": MONITORING_PORT,
                "cell_tag": cell.cell_tag,
                "quorum": { "peers": peers },
                "cluster_connection": self.cluster_connection(),
            }),
        )
    }

    /// Config artifact for the master caches
    pub fn master_cache_config(&self) -> Result<Vec<u8>> {
        to_bytes(
            "master-cache",
            json!({
                "rpc_port": MASTER_CACHE_RPC_PORT,
                "monitoring_port": MONITORING_PORT,
                "cluster_connection": self.cluster_connection(),
            }),
        )
    }

    /// Config artifact for a data node pool
    pub fn data_node_config(&self, pool: &PoolSpec) -> Result<Vec<u8>> {
        to_bytes(
            "data-node",
            json!({
                "rpc_port": DATA_NODE_RPC_PORT,
                "monitoring_port": MONITORING_PORT,
                "pool": pool.name.clone().unwrap_or_default(),
                "flavors": ["data"],
                "cluster_connection": self.cluster_connection(),
            }),
        )
    }

    /// Config artifact for an exec node pool
    pub fn exec_node_config(&self, pool: &PoolSpec) -> Result<Vec<u8>> {
        to_bytes(
            "exec-node",
            json!({
                "rpc_port": EXEC_NODE_RPC_PORT,
                "monitoring_port": MONITORING_PORT,
                "pool": pool.name.clone().unwrap_or_default(),
                "flavors": ["exec"],
                "cluster_connection": self.cluster_connection(),
            }),
        )
    }

    /// Config artifact for a tablet node pool
    pub fn tablet_node_config(&self, pool: &PoolSpec) -> Result<Vec<u8>> {
        to_bytes(
            "tablet-node",
            json!({
                "rpc_port": TABLET_NODE_RPC_PORT,
                "monitoring_port": MONITORING_PORT,
                "pool": pool.name.clone().unwrap_or_default(),
                "flavors": ["tablet"],
                "cluster_connection": self.cluster_connection(),
            }),
        )
    }

    /// Config artifact for the HTTP proxies
    pub fn http_proxy_config(&self) -> Result<Vec<u8>> {
        to_bytes(
            "http-proxy",
            json!({
                "port": HTTP_PROXY_PORT,
                "monitoring_port": MONITORING_PORT,
                "cluster_connection": self.cluster_connection(),
            }),
        )
    }

    /// Config artifact for the RPC proxies
    pub fn rpc_proxy_config(&self) -> Result<Vec<u8>> {
        to_bytes(
            "rpc-proxy",
            json!({
                "rpc_port": RPC_PROXY_PORT,
                "monitoring_port": MONITORING_PORT,
                "cluster_connection": self.cluster_connection(),
            }),
        )
    }

    /// Config artifact for the controller agents
    pub fn agent_config(&self) -> Result<Vec<u8>> {
        to_bytes(
            "agent",
            json!({
                "rpc_port": AGENT_RPC_PORT,
                "monitoring_port": MONITORING_PORT,
                "cluster_connection": self.cluster_connection(),
            }),
        )
    }

    /// Native client config used by init-job scripts
    pub fn client_config(&self) -> Result<Vec<u8>> {
        to_bytes(
            "client",
            json!({
                "driver": self.cluster_connection(),
            }),
        )
    }
}

fn to_bytes(role: &str, value: serde_json::Value) -> Result<Vec<u8>> {
    serde_json::to_vec(&value).map_err(|e| Error::config(role, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::crd::{InstanceSpec, MasterCachesSpec};

    fn generator() -> ConfigGenerator {
        ConfigGenerator::new(
            "demo",
            "strata",
            "cluster.local",
            StrataClusterSpec {
                core_image: "strata/core:24.1".to_string(),
                masters: MastersSpec {
                    cell_tag: 1,
                    instance: InstanceSpec {
                        replicas: 3,
                        ..Default::default()
                    },
                    ..Default::default()
                },
                ..Default::default()
            },
        )
    }

    #[test]
    fn master_addresses_use_pod_fqdns_without_pinning() {
        let addresses = generator().master_addresses(&generator().spec.masters);
        assert_eq!(addresses.len(), 3);
        assert_eq!(
            addresses[0],
            "master-1-0.masters-1.strata.svc.cluster.local:9010"
        );
    }

    #[test]
    fn master_addresses_prefer_pinned_hosts() {
        let mut gen = generator();
        gen.spec.masters.host_addresses =
            vec!["h1.dc".to_string(), "h2.dc".to_string(), "h3.dc".to_string()];
        let addresses = gen.master_addresses(&gen.spec.masters.clone());
        assert_eq!(addresses, vec!["h1.dc:9010", "h2.dc:9010", "h3.dc:9010"]);
    }

    #[test]
    fn cluster_connection_omits_absent_caches() {
        let connection = generator().cluster_connection();
        assert!(connection.get("master_cache").is_none());

        let mut gen = generator();
        gen.spec.master_caches = Some(MasterCachesSpec {
            instance: InstanceSpec {
                replicas: 2,
                ..Default::default()
            },
            ..Default::default()
        });
        let connection = gen.cluster_connection();
        assert_eq!(
            connection["master_cache"]["addresses"]
                .as_array()
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn config_generation_is_deterministic() {
        let gen = generator();
        let first = gen.master_config(&gen.spec.masters.clone()).unwrap();
        let second = gen.master_config(&gen.spec.masters.clone()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_master_cell_is_a_config_error() {
        let mut gen = generator();
        gen.spec.masters.instance.replicas = 0;
        let cell = gen.spec.masters.clone();
        let err = gen.master_config(&cell).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn pool_names_compose() {
        let gen = generator();
        assert_eq!(gen.pool_stateful_set_name("data-node", None), "data-node");
        assert_eq!(
            gen.pool_stateful_set_name("data-node", Some("ssd")),
            "data-node-ssd"
        );
        assert_eq!(gen.pool_service_name("data-node", Some("ssd")), "data-nodes-ssd");
    }

    #[test]
    fn admin_endpoint_requires_http_proxies() {
        assert!(generator().admin_endpoint().is_none());

        let mut gen = generator();
        gen.spec.http_proxies = Some(InstanceSpec {
            replicas: 2,
            ..Default::default()
        });
        assert_eq!(
            gen.admin_endpoint().unwrap(),
            "http://http-proxies-lb.strata.svc.cluster.local:80"
        );
    }
}
