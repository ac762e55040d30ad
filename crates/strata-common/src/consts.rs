//! Shared constants: ports, label keys and condition types.

/// Label key carrying the `<cluster>-<component>` selector value
pub const COMPONENT_LABEL_KEY: &str = "strata.io/component";

/// Label key marking pods whose monitoring endpoint should be scraped
pub const METRICS_LABEL_KEY: &str = "strata.io/metrics";

/// Pod template annotation carrying the SHA-256 of the generated config artifact
pub const CONFIG_CHECKSUM_ANNOTATION: &str = "strata.io/config-checksum";

/// Default placement-label key used for pinning quorum roles to hosts
pub const DEFAULT_HOST_ADDRESS_LABEL: &str = "kubernetes.io/hostname";

/// Default Kubernetes cluster domain for pod FQDNs
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

// Component label values (per role)

/// Master cell component label
pub const COMPONENT_MASTER: &str = "strata-master";
/// Secondary master component label
pub const COMPONENT_SECONDARY_MASTER: &str = "strata-secondary-master";
/// Master cache component label
pub const COMPONENT_MASTER_CACHE: &str = "strata-master-cache";
/// Data node component label
pub const COMPONENT_DATA_NODE: &str = "strata-data-node";
/// Exec node component label
pub const COMPONENT_EXEC_NODE: &str = "strata-exec-node";
/// Tablet node component label
pub const COMPONENT_TABLET_NODE: &str = "strata-tablet-node";
/// HTTP proxy component label
pub const COMPONENT_HTTP_PROXY: &str = "strata-http-proxy";
/// RPC proxy component label
pub const COMPONENT_RPC_PROXY: &str = "strata-rpc-proxy";
/// Controller agent component label
pub const COMPONENT_AGENT: &str = "strata-agent";

// RPC ports (one per role, fixed across the fleet)

/// Master quorum RPC port
pub const MASTER_RPC_PORT: u16 = 9010;
/// Master cache RPC port
pub const MASTER_CACHE_RPC_PORT: u16 = 9018;
/// Data node RPC port
pub const DATA_NODE_RPC_PORT: u16 = 9012;
/// Exec node RPC port
pub const EXEC_NODE_RPC_PORT: u16 = 9014;
/// Tablet node RPC port
pub const TABLET_NODE_RPC_PORT: u16 = 9022;
/// HTTP proxy serving port
pub const HTTP_PROXY_PORT: u16 = 80;
/// RPC proxy port
pub const RPC_PROXY_PORT: u16 = 9013;
/// Controller agent RPC port
pub const AGENT_RPC_PORT: u16 = 9016;

/// Monitoring (metrics) port shared by all server roles
pub const MONITORING_PORT: u16 = 10000;

// Condition types (persisted on the StrataCluster resource)

/// Masters ran the preparatory script and are ready to exit read-only mode
pub const CONDITION_MASTER_EXIT_READ_ONLY_PREPARED: &str = "MasterExitReadOnlyPrepared";
/// Masters were told to exit read-only mode
pub const CONDITION_MASTER_EXITED_READ_ONLY: &str = "MasterExitedReadOnly";
