//! Custom Resource Definitions for the Strata operator

mod cluster;
mod types;

pub use cluster::{StrataCluster, StrataClusterSpec, StrataClusterStatus};
pub use types::{
    is_condition_true, upsert_condition, ClusterState, Condition, ConditionStatus, InstanceSpec,
    MasterCachesSpec, MastersSpec, PoolSpec, RackAwarenessSpec, UpdateState,
};
