//! Strata cluster reconciliation core.
//!
//! The component lifecycle state machine, per-role drivers, the cluster-wide
//! rolling-update orchestrator and the topology synchronizer. Everything in
//! this crate is level-triggered and idempotent: a reconcile pass fetches
//! observed state, computes statuses without side effects, and applies
//! idempotent "ensure desired state" writes. No durable state lives in the
//! process; cross-pass coordination goes through Conditions on the
//! StrataCluster resource.

pub mod catalog;
pub mod cluster;
pub mod components;
pub mod config;
pub mod init_job;
pub mod platform;
pub mod resources;
pub mod topology;
pub mod update;
pub mod workload;

pub use components::{Component, ComponentStatus, PassState, SyncStatus};
