//! Orchestration-platform client.
//!
//! One trait abstracts every Kubernetes operation the core performs, so the
//! state machine can be exercised in tests with a mock while production uses
//! the real client. All writes are idempotent server-side applies; reads
//! surface 404 as `None` rather than an error.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::Client;
use tracing::debug;

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

use strata_common::crd::{StrataCluster, StrataClusterStatus};
use strata_common::{Error, Result, FIELD_MANAGER};

/// Trait abstracting Kubernetes operations for Strata components.
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Get a StrataCluster, or None if it does not exist
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<StrataCluster>>;

    /// Patch the status subresource of a StrataCluster
    async fn patch_cluster_status(
        &self,
        namespace: &str,
        name: &str,
        status: &StrataClusterStatus,
    ) -> Result<()>;

    /// Get a StatefulSet, or None if it does not exist
    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>>;

    /// Create-or-patch a StatefulSet to the desired shape
    async fn apply_stateful_set(&self, desired: &StatefulSet) -> Result<()>;

    /// Scale a StatefulSet to the given replica count
    async fn scale_stateful_set(&self, namespace: &str, name: &str, replicas: i32) -> Result<()>;

    /// Create-or-patch a ConfigMap
    async fn apply_config_map(&self, desired: &ConfigMap) -> Result<()>;

    /// Create-or-patch a Service
    async fn apply_service(&self, desired: &Service) -> Result<()>;

    /// Get a Job, or None if it does not exist
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>>;

    /// Create-or-patch a Job
    async fn apply_job(&self, desired: &Job) -> Result<()>;

    /// Delete a Job (and its pods); absent jobs are not an error
    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()>;

    /// List pods matching a label selector
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>>;
}

/// Production implementation backed by a kube `Client`.
pub struct KubePlatform {
    client: Client,
}

impl KubePlatform {
    /// Wrap the given kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn apply_params() -> PatchParams {
        PatchParams::apply(FIELD_MANAGER).force()
    }
}

#[async_trait]
impl PlatformClient for KubePlatform {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<StrataCluster>> {
        let api: Api<StrataCluster> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(cluster) => Ok(Some(cluster)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_cluster_status(
        &self,
        namespace: &str,
        name: &str,
        status: &StrataClusterStatus,
    ) -> Result<()> {
        let api: Api<StrataCluster> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "status": status });
        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(sts) => Ok(Some(sts)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_stateful_set(&self, desired: &StatefulSet) -> Result<()> {
        let (namespace, name) = object_keys(&desired.metadata)?;
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), &namespace);
        api.patch(&name, &Self::apply_params(), &Patch::Apply(desired))
            .await?;
        debug!(statefulset = %name, "applied StatefulSet");
        Ok(())
    }

    async fn scale_stateful_set(&self, namespace: &str, name: &str, replicas: i32) -> Result<()> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!(statefulset = %name, replicas, "scaled StatefulSet");
        Ok(())
    }

    async fn apply_config_map(&self, desired: &ConfigMap) -> Result<()> {
        let (namespace, name) = object_keys(&desired.metadata)?;
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &namespace);
        api.patch(&name, &Self::apply_params(), &Patch::Apply(desired))
            .await?;
        Ok(())
    }

    async fn apply_service(&self, desired: &Service) -> Result<()> {
        let (namespace, name) = object_keys(&desired.metadata)?;
        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        api.patch(&name, &Self::apply_params(), &Patch::Apply(desired))
            .await?;
        Ok(())
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(job) => Ok(Some(job)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_job(&self, desired: &Job) -> Result<()> {
        let (namespace, name) = object_keys(&desired.metadata)?;
        let api: Api<Job> = Api::namespaced(self.client.clone(), &namespace);
        api.patch(&name, &Self::apply_params(), &Patch::Apply(desired))
            .await?;
        Ok(())
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        // Foreground-delete so the job's pods go away with it
        let params = DeleteParams {
            propagation_policy: Some(kube::api::PropagationPolicy::Foreground),
            ..Default::default()
        };
        match api.delete(name, &params).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(job = %name, "job not found (already deleted)");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default().labels(selector)).await?;
        Ok(pods.items)
    }
}

fn object_keys(
    meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
) -> Result<(String, String)> {
    let name = meta
        .name
        .clone()
        .ok_or_else(|| Error::internal_with_context("platform", "object has no name"))?;
    let namespace = meta
        .namespace
        .clone()
        .ok_or_else(|| Error::internal_with_context("platform", "object has no namespace"))?;
    Ok((namespace, name))
}
