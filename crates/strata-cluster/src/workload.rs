//! Workload handle: one managed instance set plus its network endpoint and
//! config artifact.
//!
//! The handle owns the desired shape (derived from the cluster spec and the
//! generated config) and the observed StatefulSet (fetched at pass start).
//! `needs_sync` answers "does observed diverge from desired at all";
//! `needs_full_update` answers the narrower "does converging require a
//! disruptive restart". All writes are idempotent applies; convergence is
//! observed on a later pass, never awaited.

use sha2::{Digest, Sha256};
use tracing::debug;

use k8s_openapi::api::apps::v1::StatefulSet;

use strata_common::consts::CONFIG_CHECKSUM_ANNOTATION;
use strata_common::crd::InstanceSpec;
use strata_common::labels::ComponentLabels;
use strata_common::Result;

use crate::platform::PlatformClient;
use crate::resources::{self, StatefulSetParams};

/// Closure producing the role's config artifact from the declared spec.
pub type ConfigFn = Box<dyn Fn() -> Result<Vec<u8>> + Send + Sync>;

/// One managed instance set + endpoint + config artifact.
pub struct Workload {
    labels: ComponentLabels,
    sts_name: String,
    service_name: String,
    /// Extra ClusterIP service exposing this role to users, if any
    balancer: Option<(String, u16)>,
    command: String,
    config_file: String,
    config_fn: ConfigFn,
    image: String,
    rpc_port: u16,
    instance: InstanceSpec,
    pinned_hosts: Vec<String>,
    host_address_label: String,

    config: Vec<u8>,
    config_checksum: String,
    observed: Option<StatefulSet>,
}

impl Workload {
    /// Create a workload handle for one role.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        labels: ComponentLabels,
        sts_name: impl Into<String>,
        service_name: impl Into<String>,
        command: impl Into<String>,
        config_file: impl Into<String>,
        image: impl Into<String>,
        rpc_port: u16,
        instance: InstanceSpec,
        config_fn: ConfigFn,
    ) -> Self {
        Self {
            labels,
            sts_name: sts_name.into(),
            service_name: service_name.into(),
            balancer: None,
            command: command.into(),
            config_file: config_file.into(),
            config_fn,
            image: image.into(),
            rpc_port,
            instance,
            pinned_hosts: Vec::new(),
            host_address_label: strata_common::consts::DEFAULT_HOST_ADDRESS_LABEL.to_string(),
            config: Vec::new(),
            config_checksum: String::new(),
            observed: None,
        }
    }

    /// Pin each replica onto one of the given hosts (quorum roles).
    pub fn with_pinned_hosts(mut self, hosts: Vec<String>, label_key: impl Into<String>) -> Self {
        self.pinned_hosts = hosts;
        self.host_address_label = label_key.into();
        self
    }

    /// Additionally expose the role through a ClusterIP balancer service.
    pub fn with_balancer(mut self, name: impl Into<String>, port: u16) -> Self {
        self.balancer = Some((name.into(), port));
        self
    }

    /// Label manager of the owning component
    pub fn labels(&self) -> &ComponentLabels {
        &self.labels
    }

    /// Governing headless service name
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Read observed state and regenerate the config artifact.
    ///
    /// Config generation failure is fatal for the pass: without the
    /// artifact no divergence predicate (and no valid status) exists.
    pub async fn fetch(&mut self, platform: &dyn PlatformClient) -> Result<()> {
        self.config = (self.config_fn)()?;
        self.config_checksum = checksum(&self.config);
        self.observed = platform
            .get_stateful_set(&self.labels.namespace, &self.sts_name)
            .await?;
        Ok(())
    }

    fn observed_checksum(&self) -> Option<&str> {
        self.observed
            .as_ref()?
            .spec
            .as_ref()?
            .template
            .metadata
            .as_ref()?
            .annotations
            .as_ref()?
            .get(CONFIG_CHECKSUM_ANNOTATION)
            .map(String::as_str)
    }

    fn observed_image(&self) -> Option<&str> {
        self.observed
            .as_ref()?
            .spec
            .as_ref()?
            .template
            .spec
            .as_ref()?
            .containers
            .first()?
            .image
            .as_deref()
    }

    fn observed_replicas(&self) -> Option<i32> {
        self.observed.as_ref()?.spec.as_ref()?.replicas
    }

    /// True iff observed state diverges from desired in any way.
    pub fn needs_sync(&self) -> bool {
        let Some(observed) = &self.observed else {
            return true;
        };
        self.labels.needs_label_sync(&observed.metadata)
            || self.observed_replicas() != Some(self.instance.replicas)
            || self.observed_checksum() != Some(self.config_checksum.as_str())
            || self.observed_image() != Some(self.image.as_str())
    }

    /// True iff converging requires a disruptive update: the running pods
    /// were built from a different image or config artifact.
    pub fn needs_full_update(&self) -> bool {
        if !self.pods_exist() {
            return false;
        }
        self.observed_checksum() != Some(self.config_checksum.as_str())
            || self.observed_image() != Some(self.image.as_str())
    }

    /// True iff every desired replica is up, ready and current.
    pub fn pods_ready(&self) -> bool {
        let Some(status) = self.observed.as_ref().and_then(|sts| sts.status.as_ref()) else {
            return false;
        };
        let desired = self.instance.replicas;
        let generation_current = self
            .observed
            .as_ref()
            .and_then(|sts| sts.metadata.generation)
            == status.observed_generation;
        status.ready_replicas.unwrap_or(0) == desired
            && status.updated_replicas.unwrap_or(0) == desired
            && generation_current
    }

    /// True iff any pods of this workload currently exist.
    pub fn pods_exist(&self) -> bool {
        self.observed
            .as_ref()
            .and_then(|sts| sts.status.as_ref())
            .map(|status| status.replicas > 0)
            .unwrap_or(false)
    }

    /// Scale the instance set to zero; pod departure is observed later.
    pub async fn remove_pods(&self, platform: &dyn PlatformClient) -> Result<()> {
        debug!(statefulset = %self.sts_name, "scaling workload to zero for update");
        platform
            .scale_stateful_set(&self.labels.namespace, &self.sts_name, 0)
            .await
    }

    /// Apply the desired config artifact, services and instance set.
    pub async fn sync(&self, platform: &dyn PlatformClient) -> Result<()> {
        let config_map = resources::config_map(
            &self.labels,
            &self.labels.config_map_name(),
            &self.config_file,
            std::str::from_utf8(&self.config).unwrap_or_default(),
        );
        platform.apply_config_map(&config_map).await?;

        let service =
            resources::headless_service(&self.labels, &self.service_name, self.rpc_port);
        platform.apply_service(&service).await?;

        if let Some((name, port)) = &self.balancer {
            let balancer = resources::balancer_service(&self.labels, name, *port);
            platform.apply_service(&balancer).await?;
        }

        let mut sts = resources::stateful_set(&StatefulSetParams {
            labels: &self.labels,
            name: &self.sts_name,
            service_name: &self.service_name,
            command: &self.command,
            config_file: &self.config_file,
            config_map_name: &self.labels.config_map_name(),
            config_checksum: &self.config_checksum,
            image: &self.image,
            rpc_port: self.rpc_port,
            instance: &self.instance,
        });
        if let Some(pod_spec) = sts
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
        {
            resources::merge_host_affinity(
                pod_spec,
                &self.host_address_label,
                &self.pinned_hosts,
            );
        }
        platform.apply_stateful_set(&sts).await?;

        debug!(statefulset = %self.sts_name, "applied workload objects");
        Ok(())
    }
}

fn checksum(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}
