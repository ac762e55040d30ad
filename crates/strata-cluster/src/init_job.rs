//! Bootstrap (init) job handle.
//!
//! Wraps a one-shot initialization task: a script body set at sync time,
//! shipped via ConfigMap, executed by a Job. Completion is recorded as a
//! Condition on the cluster resource so re-entrant passes don't run the
//! script twice.
//!
//! Disruptive operations use the two-phase restart protocol:
//! `prepare_restart` (phase 1) deletes the stale job and resets the
//! completion condition — safe to re-run any number of times. Phase 2 (the
//! caller advancing its own Condition) only happens after phase 1 succeeds.

use tracing::{debug, info};

use k8s_openapi::api::batch::v1::Job;

use strata_common::crd::Condition;
use strata_common::labels::ComponentLabels;
use strata_common::Result;

use crate::cluster::ClusterScope;
use crate::components::{ComponentStatus, SyncStatus};
use crate::platform::PlatformClient;
use crate::resources;

/// Script file name inside the job's config mount
const SCRIPT_FILE: &str = "init-script.sh";

/// One-shot initialization task owned by a component.
pub struct InitJob {
    labels: ComponentLabels,
    job_name: String,
    script_config_map: String,
    condition_type: String,
    image: String,
    script: Option<String>,
    observed: Option<Job>,
}

impl InitJob {
    /// Create an init job handle named `job` (e.g., "default",
    /// "exit-read-only") for the owning component.
    pub fn new(labels: ComponentLabels, job: &str, image: impl Into<String>) -> Self {
        let job_name = labels.init_job_name(job);
        let script_config_map = format!("{job_name}-script");
        let condition_type = labels.init_job_condition(job);
        Self {
            labels,
            job_name,
            script_config_map,
            condition_type,
            image: image.into(),
            script: None,
            observed: None,
        }
    }

    /// Condition type recording this job's completion
    pub fn condition_type(&self) -> &str {
        &self.condition_type
    }

    /// Set the script body; rebuilt by the owner on every non-dry pass.
    pub fn set_init_script(&mut self, script: String) {
        self.script = Some(script);
    }

    /// Read the observed job object.
    pub async fn fetch(&mut self, platform: &dyn PlatformClient) -> Result<()> {
        self.observed = platform
            .get_job(&self.labels.namespace, &self.job_name)
            .await?;
        Ok(())
    }

    fn job_succeeded(&self) -> bool {
        self.observed
            .as_ref()
            .and_then(|job| job.status.as_ref())
            .and_then(|status| status.succeeded)
            .unwrap_or(0)
            > 0
    }

    /// Phase-1 check: the stale job is gone and the completion condition
    /// was reset, so the job will run again with a fresh script.
    pub fn is_restart_prepared(&self, scope: &ClusterScope) -> bool {
        self.observed.is_none() && !scope.is_condition_true(&self.condition_type)
    }

    /// Phase 1 of the restart protocol. Idempotent: deleting an absent job
    /// and resetting an already-false condition are both no-ops.
    pub async fn prepare_restart(
        &mut self,
        scope: &ClusterScope,
        platform: &dyn PlatformClient,
        dry: bool,
    ) -> Result<()> {
        if dry {
            return Ok(());
        }
        platform
            .delete_job(&self.labels.namespace, &self.job_name)
            .await?;
        self.observed = None;
        scope
            .set_condition(Condition::false_(
                &self.condition_type,
                "RestartPrepared",
            ))
            .await?;
        debug!(job = %self.job_name, "init job restart prepared");
        Ok(())
    }

    /// Evaluate the job: decide (dry) or drive (non-dry) its execution.
    ///
    /// The completion Condition short-circuits everything: once recorded,
    /// the job never runs again until a restart is prepared.
    pub async fn evaluate(
        &mut self,
        scope: &ClusterScope,
        platform: &dyn PlatformClient,
        dry: bool,
    ) -> Result<ComponentStatus> {
        if scope.is_condition_true(&self.condition_type) {
            return Ok(ComponentStatus::ready());
        }

        match &self.observed {
            None => {
                if !dry {
                    let script = self.script.clone().ok_or_else(|| {
                        strata_common::Error::internal_with_context(
                            "init-job",
                            format!("no init script set for {}", self.job_name),
                        )
                    })?;
                    let script_cm = resources::config_map(
                        &self.labels,
                        &self.script_config_map,
                        SCRIPT_FILE,
                        &script,
                    );
                    platform.apply_config_map(&script_cm).await?;

                    let job = resources::init_job(
                        &self.labels,
                        &self.job_name,
                        &self.image,
                        &self.script_config_map,
                    );
                    platform.apply_job(&job).await?;
                    info!(job = %self.job_name, "created init job");
                }
                Ok(ComponentStatus::waiting(SyncStatus::Pending, "init-job"))
            }
            Some(_) if self.job_succeeded() => {
                if !dry {
                    scope
                        .set_condition(Condition::true_(&self.condition_type, "InitJobCompleted"))
                        .await?;
                    info!(job = %self.job_name, "init job completed");
                }
                Ok(ComponentStatus::ready())
            }
            Some(_) => Ok(ComponentStatus::waiting(SyncStatus::Pending, "init-job")),
        }
    }
}
