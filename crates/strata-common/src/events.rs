//! Kubernetes Event recording for the Strata operator.
//!
//! A trait-based wrapper over `kube::runtime::events::Recorder` so the
//! reconciler can emit Events visible in `kubectl describe` without caring
//! about the transport. Events are fire-and-forget: failures are logged and
//! never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a new publisher; `controller_name` becomes the Event's
    /// reportingComponent.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "failed to publish Kubernetes event");
        }
    }
}

/// No-op implementation for tests.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Well-known event reason strings.
pub mod reasons {
    /// Cluster finished initial convergence and is running
    pub const CLUSTER_RUNNING: &str = "ClusterRunning";
    /// A cluster-wide rolling update started
    pub const UPDATE_STARTED: &str = "UpdateStarted";
    /// The rolling update moved to a new sub-phase
    pub const UPDATE_ADVANCED: &str = "UpdateAdvanced";
    /// The rolling update finished
    pub const UPDATE_FINISHED: &str = "UpdateFinished";
    /// Spec validation failed
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
}

/// Well-known event action strings.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Cluster-wide rolling update orchestration
    pub const UPDATE: &str = "Update";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
    }

    #[tokio::test]
    async fn noop_publisher_does_not_panic() {
        let publisher = NoopEventPublisher;
        publisher
            .publish(
                &ObjectReference::default(),
                EventType::Normal,
                reasons::UPDATE_STARTED,
                actions::UPDATE,
                Some("test".to_string()),
            )
            .await;
    }
}
