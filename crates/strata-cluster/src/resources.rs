//! Builders for the Kubernetes object shapes the operator owns.
//!
//! StatefulSets, services, config artifacts and init jobs are constructed
//! here and nowhere else; the workload and init-job handles only decide
//! *when* to apply them.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Affinity, ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, NodeAffinity,
    NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, PodSpec, PodTemplateSpec, Service,
    ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use strata_common::consts::{CONFIG_CHECKSUM_ANNOTATION, MONITORING_PORT};
use strata_common::crd::InstanceSpec;
use strata_common::labels::ComponentLabels;

/// Mount path for generated config artifacts
pub const CONFIG_MOUNT_PATH: &str = "/etc/strata";

/// Parameters for building a role's StatefulSet
pub struct StatefulSetParams<'a> {
    /// Label manager of the owning component
    pub labels: &'a ComponentLabels,
    /// StatefulSet name
    pub name: &'a str,
    /// Governing headless service name
    pub service_name: &'a str,
    /// Server binary to run
    pub command: &'a str,
    /// Config file name within the config mount
    pub config_file: &'a str,
    /// Name of the ConfigMap carrying the config artifact
    pub config_map_name: &'a str,
    /// SHA-256 of the config artifact, annotated onto the pod template
    pub config_checksum: &'a str,
    /// Container image
    pub image: &'a str,
    /// Role RPC port
    pub rpc_port: u16,
    /// Instance configuration (replicas, scheduling overrides)
    pub instance: &'a InstanceSpec,
}

/// Build a role's StatefulSet.
pub fn stateful_set(params: &StatefulSetParams<'_>) -> StatefulSet {
    let mut pod_labels = params.labels.meta_labels();
    pod_labels.extend(params.instance.extra_pod_labels.clone());

    let mut pod_annotations = params.instance.extra_pod_annotations.clone();
    pod_annotations.insert(
        CONFIG_CHECKSUM_ANNOTATION.to_string(),
        params.config_checksum.to_string(),
    );

    let container = Container {
        name: "server".to_string(),
        image: Some(params.image.to_string()),
        command: Some(vec![params.command.to_string()]),
        args: Some(vec![
            "--config".to_string(),
            format!("{CONFIG_MOUNT_PATH}/{}", params.config_file),
        ]),
        ports: Some(vec![
            ContainerPort {
                name: Some("rpc".to_string()),
                container_port: params.rpc_port as i32,
                ..Default::default()
            },
            ContainerPort {
                name: Some("monitoring".to_string()),
                container_port: MONITORING_PORT as i32,
                ..Default::default()
            },
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: "config".to_string(),
            mount_path: CONFIG_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let pod_spec = PodSpec {
        containers: vec![container],
        volumes: Some(vec![Volume {
            name: "config".to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: params.config_map_name.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        node_selector: if params.instance.node_selector.is_empty() {
            None
        } else {
            Some(params.instance.node_selector.clone())
        },
        tolerations: if params.instance.tolerations.is_empty() {
            None
        } else {
            Some(params.instance.tolerations.clone())
        },
        affinity: params.instance.affinity.clone(),
        ..Default::default()
    };

    StatefulSet {
        metadata: params.labels.object_meta(params.name),
        spec: Some(StatefulSetSpec {
            replicas: Some(params.instance.replicas),
            service_name: params.service_name.to_string(),
            selector: LabelSelector {
                match_labels: Some(params.labels.selector_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                    labels: Some(pod_labels),
                    annotations: Some(pod_annotations),
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Merge a required placement constraint into a pod spec.
///
/// Quorum roles pinned to a host list must schedule only onto those hosts,
/// matched via `label_key`. Existing affinity, selector terms and
/// tolerations the template already carries are preserved; the pinned term
/// is appended. An empty host list is a no-op.
pub fn merge_host_affinity(pod_spec: &mut PodSpec, label_key: &str, hosts: &[String]) {
    if hosts.is_empty() {
        return;
    }

    let affinity = pod_spec.affinity.get_or_insert_with(Affinity::default);
    let node_affinity = affinity
        .node_affinity
        .get_or_insert_with(NodeAffinity::default);
    let selector = node_affinity
        .required_during_scheduling_ignored_during_execution
        .get_or_insert_with(NodeSelector::default);

    selector.node_selector_terms.push(NodeSelectorTerm {
        match_expressions: Some(vec![NodeSelectorRequirement {
            key: label_key.to_string(),
            operator: "In".to_string(),
            values: Some(hosts.to_vec()),
        }]),
        ..Default::default()
    });
}

/// Build the headless service governing a role's pods.
pub fn headless_service(
    labels: &ComponentLabels,
    name: &str,
    rpc_port: u16,
) -> Service {
    Service {
        metadata: labels.object_meta(name),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(labels.selector_labels()),
            ports: Some(vec![ServicePort {
                name: Some("rpc".to_string()),
                port: rpc_port as i32,
                target_port: Some(IntOrString::Int(rpc_port as i32)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

/// Build a ClusterIP balancer service (user-facing proxy endpoint).
pub fn balancer_service(labels: &ComponentLabels, name: &str, port: u16) -> Service {
    Service {
        metadata: labels.object_meta(name),
        spec: Some(ServiceSpec {
            selector: Some(labels.selector_labels()),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: port as i32,
                target_port: Some(IntOrString::Int(port as i32)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

/// Build the ConfigMap carrying a generated config artifact.
pub fn config_map(labels: &ComponentLabels, name: &str, file: &str, content: &str) -> ConfigMap {
    ConfigMap {
        metadata: labels.object_meta(name),
        data: Some(BTreeMap::from([(file.to_string(), content.to_string())])),
        ..Default::default()
    }
}

/// Build a one-shot init job running `script` with the native client config
/// mounted alongside it.
pub fn init_job(
    labels: &ComponentLabels,
    name: &str,
    image: &str,
    script_config_map: &str,
) -> Job {
    let container = Container {
        name: "init".to_string(),
        image: Some(image.to_string()),
        command: Some(vec![
            "bash".to_string(),
            "-e".to_string(),
            format!("{CONFIG_MOUNT_PATH}/init-script.sh"),
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: "config".to_string(),
            mount_path: CONFIG_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Job {
        metadata: labels.object_meta(name),
        spec: Some(JobSpec {
            backoff_limit: Some(6),
            template: PodTemplateSpec {
                metadata: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                    labels: Some(labels.meta_labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    restart_policy: Some("OnFailure".to_string()),
                    volumes: Some(vec![Volume {
                        name: "config".to_string(),
                        config_map: Some(ConfigMapVolumeSource {
                            name: script_config_map.to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> ComponentLabels {
        ComponentLabels::new("demo", "strata", "strata-master", "Master")
    }

    fn params<'a>(instance: &'a InstanceSpec, labels: &'a ComponentLabels) -> StatefulSetParams<'a> {
        StatefulSetParams {
            labels,
            name: "master-1",
            service_name: "masters-1",
            command: "/usr/bin/strata-master",
            config_file: "master.json",
            config_map_name: "strata-master-config",
            config_checksum: "abc123",
            image: "strata/core:24.1",
            rpc_port: 9010,
            instance,
        }
    }

    #[test]
    fn stateful_set_carries_selector_and_checksum() {
        let labels = labels();
        let instance = InstanceSpec {
            replicas: 3,
            ..Default::default()
        };
        let sts = stateful_set(&params(&instance, &labels));

        let spec = sts.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.service_name, "masters-1");
        assert_eq!(
            spec.selector.match_labels.as_ref().unwrap(),
            &labels.selector_labels()
        );

        let template_meta = spec.template.metadata.as_ref().unwrap();
        assert_eq!(
            template_meta
                .annotations
                .as_ref()
                .unwrap()
                .get(CONFIG_CHECKSUM_ANNOTATION),
            Some(&"abc123".to_string())
        );
    }

    /// Pinning merges into existing affinity rather than replacing it.
    #[test]
    fn host_affinity_merges_into_existing_terms() {
        let existing_term = NodeSelectorTerm {
            match_expressions: Some(vec![NodeSelectorRequirement {
                key: "topology.kubernetes.io/zone".to_string(),
                operator: "In".to_string(),
                values: Some(vec!["zone-a".to_string()]),
            }]),
            ..Default::default()
        };
        let mut pod_spec = PodSpec {
            affinity: Some(Affinity {
                node_affinity: Some(NodeAffinity {
                    required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                        node_selector_terms: vec![existing_term.clone()],
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        merge_host_affinity(
            &mut pod_spec,
            "kubernetes.io/hostname",
            &["h1".to_string(), "h2".to_string()],
        );

        let terms = &pod_spec
            .affinity
            .as_ref()
            .unwrap()
            .node_affinity
            .as_ref()
            .unwrap()
            .required_during_scheduling_ignored_during_execution
            .as_ref()
            .unwrap()
            .node_selector_terms;
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0], existing_term);
        assert_eq!(
            terms[1].match_expressions.as_ref().unwrap()[0].key,
            "kubernetes.io/hostname"
        );
    }

    #[test]
    fn host_affinity_with_empty_list_is_noop() {
        let mut pod_spec = PodSpec::default();
        merge_host_affinity(&mut pod_spec, "kubernetes.io/hostname", &[]);
        assert!(pod_spec.affinity.is_none());
    }

    #[test]
    fn headless_service_has_no_cluster_ip() {
        let svc = headless_service(&labels(), "masters-1", 9010);
        assert_eq!(
            svc.spec.as_ref().unwrap().cluster_ip.as_deref(),
            Some("None")
        );
    }

    #[test]
    fn config_map_holds_artifact_under_file_name() {
        let cm = config_map(&labels(), "strata-master-config", "master.json", "{}");
        assert_eq!(
            cm.data.as_ref().unwrap().get("master.json"),
            Some(&"{}".to_string())
        );
    }
}
