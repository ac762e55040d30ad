//! Label management for component-owned objects.
//!
//! Every object a component owns (instance set, services, config artifacts,
//! init jobs) carries the same canonical label set, and every pod query uses
//! the same selector. Centralizing this here keeps the divergence predicate
//! (`needs_label_sync`) and the selectors from drifting apart.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::consts::COMPONENT_LABEL_KEY;

/// Label manager for one component of one cluster.
#[derive(Clone, Debug)]
pub struct ComponentLabels {
    /// Cluster resource name
    pub cluster_name: String,
    /// Namespace all owned objects live in
    pub namespace: String,
    /// Component label value fragment (e.g., "strata-data-node")
    pub component_label: String,
    /// Human-facing component name (e.g., "DataNode"); used in condition types
    pub component_name: String,
    /// Extra labels merged into object metadata
    pub extra_labels: BTreeMap<String, String>,
    /// Extra annotations merged into object metadata
    pub extra_annotations: BTreeMap<String, String>,
}

impl ComponentLabels {
    /// Create a label manager for a component without pool suffix
    pub fn new(
        cluster_name: impl Into<String>,
        namespace: impl Into<String>,
        component_label: impl Into<String>,
        component_name: impl Into<String>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            namespace: namespace.into(),
            component_label: component_label.into(),
            component_name: component_name.into(),
            extra_labels: BTreeMap::new(),
            extra_annotations: BTreeMap::new(),
        }
    }

    /// Create a label manager for a named instance pool.
    ///
    /// The pool name is appended to both the label value and the component
    /// name so each pool reconciles as its own component.
    pub fn for_pool(
        cluster_name: impl Into<String>,
        namespace: impl Into<String>,
        component_label: &str,
        component_name: &str,
        pool: Option<&str>,
    ) -> Self {
        match pool {
            Some(pool) if !pool.is_empty() => Self::new(
                cluster_name,
                namespace,
                format!("{component_label}-{pool}"),
                format!("{component_name}-{pool}"),
            ),
            _ => Self::new(cluster_name, namespace, component_label, component_name),
        }
    }

    /// Merge extra pod labels/annotations from an instance spec
    pub fn with_extras(
        mut self,
        labels: &BTreeMap<String, String>,
        annotations: &BTreeMap<String, String>,
    ) -> Self {
        self.extra_labels.extend(labels.clone());
        self.extra_annotations.extend(annotations.clone());
        self
    }

    /// The `<cluster>-<component>` value identifying this component's objects
    pub fn component_value(&self) -> String {
        format!("{}-{}", self.cluster_name, self.component_label)
    }

    /// Selector labels: the minimal set used to match this component's pods
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(COMPONENT_LABEL_KEY.to_string(), self.component_value())])
    }

    /// Selector string for label-filtered list calls
    pub fn selector(&self) -> String {
        format!("{}={}", COMPONENT_LABEL_KEY, self.component_value())
    }

    /// Full label map applied to owned objects and pod templates
    pub fn meta_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::from([
            ("app.kubernetes.io/name".to_string(), "Strata".to_string()),
            (
                "app.kubernetes.io/instance".to_string(),
                self.cluster_name.clone(),
            ),
            (
                "app.kubernetes.io/component".to_string(),
                self.component_label.clone(),
            ),
            (
                "app.kubernetes.io/managed-by".to_string(),
                "strata-operator".to_string(),
            ),
            (COMPONENT_LABEL_KEY.to_string(), self.component_value()),
        ]);
        labels.extend(self.extra_labels.clone());
        labels
    }

    /// Object metadata for an owned object with the given name
    pub fn object_meta(&self, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.meta_labels()),
            annotations: if self.extra_annotations.is_empty() {
                None
            } else {
                Some(self.extra_annotations.clone())
            },
            ..Default::default()
        }
    }

    /// True when an observed object's labels diverge from the desired set.
    ///
    /// Only our keys are compared; labels other controllers add are ignored.
    pub fn needs_label_sync(&self, observed: &ObjectMeta) -> bool {
        let observed_labels = observed.labels.clone().unwrap_or_default();
        self.meta_labels()
            .iter()
            .any(|(key, value)| observed_labels.get(key) != Some(value))
    }

    /// Name of the component's config artifact
    pub fn config_map_name(&self) -> String {
        format!("{}-config", self.component_label)
    }

    /// Name of an init job object owned by this component
    pub fn init_job_name(&self, job: &str) -> String {
        format!("{}-init-{}", self.component_label, job.to_lowercase())
    }

    /// Condition type recording a named init job's completion
    pub fn init_job_condition(&self, job: &str) -> String {
        format!("{}{}InitJobCompleted", self.component_name, camel(job))
    }

    /// Condition type recording that this component's stale pods are gone
    pub fn pods_removed_condition(&self) -> String {
        format!("{}PodsRemoved", self.component_name)
    }
}

/// UpperCamelCase a job name fragment ("exit-read-only" -> "ExitReadOnly")
fn camel(fragment: &str) -> String {
    fragment
        .split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> ComponentLabels {
        ComponentLabels::new("demo", "strata", "strata-data-node", "DataNode")
    }

    #[test]
    fn component_value_joins_cluster_and_component() {
        assert_eq!(labels().component_value(), "demo-strata-data-node");
        assert_eq!(
            labels().selector(),
            "strata.io/component=demo-strata-data-node"
        );
    }

    #[test]
    fn pool_suffix_extends_label_and_name() {
        let pooled =
            ComponentLabels::for_pool("demo", "strata", "strata-data-node", "DataNode", Some("ssd"));
        assert_eq!(pooled.component_value(), "demo-strata-data-node-ssd");
        assert_eq!(pooled.component_name, "DataNode-ssd");

        let unnamed =
            ComponentLabels::for_pool("demo", "strata", "strata-data-node", "DataNode", None);
        assert_eq!(unnamed.component_value(), "demo-strata-data-node");
    }

    #[test]
    fn meta_labels_include_selector_and_extras() {
        let l = labels().with_extras(
            &BTreeMap::from([("team".to_string(), "storage".to_string())]),
            &BTreeMap::new(),
        );
        let meta = l.meta_labels();
        assert_eq!(
            meta.get(COMPONENT_LABEL_KEY),
            Some(&"demo-strata-data-node".to_string())
        );
        assert_eq!(meta.get("team"), Some(&"storage".to_string()));
        assert_eq!(meta.get("app.kubernetes.io/managed-by"), Some(&"strata-operator".to_string()));
    }

    #[test]
    fn needs_label_sync_detects_missing_and_changed_keys() {
        let l = labels();
        let mut observed = l.object_meta("dnd");
        assert!(!l.needs_label_sync(&observed));

        // Foreign labels are ignored
        observed
            .labels
            .as_mut()
            .unwrap()
            .insert("other-controller/owned".to_string(), "x".to_string());
        assert!(!l.needs_label_sync(&observed));

        // One of our keys diverging triggers a sync
        observed
            .labels
            .as_mut()
            .unwrap()
            .insert(COMPONENT_LABEL_KEY.to_string(), "stale".to_string());
        assert!(l.needs_label_sync(&observed));
    }

    #[test]
    fn condition_and_object_names() {
        let l = labels();
        assert_eq!(l.config_map_name(), "strata-data-node-config");
        assert_eq!(l.init_job_name("default"), "strata-data-node-init-default");
        assert_eq!(
            l.init_job_condition("exit-read-only"),
            "DataNodeExitReadOnlyInitJobCompleted"
        );
        assert_eq!(l.pods_removed_condition(), "DataNodePodsRemoved");
    }
}
