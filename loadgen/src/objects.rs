use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{ConfigMap, Container, Namespace, PodSpec, PodTemplateSpec, ServiceAccount},
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta},
};

use crate::config::LoadConfig;

/// `created-by` label value; listing on it finds everything this tool made.
pub const CREATED_BY: &str = "loadctl";

/// Fixed names of the per-namespace children.
pub const DEPLOYMENT_NAME: &str = "load-workload";
pub const SERVICE_ACCOUNT_NAME: &str = "load-runner";
pub const CONFIG_MAP_NAMES: [&str; 2] = ["load-settings", "load-payload"];

pub type Labels = BTreeMap<String, String>;

/// The common label set. The admission policy rejects objects without an
/// `owner` label, so it goes on everything.
pub fn labels(config: &LoadConfig, sequence: &str) -> Labels {
    BTreeMap::from([
        ("owner".to_string(), config.owner.clone()),
        ("purpose".to_string(), config.purpose.clone()),
        ("created-by".to_string(), CREATED_BY.to_string()),
        ("sequence".to_string(), sequence.to_string()),
    ])
}

/// Label selector matching every object created by this tool for the
/// configured owner.
pub fn selector(config: &LoadConfig) -> String {
    format!("created-by={},owner={}", CREATED_BY, config.owner)
}

pub fn namespace(config: &LoadConfig, name: &str, sequence: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels(config, sequence)),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn service_account(config: &LoadConfig, namespace: &str, sequence: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(SERVICE_ACCOUNT_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(config, sequence)),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn config_map(
    config: &LoadConfig,
    namespace: &str,
    name: &str,
    sequence: &str,
) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(config, sequence)),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            ("namespace".to_string(), namespace.to_string()),
            ("sequence".to_string(), sequence.to_string()),
        ])),
        ..Default::default()
    }
}

/// Workload Deployment, created at zero replicas. The scheduler toggles it
/// between 0 and 1 through the scale subresource.
pub fn deployment(config: &LoadConfig, namespace: &str, sequence: &str) -> Deployment {
    let mut pod_labels = labels(config, sequence);
    pod_labels.insert("app".to_string(), DEPLOYMENT_NAME.to_string());

    Deployment {
        metadata: ObjectMeta {
            name: Some(DEPLOYMENT_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(config, sequence)),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(0),
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    "app".to_string(),
                    DEPLOYMENT_NAME.to_string(),
                )])),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(SERVICE_ACCOUNT_NAME.to_string()),
                    containers: vec![Container {
                        name: "workload".to_string(),
                        image: Some(config.image.clone()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LoadConfig {
        LoadConfig::default()
    }

    #[test]
    fn every_object_carries_the_owner_label() {
        let config = config();
        let ns = namespace(&config, "load-test-001", "001");
        let labels = ns.metadata.labels.unwrap();
        assert_eq!(labels.get("owner"), Some(&config.owner));
        assert_eq!(labels.get("created-by"), Some(&CREATED_BY.to_string()));
        assert_eq!(labels.get("sequence"), Some(&"001".to_string()));
    }

    #[test]
    fn deployment_starts_at_zero_replicas() {
        let d = deployment(&config(), "load-test-042", "042");
        let spec = d.spec.unwrap();
        assert_eq!(spec.replicas, Some(0));
        let selector = spec.selector.match_labels.unwrap();
        let pod_labels = spec.template.metadata.unwrap().labels.unwrap();
        for (key, value) in &selector {
            assert_eq!(pod_labels.get(key), Some(value));
        }
    }

    #[test]
    fn selector_matches_generated_labels() {
        let config = config();
        let labels = labels(&config, "007");
        for clause in selector(&config).split(',') {
            let (key, value) = clause.split_once('=').unwrap();
            assert_eq!(labels.get(key).map(String::as_str), Some(value));
        }
    }
}
