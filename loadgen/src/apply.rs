use std::fmt::Debug;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Namespace, ServiceAccount},
};
use kube::{
    api::{Patch, PatchParams, PostParams},
    Api, Client,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{config::LoadConfig, namer::IdRange, objects, outcome::RunReport};

/// Write half of one object kind. `Api` implements it against the cluster;
/// tests swap in a fake.
#[async_trait]
pub trait ObjectWriter<K: Send + Sync>: Send + Sync {
    async fn create(&self, object: &K) -> Result<(), kube::Error>;
    async fn patch_merge(&self, name: &str, object: &K) -> Result<(), kube::Error>;
}

#[async_trait]
impl<K> ObjectWriter<K> for Api<K>
where
    K: Clone + DeserializeOwned + Serialize + Debug + Send + Sync,
{
    async fn create(&self, object: &K) -> Result<(), kube::Error> {
        Api::create(self, &PostParams::default(), object)
            .await
            .map(|_| ())
    }

    async fn patch_merge(&self, name: &str, object: &K) -> Result<(), kube::Error> {
        Api::patch(self, name, &PatchParams::default(), &Patch::Merge(object))
            .await
            .map(|_| ())
    }
}

/// Creates the whole object range: per identifier one Namespace, one
/// ServiceAccount, two ConfigMaps and one zero-replica Deployment, all
/// labeled so the admission policy and the verifier can find them.
pub struct Applier {
    client: Client,
    config: LoadConfig,
}

impl Applier {
    pub fn new(client: Client, config: LoadConfig) -> Self {
        Self { client, config }
    }

    /// Applies every identifier through a bounded-concurrency stream. A
    /// failed identifier is recorded and the rest of the range proceeds.
    pub async fn apply_range(&self, range: &IdRange) -> RunReport {
        let results: Vec<(String, Result<()>)> = stream::iter(range.indices())
            .map(|index| {
                let name = range.name(index);
                let sequence = range.sequence(index);
                async move {
                    let result = self.apply_one(&name, &sequence).await;
                    (name, result)
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        let mut report = RunReport::default();
        for (name, result) in results {
            if let Err(e) = &result {
                tracing::error!("Failed to apply {}: {:#}", name, e);
            }
            report.record(&name, result);
        }
        report
    }

    /// Namespace first, then the namespaced children.
    async fn apply_one(&self, name: &str, sequence: &str) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        apply(
            &namespaces,
            name,
            &objects::namespace(&self.config, name, sequence),
        )
        .await
        .with_context(|| format!("Failed to apply namespace {}", name))?;

        let accounts: Api<ServiceAccount> = Api::namespaced(self.client.clone(), name);
        apply(
            &accounts,
            objects::SERVICE_ACCOUNT_NAME,
            &objects::service_account(&self.config, name, sequence),
        )
        .await
        .with_context(|| format!("Failed to apply service account in {}", name))?;

        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), name);
        for map_name in objects::CONFIG_MAP_NAMES {
            apply(
                &config_maps,
                map_name,
                &objects::config_map(&self.config, name, map_name, sequence),
            )
            .await
            .with_context(|| format!("Failed to apply config map {} in {}", map_name, name))?;
        }

        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), name);
        apply(
            &deployments,
            objects::DEPLOYMENT_NAME,
            &objects::deployment(&self.config, name, sequence),
        )
        .await
        .with_context(|| format!("Failed to apply deployment in {}", name))?;

        tracing::debug!("Applied {}", name);
        Ok(())
    }
}

/// Create-or-update. On 409 the full object is merge-patched, so a re-run
/// is a no-op for untouched objects and deterministically rewrites labels
/// and spec on existing ones.
async fn apply<K: Send + Sync>(
    writer: &dyn ObjectWriter<K>,
    name: &str,
    object: &K,
) -> Result<()> {
    match writer.create(object).await {
        Ok(()) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 409 => {
            writer.patch_merge(name, object).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::Mutex,
    };

    use kube::core::ErrorResponse;

    use super::*;

    struct FakeWriter {
        existing: Mutex<HashSet<String>>,
        patched: Mutex<Vec<String>>,
        deny: bool,
    }

    impl FakeWriter {
        fn new() -> Self {
            Self {
                existing: Mutex::new(HashSet::new()),
                patched: Mutex::new(Vec::new()),
                deny: false,
            }
        }

        fn denying() -> Self {
            Self {
                deny: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl ObjectWriter<Namespace> for FakeWriter {
        async fn create(&self, object: &Namespace) -> Result<(), kube::Error> {
            if self.deny {
                return Err(kube::Error::Api(ErrorResponse {
                    status: "Failure".to_string(),
                    message: "admission webhook denied the request".to_string(),
                    reason: "Forbidden".to_string(),
                    code: 403,
                }));
            }
            let name = object.metadata.name.clone().unwrap();
            if !self.existing.lock().unwrap().insert(name.clone()) {
                return Err(kube::Error::Api(ErrorResponse {
                    status: "Failure".to_string(),
                    message: format!("namespaces \"{}\" already exists", name),
                    reason: "AlreadyExists".to_string(),
                    code: 409,
                }));
            }
            Ok(())
        }

        async fn patch_merge(&self, name: &str, _object: &Namespace) -> Result<(), kube::Error> {
            self.patched.lock().unwrap().push(name.to_string());
            Ok(())
        }
    }

    fn namespace(name: &str) -> Namespace {
        objects::namespace(&LoadConfig::default(), name, "001")
    }

    #[tokio::test]
    async fn first_apply_creates_without_patching() {
        let writer = FakeWriter::new();
        apply(&writer, "load-test-001", &namespace("load-test-001"))
            .await
            .unwrap();
        assert!(writer.existing.lock().unwrap().contains("load-test-001"));
        assert!(writer.patched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn re_apply_of_an_existing_object_takes_the_patch_path() {
        let writer = FakeWriter::new();
        apply(&writer, "load-test-001", &namespace("load-test-001"))
            .await
            .unwrap();
        apply(&writer, "load-test-001", &namespace("load-test-001"))
            .await
            .unwrap();
        assert_eq!(
            *writer.patched.lock().unwrap(),
            vec!["load-test-001".to_string()]
        );
    }

    #[tokio::test]
    async fn non_conflict_errors_propagate() {
        let writer = FakeWriter::denying();
        let err = apply(&writer, "load-test-001", &namespace("load-test-001"))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("admission webhook"));
        assert!(writer.patched.lock().unwrap().is_empty());
    }
}
