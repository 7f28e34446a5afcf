use anyhow::{Context, Result};
use futures_util::{stream, StreamExt};
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Namespace, ServiceAccount},
};
use kube::{
    api::{DeleteParams, ListParams},
    Api, Client, ResourceExt,
};

use crate::{
    config::LoadConfig,
    namer::IdRange,
    objects,
    outcome::RunReport,
    retry::{poll_until_settled, Backoff},
};

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub deletions: RunReport,
    /// Labeled namespaces still present when the residue window closed,
    /// usually stuck in Terminating.
    pub residue: Vec<String>,
}

/// Tears the range down. Children are deleted explicitly before their
/// namespace, but the end state is the same either way once namespace
/// deletion cascades; missing objects are fine.
pub struct Cleaner {
    client: Client,
    config: LoadConfig,
}

impl Cleaner {
    pub fn new(client: Client, config: LoadConfig) -> Self {
        Self { client, config }
    }

    pub async fn cleanup(&self, range: &IdRange) -> Result<CleanupReport> {
        let results: Vec<(String, Result<()>)> = stream::iter(range.names())
            .map(|name| async move {
                let result = self.cleanup_one(&name).await;
                (name, result)
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        let mut report = CleanupReport::default();
        for (name, result) in results {
            if let Err(e) = &result {
                tracing::error!("Failed to clean up {}: {:#}", name, e);
            }
            report.deletions.record(&name, result);
        }
        report.residue = self.await_residue().await?;
        Ok(report)
    }

    async fn cleanup_one(&self, name: &str) -> Result<()> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), name);
        delete_ignoring_missing(&deployments, objects::DEPLOYMENT_NAME).await?;

        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), name);
        for map_name in objects::CONFIG_MAP_NAMES {
            delete_ignoring_missing(&config_maps, map_name).await?;
        }

        let accounts: Api<ServiceAccount> = Api::namespaced(self.client.clone(), name);
        delete_ignoring_missing(&accounts, objects::SERVICE_ACCOUNT_NAME).await?;

        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        delete_ignoring_missing(&namespaces, name)
            .await
            .with_context(|| format!("Failed to delete namespace {}", name))?;
        Ok(())
    }

    /// Re-lists labeled namespaces with backoff until they are gone or the
    /// window closes; returns whatever is left.
    async fn await_residue(&self) -> Result<Vec<String>> {
        let backoff = Backoff::for_deadline(self.config.verify_timeout());
        let params = ListParams::default().labels(&objects::selector(&self.config));
        let namespaces: Api<Namespace> = Api::all(self.client.clone());

        let leftover = poll_until_settled(
            "labeled namespaces to finish deleting",
            backoff,
            || async {
                Ok(namespaces
                    .list(&params)
                    .await
                    .with_context(|| "Failed to re-list namespaces after cleanup".to_string())?
                    .items
                    .iter()
                    .map(|ns| ns.name())
                    .collect::<Vec<String>>())
            },
            |leftover: &Vec<String>| leftover.is_empty(),
        )
        .await?;
        if !leftover.is_empty() {
            tracing::warn!(
                "{} namespaces still present after cleanup: {}",
                leftover.len(),
                leftover.join(", ")
            );
        }
        Ok(leftover)
    }
}

/// Delete where "already gone" counts as done, the `--ignore-not-found`
/// of the old runbooks.
async fn delete_ignoring_missing<K>(api: &Api<K>, name: &str) -> Result<()>
where
    K: Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}
