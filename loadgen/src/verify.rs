use anyhow::{Context, Result};
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Namespace, ServiceAccount},
};
use kube::{api::ListParams, Api, Client};

use crate::{
    config::LoadConfig,
    objects,
    retry::{poll_until_settled, Backoff},
};

/// Expected object totals for a range of N identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expected {
    pub namespaces: usize,
    pub service_accounts: usize,
    pub config_maps: usize,
    pub deployments: usize,
}

impl Expected {
    /// N namespaces, one ServiceAccount and Deployment each, two
    /// ConfigMaps each.
    pub fn for_range(count: usize) -> Self {
        Self {
            namespaces: count,
            service_accounts: count,
            config_maps: 2 * count,
            deployments: count,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observed {
    pub namespaces: usize,
    pub service_accounts: usize,
    pub config_maps: usize,
    pub deployments: usize,
}

/// One expected-versus-actual line of the verification summary.
#[derive(Debug, Clone)]
pub struct CountCheck {
    pub kind: &'static str,
    pub expected: usize,
    pub actual: usize,
}

impl CountCheck {
    pub fn matches(&self) -> bool {
        self.expected == self.actual
    }
}

pub fn compare(expected: &Expected, observed: &Observed) -> Vec<CountCheck> {
    vec![
        CountCheck {
            kind: "namespaces",
            expected: expected.namespaces,
            actual: observed.namespaces,
        },
        CountCheck {
            kind: "serviceaccounts",
            expected: expected.service_accounts,
            actual: observed.service_accounts,
        },
        CountCheck {
            kind: "configmaps",
            expected: expected.config_maps,
            actual: observed.config_maps,
        },
        CountCheck {
            kind: "deployments",
            expected: expected.deployments,
            actual: observed.deployments,
        },
    ]
}

/// Counts labeled objects across the cluster and compares them to the
/// expected totals. Counts are re-read with backoff until they converge or
/// the window closes, since controllers and cascading deletes lag; the last
/// observation is reported either way, and a mismatch is never silent.
pub struct Verifier {
    client: Client,
    config: LoadConfig,
}

impl Verifier {
    pub fn new(client: Client, config: LoadConfig) -> Self {
        Self { client, config }
    }

    pub async fn verify(&self, expected: &Expected) -> Result<Vec<CountCheck>> {
        let backoff = Backoff::for_deadline(self.config.verify_timeout());
        poll_until_settled(
            "object counts to converge",
            backoff,
            || async {
                let observed = self.observe().await?;
                Ok(compare(expected, &observed))
            },
            |checks| checks.iter().all(CountCheck::matches),
        )
        .await
    }

    pub async fn observe(&self) -> Result<Observed> {
        let params = ListParams::default().labels(&objects::selector(&self.config));
        Ok(Observed {
            namespaces: self.count::<Namespace>(&params, "namespaces").await?,
            service_accounts: self
                .count::<ServiceAccount>(&params, "serviceaccounts")
                .await?,
            config_maps: self.count::<ConfigMap>(&params, "configmaps").await?,
            deployments: self.count::<Deployment>(&params, "deployments").await?,
        })
    }

    async fn count<K>(&self, params: &ListParams, kind: &str) -> Result<usize>
    where
        K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::all(self.client.clone());
        let list = api
            .list(params)
            .await
            .with_context(|| format!("Failed to list {}", kind))?;
        Ok(list.items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_totals_for_a_range() {
        let expected = Expected::for_range(200);
        assert_eq!(expected.namespaces, 200);
        assert_eq!(expected.service_accounts, 200);
        assert_eq!(expected.config_maps, 400);
        assert_eq!(expected.deployments, 200);
    }

    #[test]
    fn shortfall_is_a_mismatch() {
        let expected = Expected::for_range(200);
        let observed = Observed {
            namespaces: 150,
            service_accounts: 200,
            config_maps: 400,
            deployments: 200,
        };
        let checks = compare(&expected, &observed);
        let bad: Vec<&CountCheck> = checks.iter().filter(|c| !c.matches()).collect();
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].kind, "namespaces");
        assert_eq!((bad[0].actual, bad[0].expected), (150, 200));
    }

    #[test]
    fn exact_counts_all_match() {
        let expected = Expected::for_range(10);
        let observed = Observed {
            namespaces: 10,
            service_accounts: 10,
            config_maps: 20,
            deployments: 10,
        };
        assert!(compare(&expected, &observed).iter().all(CountCheck::matches));
    }
}
