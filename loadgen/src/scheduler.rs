use std::{fmt, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    api::{Patch, PatchParams},
    Api, Client,
};
use serde_json::json;
use tokio::time::sleep;

use crate::{
    config::LoadConfig,
    objects,
    outcome::RunReport,
    retry::{poll_until, Backoff},
};

/// Where the scheduler currently is for a given batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ScalingUp,
    Dwell,
    ScalingDown,
    Cooldown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::ScalingUp => "scaling up",
            Phase::Dwell => "dwell",
            Phase::ScalingDown => "scaling down",
            Phase::Cooldown => "cooldown",
        };
        write!(f, "{}", name)
    }
}

/// Seam between the batch loop and the cluster, so the loop itself can be
/// exercised without one.
#[async_trait]
pub trait Scaler: Send + Sync {
    /// Set the workload Deployment in `namespace` to `replicas`.
    async fn scale(&self, namespace: &str, replicas: i32) -> Result<()>;

    /// Ready replica count of the workload Deployment in `namespace`.
    async fn ready_replicas(&self, namespace: &str) -> Result<i32>;
}

/// Scales through the Deployment scale subresource.
pub struct KubeScaler {
    client: Client,
}

impl KubeScaler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl Scaler for KubeScaler {
    async fn scale(&self, namespace: &str, replicas: i32) -> Result<()> {
        self.deployments(namespace)
            .patch_scale(
                objects::DEPLOYMENT_NAME,
                &PatchParams::default(),
                &Patch::Merge(json!({ "spec": { "replicas": replicas } })),
            )
            .await?;
        Ok(())
    }

    async fn ready_replicas(&self, namespace: &str) -> Result<i32> {
        let deployment = self.deployments(namespace).get(objects::DEPLOYMENT_NAME).await?;
        Ok(deployment
            .status
            .and_then(|status| status.ready_replicas)
            .unwrap_or(0))
    }
}

/// Timing for one run of the batch loop.
#[derive(Debug, Clone, Copy)]
pub struct SchedulePlan {
    pub dwell: Duration,
    pub cooldown: Duration,
    pub ready_deadline: Duration,
    pub concurrency: usize,
}

impl SchedulePlan {
    pub fn from_config(config: &LoadConfig) -> Self {
        Self {
            dwell: config.dwell(),
            cooldown: config.cooldown(),
            ready_deadline: config.ready_timeout(),
            concurrency: config.concurrency,
        }
    }

    /// Fixed hold time the loop will spend across `batches` batches, on
    /// top of scale-call and readiness latency.
    pub fn planned_hold(&self, batches: usize) -> Duration {
        (self.dwell + self.cooldown) * batches as u32
    }
}

/// What one run of the loop did.
#[derive(Debug, Default)]
pub struct ScheduleReport {
    pub batches: usize,
    pub scale_up: RunReport,
    pub scale_down: RunReport,
    /// Members that were scaled up but never reported ready before the
    /// deadline. The run keeps going; these are surfaced at the end.
    pub never_ready: Vec<String>,
}

impl ScheduleReport {
    pub fn is_success(&self) -> bool {
        self.scale_up.is_success() && self.scale_down.is_success() && self.never_ready.is_empty()
    }
}

/// Drives batches through `SCALING_UP -> DWELL -> SCALING_DOWN -> COOLDOWN`
/// strictly one batch at a time. Scale calls inside a batch run
/// concurrently, bounded by the plan's pool size. After scale-up the loop
/// polls readiness with backoff rather than sleeping blind; dwell and
/// cooldown stay as fixed holds.
pub struct BatchScheduler<S: Scaler> {
    scaler: S,
    plan: SchedulePlan,
}

impl<S: Scaler> BatchScheduler<S> {
    pub fn new(scaler: S, plan: SchedulePlan) -> Self {
        Self { scaler, plan }
    }

    pub async fn run(&self, batches: &[Vec<String>]) -> ScheduleReport {
        let mut report = ScheduleReport::default();
        for (i, batch) in batches.iter().enumerate() {
            let number = i + 1;
            self.transition(number, batches.len(), Phase::ScalingUp);
            let up = self.scale_batch(batch, 1).await;
            self.await_ready(batch, &up, &mut report.never_ready).await;
            report.scale_up.merge(up);

            self.transition(number, batches.len(), Phase::Dwell);
            sleep(self.plan.dwell).await;

            self.transition(number, batches.len(), Phase::ScalingDown);
            report.scale_down.merge(self.scale_batch(batch, 0).await);

            self.transition(number, batches.len(), Phase::Cooldown);
            sleep(self.plan.cooldown).await;

            self.transition(number, batches.len(), Phase::Idle);
            report.batches += 1;
        }
        tracing::info!(
            "Batch loop finished: {} batches, scale-up {}, scale-down {}",
            report.batches,
            report.scale_up,
            report.scale_down
        );
        report
    }

    fn transition(&self, batch: usize, total: usize, phase: Phase) {
        tracing::info!("Batch {}/{}: {}", batch, total, phase);
    }

    async fn scale_batch(&self, batch: &[String], replicas: i32) -> RunReport {
        let results: Vec<(String, Result<()>)> = stream::iter(batch)
            .map(|namespace| async move {
                let result = self.scaler.scale(namespace, replicas).await;
                (namespace.clone(), result)
            })
            .buffer_unordered(self.plan.concurrency)
            .collect()
            .await;

        let mut report = RunReport::default();
        for (namespace, result) in results {
            if let Err(e) = &result {
                tracing::error!("Failed to scale {} to {}: {:#}", namespace, replicas, e);
            }
            report.record(&namespace, result);
        }
        report
    }

    /// Polls every successfully scaled member until ready or the deadline.
    /// Transient status-read errors count as "not yet".
    async fn await_ready(&self, batch: &[String], up: &RunReport, never_ready: &mut Vec<String>) {
        let failed: Vec<&str> = up.failures.iter().map(|f| f.name.as_str()).collect();
        let backoff = Backoff::for_deadline(self.plan.ready_deadline);

        let stragglers: Vec<Option<String>> = stream::iter(batch)
            .filter(|namespace| {
                let skip = failed.contains(&namespace.as_str());
                async move { !skip }
            })
            .map(|namespace| async move {
                let waited = poll_until(
                    &format!("deployment in {} to become ready", namespace),
                    backoff,
                    || async {
                        match self.scaler.ready_replicas(namespace).await {
                            Ok(ready) if ready >= 1 => Ok(Some(())),
                            Ok(_) => Ok(None),
                            Err(e) => {
                                tracing::warn!(
                                    "Readiness check in {} failed: {:#}",
                                    namespace,
                                    e
                                );
                                Ok(None)
                            }
                        }
                    },
                )
                .await;
                match waited {
                    Ok(()) => None,
                    Err(e) => {
                        tracing::warn!("{:#}", e);
                        Some(namespace.clone())
                    }
                }
            })
            .buffer_unordered(self.plan.concurrency)
            .collect()
            .await;

        never_ready.extend(stragglers.into_iter().flatten());
    }
}
