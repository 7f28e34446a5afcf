use anyhow::{bail, Result};
use clap::Args;
use loadgen::{
    cluster,
    config::LoadConfig,
    namer::IdRange,
    scheduler::{BatchScheduler, KubeScaler, SchedulePlan},
};

#[derive(Args)]
pub struct Arg {
    /// Number of identifiers to drive.
    #[clap(short = 'n', long)]
    count: Option<u32>,
    /// First identifier.
    #[clap(long)]
    start: Option<u32>,
    /// Namespace name prefix.
    #[clap(short, long)]
    prefix: Option<String>,
    /// Identifiers per batch.
    #[clap(short, long)]
    batch_size: Option<u32>,
    /// Seconds to hold each batch at one replica.
    #[clap(long)]
    dwell: Option<u64>,
    /// Seconds to pause after scaling a batch back down.
    #[clap(long)]
    cooldown: Option<u64>,
}

impl Arg {
    pub async fn handle(&self, config: &LoadConfig) -> Result<()> {
        let config = self.overridden(config);
        config.validate()?;
        let range = IdRange::from_config(&config);
        let batches = range.batches(config.batch_size);
        let plan = SchedulePlan::from_config(&config);

        println!(
            "Driving {} namespaces in {} batches of up to {}, at least {:?} of hold time",
            range.len(),
            batches.len(),
            config.batch_size,
            plan.planned_hold(batches.len())
        );

        tracing::info!(
            "Starting batch run: {} namespaces, batch size {}",
            range.len(),
            config.batch_size
        );
        let client = cluster::client().await?;
        let scheduler = BatchScheduler::new(KubeScaler::new(client), plan);
        let report = scheduler.run(&batches).await;

        println!(
            "Batches: {}  scale-up: {}  scale-down: {}",
            report.batches, report.scale_up, report.scale_down
        );
        for failure in report
            .scale_up
            .failures
            .iter()
            .chain(report.scale_down.failures.iter())
        {
            println!("  {: <20} {}", failure.name, failure.reason);
        }
        if !report.never_ready.is_empty() {
            println!(
                "Never became ready before the deadline: {}",
                report.never_ready.join(", ")
            );
        }
        if !report.is_success() {
            bail!("Batch run finished with failures");
        }
        Ok(())
    }

    fn overridden(&self, config: &LoadConfig) -> LoadConfig {
        let mut config = config.clone();
        if let Some(count) = self.count {
            config.count = count;
        }
        if let Some(start) = self.start {
            config.start = start;
        }
        if let Some(prefix) = &self.prefix {
            config.prefix = prefix.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(dwell) = self.dwell {
            config.dwell_secs = dwell;
        }
        if let Some(cooldown) = self.cooldown {
            config.cooldown_secs = cooldown;
        }
        config
    }
}
