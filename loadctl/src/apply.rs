use anyhow::{bail, Result};
use clap::Args;
use loadgen::{apply::Applier, cluster, config::LoadConfig, namer::IdRange};

#[derive(Args)]
pub struct Arg {
    /// Number of identifiers to create.
    #[clap(short = 'n', long)]
    count: Option<u32>,
    /// First identifier, for restarting a partial run.
    #[clap(long)]
    start: Option<u32>,
    /// Namespace name prefix.
    #[clap(short, long)]
    prefix: Option<String>,
    /// Maximum in-flight Kubernetes calls.
    #[clap(long)]
    concurrency: Option<usize>,
}

impl Arg {
    pub async fn handle(&self, config: &LoadConfig) -> Result<()> {
        let config = self.overridden(config);
        config.validate()?;
        let range = IdRange::from_config(&config);
        tracing::info!(
            "Applying {} identifiers with prefix {} starting at {}",
            config.count,
            config.prefix,
            config.start
        );

        let client = cluster::client().await?;
        let applier = Applier::new(client, config);
        let report = applier.apply_range(&range).await;

        println!("Applied: {}", report);
        for failure in &report.failures {
            println!("  {: <20} {}", failure.name, failure.reason);
        }
        if !report.is_success() {
            bail!("{} identifiers failed to apply", report.failures.len());
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
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        config
    }
}
