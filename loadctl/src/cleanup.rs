use anyhow::{bail, Result};
use clap::Args;
use loadgen::{cleanup::Cleaner, cluster, config::LoadConfig, namer::IdRange};

#[derive(Args)]
pub struct Arg {
    /// Number of identifiers to delete.
    #[clap(short = 'n', long)]
    count: Option<u32>,
    /// First identifier.
    #[clap(long)]
    start: Option<u32>,
    /// Namespace name prefix.
    #[clap(short, long)]
    prefix: Option<String>,
}

impl Arg {
    pub async fn handle(&self, config: &LoadConfig) -> Result<()> {
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
        config.validate()?;
        let range = IdRange::from_config(&config);
        tracing::info!(
            "Cleaning up {} identifiers with prefix {}",
            config.count,
            config.prefix
        );

        let client = cluster::client().await?;
        let cleaner = Cleaner::new(client, config);
        let report = cleaner.cleanup(&range).await?;

        println!("Deleted: {}", report.deletions);
        for failure in &report.deletions.failures {
            println!("  {: <20} {}", failure.name, failure.reason);
        }
        if !report.residue.is_empty() {
            println!(
                "Warning: {} namespaces still present: {}",
                report.residue.len(),
                report.residue.join(", ")
            );
        }
        if !report.deletions.is_success() {
            bail!("{} identifiers failed to delete", report.deletions.failures.len());
        }
        Ok(())
    }
}
