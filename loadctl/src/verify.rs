use anyhow::{bail, Result};
use clap::Args;
use loadgen::{
    cluster,
    config::LoadConfig,
    verify::{Expected, Verifier},
};

#[derive(Args)]
pub struct Arg {
    /// Number of identifiers expected to exist.
    #[clap(short = 'n', long)]
    count: Option<u32>,
    /// Seconds to wait for counts to converge.
    #[clap(long)]
    timeout: Option<u64>,
}

impl Arg {
    pub async fn handle(&self, config: &LoadConfig) -> Result<()> {
        let mut config = config.clone();
        if let Some(count) = self.count {
            config.count = count;
        }
        if let Some(timeout) = self.timeout {
            config.verify_timeout_secs = timeout;
        }
        config.validate()?;

        let expected = Expected::for_range(config.count as usize);
        let client = cluster::client().await?;
        let verifier = Verifier::new(client, config);
        let checks = verifier.verify(&expected).await?;

        println!(
            "{: <20} {: <10} {: <10} {: <10}",
            "KIND", "EXPECTED", "ACTUAL", "STATUS"
        );
        for check in &checks {
            println!(
                "{: <20} {: <10} {: <10} {: <10}",
                check.kind,
                check.expected,
                check.actual,
                if check.matches() { "ok" } else { "MISMATCH" }
            );
        }
        if checks.iter().any(|check| !check.matches()) {
            bail!("Object counts do not match the expected totals");
        }
        Ok(())
    }
}
