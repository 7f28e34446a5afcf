use std::time::Duration;

use anyhow::Result;
use clap::Args;
use loadgen::{config::LoadConfig, reports, retry::Backoff};

#[derive(Args)]
pub struct Arg {
    /// Wait until `policyreports` holds at least this many rows.
    #[clap(long, value_name = "ROWS")]
    expect: Option<i64>,
    /// Seconds to wait for the expectation.
    #[clap(long, default_value = "120")]
    timeout: u64,
}

impl Arg {
    pub async fn handle(&self, config: &LoadConfig) -> Result<()> {
        let pool = reports::connect(&config.database).await?;

        if let Some(minimum) = self.expect {
            let backoff = Backoff::for_deadline(Duration::from_secs(self.timeout));
            let rows = reports::wait_for_reports(&pool, minimum, backoff).await?;
            println!("policyreports reached {} rows (wanted {})", rows, minimum);
        }

        let counts = reports::table_counts(&pool).await?;
        println!("{: <28} {: <10}", "TABLE", "ROWS");
        for count in &counts {
            println!("{: <28} {: <10}", count.table, count.rows);
        }
        Ok(())
    }
}
