use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::{
    config::DatabaseConfig,
    retry::{poll_until, Backoff},
};

/// Tables the Reports Server writes. Schema belongs to that service; this
/// side only ever counts rows.
pub const REPORT_TABLES: [&str; 4] = [
    "policyreports",
    "clusterpolicyreports",
    "ephemeralreports",
    "clusterephemeralreports",
];

#[derive(Debug, Clone)]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}

pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let url = config.url()?;
    PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to reports database at {}:{}",
                config.host, config.port
            )
        })
}

pub async fn table_counts(pool: &PgPool) -> Result<Vec<TableCount>> {
    let mut counts = Vec::with_capacity(REPORT_TABLES.len());
    for table in REPORT_TABLES {
        counts.push(TableCount {
            table: table.to_string(),
            rows: count_rows(pool, table).await?,
        });
    }
    Ok(counts)
}

async fn count_rows(pool: &PgPool, table: &str) -> Result<i64> {
    // Table names come from the fixed list above, never from input.
    let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .with_context(|| format!("Failed to count rows in {}", table))?;
    Ok(rows)
}

/// Reports trail the objects that triggered them, so an expectation is a
/// wait, not a snapshot: polls until `policyreports` reaches `minimum` rows
/// or the window closes.
pub async fn wait_for_reports(pool: &PgPool, minimum: i64, backoff: Backoff) -> Result<i64> {
    poll_until(
        &format!("policyreports to reach {} rows", minimum),
        backoff,
        || async {
            let rows = count_rows(pool, "policyreports").await?;
            Ok(if rows >= minimum { Some(rows) } else { None })
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_four_report_tables_are_queried() {
        assert_eq!(REPORT_TABLES.len(), 4);
        assert!(REPORT_TABLES.contains(&"policyreports"));
        assert!(REPORT_TABLES.contains(&"clusterephemeralreports"));
    }
}
