//! ClickHouse health checks and schema bootstrap.

use crate::client::ClickHouseClient;
use crate::schema::{create_daily_table, create_database};
use sync_core::{Error, Result};
use tracing::{debug, error, info};

/// Check ClickHouse connection health.
pub async fn check_connection(client: &ClickHouseClient) -> bool {
    match client.admin().query("SELECT 1").fetch_one::<u8>().await {
        Ok(_) => {
            debug!("ClickHouse connection healthy");
            true
        }
        Err(e) => {
            error!("ClickHouse health check failed: {}", e);
            false
        }
    }
}

/// Create the database and the given daily table when missing.
pub async fn init_schema(client: &ClickHouseClient, table: &str) -> Result<()> {
    client
        .admin()
        .query(&create_database(&client.config().database))
        .execute()
        .await
        .map_err(|e| Error::database(format!("Failed to create database: {}", e)))?;

    client
        .inner()
        .query(&create_daily_table(table))
        .execute()
        .await
        .map_err(|e| Error::database(format!("Failed to create table {}: {}", table, e)))?;

    info!(database = %client.config().database, table = table, "ClickHouse schema ready");
    Ok(())
}
