use std::str::FromStr;
use std::time::Duration;

use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};

use crate::config::DatabaseTarget;
use crate::error::AppError;

/// Create a MySQL connection pool.
///
/// `max_connections` controls the maximum number of connections in the pool.
/// Pass `StorageConfig::max_connections` for the user-configured value (default 5).
pub async fn create_pool(
    target: &DatabaseTarget,
    max_connections: u32,
) -> Result<MySqlPool, AppError> {
    let options = match target {
        DatabaseTarget::Url(url) => MySqlConnectOptions::from_str(url)?,
        DatabaseTarget::Parts {
            host,
            port,
            user,
            password,
            database,
        } => {
            let options = MySqlConnectOptions::new()
                .host(host)
                .port(*port)
                .username(user)
                .database(database);
            match password {
                Some(password) => options.password(password),
                None => options,
            }
        }
    };

    let pool = MySqlPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;

    tracing::info!(max_connections, "Connected to MySQL");
    Ok(pool)
}
