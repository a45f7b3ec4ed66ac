use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

const MAX_CONNECT_RETRIES: u32 = 30;

pub async fn init_db(db_url: &str) -> anyhow::Result<SqlitePool> {
    info!("🔌 Connecting to SQLite at {}...", db_url);

    let pool = connect_with_retry(db_url).await?;
    apply_schema(&pool, include_str!("../schema.sql")).await?;

    info!("✅ Database connected and schema applied.");
    Ok(pool)
}

fn connect_options(db_url: &str) -> Result<SqliteConnectOptions, sqlx::Error> {
    let in_memory = db_url.contains(":memory:");
    let opts = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    Ok(if in_memory {
        opts
    } else {
        opts.journal_mode(SqliteJournalMode::Wal)
    })
}

async fn connect_with_retry(db_url: &str) -> anyhow::Result<SqlitePool> {
    let opts = connect_options(db_url)?;
    // Every connection to `sqlite::memory:` opens its own database.
    let pool_opts = if db_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(16)
    };
    let delay = Duration::from_secs(1);

    for i in 1..=MAX_CONNECT_RETRIES {
        match pool_opts
            .clone()
            .connect_with(opts.clone())
            .await
        {
            Ok(p) => return Ok(p),
            Err(e) => {
                warn!(
                    "⚠️  DB Connection attempt {}/{} failed: {}. Retrying...",
                    i, MAX_CONNECT_RETRIES, e
                );
                sleep(delay).await;
            }
        }
    }
    anyhow::bail!(
        "Could not connect to {} after {} attempts",
        db_url,
        MAX_CONNECT_RETRIES
    )
}

async fn apply_schema(pool: &SqlitePool, schema: &str) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for (i, sql) in split_sql(schema).iter().enumerate() {
        if let Err(e) = sqlx::query(sql).execute(&mut *tx).await {
            error!("🚨 Schema Error in statement #{}:\n{}", i + 1, sql);
            return Err(e);
        }
    }

    tx.commit().await
}

/// Splits a schema file into statements on `;` line endings, ignoring `--` comments.
fn split_sql(raw: &str) -> Vec<String> {
    let mut cmds = Vec::new();
    let mut current = String::new();

    for line in raw.lines() {
        let code = match line.find("--") {
            Some(idx) => &line[..idx],
            None => line,
        };
        if code.trim().is_empty() {
            continue;
        }

        current.push_str(code);
        current.push('\n');

        if code.trim_end().ends_with(';') {
            cmds.push(current.trim().to_string());
            current.clear();
        }
    }

    if !current.trim().is_empty() {
        cmds.push(current.trim().to_string());
    }
    cmds
}
