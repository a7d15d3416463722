use std::{ops::Deref, time::Duration};

use anyhow::Context;
use chrono::NaiveDateTime;
use libsql::{params::Params, Transaction, TransactionBehavior, Value};
use tokio::sync::{Semaphore, SemaphorePermit};

use shared_lib::call_structs::{CallCategory, CallDuration, CallEventRecord};
use shared_lib::env_utils;
use shared_lib::utils::format_call_timestamp;

const CALL_COLUMNS: &str = "callID, dispnumber, caller_id, start_time, answer_stamp, end_time, \
    callType, call_duration, destination, status, resource_url, missedFrom, hangup_cause";

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Remote libsql server. When unset the local file at `local_path` is used.
    pub url: Option<String>,
    pub auth_token: String,
    pub local_path: String,
    /// Max connections handed out at once.
    pub pool_size: usize,
    /// How long a local connection waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl DbConfig {
    pub fn from_env() -> Self {
        DbConfig {
            url: env_utils::get_libsql_url(),
            auth_token: env_utils::get_libsql_token(),
            local_path: env_utils::get_local_db_path(),
            pool_size: env_utils::get_db_pool_size(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn local(path: impl Into<String>) -> Self {
        DbConfig {
            url: None,
            auth_token: String::new(),
            local_path: path.into(),
            pool_size: 5,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

/// A row read back from one of the call tables, for operational checks.
#[derive(Debug, Clone)]
pub struct StoredCallEvent {
    pub call_id: Option<String>,
    pub dispnumber: Option<String>,
    pub caller_id: Option<String>,
    pub start_time: Option<String>,
    pub answer_stamp: Option<String>,
    pub end_time: Option<String>,
    pub call_type: String,
    pub call_duration: Value,
    pub destination: Option<String>,
    pub status: Option<String>,
    pub resource_url: Option<String>,
    pub missed_from: Option<String>,
    pub hangup_cause: Option<String>,
}

/// A connection borrowed from the pool; the permit is returned when this is dropped.
pub struct PooledConnection<'a> {
    conn: libsql::Connection,
    _permit: SemaphorePermit<'a>,
}

impl Deref for PooledConnection<'_> {
    type Target = libsql::Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

pub struct DbService {
    db: libsql::Database,
    permits: Semaphore,
    pool_size: usize,
    remote: bool,
    busy_timeout: Duration,
}

impl DbService {
    pub async fn connect(config: DbConfig) -> anyhow::Result<Self> {
        let pool_size = config.pool_size.max(1);
        let remote = config.url.is_some();

        let db = match config.url {
            Some(url) => {
                tracing::debug!("Connecting to remote db at {}", url);
                libsql::Builder::new_remote(url, config.auth_token)
                    .build()
                    .await
            }
            None => {
                tracing::debug!("Opening local db at {}", config.local_path);
                libsql::Builder::new_local(&config.local_path)
                    .build()
                    .await
            }
        }
        .context("Failed to create database")?;

        tracing::debug!("Initialized db with pool size {}", pool_size);

        Ok(DbService {
            db,
            permits: Semaphore::new(pool_size),
            pool_size,
            remote,
            busy_timeout: config.busy_timeout,
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Waits for a free pool slot and opens a connection in it.
    pub async fn acquire(&self) -> anyhow::Result<PooledConnection<'_>> {
        let permit = self
            .permits
            .acquire()
            .await
            .context("Database pool has been shut down")?;
        let conn = self.db.connect().context("Failed to connect to db")?;

        // local writers share one file lock
        if !self.remote {
            conn.busy_timeout(self.busy_timeout)
                .context("Failed to set busy timeout")?;
        }

        Ok(PooledConnection {
            conn,
            _permit: permit,
        })
    }

    pub async fn init_tables(&self) -> anyhow::Result<()> {
        let conn = self.acquire().await?;
        for category in CallCategory::ALL {
            let statement = format!(
                "CREATE TABLE IF NOT EXISTS {} (\
                    id INTEGER PRIMARY KEY AUTOINCREMENT, \
                    callID TEXT, \
                    dispnumber TEXT, \
                    caller_id TEXT, \
                    start_time TEXT, \
                    answer_stamp TEXT, \
                    end_time TEXT, \
                    callType TEXT NOT NULL, \
                    call_duration, \
                    destination TEXT, \
                    status TEXT, \
                    resource_url TEXT, \
                    missedFrom TEXT, \
                    hangup_cause TEXT\
                )",
                category.table()
            );
            conn.execute(&statement, ())
                .await
                .with_context(|| format!("Failed to create table {}", category.table()))?;
        }

        tracing::debug!("Call tables ready");
        Ok(())
    }

    /// Writes one call event to its category table in a single transaction.
    pub async fn insert_call_event(&self, record: &CallEventRecord) -> anyhow::Result<u64> {
        let table = record.category.table();
        let statement = format!(
            "INSERT INTO {table} ({CALL_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );

        let behavior = match self.remote {
            true => TransactionBehavior::Deferred,
            false => TransactionBehavior::Immediate,
        };

        let conn = self.acquire().await?;
        let tx = conn
            .transaction_with_behavior(behavior)
            .await
            .context("Failed to begin transaction")?;

        let rows = match tx.execute(&statement, call_event_params(record)).await {
            Ok(rows) => rows,
            Err(e) => {
                rollback(tx, table).await;
                return Err(e).with_context(|| format!("Failed to insert into {table}"));
            }
        };

        if rows != 1 {
            rollback(tx, table).await;
            anyhow::bail!("Failed to insert into {table}, expected 1 row affected but got {rows}");
        }

        tx.commit()
            .await
            .with_context(|| format!("Failed to commit insert into {table}"))?;

        tracing::trace!("{} row inserted into {}", record.call_type(), table);
        Ok(rows)
    }

    pub async fn count_rows(&self, category: CallCategory) -> anyhow::Result<i64> {
        let conn = self.acquire().await?;
        let mut rows = conn
            .query(&format!("SELECT COUNT(*) FROM {}", category.table()), ())
            .await
            .context("Failed to get data from database")?;

        let row = rows
            .next()
            .await
            .context("Failed to get data from database")?
            .context("COUNT returned no rows")?;

        Ok(row.get::<i64>(0)?)
    }

    /// Most recently inserted event of a category, if any. Used to verify what a webhook stored.
    pub async fn latest_call_event(
        &self,
        category: CallCategory,
    ) -> anyhow::Result<Option<StoredCallEvent>> {
        let conn = self.acquire().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CALL_COLUMNS} FROM {} ORDER BY id DESC LIMIT 1",
                    category.table()
                ),
                (),
            )
            .await
            .context("Failed to get data from database")?;

        let Some(row) = rows
            .next()
            .await
            .context("Failed to get data from database")?
        else {
            return Ok(None);
        };

        Ok(Some(StoredCallEvent {
            call_id: row.get(0)?,
            dispnumber: row.get(1)?,
            caller_id: row.get(2)?,
            start_time: row.get(3)?,
            answer_stamp: row.get(4)?,
            end_time: row.get(5)?,
            call_type: row.get(6)?,
            call_duration: row.get_value(7)?,
            destination: row.get(8)?,
            status: row.get(9)?,
            resource_url: row.get(10)?,
            missed_from: row.get(11)?,
            hangup_cause: row.get(12)?,
        }))
    }

    /// Stops handing out connections. Outstanding connections finish normally.
    pub fn shutdown(&self) {
        self.permits.close();
        tracing::info!("Database pool closed");
    }
}

async fn rollback(tx: Transaction, table: &str) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!("Failed to roll back insert into {}: {:?}", table, e);
    }
}

fn call_event_params(record: &CallEventRecord) -> Params {
    let duration = match &record.call_duration {
        Some(CallDuration::Integer(seconds)) => Value::Integer(*seconds),
        Some(CallDuration::Real(seconds)) => Value::Real(*seconds),
        Some(CallDuration::Text(text)) => Value::Text(text.clone()),
        None => Value::Null,
    };

    Params::Positional(vec![
        text(&record.call_id),
        text(&record.dispnumber),
        text(&record.caller_id),
        timestamp(&record.start_time),
        timestamp(&record.answer_stamp),
        timestamp(&record.end_time),
        Value::Text(record.call_type().to_string()),
        duration,
        text(&record.destination),
        text(&record.status),
        text(&record.resource_url),
        text(&record.missed_from),
        Value::Text(record.hangup_cause.clone()),
    ])
}

fn timestamp(value: &Option<NaiveDateTime>) -> Value {
    match value {
        Some(timestamp) => Value::Text(format_call_timestamp(timestamp)),
        None => Value::Null,
    }
}

fn text(value: &Option<String>) -> Value {
    match value {
        Some(value) => Value::Text(value.clone()),
        None => Value::Null,
    }
}
