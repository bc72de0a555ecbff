//! Relational conditional store (MySQL, PostgreSQL, SQLite)
//!
//! The condition is rendered into the `WHERE` clause of a single `UPDATE`, so
//! the database's row locking provides the per-key atomicity. PostgreSQL and
//! SQLite return the written row from that same statement. A condition that
//! admits a missing record falls back to an insert-if-absent, which either
//! creates the row or loses to a concurrent writer and reports
//! `ConditionFailed`.

use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, QueryResult,
    Statement, Value,
};
use tracing::{debug, info, warn};

use super::{Condition, ConditionalStore, StoreError};
use crate::record::{LockRecord, RecordUpdate};

/// Table used when none is configured
pub const DEFAULT_TABLE: &str = "locks";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const READY_MAX_ATTEMPTS: u32 = 50;
const MAX_TABLE_NAME_LEN: usize = 64;
const COLUMNS: &str = "name, holder_id, last_write, value";

/// Conditional store on top of a sea-orm connection
pub struct SqlStore {
    db: DatabaseConnection,
    table: String,
}

impl SqlStore {
    /// Open a new connection pool to `url` and use `table` for lock records
    pub async fn connect(url: &str, table: &str) -> Result<Self, StoreError> {
        validate_table(table)?;

        let mut opt = ConnectOptions::new(url.to_string());
        opt.connect_timeout(CONNECT_TIMEOUT).sqlx_logging(false);

        let db = Database::connect(opt).await?;
        debug!(table = %table, "Connected lock store");

        Self::with_connection(db, table)
    }

    /// Reuse an existing connection pool
    pub fn with_connection(db: DatabaseConnection, table: &str) -> Result<Self, StoreError> {
        validate_table(table)?;
        Ok(Self {
            db,
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn statement(&self, sql: &str, values: Vec<Value>) -> Statement {
        let backend = self.db.get_database_backend();
        Statement::from_sql_and_values(backend, number_placeholders(backend, sql), values)
    }

    async fn probe(&self) -> Result<(), DbErr> {
        self.db
            .execute_unprepared(&format!("SELECT COUNT(*) FROM {}", self.table))
            .await
            .map(|_| ())
    }

    async fn insert_if_absent(
        &self,
        name: &str,
        update: &RecordUpdate,
    ) -> Result<bool, StoreError> {
        let sql = match self.db.get_database_backend() {
            DbBackend::MySql => format!(
                "INSERT IGNORE INTO {} (name, holder_id, last_write, value) VALUES (?, ?, ?, ?)",
                self.table
            ),
            _ => format!(
                "INSERT INTO {} (name, holder_id, last_write, value) VALUES (?, ?, ?, ?) \
                 ON CONFLICT (name) DO NOTHING",
                self.table
            ),
        };
        let values = vec![
            name.into(),
            update.holder_id.into(),
            update.last_write.into(),
            update.value.clone().into(),
        ];

        let result = self.db.execute(self.statement(&sql, values)).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ConditionalStore for SqlStore {
    async fn ensure_ready(&self) -> Result<(), StoreError> {
        let create = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             name VARCHAR(255) NOT NULL PRIMARY KEY, \
             holder_id BIGINT NULL, \
             last_write BIGINT NULL, \
             value TEXT NULL)",
            self.table
        );

        if let Err(e) = self.db.execute_unprepared(&create).await {
            // A concurrent initializer may have won the race; only fail if the
            // table is still unusable.
            if self.probe().await.is_err() {
                return Err(e.into());
            }
            debug!(table = %self.table, error = %e, "Lock table created concurrently");
        }

        let mut reason = String::new();
        for attempt in 1..=READY_MAX_ATTEMPTS {
            match self.probe().await {
                Ok(()) => {
                    info!(table = %self.table, attempt, "Lock table ready");
                    return Ok(());
                }
                Err(e) => {
                    reason = e.to_string();
                    tokio::time::sleep(READY_POLL_INTERVAL).await;
                }
            }
        }

        warn!(table = %self.table, reason = %reason, "Lock table never became ready");
        Err(StoreError::NotReady {
            table: self.table.clone(),
            reason,
        })
    }

    async fn conditional_update(
        &self,
        name: &str,
        condition: &Condition,
        update: &RecordUpdate,
    ) -> Result<LockRecord, StoreError> {
        let mut values: Vec<Value> = vec![update.holder_id.into(), update.last_write.into()];
        let mut assignments = String::from("holder_id = ?, last_write = ?");
        if let Some(value) = &update.value {
            assignments.push_str(", value = ?");
            values.push(value.clone().into());
        }
        values.push(name.into());
        let clause = render_condition(condition, &mut values);

        let backend = self.db.get_database_backend();
        let sql = update_sql(backend, &self.table, &assignments, &clause);
        let statement = self.statement(&sql, values);

        let updated = match backend {
            // No RETURNING; the follow-up read can observe a later writer
            DbBackend::MySql => {
                if self.db.execute(statement).await?.rows_affected() > 0 {
                    Some(self.get(name).await?.ok_or_else(|| {
                        StoreError::Other(anyhow::anyhow!(
                            "record '{}' vanished after update",
                            name
                        ))
                    })?)
                } else {
                    None
                }
            }
            _ => self
                .db
                .query_one(statement)
                .await?
                .map(|row| record_from_row(&row))
                .transpose()?,
        };
        if let Some(record) = updated {
            return Ok(record);
        }

        if condition.admits_absent() && self.insert_if_absent(name, update).await? {
            let mut record = LockRecord::new(name);
            record.apply(update);
            return Ok(record);
        }

        Err(StoreError::ConditionFailed)
    }

    async fn get(&self, name: &str) -> Result<Option<LockRecord>, StoreError> {
        let sql = format!("SELECT {} FROM {} WHERE name = ?", COLUMNS, self.table);
        let row = self
            .db
            .query_one(self.statement(&sql, vec![name.into()]))
            .await?;

        Ok(row.map(|row| record_from_row(&row)).transpose()?)
    }
}

/// Conditional `UPDATE`, returning the written row where the backend can
fn update_sql(backend: DbBackend, table: &str, assignments: &str, clause: &str) -> String {
    let sql = format!(
        "UPDATE {} SET {} WHERE name = ? AND {}",
        table, assignments, clause
    );
    match backend {
        DbBackend::MySql => sql,
        _ => format!("{} RETURNING {}", sql, COLUMNS),
    }
}

fn record_from_row(row: &QueryResult) -> Result<LockRecord, DbErr> {
    Ok(LockRecord {
        name: row.try_get("", "name")?,
        holder_id: row.try_get("", "holder_id")?,
        last_write: row.try_get("", "last_write")?,
        value: row.try_get("", "value")?,
    })
}

/// Render a condition as a SQL boolean expression over an existing row.
///
/// `Absent` can never match inside an `UPDATE`; the caller handles it with an
/// insert. Comparisons against NULL columns are unknown, which acts as false
/// here since the language has no negation.
fn render_condition(condition: &Condition, values: &mut Vec<Value>) -> String {
    match condition {
        Condition::Absent => "1 = 0".to_string(),
        Condition::HolderAbsent => "holder_id IS NULL".to_string(),
        Condition::HolderEquals(id) => {
            values.push((*id).into());
            "holder_id = ?".to_string()
        }
        Condition::HolderNotEquals(id) => {
            values.push((*id).into());
            "holder_id <> ?".to_string()
        }
        Condition::LastWriteBefore(ts) => {
            values.push((*ts).into());
            "last_write < ?".to_string()
        }
        Condition::Or(any) => join(any, " OR ", "1 = 0", values),
        Condition::And(all) => join(all, " AND ", "1 = 1", values),
    }
}

fn join(parts: &[Condition], op: &str, empty: &str, values: &mut Vec<Value>) -> String {
    if parts.is_empty() {
        return empty.to_string();
    }
    let rendered: Vec<String> = parts
        .iter()
        .map(|c| render_condition(c, values))
        .collect();
    format!("({})", rendered.join(op))
}

/// PostgreSQL wants `$1, $2, ...`; MySQL and SQLite take `?` as is
fn number_placeholders(backend: DbBackend, sql: &str) -> String {
    if backend != DbBackend::Postgres {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    for c in sql.chars() {
        if c == '?' {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(c);
        }
    }
    out
}

fn validate_table(table: &str) -> Result<(), StoreError> {
    let valid = !table.is_empty()
        && table.len() <= MAX_TABLE_NAME_LEN
        && !table.starts_with(|c: char| c.is_ascii_digit())
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}
