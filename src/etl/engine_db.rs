//! Engine database.
//!
//! Persists contracts, applications, observed topics, daily activity
//! snapshots and the scan cursor. Every write is an upsert or an
//! insert-if-absent on a unique key, so replaying a range never duplicates rows.

use anyhow::{Context, Result};
use sqlx::{any::AnyPoolOptions, any::AnyRow, Any, Pool, Row};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use crate::etl::model::{
    ActivitySnapshot, Application, ApplicationStatus, Category, Confidence, Contract, ContractType,
};

/// Embedded SQL schemas
const SQLITE_SCHEMA_SQL: &str = include_str!("../../sql/engine_schema.sql");
const POSTGRES_SCHEMA_SQL: &str = include_str!("../../sql/engine_schema_postgres.sql");

const CONTRACT_COLUMNS: &str = "address, contract_type, creator_address, creator_confidence, \
     deployment_block, deployment_time, application_id, created_at, updated_at";
const APPLICATION_COLUMNS: &str = "id, group_key, name, category, category_confidence, status, \
     quality_score, activity_score, diversity_score, age_score, grouping_confidence, \
     created_at, updated_at";
const SNAPSHOT_COLUMNS: &str =
    "application_id, day, tx_count, user_count, event_count, gas_used";

/// Engine database configuration
#[derive(Debug, Clone)]
pub struct EngineDbConfig {
    /// File path, `:memory:`, or a `sqlite:` / `postgres://` URL.
    pub path: String,
}

impl EngineDbConfig {
    pub fn in_memory() -> Self {
        Self {
            path: ":memory:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DbBackend {
    Sqlite,
    Postgres,
}

/// Row to insert for a newly detected contract.
#[derive(Debug, Clone)]
pub struct NewContract {
    pub address: String,
    pub creator_address: Option<String>,
    pub creator_confidence: Confidence,
    pub deployment_block: u64,
    pub deployment_time: Option<i64>,
}

/// Listing filter for applications.
#[derive(Debug, Clone, Default)]
pub struct ApplicationQuery {
    pub category: Option<Category>,
    pub status: Option<ApplicationStatus>,
    pub limit: u32,
    pub offset: u32,
}

/// Quality score components stored on an application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredScores {
    pub quality: f64,
    pub activity: f64,
    pub diversity: f64,
    pub age: f64,
}

/// Engine database for discovery state
pub struct EngineDb {
    pool: Pool<Any>,
    backend: DbBackend,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn parse_enum<T>(row: &AnyRow, column: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>()
        .with_context(|| format!("Invalid value in column {column}"))
}

fn contract_from_row(row: &AnyRow) -> Result<Contract> {
    Ok(Contract {
        address: row.try_get("address")?,
        contract_type: parse_enum(row, "contract_type")?,
        creator_address: row.try_get("creator_address")?,
        creator_confidence: parse_enum(row, "creator_confidence")?,
        deployment_block: row.try_get::<i64, _>("deployment_block")? as u64,
        deployment_time: row.try_get("deployment_time")?,
        application_id: row.try_get("application_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn application_from_row(row: &AnyRow) -> Result<Application> {
    Ok(Application {
        id: row.try_get("id")?,
        group_key: row.try_get("group_key")?,
        name: row.try_get("name")?,
        category: parse_enum(row, "category")?,
        category_confidence: row.try_get("category_confidence")?,
        status: parse_enum(row, "status")?,
        quality_score: row.try_get("quality_score")?,
        activity_score: row.try_get("activity_score")?,
        diversity_score: row.try_get("diversity_score")?,
        age_score: row.try_get("age_score")?,
        grouping_confidence: parse_enum(row, "grouping_confidence")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn snapshot_from_row(row: &AnyRow) -> Result<ActivitySnapshot> {
    Ok(ActivitySnapshot {
        application_id: row.try_get("application_id")?,
        day: row.try_get("day")?,
        tx_count: row.try_get::<i64, _>("tx_count")? as u64,
        user_count: row.try_get::<i64, _>("user_count")? as u64,
        event_count: row.try_get::<i64, _>("event_count")? as u64,
        gas_used: row.try_get::<i64, _>("gas_used")? as u64,
    })
}

impl EngineDb {
    /// Create a new engine database
    pub async fn new(config: EngineDbConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let backend =
            if config.path.starts_with("postgres://") || config.path.starts_with("postgresql://") {
                DbBackend::Postgres
            } else {
                DbBackend::Sqlite
            };

        let is_memory = config.path == ":memory:" || config.path == "sqlite::memory:";

        // Ensure parent directory exists for sqlite file databases.
        if backend == DbBackend::Sqlite && !is_memory && !config.path.starts_with("sqlite:") {
            if let Some(parent) = Path::new(&config.path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .context(format!("Failed to create directory: {}", parent.display()))?;
                }
            }
        }

        let database_url = match backend {
            DbBackend::Postgres => config.path.clone(),
            DbBackend::Sqlite => {
                if is_memory {
                    "sqlite::memory:".to_string()
                } else if config.path.starts_with("sqlite:") {
                    config.path.clone()
                } else {
                    format!("sqlite://{}?mode=rwc", config.path)
                }
            }
        };

        tracing::debug!(
            target: "scout::etl::engine_db",
            "Connecting to database: {}",
            database_url
        );

        // Each in-memory SQLite connection is its own database.
        let max_connections = if is_memory { 1 } else { 5 };

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(&database_url)
            .await
            .context("Failed to connect to engine database")?;

        let db = Self { pool, backend };

        db.init_schema().await?;

        Ok(db)
    }

    /// Rewrites `?` placeholders for the active backend.
    fn sql(&self, sqlite: &str) -> String {
        match self.backend {
            DbBackend::Sqlite => sqlite.to_string(),
            DbBackend::Postgres => {
                let mut out = String::with_capacity(sqlite.len() + 16);
                let mut n = 0;
                for c in sqlite.chars() {
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
        }
    }

    fn table(&self, name: &str) -> String {
        match self.backend {
            DbBackend::Sqlite => name.to_string(),
            DbBackend::Postgres => format!("scout.{name}"),
        }
    }

    /// Initialize database with backend tuning and schema
    async fn init_schema(&self) -> Result<()> {
        self.apply_pragmas().await?;
        self.load_schema_from_sql().await?;

        tracing::info!(target: "scout::etl::engine_db", "Engine database schema initialized");

        Ok(())
    }

    /// Apply SQLite PRAGMAs for performance
    async fn apply_pragmas(&self) -> Result<()> {
        if self.backend != DbBackend::Sqlite {
            return Ok(());
        }

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;

        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        tracing::debug!(target: "scout::etl::engine_db", "Applied SQLite PRAGMAs");

        Ok(())
    }

    /// Load schema from SQL file
    async fn load_schema_from_sql(&self) -> Result<()> {
        let schema_sql = match self.backend {
            DbBackend::Sqlite => SQLITE_SCHEMA_SQL,
            DbBackend::Postgres => POSTGRES_SCHEMA_SQL,
        };

        for statement in schema_sql.split(';') {
            let sql_lines: Vec<&str> = statement
                .lines()
                .filter(|line| {
                    let trimmed = line.trim();
                    !trimmed.is_empty() && !trimmed.starts_with("--")
                })
                .collect();

            if sql_lines.is_empty() {
                continue;
            }

            let clean_sql = sql_lines.join("\n");
            let first_line = clean_sql.lines().next().unwrap_or("");

            tracing::debug!(
                target: "scout::etl::engine_db",
                "Executing SQL: {}",
                first_line
            );

            sqlx::query(&clean_sql)
                .execute(&self.pool)
                .await
                .context(format!("Failed to execute SQL: {first_line}"))?;
        }

        Ok(())
    }

    // ===== Contracts =====

    /// Inserts the contract unless the address is already known.
    ///
    /// Returns true if a row was created.
    pub async fn insert_contract_if_absent(&self, contract: &NewContract) -> Result<bool> {
        let ts = now();
        let sql = self.sql(&format!(
            "INSERT INTO {t} ({CONTRACT_COLUMNS}) VALUES (?, 'UNKNOWN', ?, ?, ?, ?, NULL, ?, ?) \
             ON CONFLICT(address) DO NOTHING",
            t = self.table("contracts")
        ));

        let result = sqlx::query(&sql)
            .bind(&contract.address)
            .bind(contract.creator_address.clone())
            .bind(contract.creator_confidence.as_str())
            .bind(contract.deployment_block as i64)
            .bind(contract.deployment_time)
            .bind(ts)
            .bind(ts)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_contract(&self, address: &str) -> Result<Option<Contract>> {
        let sql = self.sql(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM {t} WHERE address = ?",
            t = self.table("contracts")
        ));
        let row = sqlx::query(&sql)
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(contract_from_row).transpose()
    }

    /// Addresses among `addresses` that are already stored.
    pub async fn known_contracts(&self, addresses: &[String]) -> Result<HashSet<String>> {
        if addresses.is_empty() {
            return Ok(HashSet::new());
        }

        let placeholders = vec!["?"; addresses.len()].join(", ");
        let sql = self.sql(&format!(
            "SELECT address FROM {t} WHERE address IN ({placeholders})",
            t = self.table("contracts")
        ));

        let mut query = sqlx::query(&sql);
        for address in addresses {
            query = query.bind(address);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>(0).map_err(Into::into))
            .collect()
    }

    pub async fn set_contract_type(&self, address: &str, contract_type: ContractType) -> Result<()> {
        let sql = self.sql(&format!(
            "UPDATE {t} SET contract_type = ?, updated_at = ? WHERE address = ?",
            t = self.table("contracts")
        ));
        sqlx::query(&sql)
            .bind(contract_type.as_str())
            .bind(now())
            .bind(address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn assign_contract(&self, address: &str, application_id: &str) -> Result<()> {
        let sql = self.sql(&format!(
            "UPDATE {t} SET application_id = ?, updated_at = ? WHERE address = ?",
            t = self.table("contracts")
        ));
        sqlx::query(&sql)
            .bind(application_id)
            .bind(now())
            .bind(address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn contracts_for_application(&self, application_id: &str) -> Result<Vec<Contract>> {
        let sql = self.sql(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM {t} WHERE application_id = ? ORDER BY deployment_block, address",
            t = self.table("contracts")
        ));
        let rows = sqlx::query(&sql)
            .bind(application_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(contract_from_row).collect()
    }

    pub async fn count_contracts(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {t}",
            t = self.table("contracts")
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    // ===== Applications =====

    /// Inserts the application unless its group key already exists.
    ///
    /// Returns true if a row was created.
    pub async fn insert_application_if_absent(&self, app: &Application) -> Result<bool> {
        let sql = self.sql(&format!(
            "INSERT INTO {t} ({APPLICATION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT DO NOTHING",
            t = self.table("applications")
        ));

        let result = sqlx::query(&sql)
            .bind(&app.id)
            .bind(&app.group_key)
            .bind(&app.name)
            .bind(app.category.as_str())
            .bind(app.category_confidence)
            .bind(app.status.as_str())
            .bind(app.quality_score)
            .bind(app.activity_score)
            .bind(app.diversity_score)
            .bind(app.age_score)
            .bind(app.grouping_confidence.as_str())
            .bind(app.created_at)
            .bind(app.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_application(&self, id: &str) -> Result<Option<Application>> {
        let sql = self.sql(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM {t} WHERE id = ?",
            t = self.table("applications")
        ));
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(application_from_row).transpose()
    }

    pub async fn get_application_by_key(&self, group_key: &str) -> Result<Option<Application>> {
        let sql = self.sql(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM {t} WHERE group_key = ?",
            t = self.table("applications")
        ));
        let row = sqlx::query(&sql)
            .bind(group_key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(application_from_row).transpose()
    }

    /// Newest applications first.
    pub async fn list_applications(&self, query: &ApplicationQuery) -> Result<Vec<Application>> {
        let mut conditions = Vec::new();
        let mut binds = Vec::new();
        if let Some(category) = query.category {
            conditions.push("category = ?");
            binds.push(category.as_str());
        }
        if let Some(status) = query.status {
            conditions.push("status = ?");
            binds.push(status.as_str());
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = self.sql(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM {t} {where_clause} \
             ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
            t = self.table("applications")
        ));

        let mut q = sqlx::query(&sql);
        for value in binds {
            q = q.bind(value);
        }
        let rows = q
            .bind(i64::from(query.limit))
            .bind(i64::from(query.offset))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(application_from_row).collect()
    }

    pub async fn list_application_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT id FROM {t} ORDER BY created_at, id",
            t = self.table("applications")
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    pub async fn update_application_category(
        &self,
        id: &str,
        category: Category,
        confidence: f64,
    ) -> Result<()> {
        let sql = self.sql(&format!(
            "UPDATE {t} SET category = ?, category_confidence = ?, updated_at = ? WHERE id = ?",
            t = self.table("applications")
        ));
        sqlx::query(&sql)
            .bind(category.as_str())
            .bind(confidence)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_grouping_confidence(&self, id: &str, confidence: Confidence) -> Result<()> {
        let sql = self.sql(&format!(
            "UPDATE {t} SET grouping_confidence = ?, updated_at = ? WHERE id = ?",
            t = self.table("applications")
        ));
        sqlx::query(&sql)
            .bind(confidence.as_str())
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_application_status(&self, id: &str, status: ApplicationStatus) -> Result<()> {
        let sql = self.sql(&format!(
            "UPDATE {t} SET status = ?, updated_at = ? WHERE id = ?",
            t = self.table("applications")
        ));
        sqlx::query(&sql)
            .bind(status.as_str())
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_application_scores(&self, id: &str, scores: StoredScores) -> Result<()> {
        let sql = self.sql(&format!(
            "UPDATE {t} SET quality_score = ?, activity_score = ?, diversity_score = ?, \
             age_score = ?, updated_at = ? WHERE id = ?",
            t = self.table("applications")
        ));
        sqlx::query(&sql)
            .bind(scores.quality)
            .bind(scores.activity)
            .bind(scores.diversity)
            .bind(scores.age)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_applications(&self, status: Option<ApplicationStatus>) -> Result<u64> {
        let t = self.table("applications");
        let count: i64 = match status {
            Some(status) => {
                sqlx::query_scalar(&self.sql(&format!("SELECT COUNT(*) FROM {t} WHERE status = ?")))
                    .bind(status.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {t}"))
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count as u64)
    }

    // ===== Topics =====

    pub async fn record_topics(&self, application_id: &str, topics: &[String]) -> Result<()> {
        if topics.is_empty() {
            return Ok(());
        }

        let sql = self.sql(&format!(
            "INSERT INTO {t} (application_id, topic0, first_seen) VALUES (?, ?, ?) \
             ON CONFLICT(application_id, topic0) DO NOTHING",
            t = self.table("application_topics")
        ));
        let ts = now();

        let mut tx = self.pool.begin().await?;
        for topic in topics {
            sqlx::query(&sql)
                .bind(application_id)
                .bind(topic)
                .bind(ts)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    pub async fn application_topics(&self, application_id: &str) -> Result<Vec<String>> {
        let sql = self.sql(&format!(
            "SELECT topic0 FROM {t} WHERE application_id = ? ORDER BY topic0",
            t = self.table("application_topics")
        ));
        let topics: Vec<String> = sqlx::query_scalar(&sql)
            .bind(application_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(topics)
    }

    // ===== Activity snapshots =====

    /// Writes the snapshot for its `(application_id, day)`; last writer wins.
    pub async fn upsert_snapshot(&self, snapshot: &ActivitySnapshot) -> Result<()> {
        let sql = self.sql(&format!(
            "INSERT INTO {t} ({SNAPSHOT_COLUMNS}, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(application_id, day) DO UPDATE SET \
             tx_count = excluded.tx_count, user_count = excluded.user_count, \
             event_count = excluded.event_count, gas_used = excluded.gas_used, \
             updated_at = excluded.updated_at",
            t = self.table("activity_snapshots")
        ));

        sqlx::query(&sql)
            .bind(&snapshot.application_id)
            .bind(snapshot.day)
            .bind(snapshot.tx_count as i64)
            .bind(snapshot.user_count as i64)
            .bind(snapshot.event_count as i64)
            .bind(snapshot.gas_used as i64)
            .bind(now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Snapshots with `day >= since_day`, oldest first.
    pub async fn snapshots_since(
        &self,
        application_id: &str,
        since_day: i64,
    ) -> Result<Vec<ActivitySnapshot>> {
        let sql = self.sql(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM {t} WHERE application_id = ? AND day >= ? ORDER BY day",
            t = self.table("activity_snapshots")
        ));
        let rows = sqlx::query(&sql)
            .bind(application_id)
            .bind(since_day)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    pub async fn first_snapshot_day(&self, application_id: &str) -> Result<Option<i64>> {
        let sql = self.sql(&format!(
            "SELECT MIN(day) FROM {t} WHERE application_id = ?",
            t = self.table("activity_snapshots")
        ));
        let day: Option<i64> = sqlx::query_scalar(&sql)
            .bind(application_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(day)
    }

    /// Deletes snapshots older than `before_day`; returns rows removed.
    pub async fn delete_snapshots_before(&self, before_day: i64) -> Result<u64> {
        let sql = self.sql(&format!(
            "DELETE FROM {t} WHERE day < ?",
            t = self.table("activity_snapshots")
        ));
        let result = sqlx::query(&sql)
            .bind(before_day)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Applications ranked by transactions since `since_day`.
    pub async fn top_by_transactions(
        &self,
        since_day: i64,
        limit: u32,
    ) -> Result<Vec<ActivitySnapshot>> {
        let sql = self.sql(&format!(
            "SELECT application_id, MAX(day) AS day, \
             CAST(SUM(tx_count) AS BIGINT) AS tx_count, \
             CAST(SUM(user_count) AS BIGINT) AS user_count, \
             CAST(SUM(event_count) AS BIGINT) AS event_count, \
             CAST(SUM(gas_used) AS BIGINT) AS gas_used \
             FROM {t} WHERE day >= ? GROUP BY application_id \
             ORDER BY tx_count DESC, application_id LIMIT ?",
            t = self.table("activity_snapshots")
        ));
        let rows = sqlx::query(&sql)
            .bind(since_day)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    /// Total `(tx_count, user_count)` recorded for `day` across applications.
    pub async fn day_totals(&self, day: i64) -> Result<(u64, u64)> {
        let sql = self.sql(&format!(
            "SELECT CAST(COALESCE(SUM(tx_count), 0) AS BIGINT), \
             CAST(COALESCE(SUM(user_count), 0) AS BIGINT) FROM {t} WHERE day = ?",
            t = self.table("activity_snapshots")
        ));
        let row = sqlx::query(&sql).bind(day).fetch_one(&self.pool).await?;
        let txs: i64 = row.try_get(0)?;
        let users: i64 = row.try_get(1)?;
        Ok((txs as u64, users as u64))
    }

    // ===== Scan cursor =====

    pub async fn get_cursor(&self) -> Result<Option<u64>> {
        let block: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT last_scanned_block FROM {t} WHERE id = 'main'",
            t = self.table("scan_cursor")
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(block.map(|b| b as u64))
    }

    /// Moves the cursor to `block` unless it is already further.
    pub async fn advance_cursor(&self, block: u64) -> Result<()> {
        let t = self.table("scan_cursor");
        let greatest = match self.backend {
            DbBackend::Sqlite => format!("MAX({t}.last_scanned_block, excluded.last_scanned_block)"),
            DbBackend::Postgres => {
                format!("GREATEST({t}.last_scanned_block, EXCLUDED.last_scanned_block)")
            }
        };
        let sql = self.sql(&format!(
            "INSERT INTO {t} (id, last_scanned_block, updated_at) VALUES ('main', ?, ?) \
             ON CONFLICT(id) DO UPDATE SET last_scanned_block = {greatest}, \
             updated_at = excluded.updated_at"
        ));

        sqlx::query(&sql)
            .bind(block as i64)
            .bind(now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ===== Stats =====

    /// Get engine statistics as a JSON-friendly struct
    pub async fn get_stats(&self) -> Result<EngineStats> {
        let today = scout_common::today_start();
        let (today_tx_count, today_user_count) = self.day_totals(today).await?;

        Ok(EngineStats {
            total_applications: self.count_applications(None).await?,
            total_contracts: self.count_contracts().await?,
            active_applications: self.count_applications(Some(ApplicationStatus::Active)).await?,
            dormant_applications: self
                .count_applications(Some(ApplicationStatus::Dormant))
                .await?,
            inactive_applications: self
                .count_applications(Some(ApplicationStatus::Inactive))
                .await?,
            today_tx_count,
            today_user_count,
            last_scanned_block: self.get_cursor().await?,
        })
    }
}

/// Engine statistics
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EngineStats {
    pub total_applications: u64,
    pub total_contracts: u64,
    pub active_applications: u64,
    pub dormant_applications: u64,
    pub inactive_applications: u64,
    pub today_tx_count: u64,
    pub today_user_count: u64,
    pub last_scanned_block: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x2222222222222222222222222222222222222222";

    async fn db() -> EngineDb {
        EngineDb::new(EngineDbConfig::in_memory()).await.unwrap()
    }

    fn new_contract(address: &str) -> NewContract {
        NewContract {
            address: address.to_string(),
            creator_address: Some("0x1111111111111111111111111111111111111111".to_string()),
            creator_confidence: Confidence::Exact,
            deployment_block: 42,
            deployment_time: Some(1_700_000_042),
        }
    }

    fn app(id: &str, key: &str) -> Application {
        Application {
            id: id.to_string(),
            group_key: key.to_string(),
            name: "DEX 0x1111...1111".to_string(),
            category: Category::Dex,
            category_confidence: 1.0,
            status: ApplicationStatus::Inactive,
            quality_score: 0.0,
            activity_score: 0.0,
            diversity_score: 0.0,
            age_score: 0.0,
            grouping_confidence: Confidence::Exact,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[tokio::test]
    async fn test_contract_insert_is_idempotent() {
        let db = db().await;

        assert!(db.insert_contract_if_absent(&new_contract(ADDR)).await.unwrap());
        assert!(!db.insert_contract_if_absent(&new_contract(ADDR)).await.unwrap());
        assert_eq!(db.count_contracts().await.unwrap(), 1);

        let stored = db.get_contract(ADDR).await.unwrap().unwrap();
        assert_eq!(stored.contract_type, ContractType::Unknown);
        assert_eq!(stored.deployment_block, 42);
        assert_eq!(stored.creator_confidence, Confidence::Exact);

        db.set_contract_type(ADDR, ContractType::Erc20).await.unwrap();
        let stored = db.get_contract(ADDR).await.unwrap().unwrap();
        assert_eq!(stored.contract_type, ContractType::Erc20);

        let known = db
            .known_contracts(&[ADDR.to_string(), "0xdead".to_string()])
            .await
            .unwrap();
        assert_eq!(known.len(), 1);
    }

    #[tokio::test]
    async fn test_application_unique_group_key() {
        let db = db().await;

        assert!(db.insert_application_if_absent(&app("app_1", "key")).await.unwrap());
        assert!(!db.insert_application_if_absent(&app("app_2", "key")).await.unwrap());

        let stored = db.get_application_by_key("key").await.unwrap().unwrap();
        assert_eq!(stored.id, "app_1");

        db.insert_contract_if_absent(&new_contract(ADDR)).await.unwrap();
        db.assign_contract(ADDR, "app_1").await.unwrap();
        let contracts = db.contracts_for_application("app_1").await.unwrap();
        assert_eq!(contracts.len(), 1);

        let listed = db
            .list_applications(&ApplicationQuery {
                category: Some(Category::Dex),
                limit: 10,
                ..ApplicationQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        let none = db
            .list_applications(&ApplicationQuery {
                status: Some(ApplicationStatus::Active),
                limit: 10,
                ..ApplicationQuery::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_upsert_last_writer_wins() {
        let db = db().await;
        let mut snapshot = ActivitySnapshot {
            application_id: "app_1".to_string(),
            day: 86_400 * 10,
            tx_count: 5,
            user_count: 2,
            event_count: 7,
            gas_used: 100,
        };

        db.upsert_snapshot(&snapshot).await.unwrap();
        snapshot.tx_count = 9;
        db.upsert_snapshot(&snapshot).await.unwrap();

        let rows = db.snapshots_since("app_1", 0).await.unwrap();
        assert_eq!(rows, vec![snapshot]);
        assert_eq!(db.first_snapshot_day("app_1").await.unwrap(), Some(86_400 * 10));
        assert_eq!(db.first_snapshot_day("app_2").await.unwrap(), None);

        assert_eq!(db.delete_snapshots_before(86_400 * 11).await.unwrap(), 1);
        assert!(db.snapshots_since("app_1", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cursor_is_monotonic() {
        let db = db().await;
        assert_eq!(db.get_cursor().await.unwrap(), None);

        db.advance_cursor(100).await.unwrap();
        db.advance_cursor(50).await.unwrap();
        assert_eq!(db.get_cursor().await.unwrap(), Some(100));

        db.advance_cursor(150).await.unwrap();
        assert_eq!(db.get_cursor().await.unwrap(), Some(150));
    }

    #[tokio::test]
    async fn test_topics_deduplicated() {
        let db = db().await;
        let topics = vec!["0xaa".to_string(), "0xbb".to_string()];
        db.record_topics("app_1", &topics).await.unwrap();
        db.record_topics("app_1", &topics[..1]).await.unwrap();
        assert_eq!(db.application_topics("app_1").await.unwrap(), topics);
    }

    #[tokio::test]
    async fn test_file_backed_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.db");
        let config = EngineDbConfig {
            path: path.to_string_lossy().to_string(),
        };

        {
            let db = EngineDb::new(config.clone()).await.unwrap();
            db.advance_cursor(7).await.unwrap();
        }

        let db = EngineDb::new(config).await.unwrap();
        assert_eq!(db.get_cursor().await.unwrap(), Some(7));
    }
}
