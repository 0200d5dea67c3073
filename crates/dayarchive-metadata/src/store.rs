//! SQLite Archive Store Implementation
//!
//! `SqliteArchiveStore` implements both [`StatementStore`] and [`DayArchiveStore`]
//! over one SQLite database.
//!
//! ## Usage
//!
//! ### File-Based (Production)
//! ```ignore
//! let store = SqliteArchiveStore::new("archive.db").await?;
//! ```
//!
//! ### In-Memory (Testing)
//! ```ignore
//! let store = SqliteArchiveStore::new_in_memory().await?;
//! ```
//!
//! ## Implementation Details
//!
//! ### Timestamps
//! Statement timestamps are stored as `YYYY-MM-DD HH:MM:SS` text. Equal-width
//! text sorts like time, so range predicates use the `created_at` index, and the
//! boundary probes compare whole seconds with `IN (...)`.
//!
//! ### Claims
//! `claim_day` opens its transaction with `BEGIN IMMEDIATE`, inserts the claim,
//! checks for existing rows and inserts every pending row. A concurrent claim
//! on another connection waits for the write lock and then fails on the
//! claim's primary key, so the same day resolves to exactly one winner and the
//! others see `DayAlreadyArchived`.
//!
//! ### In-Memory Pools
//! An in-memory database lives and dies with its connection, so the in-memory
//! pool holds a single connection that never expires.

use crate::{
    error::{MetadataError, Result},
    types::*,
    DayArchiveStore, StatementStore,
};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use dayarchive_core::{Scope, Statement, StatementAttributes, Variant};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// How long a connection waits for another connection's write lock.
const CLAIM_BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const SQL_DATE: &str = "%Y-%m-%d";
const SQL_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

const ARCHIVE_COLUMNS: &str = "a.id, a.date, a.platform_id, p.name AS platform_name, a.category, \
     a.decision_ground, a.variant, a.slug, a.total, a.start_id, a.end_id, a.raw_path, \
     a.archive_path, a.checksum_path, a.archive_size, a.checksum, a.completed_at, \
     a.created_at, a.updated_at";

const STATEMENT_COLUMNS: &str = "s.id, s.uuid, s.platform_id, p.name AS platform_name, s.puid, \
     s.created_at, s.attributes";

/// SQLite-backed record store and day archive store.
pub struct SqliteArchiveStore {
    pool: SqlitePool,
}

impl SqliteArchiveStore {
    /// Open (or create) a database file and run migrations.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", path.as_ref().display()))?
                .create_if_missing(true)
                .busy_timeout(CLAIM_BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create an in-memory database (for testing)
    pub async fn new_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// A claim that lost the write lock to another claim of the same day is a
    /// conflict, not a database failure.
    async fn claim_failure(&self, date: NaiveDate, e: sqlx::Error) -> MetadataError {
        if is_busy(&e) {
            match self.is_day_claimed(date).await {
                Ok(true) => return MetadataError::DayAlreadyArchived(date),
                Ok(false) => {}
                Err(check) => {
                    tracing::warn!(date = %date, error = %check, "Failed to re-check day claim");
                }
            }
        }
        e.into()
    }

    async fn fetch_archives(&self, filter: &str, bind: Option<&str>) -> Result<Vec<DayArchive>> {
        let sql = format!(
            "SELECT {} FROM day_archives a LEFT JOIN platforms p ON p.id = a.platform_id {}",
            ARCHIVE_COLUMNS, filter
        );
        let mut query = sqlx::query(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(archive_from_row).collect()
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(SQL_DATE).to_string()
}

fn is_busy(e: &sqlx::Error) -> bool {
    match e.as_database_error() {
        // SQLITE_BUSY and its extended codes, SQLITE_LOCKED
        Some(db) => {
            matches!(db.code().as_deref(), Some("5" | "6" | "261" | "517"))
                || db.message().contains("database is locked")
        }
        None => false,
    }
}

/// Claim rows of one day inside an open write transaction.
async fn insert_claim(
    conn: &mut SqliteConnection,
    date: NaiveDate,
    archives: Vec<NewDayArchive>,
) -> Result<Vec<DayArchive>> {
    let day = format_date(date);
    let now = SqliteArchiveStore::now_ms();

    let result = sqlx::query("INSERT INTO day_archive_claims (date, claimed_at) VALUES (?, ?)")
        .bind(&day)
        .bind(now)
        .execute(&mut *conn)
        .await;
    if let Err(e) = result {
        if e.to_string().contains("UNIQUE constraint failed") {
            return Err(MetadataError::DayAlreadyArchived(date));
        }
        return Err(e.into());
    }

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM day_archives WHERE date = ?")
        .bind(&day)
        .fetch_one(&mut *conn)
        .await?;
    if existing > 0 {
        return Err(MetadataError::DayAlreadyArchived(date));
    }

    let mut created = Vec::with_capacity(archives.len());
    for archive in archives {
        let id = sqlx::query(
            r#"
            INSERT INTO day_archives (date, platform_id, category, decision_ground, variant, slug,
                                      total, start_id, end_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
            "#,
        )
        .bind(&day)
        .bind(archive.scope.platform_id())
        .bind(archive.scope.category())
        .bind(archive.scope.decision_ground())
        .bind(archive.variant.as_str())
        .bind(&archive.slug)
        .bind(archive.range.first_id)
        .bind(archive.range.last_id)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        created.push(DayArchive {
            id,
            date,
            scope: archive.scope,
            variant: archive.variant,
            slug: archive.slug,
            total: 0,
            range: archive.range,
            raw_path: None,
            archive_path: None,
            checksum_path: None,
            archive_size: None,
            checksum: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        });
    }

    Ok(created)
}

fn format_datetime(at: NaiveDateTime) -> String {
    at.format(SQL_DATETIME).to_string()
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, SQL_DATE)
        .map_err(|e| MetadataError::InvalidRow(format!("bad date '{}': {}", value, e)))
}

fn parse_datetime(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, SQL_DATETIME)
        .map_err(|e| MetadataError::InvalidRow(format!("bad timestamp '{}': {}", value, e)))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn archive_from_row(r: &SqliteRow) -> Result<DayArchive> {
    let date: String = r.get("date");
    let platform = r
        .get::<Option<i64>, _>("platform_id")
        .map(|id| (id, r.get::<Option<String>, _>("platform_name").unwrap_or_default()));
    let scope = Scope::from_columns(platform, r.get("category"), r.get("decision_ground"))?;
    let variant: String = r.get("variant");

    Ok(DayArchive {
        id: r.get("id"),
        date: parse_date(&date)?,
        scope,
        variant: Variant::from_str(&variant)?,
        slug: r.get("slug"),
        total: r.get::<i64, _>("total") as u64,
        range: DayRange::new(r.get("start_id"), r.get("end_id")),
        raw_path: r.get("raw_path"),
        archive_path: r.get("archive_path"),
        checksum_path: r.get("checksum_path"),
        archive_size: r.get::<Option<i64>, _>("archive_size").map(|s| s as u64),
        checksum: r.get("checksum"),
        completed_at: r.get("completed_at"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn statement_from_row(r: &SqliteRow) -> Result<Statement> {
    let created_at: String = r.get("created_at");
    let attributes: String = r.get("attributes");
    let attributes: StatementAttributes = serde_json::from_str(&attributes)?;

    Ok(Statement {
        id: r.get("id"),
        uuid: r.get("uuid"),
        platform_id: r.get("platform_id"),
        platform_name: r.get("platform_name"),
        puid: r.get("puid"),
        created_at: parse_datetime(&created_at)?,
        attributes,
    })
}

#[async_trait]
impl StatementStore for SqliteArchiveStore {
    async fn create_platform(&self, name: &str) -> Result<Platform> {
        let uuid = uuid::Uuid::new_v4().to_string();
        let id = sqlx::query("INSERT INTO platforms (name, uuid, created_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(&uuid)
            .bind(Self::now_ms())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(Platform {
            id,
            name: name.to_string(),
            uuid,
        })
    }

    async fn list_platforms(&self) -> Result<Vec<Platform>> {
        let rows = sqlx::query("SELECT id, name, uuid FROM platforms ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| Platform {
                id: r.get("id"),
                name: r.get("name"),
                uuid: r.get("uuid"),
            })
            .collect())
    }

    async fn append_statement(&self, statement: NewStatement) -> Result<Statement> {
        let platform_name: Option<String> =
            sqlx::query_scalar("SELECT name FROM platforms WHERE id = ?")
                .bind(statement.platform_id)
                .fetch_optional(&self.pool)
                .await?;
        let platform_name =
            platform_name.ok_or(MetadataError::PlatformNotFound(statement.platform_id))?;

        let uuid = uuid::Uuid::new_v4().to_string();
        let created_at = format_datetime(statement.created_at);
        let attributes = serde_json::to_string(&statement.attributes)?;

        let id = sqlx::query(
            r#"
            INSERT INTO statements (uuid, platform_id, puid, category, decision_ground, attributes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&uuid)
        .bind(statement.platform_id)
        .bind(&statement.puid)
        .bind(&statement.attributes.category)
        .bind(&statement.attributes.decision_ground)
        .bind(&attributes)
        .bind(&created_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Statement {
            id,
            uuid,
            platform_id: statement.platform_id,
            platform_name,
            puid: statement.puid,
            created_at: parse_datetime(&created_at)?,
            attributes: statement.attributes,
        })
    }

    async fn min_id_at(&self, marks: &[NaiveDateTime]) -> Result<Option<i64>> {
        if marks.is_empty() {
            return Ok(None);
        }
        let sql = format!(
            "SELECT MIN(id) FROM statements WHERE created_at IN ({})",
            placeholders(marks.len())
        );
        let mut query = sqlx::query_scalar::<_, Option<i64>>(&sql);
        for mark in marks {
            query = query.bind(format_datetime(*mark));
        }
        Ok(query.fetch_one(&self.pool).await?)
    }

    async fn max_id_at(&self, marks: &[NaiveDateTime]) -> Result<Option<i64>> {
        if marks.is_empty() {
            return Ok(None);
        }
        let sql = format!(
            "SELECT MAX(id) FROM statements WHERE created_at IN ({})",
            placeholders(marks.len())
        );
        let mut query = sqlx::query_scalar::<_, Option<i64>>(&sql);
        for mark in marks {
            query = query.bind(format_datetime(*mark));
        }
        Ok(query.fetch_one(&self.pool).await?)
    }

    async fn min_id_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> Result<Option<i64>> {
        let id = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MIN(id) FROM statements WHERE created_at >= ? AND created_at <= ?",
        )
        .bind(format_datetime(from))
        .bind(format_datetime(to))
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn max_id_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> Result<Option<i64>> {
        let id = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(id) FROM statements WHERE created_at >= ? AND created_at <= ?",
        )
        .bind(format_datetime(from))
        .bind(format_datetime(to))
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn statements_after(
        &self,
        after_id: i64,
        last_id: i64,
        limit: u32,
    ) -> Result<Vec<Statement>> {
        let sql = format!(
            "SELECT {} FROM statements s JOIN platforms p ON p.id = s.platform_id \
             WHERE s.id > ? AND s.id <= ? ORDER BY s.id LIMIT ?",
            STATEMENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(after_id)
            .bind(last_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(statement_from_row).collect()
    }
}

#[async_trait]
impl DayArchiveStore for SqliteArchiveStore {
    async fn claim_day(
        &self,
        date: NaiveDate,
        archives: Vec<NewDayArchive>,
    ) -> Result<Vec<DayArchive>> {
        let mut conn = self.pool.acquire().await?;

        // Write lock first: a racing claim waits here, then sees this one.
        if let Err(e) = sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await {
            drop(conn);
            return Err(self.claim_failure(date, e).await);
        }

        let result = async {
            let created = insert_claim(&mut conn, date, archives).await?;
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            Ok::<_, MetadataError>(created)
        }
        .await;

        match result {
            Ok(created) => {
                tracing::debug!(date = %date, archives = created.len(), "Claimed day for archiving");
                Ok(created)
            }
            Err(e) => {
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    tracing::warn!(date = %date, error = %rollback, "Failed to roll back day claim");
                    conn.detach();
                }
                Err(e)
            }
        }
    }

    async fn is_day_claimed(&self, date: NaiveDate) -> Result<bool> {
        let day = format_date(date);
        let claimed: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM day_archive_claims WHERE date = ?)
                  + (SELECT COUNT(*) FROM day_archives WHERE date = ?)",
        )
        .bind(&day)
        .bind(&day)
        .fetch_one(&self.pool)
        .await?;
        Ok(claimed > 0)
    }

    async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<DayArchive>> {
        self.fetch_archives("WHERE a.date = ? ORDER BY a.id", Some(&format_date(date)))
            .await
    }

    async fn get_day_archive(&self, id: i64) -> Result<Option<DayArchive>> {
        let sql = format!(
            "SELECT {} FROM day_archives a LEFT JOIN platforms p ON p.id = a.platform_id WHERE a.id = ?",
            ARCHIVE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(archive_from_row).transpose()
    }

    async fn update_raw(&self, id: i64, raw_path: &str, total: u64) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE day_archives SET raw_path = ?, total = ?, updated_at = ? WHERE id = ?",
        )
        .bind(raw_path)
        .bind(total as i64)
        .bind(Self::now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(MetadataError::DayArchiveNotFound(id));
        }
        Ok(())
    }

    async fn mark_complete(&self, id: i64, completion: ArchiveCompletion) -> Result<()> {
        let now = Self::now_ms();
        let rows_affected = sqlx::query(
            r#"
            UPDATE day_archives
            SET archive_path = ?, checksum_path = ?, archive_size = ?, checksum = ?,
                updated_at = ?, completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&completion.archive_path)
        .bind(&completion.checksum_path)
        .bind(completion.archive_size as i64)
        .bind(&completion.checksum)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(MetadataError::DayArchiveNotFound(id));
        }
        Ok(())
    }

    async fn global_list(&self) -> Result<Vec<DayArchive>> {
        self.fetch_archives(
            "WHERE a.platform_id IS NULL AND a.category IS NULL AND a.decision_ground IS NULL \
             AND a.completed_at IS NOT NULL ORDER BY a.date DESC, a.variant ASC",
            None,
        )
        .await
    }

    async fn list_by_slug(&self, slug: &str) -> Result<Vec<DayArchive>> {
        self.fetch_archives(
            "WHERE a.slug = ? AND a.completed_at IS NOT NULL ORDER BY a.date DESC, a.variant ASC",
            Some(slug),
        )
        .await
    }

    async fn get_day_archive_by_date(&self, date: NaiveDate) -> Result<Option<DayArchive>> {
        let archives = self
            .fetch_archives(
                "WHERE a.date = ? AND a.platform_id IS NULL AND a.category IS NULL \
                 AND a.decision_ground IS NULL AND a.variant = 'full' ORDER BY a.id LIMIT 1",
                Some(&format_date(date)),
            )
            .await?;
        Ok(archives.into_iter().next())
    }

    async fn discard_day(&self, date: NaiveDate) -> Result<u64> {
        let day = format_date(date);
        let mut tx = self.pool.begin().await?;

        let completed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM day_archives WHERE date = ? AND completed_at IS NOT NULL",
        )
        .bind(&day)
        .fetch_one(&mut *tx)
        .await?;
        if completed > 0 {
            return Err(MetadataError::CompletedArchivesExist(date));
        }

        let removed = sqlx::query("DELETE FROM day_archives WHERE date = ?")
            .bind(&day)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM day_archive_claims WHERE date = ?")
            .bind(&day)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::warn!(date = %date, removed, "Discarded incomplete day archives");

        Ok(removed)
    }
}
