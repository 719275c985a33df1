use crate::error::{is_unique_violation, map_sqlx_error};
use async_trait::async_trait;
use burrow_core::error::{Result, StorageError};
use burrow_core::{
    DeleteRequest, DeleteSink, ReadRepository, Repository, ShortCode, UrlRecord, UserId,
};
use sqlx::migrate::Migrator;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{Executor, MySql, MySqlPool, QueryBuilder, Row};
use tracing::{debug, info};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Width of the `original` column, in characters.
pub const MAX_ORIGINAL_CHARS: usize = 768;

const INSERT_URL: &str = r#"
    INSERT INTO short_urls (original, short, user_id, is_deleted)
    VALUES (?, ?, ?, FALSE)
"#;

const SELECT_SHORT_BY_ORIGINAL: &str = r#"
    SELECT short
    FROM short_urls
    WHERE original = ?
    LIMIT 1
"#;

/// MySQL implementation of the repository contract.
///
/// Idempotent creation relies on the unique key over `original`: a colliding
/// insert is followed by a lookup of the existing code. Deletes are soft and
/// flip `is_deleted`; rows are never removed.
#[derive(Debug, Clone)]
pub struct MySqlRepository {
    pool: MySqlPool,
}

impl MySqlRepository {
    /// Opens a pool, checks the server is reachable and applies migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Unavailable(format!("connect: {e}")))?;

        Self::from_pool(pool).await
    }

    /// Wraps an existing pool and applies migrations before returning.
    ///
    /// On migration failure the pool is closed and no repository is returned.
    pub async fn from_pool(pool: MySqlPool) -> Result<Self> {
        if let Err(err) = MIGRATOR.run(&pool).await {
            pool.close().await;
            return Err(StorageError::Unavailable(format!("run migrations: {err}")));
        }

        info!("mysql repository ready");
        Ok(Self { pool })
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

async fn find_short_by_original<'e, E>(executor: E, original: &str) -> Result<Option<ShortCode>>
where
    E: Executor<'e, Database = MySql>,
{
    let row = sqlx::query(SELECT_SHORT_BY_ORIGINAL)
        .bind(original)
        .fetch_optional(executor)
        .await
        .map_err(map_sqlx_error)?;

    row.map(|row| {
        row.try_get::<String, _>("short")
            .map(ShortCode::new_unchecked)
            .map_err(map_sqlx_error)
    })
    .transpose()
}

fn check_original(record: &UrlRecord) -> Result<()> {
    let chars = record.original.chars().count();
    if chars > MAX_ORIGINAL_CHARS {
        return Err(StorageError::InvalidData(format!(
            "original url is {chars} characters, at most {MAX_ORIGINAL_CHARS} are stored"
        )));
    }
    Ok(())
}

fn row_to_record(row: &sqlx::mysql::MySqlRow) -> Result<UrlRecord> {
    Ok(UrlRecord {
        owner: UserId::new(row.try_get::<String, _>("user_id").map_err(map_sqlx_error)?),
        original: row.try_get("original").map_err(map_sqlx_error)?,
        code: ShortCode::new_unchecked(row.try_get::<String, _>("short").map_err(map_sqlx_error)?),
        deleted: row.try_get("is_deleted").map_err(map_sqlx_error)?,
    })
}

#[async_trait]
impl ReadRepository for MySqlRepository {
    async fn resolve(&self, code: &ShortCode) -> Result<String> {
        let row = sqlx::query(
            r#"
            SELECT original, is_deleted
            FROM short_urls
            WHERE short = ?
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e).context("resolve"))?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(code.clone()));
        };

        let is_deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;
        if is_deleted {
            return Err(StorageError::Deleted(code.clone()));
        }

        row.try_get("original").map_err(map_sqlx_error)
    }

    async fn list_by_owner(&self, owner: &UserId) -> Result<Vec<UrlRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT original, short, user_id, is_deleted
            FROM short_urls
            WHERE user_id = ?
            ORDER BY id
            "#,
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e).context("list by owner"))?;

        if rows.is_empty() {
            return Err(StorageError::Empty(owner.clone()));
        }

        rows.iter().map(row_to_record).collect()
    }
}

#[async_trait]
impl DeleteSink for MySqlRepository {
    /// Tombstones the whole batch with a single `UPDATE ... JOIN` over a
    /// derived table of `(user_id, short)` pairs.
    async fn apply_deletes(&self, requests: &[DeleteRequest]) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<MySql>::new("UPDATE short_urls AS s JOIN (");
        for (i, request) in requests.iter().enumerate() {
            if i > 0 {
                builder.push(" UNION ALL ");
            }
            builder
                .push("SELECT ")
                .push_bind(request.owner.as_str())
                .push(" AS user_id, ")
                .push_bind(request.code.as_str())
                .push(" AS short");
        }
        builder.push(
            ") AS tmp ON s.user_id = tmp.user_id AND s.short = tmp.short SET s.is_deleted = TRUE",
        );

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e).context("batch delete"))?;

        debug!(
            requested = requests.len(),
            flipped = result.rows_affected(),
            "applied delete batch"
        );
        Ok(())
    }
}

#[async_trait]
impl Repository for MySqlRepository {
    async fn save_one(&self, record: UrlRecord) -> Result<ShortCode> {
        check_original(&record)?;

        let result = sqlx::query(INSERT_URL)
            .bind(&record.original)
            .bind(record.code.as_str())
            .bind(record.owner.as_str())
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(record.code),
            Err(err) if is_unique_violation(&err) => {
                match find_short_by_original(&self.pool, &record.original).await? {
                    Some(existing) => Err(StorageError::AlreadyExists(existing)),
                    None => Err(StorageError::CodeTaken(record.code)),
                }
            }
            Err(err) => Err(map_sqlx_error(err).context("insert url")),
        }
    }

    async fn save_many(&self, records: Vec<UrlRecord>) -> Result<Vec<UrlRecord>> {
        records.iter().try_for_each(check_original)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Io(format!("begin transaction: {e}")))?;

        for record in &records {
            let result = sqlx::query(INSERT_URL)
                .bind(&record.original)
                .bind(record.code.as_str())
                .bind(record.owner.as_str())
                .execute(&mut *tx)
                .await;

            let Err(err) = result else {
                continue;
            };

            // Dropping `tx` rolls the whole batch back.
            if !is_unique_violation(&err) {
                return Err(StorageError::Io(format!(
                    "insert original {} as {}: {err}",
                    record.original, record.code
                )));
            }
            return match find_short_by_original(&mut *tx, &record.original).await? {
                Some(existing) => Err(StorageError::Io(format!(
                    "original {} already shortened as {existing}, batch rolled back",
                    record.original
                ))),
                None => Err(StorageError::CodeTaken(record.code.clone())),
            };
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Io(format!("commit transaction: {e}")))?;

        Ok(records
            .into_iter()
            .map(|mut record| {
                record.deleted = false;
                record
            })
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| StorageError::Unavailable(format!("ping: {e}")))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
