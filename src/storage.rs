use crate::{
    error::{LearningError, LearningResult},
    models::{FeaturePattern, InsightData, LearningInsight, ModelPerformance, NewInsight},
};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    Row, Sqlite, SqliteConnection, SqliteExecutor, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const PATTERN_COLUMNS: &str = r#"
    category, total_attempts, successful_attempts, avg_attempts_to_success,
    best_model_id, best_model_success_rate, avg_input_tokens, avg_output_tokens,
    avg_cost, avg_duration_ms, avg_steps, estimated_difficulty, created_at, updated_at
"#;

const PERFORMANCE_COLUMNS: &str = r#"
    model_id, category, total_attempts, successful_attempts, success_rate,
    total_input_tokens, total_output_tokens, total_cost, cost_per_success,
    avg_duration_ms, updated_at
"#;

const INSIGHT_COLUMNS: &str = r#"
    id, category, title, description, confidence, data, created_at, applied
"#;

/// SQLite-backed attempt store holding category patterns, model performance
/// rollups and generated insights.
#[derive(Clone)]
pub struct Storage {
    pool: Arc<SqlitePool>,
    path: PathBuf,
}

impl Storage {
    pub async fn connect(path: impl AsRef<Path>) -> LearningResult<Self> {
        Self::connect_with(path, DEFAULT_MAX_CONNECTIONS, DEFAULT_BUSY_TIMEOUT).await
    }

    pub async fn connect_with(
        path: impl AsRef<Path>,
        max_connections: u32,
        busy_timeout: Duration,
    ) -> LearningResult<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let options = SqliteConnectOptions::new()
            .filename(&path_buf)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        tracing::debug!(path = %path_buf.display(), "opened learning database");
        Ok(Self {
            pool: Arc::new(pool),
            path: path_buf,
        })
    }

    pub async fn ensure_schema(&self) -> LearningResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feature_patterns (
                category TEXT PRIMARY KEY NOT NULL,
                total_attempts INTEGER NOT NULL DEFAULT 0,
                successful_attempts INTEGER NOT NULL DEFAULT 0,
                avg_attempts_to_success REAL NOT NULL DEFAULT 1.0,
                best_model_id TEXT,
                best_model_success_rate REAL NOT NULL DEFAULT 0.0,
                avg_input_tokens REAL NOT NULL DEFAULT 0.0,
                avg_output_tokens REAL NOT NULL DEFAULT 0.0,
                avg_cost REAL NOT NULL DEFAULT 0.0,
                avg_duration_ms REAL NOT NULL DEFAULT 0.0,
                avg_steps REAL NOT NULL DEFAULT 1.0,
                estimated_difficulty REAL NOT NULL DEFAULT 0.5,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS model_performance (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                model_id TEXT NOT NULL,
                category TEXT,
                total_attempts INTEGER NOT NULL DEFAULT 0,
                successful_attempts INTEGER NOT NULL DEFAULT 0,
                success_rate REAL NOT NULL DEFAULT 0.0,
                total_input_tokens INTEGER NOT NULL DEFAULT 0,
                total_output_tokens INTEGER NOT NULL DEFAULT 0,
                total_cost REAL NOT NULL DEFAULT 0.0,
                cost_per_success REAL NOT NULL DEFAULT 0.0,
                avg_duration_ms REAL NOT NULL DEFAULT 0.0,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&*self.pool)
        .await?;

        // NULL category is the cross-category rollup; one row per model.
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_model_performance_key
            ON model_performance(model_id, COALESCE(category, ''));
            "#,
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_model_performance_category
            ON model_performance(category);
            "#,
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS learning_insights (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                insight_type TEXT NOT NULL,
                category TEXT,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                confidence REAL NOT NULL DEFAULT 0.5,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                applied INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_learning_insights_created
            ON learning_insights(created_at);
            "#,
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_learning_insights_dedup
            ON learning_insights(insight_type, category, created_at);
            "#,
        )
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts a deferred transaction. Dropping it without commit rolls back.
    pub async fn begin(&self) -> LearningResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Starts a transaction holding the write lock from its first statement,
    /// so reads inside it never need a lock upgrade. Waits on `busy_timeout`
    /// while another writer is active.
    pub async fn begin_write(&self) -> LearningResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    pub async fn feature_pattern(&self, category: &str) -> LearningResult<Option<FeaturePattern>> {
        select_pattern(&*self.pool, category).await
    }

    /// All patterns ordered by category.
    pub async fn feature_patterns(&self) -> LearningResult<Vec<FeaturePattern>> {
        select_patterns(&*self.pool, 0).await
    }

    /// Performance rows for `category`, or the overall rollup when `None`,
    /// best success rate first.
    pub async fn model_performances(
        &self,
        category: Option<&str>,
    ) -> LearningResult<Vec<ModelPerformance>> {
        let sql = format!(
            "SELECT {PERFORMANCE_COLUMNS} FROM model_performance
             WHERE category IS ?
             ORDER BY success_rate DESC, model_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(category)
            .fetch_all(&*self.pool)
            .await?;
        rows.iter().map(performance_from_row).collect()
    }

    /// Most recent insights first.
    pub async fn recent_insights(&self, limit: usize) -> LearningResult<Vec<LearningInsight>> {
        let sql = format!(
            "SELECT {INSIGHT_COLUMNS} FROM learning_insights
             ORDER BY created_at DESC, id DESC
             LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&*self.pool)
            .await?;
        rows.iter().map(insight_from_row).collect()
    }

    /// Sets the `applied` flag. Returns false when no insight has that id.
    pub async fn mark_insight_applied(&self, id: i64) -> LearningResult<bool> {
        let result = sqlx::query("UPDATE learning_insights SET applied = 1 WHERE id = ?")
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub(crate) async fn select_pattern<'e>(
    executor: impl SqliteExecutor<'e>,
    category: &str,
) -> LearningResult<Option<FeaturePattern>> {
    let sql = format!("SELECT {PATTERN_COLUMNS} FROM feature_patterns WHERE category = ?");
    let row = sqlx::query(&sql)
        .bind(category)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(pattern_from_row).transpose()
}

pub(crate) async fn select_patterns<'e>(
    executor: impl SqliteExecutor<'e>,
    min_attempts: u64,
) -> LearningResult<Vec<FeaturePattern>> {
    let sql = format!(
        "SELECT {PATTERN_COLUMNS} FROM feature_patterns
         WHERE total_attempts >= ?
         ORDER BY category ASC"
    );
    let rows = sqlx::query(&sql)
        .bind(to_db(min_attempts))
        .fetch_all(executor)
        .await?;
    rows.iter().map(pattern_from_row).collect()
}

/// Per-category rows (overall rollups excluded) with enough samples, grouped
/// by category in order.
/// Per-category rows for `category` with at least `min_attempts` samples.
pub(crate) async fn select_qualified_performances<'e>(
    executor: impl SqliteExecutor<'e>,
    category: &str,
    min_attempts: u64,
) -> LearningResult<Vec<ModelPerformance>> {
    let sql = format!(
        "SELECT {PERFORMANCE_COLUMNS} FROM model_performance
         WHERE category = ? AND total_attempts >= ?
         ORDER BY model_id ASC"
    );
    let rows = sqlx::query(&sql)
        .bind(category)
        .bind(to_db(min_attempts))
        .fetch_all(executor)
        .await?;
    rows.iter().map(performance_from_row).collect()
}

pub(crate) async fn select_category_performances<'e>(
    executor: impl SqliteExecutor<'e>,
    min_attempts: u64,
) -> LearningResult<Vec<ModelPerformance>> {
    let sql = format!(
        "SELECT {PERFORMANCE_COLUMNS} FROM model_performance
         WHERE category IS NOT NULL AND total_attempts >= ?
         ORDER BY category ASC, model_id ASC"
    );
    let rows = sqlx::query(&sql)
        .bind(to_db(min_attempts))
        .fetch_all(executor)
        .await?;
    rows.iter().map(performance_from_row).collect()
}

/// Loads the pattern row for `category`, inserting a fresh one first if
/// absent. The insert is issued even when the row exists so that the calling
/// transaction holds the write lock before it reads.
pub(crate) async fn load_or_create_pattern(
    conn: &mut SqliteConnection,
    category: &str,
    now: DateTime<Utc>,
) -> LearningResult<FeaturePattern> {
    let fresh = FeaturePattern::new(category, now);
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO feature_patterns (
            category, avg_attempts_to_success, avg_steps, estimated_difficulty, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?);
        "#,
    )
    .bind(category)
    .bind(fresh.avg_attempts_to_success)
    .bind(fresh.avg_steps)
    .bind(fresh.estimated_difficulty)
    .bind(format_timestamp(now))
    .bind(format_timestamp(now))
    .execute(&mut *conn)
    .await?;

    select_pattern(&mut *conn, category)
        .await?
        .ok_or(LearningError::Storage(sqlx::Error::RowNotFound))
}

pub(crate) async fn save_pattern(
    conn: &mut SqliteConnection,
    pattern: &FeaturePattern,
) -> LearningResult<()> {
    sqlx::query(
        r#"
        UPDATE feature_patterns SET
            total_attempts = ?,
            successful_attempts = ?,
            avg_attempts_to_success = ?,
            best_model_id = ?,
            best_model_success_rate = ?,
            avg_input_tokens = ?,
            avg_output_tokens = ?,
            avg_cost = ?,
            avg_duration_ms = ?,
            avg_steps = ?,
            estimated_difficulty = ?,
            updated_at = ?
        WHERE category = ?;
        "#,
    )
    .bind(to_db(pattern.total_attempts))
    .bind(to_db(pattern.successful_attempts))
    .bind(pattern.avg_attempts_to_success)
    .bind(pattern.best_model_id.as_deref())
    .bind(pattern.best_model_success_rate)
    .bind(pattern.avg_input_tokens)
    .bind(pattern.avg_output_tokens)
    .bind(pattern.avg_cost)
    .bind(pattern.avg_duration_ms)
    .bind(pattern.avg_steps)
    .bind(pattern.estimated_difficulty)
    .bind(format_timestamp(pattern.updated_at))
    .bind(&pattern.category)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn load_or_create_performance(
    conn: &mut SqliteConnection,
    model_id: &str,
    category: Option<&str>,
    now: DateTime<Utc>,
) -> LearningResult<ModelPerformance> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO model_performance (model_id, category, updated_at)
        VALUES (?, ?, ?);
        "#,
    )
    .bind(model_id)
    .bind(category)
    .bind(format_timestamp(now))
    .execute(&mut *conn)
    .await?;

    let sql = format!(
        "SELECT {PERFORMANCE_COLUMNS} FROM model_performance
         WHERE model_id = ? AND category IS ?"
    );
    let row = sqlx::query(&sql)
        .bind(model_id)
        .bind(category)
        .fetch_one(&mut *conn)
        .await?;
    performance_from_row(&row)
}

pub(crate) async fn save_performance(
    conn: &mut SqliteConnection,
    performance: &ModelPerformance,
) -> LearningResult<()> {
    sqlx::query(
        r#"
        UPDATE model_performance SET
            total_attempts = ?,
            successful_attempts = ?,
            success_rate = ?,
            total_input_tokens = ?,
            total_output_tokens = ?,
            total_cost = ?,
            cost_per_success = ?,
            avg_duration_ms = ?,
            updated_at = ?
        WHERE model_id = ? AND category IS ?;
        "#,
    )
    .bind(to_db(performance.total_attempts))
    .bind(to_db(performance.successful_attempts))
    .bind(performance.success_rate)
    .bind(to_db(performance.total_input_tokens))
    .bind(to_db(performance.total_output_tokens))
    .bind(performance.total_cost)
    .bind(performance.cost_per_success)
    .bind(performance.avg_duration_ms)
    .bind(format_timestamp(performance.updated_at))
    .bind(&performance.model_id)
    .bind(performance.category.as_deref())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Inserts `insight` unless one with the same type and category was created
/// after `not_since`. Check and insert are a single statement. Returns the new
/// row id, or `None` when a recent duplicate exists.
pub(crate) async fn insert_insight_unless_recent(
    conn: &mut SqliteConnection,
    insight: &NewInsight,
    created_at: DateTime<Utc>,
    not_since: DateTime<Utc>,
) -> LearningResult<Option<i64>> {
    let data = serde_json::to_string(&insight.data)?;
    let result = sqlx::query(
        r#"
        INSERT INTO learning_insights (
            insight_type, category, title, description, confidence, data, created_at, applied
        )
        SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, 0
        WHERE NOT EXISTS (
            SELECT 1 FROM learning_insights
            WHERE insight_type = ?1
              AND category IS ?2
              AND created_at > ?8
        );
        "#,
    )
    .bind(insight.insight_type())
    .bind(insight.category.as_deref())
    .bind(&insight.title)
    .bind(&insight.description)
    .bind(insight.confidence)
    .bind(data)
    .bind(format_timestamp(created_at))
    .bind(format_timestamp(not_since))
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        Ok(None)
    } else {
        Ok(Some(result.last_insert_rowid()))
    }
}

/// Fixed-width RFC 3339 in UTC so stored timestamps compare lexically.
pub(crate) fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> LearningResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| LearningError::Timestamp(value.to_string()))
}

fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn count(row: &SqliteRow, column: &str) -> LearningResult<u64> {
    Ok(row.try_get::<i64, _>(column)?.max(0) as u64)
}

fn timestamp(row: &SqliteRow, column: &str) -> LearningResult<DateTime<Utc>> {
    parse_timestamp(&row.try_get::<String, _>(column)?)
}

fn pattern_from_row(row: &SqliteRow) -> LearningResult<FeaturePattern> {
    Ok(FeaturePattern {
        category: row.try_get("category")?,
        total_attempts: count(row, "total_attempts")?,
        successful_attempts: count(row, "successful_attempts")?,
        avg_attempts_to_success: row.try_get("avg_attempts_to_success")?,
        best_model_id: row.try_get("best_model_id")?,
        best_model_success_rate: row.try_get("best_model_success_rate")?,
        avg_input_tokens: row.try_get("avg_input_tokens")?,
        avg_output_tokens: row.try_get("avg_output_tokens")?,
        avg_cost: row.try_get("avg_cost")?,
        avg_duration_ms: row.try_get("avg_duration_ms")?,
        avg_steps: row.try_get("avg_steps")?,
        estimated_difficulty: row.try_get("estimated_difficulty")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn performance_from_row(row: &SqliteRow) -> LearningResult<ModelPerformance> {
    Ok(ModelPerformance {
        model_id: row.try_get("model_id")?,
        category: row.try_get("category")?,
        total_attempts: count(row, "total_attempts")?,
        successful_attempts: count(row, "successful_attempts")?,
        success_rate: row.try_get("success_rate")?,
        total_input_tokens: count(row, "total_input_tokens")?,
        total_output_tokens: count(row, "total_output_tokens")?,
        total_cost: row.try_get("total_cost")?,
        cost_per_success: row.try_get("cost_per_success")?,
        avg_duration_ms: row.try_get("avg_duration_ms")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn insight_from_row(row: &SqliteRow) -> LearningResult<LearningInsight> {
    let data: InsightData = serde_json::from_str(&row.try_get::<String, _>("data")?)?;
    Ok(LearningInsight {
        id: row.try_get("id")?,
        category: row.try_get("category")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        confidence: row.try_get("confidence")?,
        data,
        created_at: timestamp(row, "created_at")?,
        applied: row.try_get::<i64, _>("applied")? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::NamedTempFile;

    async fn open(file: &NamedTempFile) -> Storage {
        let storage = Storage::connect(file.path()).await.unwrap();
        storage.ensure_schema().await.unwrap();
        storage
    }

    fn difficulty_insight(category: &str) -> NewInsight {
        NewInsight {
            category: Some(category.to_string()),
            title: format!("High difficulty category: {category}"),
            description: "hard".to_string(),
            confidence: 0.1,
            data: InsightData::HighDifficulty {
                success_rate: 20.0,
                avg_attempts: 3.0,
                total_attempts: 5,
            },
        }
    }

    #[tokio::test]
    async fn load_or_create_is_idempotent_and_keeps_one_row_per_key() {
        let db_file = NamedTempFile::new().unwrap();
        let storage = open(&db_file).await;
        let now = Utc::now();

        let mut tx = storage.begin().await.unwrap();
        let mut pattern = load_or_create_pattern(&mut tx, "auth", now).await.unwrap();
        assert_eq!(pattern.total_attempts, 0);
        assert_eq!(pattern.avg_steps, 1.0);
        pattern.total_attempts = 3;
        save_pattern(&mut tx, &pattern).await.unwrap();

        let again = load_or_create_pattern(&mut tx, "auth", now).await.unwrap();
        assert_eq!(again.total_attempts, 3);

        let mut scoped = load_or_create_performance(&mut tx, "m1", Some("auth"), now)
            .await
            .unwrap();
        scoped.total_attempts = 2;
        save_performance(&mut tx, &scoped).await.unwrap();
        load_or_create_performance(&mut tx, "m1", None, now)
            .await
            .unwrap();
        load_or_create_performance(&mut tx, "m1", None, now)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let overall = storage.model_performances(None).await.unwrap();
        assert_eq!(overall.len(), 1);
        assert!(overall[0].is_overall());

        let auth = storage.model_performances(Some("auth")).await.unwrap();
        assert_eq!(auth.len(), 1);
        assert_eq!(auth[0].total_attempts, 2);
    }

    #[tokio::test]
    async fn write_transactions_wait_for_the_active_writer() {
        let db_file = NamedTempFile::new().unwrap();
        let storage = open(&db_file).await;

        let mut first = storage.begin_write().await.unwrap();
        let mut pattern = load_or_create_pattern(&mut first, "auth", Utc::now())
            .await
            .unwrap();
        pattern.total_attempts = 1;
        save_pattern(&mut first, &pattern).await.unwrap();

        let second = {
            let storage = storage.clone();
            tokio::spawn(async move {
                let mut tx = storage.begin_write().await?;
                let mut pattern = load_or_create_pattern(&mut tx, "auth", Utc::now()).await?;
                pattern.total_attempts += 1;
                save_pattern(&mut tx, &pattern).await?;
                tx.commit().await?;
                Ok::<_, LearningError>(())
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        first.commit().await.unwrap();

        second.await.unwrap().unwrap();
        let pattern = storage.feature_pattern("auth").await.unwrap().unwrap();
        assert_eq!(pattern.total_attempts, 2);
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let db_file = NamedTempFile::new().unwrap();
        let storage = open(&db_file).await;

        {
            let mut tx = storage.begin().await.unwrap();
            let mut pattern = load_or_create_pattern(&mut tx, "ui", Utc::now())
                .await
                .unwrap();
            pattern.total_attempts = 1;
            save_pattern(&mut tx, &pattern).await.unwrap();
        }

        assert!(storage.feature_pattern("ui").await.unwrap().is_none());
        assert!(storage.feature_patterns().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insight_insert_respects_window_and_orders_newest_first() {
        let db_file = NamedTempFile::new().unwrap();
        let storage = open(&db_file).await;
        let now = Utc::now();
        let window = ChronoDuration::days(7);

        let mut tx = storage.begin().await.unwrap();
        let old = now - ChronoDuration::days(8);
        let first = insert_insight_unless_recent(&mut tx, &difficulty_insight("db"), old, old - window)
            .await
            .unwrap();
        assert!(first.is_some());

        // The old insight is outside the window, so a new one is allowed.
        let second = insert_insight_unless_recent(&mut tx, &difficulty_insight("db"), now, now - window)
            .await
            .unwrap();
        assert!(second.is_some());

        let duplicate = insert_insight_unless_recent(&mut tx, &difficulty_insight("db"), now, now - window)
            .await
            .unwrap();
        assert!(duplicate.is_none());

        let other_category = insert_insight_unless_recent(&mut tx, &difficulty_insight("ui"), now, now - window)
            .await
            .unwrap();
        assert!(other_category.is_some());
        tx.commit().await.unwrap();

        let insights = storage.recent_insights(10).await.unwrap();
        assert_eq!(insights.len(), 3);
        assert_eq!(insights[0].id, other_category.unwrap());
        assert_eq!(insights[2].id, first.unwrap());
        assert!(insights.iter().all(|insight| !insight.applied));

        let limited = storage.recent_insights(1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn mark_insight_applied_flags_only_existing_rows() {
        let db_file = NamedTempFile::new().unwrap();
        let storage = open(&db_file).await;
        let now = Utc::now();

        let mut tx = storage.begin().await.unwrap();
        let id = insert_insight_unless_recent(
            &mut tx,
            &difficulty_insight("auth"),
            now,
            now - ChronoDuration::days(7),
        )
        .await
        .unwrap()
        .unwrap();
        tx.commit().await.unwrap();

        assert!(storage.mark_insight_applied(id).await.unwrap());
        assert!(!storage.mark_insight_applied(id + 100).await.unwrap());

        let insights = storage.recent_insights(5).await.unwrap();
        assert!(insights[0].applied);
        assert_eq!(insights[0].insight_type(), InsightData::HIGH_DIFFICULTY);
    }

    #[test]
    fn timestamps_round_trip_with_fixed_width() {
        let now = Utc::now();
        let text = format_timestamp(now);
        assert!(text.ends_with('Z'));
        let parsed = parse_timestamp(&text).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }
}
