use crate::{
    aggregator,
    config::{LearningConfig, StorageConfig},
    error::LearningResult,
    insights,
    models::{AttemptRecord, FeaturePattern, FeatureRecommendation, LearningInsight, ModelPerformance},
    recommend,
    storage::{self, Storage},
};
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::sync::Mutex;

/// Learning engine bound to one project's store.
pub struct LearningEngine {
    storage: Storage,
    config: LearningConfig,
    /// Serialises insight generation within the process.
    insight_gate: Mutex<()>,
}

impl LearningEngine {
    /// Opens (creating if needed) the database at `path` and its schema.
    pub async fn open(path: impl AsRef<Path>, config: LearningConfig) -> LearningResult<Self> {
        let storage = Storage::connect(path).await?;
        Self::with_storage(storage, config).await
    }

    pub async fn open_with(
        path: impl AsRef<Path>,
        storage_config: &StorageConfig,
        config: LearningConfig,
    ) -> LearningResult<Self> {
        let storage = Storage::connect_with(
            path,
            storage_config.max_connections,
            storage_config.busy_timeout(),
        )
        .await?;
        Self::with_storage(storage, config).await
    }

    pub async fn with_storage(storage: Storage, config: LearningConfig) -> LearningResult<Self> {
        storage.ensure_schema().await?;
        Ok(Self {
            storage,
            config,
            insight_gate: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn database_path(&self) -> &Path {
        self.storage.path()
    }

    /// Folds one attempt into the statistics. On error nothing was recorded;
    /// the update is not idempotent, so only retry calls known to have failed.
    pub async fn record_attempt(&self, attempt: &AttemptRecord) -> LearningResult<()> {
        aggregator::record(&self.storage, &self.config, attempt, Utc::now()).await
    }

    /// Never fails for lack of history; unknown categories get the cold-start
    /// defaults.
    pub async fn get_recommendation(
        &self,
        category: &str,
        num_steps: u32,
    ) -> LearningResult<FeatureRecommendation> {
        // One read transaction, so the pattern and its candidates share a snapshot.
        let mut tx = self.storage.begin().await?;
        let Some(pattern) = storage::select_pattern(&mut *tx, category).await? else {
            tracing::debug!(category, "no history for category, using defaults");
            return Ok(recommend::default_recommendation(&self.config));
        };
        let candidates = storage::select_qualified_performances(
            &mut *tx,
            category,
            self.config.learning_threshold,
        )
        .await?;
        tx.commit().await?;

        Ok(recommend::recommend(
            Some(&pattern),
            &candidates,
            num_steps,
            &self.config,
        ))
    }

    /// Most recent first, at most `limit`.
    pub async fn get_insights(&self, limit: usize) -> LearningResult<Vec<LearningInsight>> {
        self.storage.recent_insights(limit).await
    }

    pub async fn generate_insights(&self) -> LearningResult<Vec<LearningInsight>> {
        self.generate_insights_at(Utc::now()).await
    }

    pub(crate) async fn generate_insights_at(
        &self,
        now: DateTime<Utc>,
    ) -> LearningResult<Vec<LearningInsight>> {
        let _guard = self.insight_gate.lock().await;
        insights::generate(&self.storage, &self.config, now).await
    }

    pub async fn get_category_stats(&self) -> LearningResult<Vec<FeaturePattern>> {
        self.storage.feature_patterns().await
    }

    /// Rows for `category`, or each model's overall rollup when `None`.
    pub async fn get_model_stats(
        &self,
        category: Option<&str>,
    ) -> LearningResult<Vec<ModelPerformance>> {
        self.storage.model_performances(category).await
    }

    pub async fn mark_insight_applied(&self, id: i64) -> LearningResult<bool> {
        self.storage.mark_insight_applied(id).await
    }
}
