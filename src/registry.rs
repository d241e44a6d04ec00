use crate::{
    config::{LearningConfig, StorageConfig},
    engine::LearningEngine,
    error::LearningResult,
};
use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;

/// Hands out one shared [`LearningEngine`] per database path.
///
/// The caller owns the registry and threads it through; engines are opened
/// lazily and kept for the registry's lifetime. Nothing here guards against
/// other processes opening the same file; SQLite's locking covers that.
pub struct EngineRegistry {
    storage: StorageConfig,
    learning: LearningConfig,
    engines: Mutex<HashMap<PathBuf, Arc<LearningEngine>>>,
}

impl EngineRegistry {
    pub fn new(storage: StorageConfig, learning: LearningConfig) -> Self {
        Self {
            storage,
            learning,
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Engine for the project rooted at `project_dir`, stored under the
    /// configured data directory.
    pub async fn for_project(&self, project_dir: &Path) -> LearningResult<Arc<LearningEngine>> {
        let path = self.storage.database_path_for(project_dir);
        self.for_database(&path).await
    }

    /// Engine for an explicit database file.
    pub async fn for_database(&self, path: &Path) -> LearningResult<Arc<LearningEngine>> {
        let key = canonical_database_path(path)?;

        // Held across the open so concurrent first requests share one engine.
        let mut engines = self.engines.lock().await;
        if let Some(engine) = engines.get(&key) {
            return Ok(engine.clone());
        }

        tracing::info!(path = %key.display(), "opening learning engine");
        let engine =
            Arc::new(LearningEngine::open_with(&key, &self.storage, self.learning.clone()).await?);
        engines.insert(key, engine.clone());
        Ok(engine)
    }

    pub async fn len(&self) -> usize {
        self.engines.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.engines.lock().await.is_empty()
    }
}

/// Creates the parent directory if needed and resolves it, so different
/// spellings of one location map to the same key.
fn canonical_database_path(path: &Path) -> io::Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("database path has no file name: {}", path.display()),
        )
    })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    Ok(fs::canonicalize(&parent)?.join(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttemptRecord;
    use tempfile::TempDir;

    fn registry() -> EngineRegistry {
        EngineRegistry::new(StorageConfig::default(), LearningConfig::default())
    }

    #[tokio::test]
    async fn same_project_shares_one_engine() {
        let dir = TempDir::new().unwrap();
        let registry = registry();

        let first = registry.for_project(dir.path()).await.unwrap();
        let nested = dir.path().join("src").join("..");
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        let second = registry.for_project(&nested).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);
        assert!(first.database_path().ends_with(".autocoder/learning.db"));
        assert!(first.database_path().exists());
    }

    #[tokio::test]
    async fn distinct_projects_get_distinct_stores() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let registry = registry();

        let engine_a = registry.for_project(a.path()).await.unwrap();
        let engine_b = registry.for_project(b.path()).await.unwrap();
        assert!(!Arc::ptr_eq(&engine_a, &engine_b));

        engine_a
            .record_attempt(&AttemptRecord::new("auth", "m1", true))
            .await
            .unwrap();
        assert_eq!(engine_a.get_category_stats().await.unwrap().len(), 1);
        assert!(engine_b.get_category_stats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_first_requests_open_once() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(registry());
        let db = dir.path().join("learning.db");

        let (a, b) = tokio::join!(registry.for_database(&db), registry.for_database(&db));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(registry.len().await, 1);
        assert!(!registry.is_empty().await);
    }
}
