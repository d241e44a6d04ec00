use agent_learning::{AttemptRecord, attempts::AttemptSender};
use anyhow::{Context, Result, anyhow};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub queued: u64,
    pub skipped: u64,
}

/// Queues every parseable attempt in a JSON-lines file. Blank lines are
/// ignored; malformed ones are logged and skipped.
pub async fn ingest_file(path: &Path, sender: &AttemptSender) -> Result<IngestStats> {
    let file = File::open(path)
        .with_context(|| format!("failed to open attempts file {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut stats = IngestStats::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let attempt = match serde_json::from_str::<AttemptRecord>(&line) {
            Ok(attempt) => attempt,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    path = %path.display(),
                    line = index + 1,
                    "skipping unparseable attempt"
                );
                stats.skipped += 1;
                continue;
            }
        };
        sender
            .send(attempt)
            .await
            .map_err(|_| anyhow!("attempt recorder stopped before ingest finished"))?;
        stats.queued += 1;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::NamedTempFile;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn queues_valid_lines_and_skips_garbage() {
        let file = NamedTempFile::new().unwrap();
        fs::write(
            file.path(),
            concat!(
                r#"{"category":"auth","model_id":"m1","success":true,"cost":0.1}"#,
                "\n\n",
                "not json\n",
                r#"{"category":"ui","model_id":"m2","success":false,"attempt_number":2}"#,
                "\n",
            ),
        )
        .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let stats = ingest_file(file.path(), &tx).await.unwrap();
        assert_eq!(stats, IngestStats { queued: 2, skipped: 1 });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.category, "auth");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.attempt_number, 2);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let (tx, _rx) = mpsc::channel(1);
        let err = ingest_file(Path::new("/nonexistent/attempts.jsonl"), &tx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to open attempts file"));
    }
}
