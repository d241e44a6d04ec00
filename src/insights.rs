//! Batch analysis of the aggregates into deduplicated, human-readable alerts.

use crate::{
    config::LearningConfig,
    error::LearningResult,
    models::{
        FeaturePattern, InsightData, LearningInsight, ModelPerformance, NewInsight,
        sample_confidence,
    },
    storage::{self, Storage},
};
use chrono::{DateTime, Duration, Utc};
use std::{cmp::Ordering, collections::BTreeMap};

/// No two insights of the same type and category within this window.
pub const DEDUP_WINDOW_DAYS: i64 = 7;

/// Categories above this difficulty are flagged.
pub const HIGH_DIFFICULTY_THRESHOLD: f64 = 0.7;

/// The cheaper model must keep at least this share of the pricier one's
/// success rate.
const SIMILAR_SUCCESS_RATIO: f64 = 0.9;

/// The cheaper model must cost less than this share of the pricier one.
const SIGNIFICANT_COST_RATIO: f64 = 0.5;

pub fn high_difficulty_insight(pattern: &FeaturePattern, config: &LearningConfig) -> Option<NewInsight> {
    if pattern.total_attempts < config.learning_threshold
        || pattern.estimated_difficulty <= HIGH_DIFFICULTY_THRESHOLD
    {
        return None;
    }

    let success_rate = pattern.success_rate() * 100.0;
    Some(NewInsight {
        category: Some(pattern.category.clone()),
        title: format!("High difficulty category: {}", pattern.category),
        description: format!(
            "Features in '{}' have a {:.0}% success rate and require an average of {:.1} attempts. \
             Consider breaking down these features into smaller tasks.",
            pattern.category, success_rate, pattern.avg_attempts_to_success
        ),
        confidence: sample_confidence(pattern.total_attempts),
        data: InsightData::HighDifficulty {
            success_rate,
            avg_attempts: pattern.avg_attempts_to_success,
            total_attempts: pattern.total_attempts,
        },
    })
}

/// Compares the cheapest and most expensive qualified models of one category.
pub fn cost_optimization_insight(
    category: &str,
    performances: &[&ModelPerformance],
    config: &LearningConfig,
) -> Option<NewInsight> {
    let mut qualified: Vec<&ModelPerformance> = performances
        .iter()
        .copied()
        .filter(|perf| perf.total_attempts >= config.learning_threshold)
        .collect();
    if qualified.len() < 2 {
        return None;
    }

    qualified.sort_by(|a, b| {
        a.cost_per_success
            .partial_cmp(&b.cost_per_success)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.model_id.cmp(&b.model_id))
    });
    let cheapest = qualified[0];
    let most_expensive = qualified[qualified.len() - 1];

    let similar_success = cheapest.success_rate >= most_expensive.success_rate * SIMILAR_SUCCESS_RATIO;
    let much_cheaper =
        cheapest.cost_per_success < most_expensive.cost_per_success * SIGNIFICANT_COST_RATIO;
    if !(similar_success && much_cheaper) {
        return None;
    }

    let savings = (most_expensive.cost_per_success - cheapest.cost_per_success)
        / most_expensive.cost_per_success
        * 100.0;
    let samples = cheapest.total_attempts.min(most_expensive.total_attempts);

    Some(NewInsight {
        category: Some(category.to_string()),
        title: format!("Cost optimization for {category}"),
        description: format!(
            "Using {} instead of {} for '{}' features could save ~{:.0}% \
             with similar success rate ({:.0}% vs {:.0}%).",
            cheapest.model_id,
            most_expensive.model_id,
            category,
            savings,
            cheapest.success_rate * 100.0,
            most_expensive.success_rate * 100.0
        ),
        confidence: sample_confidence(samples),
        data: InsightData::CostOptimization {
            cheaper_model: cheapest.model_id.clone(),
            expensive_model: most_expensive.model_id.clone(),
            savings_percent: savings,
        },
    })
}

/// Every candidate insight for the given aggregates, before deduplication.
pub fn candidate_insights(
    patterns: &[FeaturePattern],
    performances: &[ModelPerformance],
    config: &LearningConfig,
) -> Vec<NewInsight> {
    let mut candidates: Vec<NewInsight> = patterns
        .iter()
        .filter_map(|pattern| high_difficulty_insight(pattern, config))
        .collect();

    let mut by_category: BTreeMap<&str, Vec<&ModelPerformance>> = BTreeMap::new();
    for perf in performances {
        if let Some(category) = perf.category.as_deref() {
            by_category.entry(category).or_default().push(perf);
        }
    }
    candidates.extend(
        by_category
            .iter()
            .filter_map(|(category, perfs)| cost_optimization_insight(category, perfs, config)),
    );
    candidates
}

/// Scans the store and appends the insights not already raised within the
/// dedup window, all inside one transaction.
pub async fn generate(
    storage: &Storage,
    config: &LearningConfig,
    now: DateTime<Utc>,
) -> LearningResult<Vec<LearningInsight>> {
    let not_since = now - Duration::days(DEDUP_WINDOW_DAYS);
    let mut tx = storage.begin_write().await?;

    let patterns = storage::select_patterns(&mut *tx, config.learning_threshold).await?;
    let performances =
        storage::select_category_performances(&mut *tx, config.learning_threshold).await?;

    let mut created = Vec::new();
    for candidate in candidate_insights(&patterns, &performances, config) {
        match storage::insert_insight_unless_recent(&mut tx, &candidate, now, not_since).await? {
            Some(id) => created.push(candidate.into_stored(id, now)),
            None => tracing::debug!(
                insight_type = candidate.insight_type(),
                category = ?candidate.category,
                "skipping insight raised within the dedup window"
            ),
        }
    }
    tx.commit().await?;

    if !created.is_empty() {
        tracing::info!(count = created.len(), "generated learning insights");
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perf(model: &str, category: Option<&str>, attempts: u64, rate: f64, cps: f64) -> ModelPerformance {
        ModelPerformance {
            total_attempts: attempts,
            success_rate: rate,
            cost_per_success: cps,
            ..ModelPerformance::new(model, category.map(str::to_string), Utc::now())
        }
    }

    fn hard_pattern(category: &str, total: u64) -> FeaturePattern {
        FeaturePattern {
            total_attempts: total,
            successful_attempts: 1,
            avg_attempts_to_success: 3.0,
            estimated_difficulty: 0.76,
            ..FeaturePattern::new(category, Utc::now())
        }
    }

    #[test]
    fn flags_hard_categories_with_enough_samples() {
        let config = LearningConfig::default();
        let insight = high_difficulty_insight(&hard_pattern("db", 5), &config).unwrap();
        assert_eq!(insight.insight_type(), InsightData::HIGH_DIFFICULTY);
        assert_eq!(insight.category.as_deref(), Some("db"));
        assert!(insight.description.contains("20% success rate"));
        assert!(insight.description.contains("3.0 attempts"));
        assert!((insight.confidence - 0.1).abs() < 1e-12);

        assert!(high_difficulty_insight(&hard_pattern("db", 4), &config).is_none());

        let mut borderline = hard_pattern("db", 5);
        borderline.estimated_difficulty = 0.7;
        assert!(high_difficulty_insight(&borderline, &config).is_none());
    }

    #[test]
    fn cheaper_model_with_similar_success_is_reported() {
        let config = LearningConfig::default();
        let cheap = perf("cheap", Some("ui"), 10, 0.85, 0.01);
        let pricey = perf("pricey", Some("ui"), 6, 0.90, 0.05);
        let insight = cost_optimization_insight("ui", &[&pricey, &cheap], &config).unwrap();

        assert_eq!(insight.title, "Cost optimization for ui");
        assert!((insight.confidence - 6.0 / 50.0).abs() < 1e-12);
        match &insight.data {
            InsightData::CostOptimization {
                cheaper_model,
                expensive_model,
                savings_percent,
            } => {
                assert_eq!(cheaper_model, "cheap");
                assert_eq!(expensive_model, "pricey");
                assert!((savings_percent - 80.0).abs() < 1e-9);
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(insight.description.contains("save ~80%"));
    }

    #[test]
    fn cost_comparison_needs_similar_success_and_large_savings() {
        let config = LearningConfig::default();
        let pricey = perf("pricey", Some("ui"), 10, 0.90, 0.05);

        let unreliable = perf("cheap", Some("ui"), 10, 0.80, 0.01);
        assert!(cost_optimization_insight("ui", &[&unreliable, &pricey], &config).is_none());

        let modest = perf("cheap", Some("ui"), 10, 0.90, 0.03);
        assert!(cost_optimization_insight("ui", &[&modest, &pricey], &config).is_none());

        let untested = perf("cheap", Some("ui"), 2, 0.90, 0.01);
        assert!(cost_optimization_insight("ui", &[&untested, &pricey], &config).is_none());
    }

    #[test]
    fn candidates_skip_overall_rows() {
        let config = LearningConfig::default();
        let performances = vec![
            perf("cheap", None, 10, 0.9, 0.01),
            perf("pricey", None, 10, 0.9, 0.05),
            perf("cheap", Some("ui"), 10, 0.9, 0.01),
            perf("pricey", Some("api"), 10, 0.9, 0.05),
        ];
        assert!(candidate_insights(&[], &performances, &config).is_empty());
    }
}
