//! Read-only model ranking and feature recommendations.

use crate::{
    config::LearningConfig,
    models::{FeaturePattern, FeatureRecommendation, ModelPerformance, sample_confidence},
};
use std::cmp::Ordering;

/// Blended score: success rate weighted against cost per success.
pub fn model_score(performance: &ModelPerformance, cost_weight: f64) -> f64 {
    performance.success_rate * (1.0 - cost_weight) - performance.cost_per_success * cost_weight
}

/// Highest-scoring model among those with at least `learning_threshold`
/// samples. Equal scores go to the lexically smaller model id.
pub fn select_best_model<'a>(
    candidates: &'a [ModelPerformance],
    config: &LearningConfig,
) -> Option<&'a ModelPerformance> {
    candidates
        .iter()
        .filter(|perf| perf.total_attempts >= config.learning_threshold)
        .max_by(|a, b| {
            model_score(a, config.cost_weight)
                .partial_cmp(&model_score(b, config.cost_weight))
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.model_id.cmp(&a.model_id))
        })
}

/// Cold-start recommendation used when a category lacks history.
pub fn default_recommendation(config: &LearningConfig) -> FeatureRecommendation {
    FeatureRecommendation {
        recommended_model: config.default_model.clone(),
        expected_attempts: 1,
        estimated_cost: 0.0,
        estimated_duration_ms: 0,
        difficulty: 0.5,
        confidence: 0.0,
        reasoning: "Insufficient data for category-specific recommendation".to_string(),
    }
}

/// Builds a recommendation from the category's pattern and its per-model rows.
pub fn recommend(
    pattern: Option<&FeaturePattern>,
    candidates: &[ModelPerformance],
    num_steps: u32,
    config: &LearningConfig,
) -> FeatureRecommendation {
    let Some(pattern) = pattern.filter(|p| p.total_attempts >= config.learning_threshold) else {
        return default_recommendation(config);
    };

    let recommended_model = select_best_model(candidates, config)
        .map(|perf| perf.model_id.clone())
        .unwrap_or_else(|| config.default_model.clone());

    let step_factor = if pattern.avg_steps > 0.0 {
        f64::from(num_steps) / pattern.avg_steps
    } else {
        1.0
    };

    let expected_attempts = pattern.avg_attempts_to_success.round_ties_even().max(1.0) as u32;
    let success_percent = pattern.success_rate() * 100.0;

    FeatureRecommendation {
        recommended_model,
        expected_attempts,
        estimated_cost: pattern.avg_cost * step_factor,
        estimated_duration_ms: (pattern.avg_duration_ms * step_factor).max(0.0) as u64,
        difficulty: pattern.estimated_difficulty,
        confidence: sample_confidence(pattern.total_attempts),
        reasoning: format!(
            "Based on {} attempts in '{}' category ({} successful, {:.1}% success rate)",
            pattern.total_attempts, pattern.category, pattern.successful_attempts, success_percent
        ),
    }
}
