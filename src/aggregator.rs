//! Incremental statistics maintenance, run once per recorded attempt.
//!
//! The update rules are pure functions over loaded rows; [`record`] wraps them
//! in a single transaction so a failure leaves no partial increments behind.

use crate::{
    config::LearningConfig,
    error::LearningResult,
    models::{AttemptRecord, FeaturePattern, ModelPerformance, ratio},
    storage::{self, Storage},
};
use chrono::{DateTime, Utc};

/// `(old * (n - 1) + sample) / n` for the n-th sample.
fn running_mean(old: f64, sample: f64, n: u64) -> f64 {
    if n <= 1 {
        return sample;
    }
    let n = n as f64;
    (old * (n - 1.0) + sample) / n
}

/// `1 - (success_rate * 0.7 + (1 / avg_attempts_to_success) * 0.3)`; lower is
/// easier.
pub fn estimate_difficulty(success_rate: f64, avg_attempts_to_success: f64) -> f64 {
    let attempts = if avg_attempts_to_success > 0.0 {
        avg_attempts_to_success
    } else {
        1.0
    };
    1.0 - (success_rate * 0.7 + (1.0 / attempts) * 0.3)
}

pub fn apply_to_pattern(pattern: &mut FeaturePattern, attempt: &AttemptRecord, now: DateTime<Utc>) {
    pattern.total_attempts += 1;
    if attempt.success {
        pattern.successful_attempts += 1;
        pattern.avg_attempts_to_success = running_mean(
            pattern.avg_attempts_to_success,
            f64::from(attempt.attempt_number),
            pattern.successful_attempts,
        );
    }

    let n = pattern.total_attempts;
    pattern.avg_input_tokens = running_mean(pattern.avg_input_tokens, attempt.input_tokens as f64, n);
    pattern.avg_output_tokens =
        running_mean(pattern.avg_output_tokens, attempt.output_tokens as f64, n);
    pattern.avg_cost = running_mean(pattern.avg_cost, attempt.cost, n);
    pattern.avg_duration_ms = running_mean(pattern.avg_duration_ms, attempt.duration_ms as f64, n);
    pattern.avg_steps = running_mean(pattern.avg_steps, f64::from(attempt.num_steps), n);

    pattern.estimated_difficulty =
        estimate_difficulty(pattern.success_rate(), pattern.avg_attempts_to_success);
    pattern.updated_at = now;
}

/// Applied identically to the per-category row and the overall rollup.
pub fn apply_to_performance(
    performance: &mut ModelPerformance,
    attempt: &AttemptRecord,
    now: DateTime<Utc>,
) {
    performance.total_attempts += 1;
    if attempt.success {
        performance.successful_attempts += 1;
    }
    performance.success_rate = ratio(performance.successful_attempts, performance.total_attempts);
    performance.total_input_tokens = performance
        .total_input_tokens
        .saturating_add(attempt.input_tokens);
    performance.total_output_tokens = performance
        .total_output_tokens
        .saturating_add(attempt.output_tokens);
    performance.total_cost += attempt.cost;
    performance.cost_per_success = if performance.successful_attempts > 0 {
        performance.total_cost / performance.successful_attempts as f64
    } else {
        performance.total_cost
    };
    performance.avg_duration_ms = running_mean(
        performance.avg_duration_ms,
        attempt.duration_ms as f64,
        performance.total_attempts,
    );
    performance.updated_at = now;
}

/// Makes `performance` the category's best model once it has enough samples
/// and beats the recorded best rate. Returns whether it was promoted.
pub fn promote_if_better(
    pattern: &mut FeaturePattern,
    performance: &ModelPerformance,
    learning_threshold: u64,
) -> bool {
    if performance.total_attempts < learning_threshold
        || performance.success_rate <= pattern.best_model_success_rate
    {
        return false;
    }
    pattern.best_model_id = Some(performance.model_id.clone());
    pattern.best_model_success_rate = performance.success_rate;
    true
}

/// Validates `attempt` and folds it into the stored aggregates as one unit of
/// work.
pub async fn record(
    storage: &Storage,
    config: &LearningConfig,
    attempt: &AttemptRecord,
    now: DateTime<Utc>,
) -> LearningResult<()> {
    attempt.validate()?;

    let mut tx = storage.begin_write().await?;

    let mut pattern = storage::load_or_create_pattern(&mut tx, &attempt.category, now).await?;
    apply_to_pattern(&mut pattern, attempt, now);

    let mut performance = storage::load_or_create_performance(
        &mut tx,
        &attempt.model_id,
        Some(attempt.category.as_str()),
        now,
    )
    .await?;
    apply_to_performance(&mut performance, attempt, now);

    if promote_if_better(&mut pattern, &performance, config.learning_threshold) {
        tracing::info!(
            category = %attempt.category,
            model = %attempt.model_id,
            success_rate = performance.success_rate,
            "promoted best model for category"
        );
    }

    let mut overall =
        storage::load_or_create_performance(&mut tx, &attempt.model_id, None, now).await?;
    apply_to_performance(&mut overall, attempt, now);

    storage::save_pattern(&mut tx, &pattern).await?;
    storage::save_performance(&mut tx, &performance).await?;
    storage::save_performance(&mut tx, &overall).await?;
    tx.commit().await?;

    tracing::debug!(
        category = %attempt.category,
        model = %attempt.model_id,
        success = attempt.success,
        total_attempts = pattern.total_attempts,
        "recorded feature attempt"
    );
    Ok(())
}
