use crate::error::{LearningError, LearningResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running statistics for one feature category.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturePattern {
    pub category: String,
    pub total_attempts: u64,
    pub successful_attempts: u64,
    pub avg_attempts_to_success: f64,
    /// Label of the best model seen so far; not a reference to a stored row.
    pub best_model_id: Option<String>,
    pub best_model_success_rate: f64,
    pub avg_input_tokens: f64,
    pub avg_output_tokens: f64,
    pub avg_cost: f64,
    pub avg_duration_ms: f64,
    pub avg_steps: f64,
    /// Lower is easier. Derived from success rate and attempts to success.
    pub estimated_difficulty: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeaturePattern {
    pub fn new(category: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            category: category.into(),
            total_attempts: 0,
            successful_attempts: 0,
            avg_attempts_to_success: 1.0,
            best_model_id: None,
            best_model_success_rate: 0.0,
            avg_input_tokens: 0.0,
            avg_output_tokens: 0.0,
            avg_cost: 0.0,
            avg_duration_ms: 0.0,
            avg_steps: 1.0,
            estimated_difficulty: 0.5,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn success_rate(&self) -> f64 {
        ratio(self.successful_attempts, self.total_attempts)
    }

    pub fn view(&self) -> FeaturePatternView {
        FeaturePatternView {
            category: self.category.clone(),
            total_attempts: self.total_attempts,
            successful_attempts: self.successful_attempts,
            success_rate: round_to(self.success_rate() * 100.0, 1),
            avg_attempts_to_success: round_to(self.avg_attempts_to_success, 2),
            best_model: self.best_model_id.clone(),
            model_success_rate: round_to(self.best_model_success_rate * 100.0, 1),
            avg_input_tokens: self.avg_input_tokens.round() as u64,
            avg_output_tokens: self.avg_output_tokens.round() as u64,
            avg_cost: round_to(self.avg_cost, 4),
            avg_duration_ms: self.avg_duration_ms.round() as u64,
            avg_steps: round_to(self.avg_steps, 2),
            estimated_difficulty: round_to(self.estimated_difficulty, 2),
            updated_at: self.updated_at.to_rfc3339(),
        }
    }
}

/// Performance of one model, either within a category or across all of them
/// (`category == None`).
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPerformance {
    pub model_id: String,
    pub category: Option<String>,
    pub total_attempts: u64,
    pub successful_attempts: u64,
    pub success_rate: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost: f64,
    pub cost_per_success: f64,
    pub avg_duration_ms: f64,
    pub updated_at: DateTime<Utc>,
}

impl ModelPerformance {
    pub fn new(model_id: impl Into<String>, category: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            model_id: model_id.into(),
            category,
            total_attempts: 0,
            successful_attempts: 0,
            success_rate: 0.0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cost: 0.0,
            cost_per_success: 0.0,
            avg_duration_ms: 0.0,
            updated_at: now,
        }
    }

    pub fn is_overall(&self) -> bool {
        self.category.is_none()
    }

    pub fn view(&self) -> ModelPerformanceView {
        ModelPerformanceView {
            model_id: self.model_id.clone(),
            category: self.category.clone(),
            total_attempts: self.total_attempts,
            successful_attempts: self.successful_attempts,
            success_rate: round_to(self.success_rate * 100.0, 1),
            total_input_tokens: self.total_input_tokens,
            total_output_tokens: self.total_output_tokens,
            total_cost: round_to(self.total_cost, 4),
            cost_per_success: round_to(self.cost_per_success, 4),
            avg_duration_ms: self.avg_duration_ms.round() as u64,
            updated_at: self.updated_at.to_rfc3339(),
        }
    }
}

/// Typed evidence attached to an insight. The `kind` tag doubles as the
/// stored `insight_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InsightData {
    #[serde(rename_all = "camelCase")]
    HighDifficulty {
        success_rate: f64,
        avg_attempts: f64,
        total_attempts: u64,
    },
    #[serde(rename_all = "camelCase")]
    CostOptimization {
        cheaper_model: String,
        expensive_model: String,
        savings_percent: f64,
    },
}

impl InsightData {
    pub const HIGH_DIFFICULTY: &'static str = "high_difficulty";
    pub const COST_OPTIMIZATION: &'static str = "cost_optimization";

    pub fn insight_type(&self) -> &'static str {
        match self {
            Self::HighDifficulty { .. } => Self::HIGH_DIFFICULTY,
            Self::CostOptimization { .. } => Self::COST_OPTIMIZATION,
        }
    }
}

/// An insight that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInsight {
    pub category: Option<String>,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub data: InsightData,
}

impl NewInsight {
    pub fn insight_type(&self) -> &'static str {
        self.data.insight_type()
    }

    pub fn into_stored(self, id: i64, created_at: DateTime<Utc>) -> LearningInsight {
        LearningInsight {
            id,
            category: self.category,
            title: self.title,
            description: self.description,
            confidence: self.confidence,
            data: self.data,
            created_at,
            applied: false,
        }
    }
}

/// Append-only insight record. Only `applied` changes after insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct LearningInsight {
    pub id: i64,
    pub category: Option<String>,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub data: InsightData,
    pub created_at: DateTime<Utc>,
    pub applied: bool,
}

impl LearningInsight {
    pub fn insight_type(&self) -> &'static str {
        self.data.insight_type()
    }

    pub fn view(&self) -> LearningInsightView {
        LearningInsightView {
            id: self.id,
            insight_type: self.insight_type().to_string(),
            category: self.category.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            confidence: round_to(self.confidence, 2),
            data: self.data.clone(),
            created_at: self.created_at.to_rfc3339(),
            applied: self.applied,
        }
    }
}

/// Suggested strategy for the next feature attempt. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRecommendation {
    pub recommended_model: String,
    pub expected_attempts: u32,
    pub estimated_cost: f64,
    pub estimated_duration_ms: u64,
    pub difficulty: f64,
    pub confidence: f64,
    pub reasoning: String,
}

/// One feature implementation attempt as reported by the agent loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AttemptRecord {
    pub category: String,
    pub model_id: String,
    pub success: bool,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default = "default_ordinal")]
    pub attempt_number: u32,
    #[serde(default = "default_ordinal")]
    pub num_steps: u32,
}

impl AttemptRecord {
    /// A single-step first attempt with no resource usage.
    pub fn new(category: impl Into<String>, model_id: impl Into<String>, success: bool) -> Self {
        Self {
            category: category.into(),
            model_id: model_id.into(),
            success,
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
            duration_ms: 0,
            attempt_number: 1,
            num_steps: 1,
        }
    }

    pub fn validate(&self) -> LearningResult<()> {
        if self.category.trim().is_empty() {
            return Err(LearningError::validation("category must not be empty"));
        }
        if self.model_id.trim().is_empty() {
            return Err(LearningError::validation("model_id must not be empty"));
        }
        if self.attempt_number == 0 {
            return Err(LearningError::validation("attempt_number must be at least 1"));
        }
        if self.num_steps == 0 {
            return Err(LearningError::validation("num_steps must be at least 1"));
        }
        if !self.cost.is_finite() || self.cost < 0.0 {
            return Err(LearningError::validation(format!(
                "cost must be a non-negative number, got {}",
                self.cost
            )));
        }
        Ok(())
    }
}

fn default_ordinal() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturePatternView {
    pub category: String,
    pub total_attempts: u64,
    pub successful_attempts: u64,
    pub success_rate: f64,
    pub avg_attempts_to_success: f64,
    pub best_model: Option<String>,
    pub model_success_rate: f64,
    pub avg_input_tokens: u64,
    pub avg_output_tokens: u64,
    pub avg_cost: f64,
    pub avg_duration_ms: u64,
    pub avg_steps: f64,
    pub estimated_difficulty: f64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPerformanceView {
    pub model_id: String,
    pub category: Option<String>,
    pub total_attempts: u64,
    pub successful_attempts: u64,
    pub success_rate: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost: f64,
    pub cost_per_success: f64,
    pub avg_duration_ms: u64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningInsightView {
    pub id: i64,
    pub insight_type: String,
    pub category: Option<String>,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub data: InsightData,
    pub created_at: String,
    pub applied: bool,
}

/// `part / whole`, or 0 when `whole` is 0.
pub(crate) fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Linear confidence ramp saturating at 50 samples.
pub(crate) fn sample_confidence(samples: u64) -> f64 {
    (samples as f64 / 50.0).min(1.0)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_validation_rejects_malformed_input() {
        assert!(AttemptRecord::new("auth", "m1", true).validate().is_ok());

        let empty_category = AttemptRecord::new("  ", "m1", true);
        assert!(matches!(
            empty_category.validate(),
            Err(LearningError::Validation(_))
        ));

        let empty_model = AttemptRecord::new("auth", "", true);
        assert!(empty_model.validate().is_err());

        let mut zeroth = AttemptRecord::new("auth", "m1", true);
        zeroth.attempt_number = 0;
        assert!(zeroth.validate().is_err());

        let mut negative_cost = AttemptRecord::new("auth", "m1", false);
        negative_cost.cost = -0.01;
        assert!(negative_cost.validate().is_err());

        let mut nan_cost = AttemptRecord::new("auth", "m1", false);
        nan_cost.cost = f64::NAN;
        assert!(nan_cost.validate().is_err());
    }

    #[test]
    fn attempt_record_deserializes_with_defaults() {
        let record: AttemptRecord =
            serde_json::from_str(r#"{"category":"ui","model_id":"m2","success":false}"#).unwrap();
        assert_eq!(record, AttemptRecord::new("ui", "m2", false));
    }

    #[test]
    fn insight_data_is_tagged_by_kind() {
        let data = InsightData::CostOptimization {
            cheaper_model: "cheap".to_string(),
            expensive_model: "pricey".to_string(),
            savings_percent: 80.0,
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["kind"], "cost_optimization");
        assert_eq!(json["cheaperModel"], "cheap");
        assert_eq!(data.insight_type(), InsightData::COST_OPTIMIZATION);

        let back: InsightData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn views_round_like_the_platform_api() {
        let mut pattern = FeaturePattern::new("auth", Utc::now());
        pattern.total_attempts = 3;
        pattern.successful_attempts = 2;
        pattern.avg_cost = 0.123456;
        let view = pattern.view();
        assert!((view.success_rate - 66.7).abs() < 1e-9);
        assert!((view.avg_cost - 0.1235).abs() < 1e-9);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["totalAttempts"], 3);
        assert!(json.get("bestModel").is_some());
    }

    #[test]
    fn confidence_saturates_at_fifty_samples() {
        assert_eq!(sample_confidence(0), 0.0);
        assert!((sample_confidence(5) - 0.1).abs() < f64::EPSILON);
        assert_eq!(sample_confidence(50), 1.0);
        assert_eq!(sample_confidence(500), 1.0);
    }
}
