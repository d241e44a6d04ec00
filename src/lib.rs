//! Learns from feature-implementation attempts made by coding agents and
//! recommends models, expected attempts and cost for the next one.

pub mod aggregator;
pub mod attempts;
pub mod config;
pub mod engine;
pub mod error;
pub mod insights;
pub mod models;
pub mod recommend;
pub mod registry;
pub mod storage;

pub use config::{AppConfig, LearningConfig, StorageConfig};
pub use engine::LearningEngine;
pub use error::{LearningError, LearningResult};
pub use models::{
    AttemptRecord, FeaturePattern, FeatureRecommendation, InsightData, LearningInsight,
    ModelPerformance,
};
pub use registry::EngineRegistry;
