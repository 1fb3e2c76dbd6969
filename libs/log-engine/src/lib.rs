pub mod error;
pub mod generator;
pub mod reader;
pub mod scheduler;

pub use error::EngineError;
pub use generator::{
    BatchOutcome, BatchReport, GeneratorConfig, OutlierTier, SizeTier, SizeTierGenerator,
    TestFeedConfig, TierBand, TierCounts, choose_tier,
};
pub use reader::{BatchPlan, BatchReader, BudgetPlanner, ReadLimits};
pub use scheduler::{fill_to_target, spawn_generator_task};
