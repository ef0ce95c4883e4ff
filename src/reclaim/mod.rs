pub mod batch;
pub mod classifier;
pub mod engine;
pub mod gate;
pub mod pipeline;
pub mod risk;

pub use batch::{BatchRunner, BatchSummary, Scheduler};
pub use classifier::AccountClassifier;
pub use engine::{ExecutionMode, ReclaimAction, ReclaimExecutor, ReclaimStatus};
pub use gate::{SafetyGate, SafetyVerdict};
pub use pipeline::ReclaimPipeline;
pub use risk::{RiskAssessor, RiskFlag, RiskFlags};
