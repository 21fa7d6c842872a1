mod category;
pub mod config;
pub mod extraction;
pub mod limits;
pub mod normalize;
mod records;
pub mod workflow;

pub use category::Category;
pub use config::{Config, InferenceConfig, WorkflowConfig};
pub use records::*;
pub use workflow::{
    CategoryRoute, EvaluationVerdict, ExtractionCandidate, Narrative, RoutingDecision,
};
