pub mod evaluation;
pub mod extraction;
pub mod llm;
pub mod merge;
pub mod refinement;
pub mod triage;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use llm::{InferenceClient, InferenceError, OllamaRuntime};
pub use workflow::{ExtractionRequest, ExtractionWorkflow, WorkflowError};
