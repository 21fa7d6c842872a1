//! Data carried through one extraction workflow run

use serde::Serialize;

use crate::model::Category;

/// Incident narrative under extraction; read-only for the whole run
#[derive(Debug, Clone)]
pub struct Narrative {
    pub case_id: String,
    pub text: String,
}

impl Narrative {
    pub fn new(case_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            case_id: case_id.into(),
            text: text.into(),
        }
    }
}

/// Records of one category produced by a single extractor invocation
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionCandidate<R> {
    pub category: Category,
    /// 1-based iteration of the refinement session that produced it
    pub iteration: u32,
    pub model: String,
    pub records: Vec<R>,
    /// Records dropped by validation, with the reason
    pub validation_notes: Vec<String>,
    /// Set when the model output could not be parsed; `records` is then empty
    pub error: Option<String>,
}

impl<R> ExtractionCandidate<R> {
    pub fn new(category: Category, iteration: u32, model: &str, records: Vec<R>) -> Self {
        Self {
            category,
            iteration,
            model: model.to_string(),
            records,
            validation_notes: Vec::new(),
            error: None,
        }
    }

    /// Empty candidate standing in for an unparseable model response
    pub fn failed(category: Category, iteration: u32, model: &str, error: String) -> Self {
        Self {
            category,
            iteration,
            model: model.to_string(),
            records: Vec::new(),
            validation_notes: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Evaluator judgement of one extraction attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationVerdict {
    pub category: Category,
    pub accepted: bool,
    pub feedback: String,
}

impl EvaluationVerdict {
    pub fn accepted(category: Category, feedback: impl Into<String>) -> Self {
        Self {
            category,
            accepted: true,
            feedback: feedback.into(),
        }
    }

    pub fn rejected(category: Category, feedback: impl Into<String>) -> Self {
        Self {
            category,
            accepted: false,
            feedback: feedback.into(),
        }
    }
}

/// One category the triage router marked applicable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRoute {
    pub category: Category,
    /// Model confidence; `None` when routed by the fail-open fallback
    pub confidence: Option<f32>,
}

/// Which extractor capabilities run for a narrative
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingDecision {
    /// The classifier answered; only the listed categories apply
    Classified { routes: Vec<CategoryRoute> },
    /// The classifier output was unusable; every category applies
    FailOpen { reason: String },
}

impl RoutingDecision {
    pub fn fail_open(reason: impl Into<String>) -> Self {
        RoutingDecision::FailOpen {
            reason: reason.into(),
        }
    }

    pub fn routes(&self) -> Vec<CategoryRoute> {
        match self {
            RoutingDecision::Classified { routes } => routes.clone(),
            RoutingDecision::FailOpen { .. } => Category::ALL
                .iter()
                .map(|&category| CategoryRoute {
                    category,
                    confidence: None,
                })
                .collect(),
        }
    }

    pub fn applies(&self, category: Category) -> bool {
        match self {
            RoutingDecision::Classified { routes } => {
                routes.iter().any(|r| r.category == category)
            }
            RoutingDecision::FailOpen { .. } => true,
        }
    }

    pub fn applicable_count(&self) -> usize {
        Category::ALL.iter().filter(|&&c| self.applies(c)).count()
    }
}
