//! Triage router
//!
//! Decides which extractor capabilities apply to a narrative with a single
//! classification call. An unparseable classification routes to every
//! category; under-extraction loses evidence silently.

use crate::model::extraction::ExtractedTriage;
use crate::model::{Category, CategoryRoute, Narrative, RoutingDecision};
use crate::service::llm::{InferenceClient, InferenceError, InferenceTask};

pub mod prompts;

use prompts::{TRIAGE_SYSTEM_PROMPT, build_triage_prompt};

#[derive(Clone)]
pub struct TriageRouter {
    client: InferenceClient,
}

impl TriageRouter {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }

    /// Classify the narrative; only runtime failures are returned as errors
    pub async fn route(
        &self,
        narrative: &Narrative,
        model: &str,
    ) -> Result<RoutingDecision, InferenceError> {
        let result = self
            .client
            .invoke::<ExtractedTriage>(
                InferenceTask::Triage,
                model,
                TRIAGE_SYSTEM_PROMPT,
                build_triage_prompt(narrative),
            )
            .await;

        let decision = match result {
            Ok(triage) => classify(&triage),
            Err(InferenceError::Parse { reason, .. }) => {
                tracing::warn!(
                    case_id = %narrative.case_id,
                    error = %reason,
                    "Triage output unusable, routing to all categories"
                );
                RoutingDecision::fail_open(reason)
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            case_id = %narrative.case_id,
            routes = ?decision.routes().iter().map(|r| r.category.as_str()).collect::<Vec<_>>(),
            fail_open = matches!(decision, RoutingDecision::FailOpen { .. }),
            "Triage complete"
        );

        Ok(decision)
    }
}

fn classify(triage: &ExtractedTriage) -> RoutingDecision {
    let routes = Category::ALL
        .iter()
        .filter_map(|&category| {
            let signal = triage.signal(category);
            signal.applicable.then(|| CategoryRoute {
                category,
                confidence: Some(signal.confidence.clamp(0.0, 1.0)),
            })
        })
        .collect();

    RoutingDecision::Classified { routes }
}
