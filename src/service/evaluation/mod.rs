//! Evaluator capability
//!
//! Judges a candidate against the narrative and returns a verdict with
//! feedback. It only recommends; candidates are never modified here.

use async_trait::async_trait;
use serde::Serialize;

use crate::model::extraction::{CategoryRecord, ExtractedVerdict};
use crate::model::{EvaluationVerdict, ExtractionCandidate, Narrative};
use crate::service::llm::{InferenceClient, InferenceError, InferenceTask};

pub mod prompts;

use prompts::{EVALUATION_SYSTEM_PROMPT, build_evaluation_prompt};

/// Feedback for an attempt whose output did not parse
pub const UNPARSEABLE_EXTRACTION_FEEDBACK: &str = "The previous response could not be parsed. \
Return a single JSON object with a `records` array whose items follow the required schema exactly, \
with no commentary or markdown around it.";

#[async_trait]
pub trait Evaluator<R: CategoryRecord>: Send + Sync {
    async fn evaluate(
        &self,
        narrative: &Narrative,
        candidate: &ExtractionCandidate<R>,
    ) -> Result<EvaluationVerdict, InferenceError>;
}

/// Verdict that needs no model call, if any
///
/// An empty candidate is accepted as "nothing to extract" only when the
/// model itself returned no records. An empty candidate standing in for an
/// unparseable response, or one whose records were all dropped by
/// validation, is rejected with feedback asking for a corrected attempt.
pub fn local_verdict<R>(candidate: &ExtractionCandidate<R>) -> Option<EvaluationVerdict> {
    if !candidate.is_empty() {
        return None;
    }
    if candidate.error.is_some() {
        return Some(EvaluationVerdict::rejected(
            candidate.category,
            UNPARSEABLE_EXTRACTION_FEEDBACK,
        ));
    }
    if !candidate.validation_notes.is_empty() {
        return Some(EvaluationVerdict::rejected(
            candidate.category,
            invalid_records_feedback(&candidate.validation_notes),
        ));
    }
    Some(EvaluationVerdict::accepted(candidate.category, ""))
}

fn invalid_records_feedback(notes: &[String]) -> String {
    let mut feedback = String::from(
        "Every record of the previous response was rejected. Fix these problems and return the records again:",
    );
    for note in notes {
        feedback.push_str("\n- ");
        feedback.push_str(note);
    }
    feedback
}

/// Evaluator backed by the inference runtime
#[derive(Clone)]
pub struct LlmEvaluator {
    client: InferenceClient,
    model: String,
}

impl LlmEvaluator {
    pub fn new(client: InferenceClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[derive(Serialize)]
struct RecordsView<'a, R> {
    records: &'a [R],
}

#[async_trait]
impl<R: CategoryRecord> Evaluator<R> for LlmEvaluator {
    async fn evaluate(
        &self,
        narrative: &Narrative,
        candidate: &ExtractionCandidate<R>,
    ) -> Result<EvaluationVerdict, InferenceError> {
        let category = candidate.category;
        let records_json = serde_json::to_string_pretty(&RecordsView {
            records: &candidate.records,
        })
        .map_err(|e| InferenceError::Unavailable(format!("Failed to encode candidate: {}", e)))?;

        let prompt = build_evaluation_prompt(
            narrative,
            category,
            &records_json,
            &candidate.validation_notes,
        );

        let result = self
            .client
            .invoke::<ExtractedVerdict>(
                InferenceTask::Evaluate(category),
                &self.model,
                EVALUATION_SYSTEM_PROMPT,
                prompt,
            )
            .await;

        let verdict = match result {
            Ok(verdict) if verdict.accepted => {
                EvaluationVerdict::accepted(category, verdict.feedback.trim())
            }
            Ok(verdict) => {
                let feedback = verdict.feedback.trim();
                let feedback = if feedback.is_empty() {
                    "The extraction was not accepted. Re-read the description and correct missing or wrong records."
                } else {
                    feedback
                };
                EvaluationVerdict::rejected(category, feedback)
            }
            // An unreadable review cannot confirm anything
            Err(InferenceError::Parse { reason, .. }) => {
                tracing::warn!(
                    case_id = %narrative.case_id,
                    category = %category,
                    iteration = candidate.iteration,
                    error = %reason,
                    "Evaluator output unparseable, treating as rejection"
                );
                EvaluationVerdict::rejected(
                    category,
                    "Re-check every record against the description and the required format.",
                )
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            case_id = %narrative.case_id,
            category = %category,
            iteration = candidate.iteration,
            accepted = verdict.accepted,
            "Evaluation complete"
        );

        Ok(verdict)
    }
}
