//! Extractor capabilities
//!
//! One extractor per category turns the narrative (plus feedback on the
//! previous attempt) into a candidate set of typed records. Model output
//! that does not parse becomes an empty candidate carrying the error, so
//! the refinement loop can ask for a corrected attempt.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;

use crate::model::extraction::{CategoryRecord, ExtractedRecords};
use crate::model::{ExtractionCandidate, Narrative};
use crate::service::llm::{InferenceClient, InferenceError, InferenceTask};

pub mod prompts;

use prompts::{build_extraction_prompt, system_prompt};

/// Prior attempt and the evaluator's feedback on it
pub struct Refinement<'a, R> {
    pub previous: &'a ExtractionCandidate<R>,
    pub feedback: &'a str,
}

#[async_trait]
pub trait Extractor<R: CategoryRecord>: Send + Sync {
    /// Produce the candidate for `iteration`; `refinement` is `None` on the first attempt
    async fn extract(
        &self,
        narrative: &Narrative,
        iteration: u32,
        refinement: Option<Refinement<'_, R>>,
    ) -> Result<ExtractionCandidate<R>, InferenceError>;
}

/// Extractor backed by the inference runtime
pub struct LlmExtractor<R> {
    client: InferenceClient,
    model: String,
    _record: PhantomData<fn() -> R>,
}

impl<R: CategoryRecord> LlmExtractor<R> {
    pub fn new(client: InferenceClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            _record: PhantomData,
        }
    }
}

#[derive(Serialize)]
struct RecordsView<'a, R> {
    records: &'a [R],
}

#[async_trait]
impl<R: CategoryRecord> Extractor<R> for LlmExtractor<R> {
    async fn extract(
        &self,
        narrative: &Narrative,
        iteration: u32,
        refinement: Option<Refinement<'_, R>>,
    ) -> Result<ExtractionCandidate<R>, InferenceError> {
        let category = R::CATEGORY;

        let previous = refinement.as_ref().and_then(|r| {
            serde_json::to_string_pretty(&RecordsView {
                records: &r.previous.records,
            })
            .ok()
        });
        let feedback = refinement.as_ref().map(|r| r.feedback);
        let notes = refinement
            .as_ref()
            .map(|r| r.previous.validation_notes.as_slice())
            .unwrap_or_default();

        let prompt = build_extraction_prompt(narrative, previous.as_deref(), feedback, notes);

        let result = self
            .client
            .invoke::<ExtractedRecords<R>>(
                InferenceTask::Extract(category),
                &self.model,
                system_prompt(category),
                prompt,
            )
            .await;

        let extracted = match result {
            Ok(extracted) => extracted,
            Err(InferenceError::Parse { reason, .. }) => {
                tracing::warn!(
                    case_id = %narrative.case_id,
                    category = %category,
                    iteration = iteration,
                    error = %reason,
                    "Extraction output unparseable, using empty candidate"
                );
                return Ok(ExtractionCandidate::failed(
                    category,
                    iteration,
                    &self.model,
                    reason,
                ));
            }
            Err(e) => return Err(e),
        };

        let raw_count = extracted.records.len();
        let (records, validation_notes) = validate_records(extracted.records);

        tracing::info!(
            case_id = %narrative.case_id,
            category = %category,
            iteration = iteration,
            raw_record_count = raw_count,
            record_count = records.len(),
            dropped = validation_notes.len(),
            "Extraction attempt complete"
        );

        let mut candidate = ExtractionCandidate::new(category, iteration, &self.model, records);
        candidate.validation_notes = validation_notes;
        Ok(candidate)
    }
}

/// Keep the records that pass validation; describe the ones that do not
pub fn validate_records<R: CategoryRecord>(records: Vec<R>) -> (Vec<R>, Vec<String>) {
    let mut valid = Vec::with_capacity(records.len());
    let mut notes = Vec::new();

    for mut record in records {
        match record.validate() {
            Ok(()) => valid.push(record),
            Err(reason) => {
                tracing::debug!(category = %R::CATEGORY, reason = %reason, "Dropping invalid record");
                notes.push(reason);
            }
        }
    }

    (valid, notes)
}
