//! Refinement session state machine
//!
//! ```text
//! Pending -> Extracting -> Evaluating -> Accepted
//!                ^             |-------> Exhausted
//!                |             v
//!                +-------- Refining
//! ```
//!
//! `Refining` is only reachable while `iteration < max_iterations`, so a
//! session performs at most `max_iterations` extract/evaluate rounds.

use serde::Serialize;
use tokio::sync::watch;

use crate::model::extraction::CategoryRecord;
use crate::model::{Category, EvaluationVerdict, ExtractionCandidate, Narrative};
use crate::service::evaluation::{Evaluator, local_verdict};
use crate::service::extraction::{Extractor, Refinement};
use crate::service::llm::{InferenceError, InferenceTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Extracting,
    Evaluating,
    Refining,
    Accepted,
    Exhausted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Accepted | SessionState::Exhausted)
    }

    pub fn allowed_transitions(self) -> &'static [SessionState] {
        use SessionState::*;
        match self {
            Pending => &[Extracting],
            Extracting => &[Evaluating],
            Evaluating => &[Accepted, Refining, Exhausted],
            Refining => &[Extracting],
            Accepted | Exhausted => &[],
        }
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        self.allowed_transitions().contains(&next)
    }
}

/// Inference failure inside a session, tagged with the call that failed
#[derive(Debug, Clone, thiserror::Error)]
#[error("{task} failed: {source}")]
pub struct SessionError {
    pub task: InferenceTask,
    #[source]
    pub source: InferenceError,
}

/// Everything a session has learned so far
///
/// Published after every transition so the controller can still surface
/// the best candidate if the session is cut off by the deadline.
#[derive(Debug, Clone)]
pub struct SessionProgress<R> {
    pub category: Category,
    pub state: SessionState,
    /// 1-based iteration currently in flight or last completed
    pub iteration: u32,
    pub max_iterations: u32,
    pub current: Option<ExtractionCandidate<R>>,
    /// Most recent candidate with at least one record
    pub best: Option<ExtractionCandidate<R>>,
    /// Oldest first
    pub feedback_history: Vec<String>,
    pub verdicts: Vec<EvaluationVerdict>,
    pub accepted_iteration: Option<u32>,
}

impl<R: Clone> SessionProgress<R> {
    pub fn new(category: Category, max_iterations: u32) -> Self {
        Self {
            category,
            state: SessionState::Pending,
            iteration: 0,
            max_iterations: max_iterations.max(1),
            current: None,
            best: None,
            feedback_history: Vec::new(),
            verdicts: Vec::new(),
            accepted_iteration: None,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal session transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(
            category = %self.category,
            iteration = self.iteration,
            from = ?self.state,
            to = ?next,
            "Session transition"
        );
        self.state = next;
    }

    /// Final result of a session that reached a terminal state on its own
    fn into_outcome(self) -> SessionOutcome<R> {
        self.finish(false)
    }

    /// Final result of a session cut off before reaching a terminal state
    pub fn force_exhausted(self) -> SessionOutcome<R> {
        self.finish(true)
    }

    fn finish(mut self, forced_by_deadline: bool) -> SessionOutcome<R> {
        if forced_by_deadline {
            self.state = SessionState::Exhausted;
        }

        let candidate = match self.state {
            SessionState::Accepted => self.current,
            _ => self.best.or(self.current),
        };

        SessionOutcome {
            category: self.category,
            state: self.state,
            iterations: self.iteration,
            accepted_iteration: self.accepted_iteration,
            candidate,
            feedback_history: self.feedback_history,
            verdicts: self.verdicts,
            forced_by_deadline,
        }
    }
}

/// Terminal result of one session
#[derive(Debug, Clone)]
pub struct SessionOutcome<R> {
    pub category: Category,
    /// `Accepted` or `Exhausted`
    pub state: SessionState,
    pub iterations: u32,
    pub accepted_iteration: Option<u32>,
    /// Surfaced candidate; `None` only if no extraction attempt completed
    pub candidate: Option<ExtractionCandidate<R>>,
    pub feedback_history: Vec<String>,
    pub verdicts: Vec<EvaluationVerdict>,
    pub forced_by_deadline: bool,
}

impl<R> SessionOutcome<R> {
    pub fn record_count(&self) -> usize {
        self.candidate.as_ref().map_or(0, |c| c.records.len())
    }

    /// Whether the surfaced candidate is the one the evaluator accepted
    pub fn is_confirmed(&self) -> bool {
        match (&self.candidate, self.accepted_iteration) {
            (Some(candidate), Some(accepted)) => candidate.iteration == accepted,
            _ => false,
        }
    }
}

/// One category's bounded extract/evaluate/refine loop
pub struct RefinementSession<'a, R, X, E> {
    narrative: &'a Narrative,
    extractor: &'a X,
    evaluator: &'a E,
    progress: SessionProgress<R>,
    publisher: watch::Sender<SessionProgress<R>>,
}

impl<'a, R, X, E> RefinementSession<'a, R, X, E>
where
    R: CategoryRecord,
    X: Extractor<R>,
    E: Evaluator<R>,
{
    pub fn new(
        narrative: &'a Narrative,
        extractor: &'a X,
        evaluator: &'a E,
        publisher: watch::Sender<SessionProgress<R>>,
    ) -> Self {
        let progress = publisher.borrow().clone();
        Self {
            narrative,
            extractor,
            evaluator,
            progress,
            publisher,
        }
    }

    pub async fn run(mut self) -> Result<SessionOutcome<R>, SessionError> {
        while !self.progress.state.is_terminal() {
            self.step().await?;
            self.publisher.send_replace(self.progress.clone());
        }

        tracing::info!(
            case_id = %self.narrative.case_id,
            category = %self.progress.category,
            state = ?self.progress.state,
            iterations = self.progress.iteration,
            "Refinement session finished"
        );

        Ok(self.progress.into_outcome())
    }

    async fn step(&mut self) -> Result<(), SessionError> {
        let category = self.progress.category;

        match self.progress.state {
            SessionState::Pending => {
                self.progress.iteration = 1;
                self.progress.transition(SessionState::Extracting);
            }
            SessionState::Extracting => {
                let iteration = self.progress.iteration;
                let refinement = match (&self.progress.current, self.progress.feedback_history.last()) {
                    (Some(previous), Some(feedback)) => Some(Refinement {
                        previous,
                        feedback: feedback.as_str(),
                    }),
                    _ => None,
                };

                let candidate = self
                    .extractor
                    .extract(self.narrative, iteration, refinement)
                    .await
                    .map_err(|source| SessionError {
                        task: InferenceTask::Extract(category),
                        source,
                    })?;

                if !candidate.is_empty() {
                    self.progress.best = Some(candidate.clone());
                }
                self.progress.current = Some(candidate);
                self.progress.transition(SessionState::Evaluating);
            }
            SessionState::Evaluating => {
                let verdict = match self.progress.current.as_ref() {
                    Some(candidate) => match local_verdict(candidate) {
                        Some(verdict) => verdict,
                        None => self
                            .evaluator
                            .evaluate(self.narrative, candidate)
                            .await
                            .map_err(|source| SessionError {
                                task: InferenceTask::Evaluate(category),
                                source,
                            })?,
                    },
                    None => EvaluationVerdict::rejected(category, "No extraction attempt completed."),
                };

                let accepted = verdict.accepted;
                if !accepted {
                    self.progress.feedback_history.push(verdict.feedback.clone());
                }
                self.progress.verdicts.push(verdict);

                if accepted {
                    self.progress.accepted_iteration = Some(self.progress.iteration);
                    self.progress.transition(SessionState::Accepted);
                } else if self.progress.iteration < self.progress.max_iterations {
                    self.progress.transition(SessionState::Refining);
                } else {
                    self.progress.transition(SessionState::Exhausted);
                }
            }
            SessionState::Refining => {
                self.progress.iteration += 1;
                debug_assert!(self.progress.iteration <= self.progress.max_iterations);
                self.progress.transition(SessionState::Extracting);
            }
            SessionState::Accepted | SessionState::Exhausted => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::extraction::ExtractedNetworkIoc;
    use crate::service::evaluation::LlmEvaluator;
    use crate::service::extraction::LlmExtractor;
    use crate::service::llm::InferenceClient;
    use crate::service::testing::{Reply, ScriptedRuntime, network_reply, verdict_reply};

    async fn run_network_session(
        runtime: Arc<ScriptedRuntime>,
        max_iterations: u32,
    ) -> SessionOutcome<ExtractedNetworkIoc> {
        let client = InferenceClient::new(runtime);
        let extractor = LlmExtractor::<ExtractedNetworkIoc>::new(client.clone(), "llama3.2");
        let evaluator = LlmEvaluator::new(client, "llama3.2");
        let narrative = Narrative::new("CASE-1", "Beacon to 1.2.3.4 and evil.example.com");
        let (tx, _rx) = watch::channel(SessionProgress::new(Category::Network, max_iterations));

        RefinementSession::new(&narrative, &extractor, &evaluator, tx)
            .run()
            .await
            .unwrap()
    }

    #[test]
    fn test_transition_table() {
        use SessionState::*;
        assert!(Pending.can_transition_to(Extracting));
        assert!(Evaluating.can_transition_to(Refining));
        assert!(Refining.can_transition_to(Extracting));
        assert!(!Refining.can_transition_to(Accepted));
        assert!(!Pending.can_transition_to(Evaluating));
        assert!(Accepted.allowed_transitions().is_empty());
        assert!(Exhausted.is_terminal());
        assert!(!Refining.is_terminal());
    }

    #[tokio::test]
    async fn test_accepted_on_first_attempt() {
        let runtime = Arc::new(ScriptedRuntime::new(|request, _| match request.task {
            InferenceTask::Extract(_) => Reply::text(network_reply(&["1.2.3.4"])),
            _ => Reply::text(verdict_reply(true, "")),
        }));

        let outcome = run_network_session(runtime.clone(), 3).await;

        assert_eq!(outcome.state, SessionState::Accepted);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.accepted_iteration, Some(1));
        assert_eq!(outcome.verdicts.len(), 1);
        assert!(outcome.is_confirmed());
        assert_eq!(runtime.calls_for(InferenceTask::Extract(Category::Network)), 1);
    }

    #[tokio::test]
    async fn test_exhausted_after_max_iterations() {
        let runtime = Arc::new(ScriptedRuntime::new(|request, nth| match request.task {
            InferenceTask::Extract(_) => {
                let ip = format!("10.0.0.{}", nth);
                Reply::text(network_reply(&[ip.as_str()]))
            }
            _ => Reply::text(verdict_reply(false, &format!("attempt {} incomplete", nth))),
        }));

        let outcome = run_network_session(runtime.clone(), 3).await;

        assert_eq!(outcome.state, SessionState::Exhausted);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.accepted_iteration, None);
        assert_eq!(outcome.verdicts.len(), 3);
        assert_eq!(
            outcome.feedback_history,
            vec![
                "attempt 1 incomplete".to_string(),
                "attempt 2 incomplete".to_string(),
                "attempt 3 incomplete".to_string(),
            ]
        );
        let candidate = outcome.candidate.as_ref().unwrap();
        assert_eq!(candidate.iteration, 3);
        assert_eq!(candidate.records[0].indicator, "10.0.0.3");
        assert!(!outcome.is_confirmed());
        assert_eq!(runtime.calls_for(InferenceTask::Evaluate(Category::Network)), 3);
    }

    #[tokio::test]
    async fn test_feedback_reaches_next_attempt() {
        let runtime = Arc::new(ScriptedRuntime::new(|request, nth| match request.task {
            InferenceTask::Extract(_) if nth == 1 => Reply::text(network_reply(&["1.2.3.4"])),
            InferenceTask::Extract(_) => {
                assert!(request.user.contains("missed evil.example.com"));
                Reply::text(network_reply(&["1.2.3.4", "evil.example.com"]))
            }
            _ if nth == 1 => Reply::text(verdict_reply(false, "missed evil.example.com")),
            _ => Reply::text(verdict_reply(true, "")),
        }));

        let outcome = run_network_session(runtime, 3).await;

        assert_eq!(outcome.state, SessionState::Accepted);
        assert_eq!(outcome.accepted_iteration, Some(2));
        assert_eq!(outcome.record_count(), 2);
    }

    #[tokio::test]
    async fn test_unparseable_then_empty_is_accepted_locally() {
        let runtime = Arc::new(ScriptedRuntime::new(|request, nth| match request.task {
            InferenceTask::Extract(_) if nth == 1 => Reply::text("not json"),
            InferenceTask::Extract(_) => {
                assert!(request.user.contains("could not be parsed"));
                Reply::text(r#"{"records": []}"#)
            }
            _ => panic!("evaluator must not be called for empty candidates"),
        }));

        let outcome = run_network_session(runtime.clone(), 3).await;

        assert_eq!(outcome.state, SessionState::Accepted);
        assert_eq!(outcome.accepted_iteration, Some(2));
        assert_eq!(outcome.record_count(), 0);
        assert_eq!(outcome.verdicts.len(), 2);
        assert_eq!(runtime.calls_for(InferenceTask::Evaluate(Category::Network)), 0);
    }

    #[tokio::test]
    async fn test_all_invalid_records_are_refined_not_accepted() {
        let runtime = Arc::new(ScriptedRuntime::new(|request, nth| match request.task {
            InferenceTask::Extract(_) if nth == 1 => Reply::text(
                r#"{"records": [{"indicator_type": "hostname", "indicator": "evil.example.com"}]}"#,
            ),
            InferenceTask::Extract(_) => {
                assert!(request.user.contains("unsupported indicator_type 'hostname'"));
                Reply::text(network_reply(&["evil.example.com"]))
            }
            _ => Reply::text(verdict_reply(true, "")),
        }));

        let outcome = run_network_session(runtime.clone(), 3).await;

        assert_eq!(outcome.state, SessionState::Accepted);
        assert_eq!(outcome.accepted_iteration, Some(2));
        assert_eq!(outcome.record_count(), 1);
        assert!(!outcome.verdicts[0].accepted);
        assert_eq!(runtime.calls_for(InferenceTask::Extract(Category::Network)), 2);
        assert_eq!(runtime.calls_for(InferenceTask::Evaluate(Category::Network)), 1);
    }

    #[tokio::test]
    async fn test_persistently_invalid_records_exhaust() {
        let runtime = Arc::new(ScriptedRuntime::new(|request, _| match request.task {
            InferenceTask::Extract(_) => Reply::text(
                r#"{"records": [{"indicator_type": "ip", "indicator": "   "}]}"#,
            ),
            _ => panic!("evaluator must not be called when every record is invalid"),
        }));

        let outcome = run_network_session(runtime, 2).await;

        assert_eq!(outcome.state, SessionState::Exhausted);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.record_count(), 0);
        assert!(outcome.feedback_history.iter().all(|f| f.contains("empty indicator")));
    }

    #[tokio::test]
    async fn test_exhausted_keeps_last_non_empty_candidate() {
        let runtime = Arc::new(ScriptedRuntime::new(|request, nth| match request.task {
            InferenceTask::Extract(_) if nth == 1 => Reply::text(network_reply(&["1.2.3.4"])),
            InferenceTask::Extract(_) => Reply::text("garbage"),
            _ => Reply::text(verdict_reply(false, "incomplete")),
        }));

        let outcome = run_network_session(runtime, 2).await;

        assert_eq!(outcome.state, SessionState::Exhausted);
        assert_eq!(outcome.iterations, 2);
        let candidate = outcome.candidate.unwrap();
        assert_eq!(candidate.iteration, 1);
        assert_eq!(candidate.records.len(), 1);
    }

    #[tokio::test]
    async fn test_single_iteration_budget() {
        let runtime = Arc::new(ScriptedRuntime::new(|request, _| match request.task {
            InferenceTask::Extract(_) => Reply::text(network_reply(&["1.2.3.4"])),
            _ => Reply::text(verdict_reply(false, "incomplete")),
        }));

        let outcome = run_network_session(runtime.clone(), 1).await;

        assert_eq!(outcome.state, SessionState::Exhausted);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(runtime.calls_for(InferenceTask::Extract(Category::Network)), 1);
    }
}
