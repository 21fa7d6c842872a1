//! Refinement controller
//!
//! Runs one refinement session per applicable category, concurrently, under
//! the request's deadline. Each session owns its category's result slot; the
//! slots are only combined after the join.

use tokio::sync::watch;
use tokio::time::{Instant, timeout_at};

use crate::model::extraction::{
    CategoryRecord, ExtractedHostIoc, ExtractedNetworkIoc, ExtractedTimelineEvent,
};
use crate::model::{Category, Narrative, RoutingDecision, WorkflowConfig};
use crate::service::evaluation::Evaluator;
use crate::service::extraction::Extractor;

pub mod session;

pub use session::{
    RefinementSession, SessionError, SessionOutcome, SessionProgress, SessionState,
};

/// Terminal session results of one workflow run, one slot per category
///
/// A slot is `None` when triage did not route to that category.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub host: Option<SessionOutcome<ExtractedHostIoc>>,
    pub network: Option<SessionOutcome<ExtractedNetworkIoc>>,
    pub timeline: Option<SessionOutcome<ExtractedTimelineEvent>>,
}

impl RunOutcome {
    pub fn session_count(&self) -> usize {
        [
            self.host.is_some(),
            self.network.is_some(),
            self.timeline.is_some(),
        ]
        .iter()
        .filter(|&&ran| ran)
        .count()
    }

    /// Per-session summary, in category order
    pub fn reports(&self) -> Vec<SessionReport> {
        let mut reports = Vec::new();
        if let Some(outcome) = &self.host {
            reports.push(SessionReport::from(outcome));
        }
        if let Some(outcome) = &self.network {
            reports.push(SessionReport::from(outcome));
        }
        if let Some(outcome) = &self.timeline {
            reports.push(SessionReport::from(outcome));
        }
        reports
    }
}

/// Summary of one finished session, without its records
#[derive(Debug, Clone, PartialEq, serde::Serialize, utoipa::ToSchema)]
pub struct SessionReport {
    pub category: Category,
    #[schema(value_type = String)]
    pub state: SessionState,
    pub iterations: u32,
    pub accepted_iteration: Option<u32>,
    pub record_count: usize,
    pub forced_by_deadline: bool,
}

impl<R> From<&SessionOutcome<R>> for SessionReport {
    fn from(outcome: &SessionOutcome<R>) -> Self {
        Self {
            category: outcome.category,
            state: outcome.state,
            iterations: outcome.iterations,
            accepted_iteration: outcome.accepted_iteration,
            record_count: outcome.record_count(),
            forced_by_deadline: outcome.forced_by_deadline,
        }
    }
}

/// The three extractor capabilities of a run
pub struct Extractors<'a, H, N, T> {
    pub host: &'a H,
    pub network: &'a N,
    pub timeline: &'a T,
}

pub struct RefinementController {
    max_iterations: u32,
}

impl RefinementController {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
        }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(config.max_iterations())
    }

    /// Drive every routed category to a terminal state by `deadline`
    ///
    /// The first runtime failure aborts the remaining sessions and is
    /// returned; nothing of the run survives it.
    pub async fn run<H, N, T, E>(
        &self,
        narrative: &Narrative,
        routing: &RoutingDecision,
        extractors: Extractors<'_, H, N, T>,
        evaluator: &E,
        deadline: Instant,
    ) -> Result<RunOutcome, SessionError>
    where
        H: Extractor<ExtractedHostIoc>,
        N: Extractor<ExtractedNetworkIoc>,
        T: Extractor<ExtractedTimelineEvent>,
        E: Evaluator<ExtractedHostIoc>
            + Evaluator<ExtractedNetworkIoc>
            + Evaluator<ExtractedTimelineEvent>,
    {
        let start_time = std::time::Instant::now();

        tracing::info!(
            case_id = %narrative.case_id,
            sessions = routing.applicable_count(),
            max_iterations = self.max_iterations,
            remaining_ms = deadline.saturating_duration_since(Instant::now()).as_millis(),
            "Starting refinement sessions"
        );

        let (host, network, timeline) = tokio::try_join!(
            self.run_if_routed::<ExtractedHostIoc, _, _>(
                routing,
                narrative,
                extractors.host,
                evaluator,
                deadline
            ),
            self.run_if_routed::<ExtractedNetworkIoc, _, _>(
                routing,
                narrative,
                extractors.network,
                evaluator,
                deadline
            ),
            self.run_if_routed::<ExtractedTimelineEvent, _, _>(
                routing,
                narrative,
                extractors.timeline,
                evaluator,
                deadline
            ),
        )?;

        let outcome = RunOutcome {
            host,
            network,
            timeline,
        };

        tracing::info!(
            case_id = %narrative.case_id,
            sessions = outcome.session_count(),
            elapsed_ms = start_time.elapsed().as_millis(),
            "Refinement sessions complete"
        );

        Ok(outcome)
    }

    async fn run_if_routed<R, X, E>(
        &self,
        routing: &RoutingDecision,
        narrative: &Narrative,
        extractor: &X,
        evaluator: &E,
        deadline: Instant,
    ) -> Result<Option<SessionOutcome<R>>, SessionError>
    where
        R: CategoryRecord,
        X: Extractor<R>,
        E: Evaluator<R>,
    {
        if !routing.applies(R::CATEGORY) {
            return Ok(None);
        }
        self.run_session(narrative, extractor, evaluator, deadline)
            .await
            .map(Some)
    }

    /// Run one session; on deadline it is forced to `Exhausted`
    pub async fn run_session<R, X, E>(
        &self,
        narrative: &Narrative,
        extractor: &X,
        evaluator: &E,
        deadline: Instant,
    ) -> Result<SessionOutcome<R>, SessionError>
    where
        R: CategoryRecord,
        X: Extractor<R>,
        E: Evaluator<R>,
    {
        let (publisher, progress) =
            watch::channel(SessionProgress::new(R::CATEGORY, self.max_iterations));
        let session = RefinementSession::new(narrative, extractor, evaluator, publisher);

        match timeout_at(deadline, session.run()).await {
            Ok(result) => result,
            Err(_) => {
                // The session future is dropped here; its last published progress is final
                let snapshot = progress.borrow().clone();
                tracing::warn!(
                    case_id = %narrative.case_id,
                    category = %R::CATEGORY,
                    state = ?snapshot.state,
                    iteration = snapshot.iteration,
                    "Session deadline reached, forcing exhausted"
                );
                Ok(snapshot.force_exhausted())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::service::evaluation::LlmEvaluator;
    use crate::service::extraction::LlmExtractor;
    use crate::service::llm::{InferenceClient, InferenceError, InferenceTask};
    use crate::service::testing::{
        Reply, ScriptedRuntime, host_reply, network_reply, timeline_reply, verdict_reply,
    };

    struct Fixture {
        host: LlmExtractor<ExtractedHostIoc>,
        network: LlmExtractor<ExtractedNetworkIoc>,
        timeline: LlmExtractor<ExtractedTimelineEvent>,
        evaluator: LlmEvaluator,
    }

    impl Fixture {
        fn new(runtime: Arc<ScriptedRuntime>) -> Self {
            let client = InferenceClient::new(runtime);
            Self {
                host: LlmExtractor::new(client.clone(), "llama3.2"),
                network: LlmExtractor::new(client.clone(), "llama3.2"),
                timeline: LlmExtractor::new(client.clone(), "llama3.2"),
                evaluator: LlmEvaluator::new(client, "llama3.2"),
            }
        }

        async fn run(
            &self,
            controller: &RefinementController,
            routing: &RoutingDecision,
            deadline: Duration,
        ) -> Result<RunOutcome, SessionError> {
            let narrative = Narrative::new("CASE-1", "narrative");
            controller
                .run(
                    &narrative,
                    routing,
                    Extractors {
                        host: &self.host,
                        network: &self.network,
                        timeline: &self.timeline,
                    },
                    &self.evaluator,
                    Instant::now() + deadline,
                )
                .await
        }
    }

    fn answer_everything(request: &crate::service::llm::CompletionRequest) -> Reply {
        match request.task {
            InferenceTask::Extract(Category::Host) => Reply::text(host_reply(&["evil.exe"])),
            InferenceTask::Extract(Category::Network) => Reply::text(network_reply(&["1.2.3.4"])),
            InferenceTask::Extract(Category::Timeline) => {
                Reply::text(timeline_reply(&["psexec launched"]))
            }
            _ => Reply::text(verdict_reply(true, "")),
        }
    }

    #[tokio::test]
    async fn test_sessions_match_routing() {
        let runtime = Arc::new(ScriptedRuntime::new(|request, _| answer_everything(request)));
        let fixture = Fixture::new(runtime.clone());
        let controller = RefinementController::new(3);
        let deadline = Duration::from_secs(300);

        let routing = RoutingDecision::Classified {
            routes: vec![crate::model::CategoryRoute {
                category: Category::Network,
                confidence: Some(0.8),
            }],
        };
        let outcome = fixture.run(&controller, &routing, deadline).await.unwrap();

        assert_eq!(outcome.session_count(), 1);
        assert!(outcome.host.is_none());
        assert!(outcome.timeline.is_none());
        assert_eq!(runtime.calls_for(InferenceTask::Extract(Category::Host)), 0);
        assert_eq!(runtime.calls_for(InferenceTask::Extract(Category::Timeline)), 0);
    }

    #[tokio::test]
    async fn test_fail_open_runs_all_sessions() {
        let runtime = Arc::new(ScriptedRuntime::new(|request, _| answer_everything(request)));
        let fixture = Fixture::new(runtime.clone());
        let controller = RefinementController::new(3);
        let deadline = Duration::from_secs(300);

        let outcome = fixture
            .run(&controller, &RoutingDecision::fail_open("unparseable"), deadline)
            .await
            .unwrap();

        assert_eq!(outcome.session_count(), 3);
        for report in outcome.reports() {
            assert_eq!(report.state, SessionState::Accepted);
            assert!(report.iterations <= 3);
            assert_eq!(report.record_count, 1);
        }
    }

    #[tokio::test]
    async fn test_unavailable_runtime_aborts_run() {
        let runtime = Arc::new(ScriptedRuntime::new(|request, _| match request.task {
            InferenceTask::Evaluate(Category::Timeline) => Reply::Unavailable("refused".into()),
            _ => answer_everything(request),
        }));
        let fixture = Fixture::new(runtime);
        let controller = RefinementController::new(3);
        let deadline = Duration::from_secs(300);

        let err = fixture
            .run(&controller, &RoutingDecision::fail_open("unparseable"), deadline)
            .await
            .unwrap_err();

        assert_eq!(err.task, InferenceTask::Evaluate(Category::Timeline));
        assert!(matches!(err.source, InferenceError::Unavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_forces_exhausted_with_last_candidate() {
        let runtime = Arc::new(ScriptedRuntime::new(|request, nth| match request.task {
            InferenceTask::Extract(Category::Network) if nth == 1 => {
                Reply::text(network_reply(&["1.2.3.4"]))
            }
            InferenceTask::Extract(Category::Network) => Reply::Hang,
            InferenceTask::Evaluate(Category::Network) => {
                Reply::text(verdict_reply(false, "missed the C2 domain"))
            }
            _ => answer_everything(request),
        }));
        let fixture = Fixture::new(runtime);
        let controller = RefinementController::new(3);
        let deadline = Duration::from_secs(30);

        let outcome = fixture
            .run(&controller, &RoutingDecision::fail_open("unparseable"), deadline)
            .await
            .unwrap();

        let network = outcome.network.unwrap();
        assert!(network.forced_by_deadline);
        assert_eq!(network.state, SessionState::Exhausted);
        assert_eq!(network.iterations, 2);
        let candidate = network.candidate.unwrap();
        assert_eq!(candidate.iteration, 1);
        assert_eq!(candidate.records[0].indicator, "1.2.3.4");

        let host = outcome.host.unwrap();
        assert_eq!(host.state, SessionState::Accepted);
        assert!(!host.forced_by_deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_before_any_candidate() {
        let runtime = Arc::new(ScriptedRuntime::new(|_, _| Reply::Hang));
        let fixture = Fixture::new(runtime);
        let controller = RefinementController::new(3);
        let deadline = Duration::from_secs(30);

        let routing = RoutingDecision::Classified {
            routes: vec![crate::model::CategoryRoute {
                category: Category::Host,
                confidence: Some(0.9),
            }],
        };
        let outcome = fixture.run(&controller, &routing, deadline).await.unwrap();

        let host = outcome.host.unwrap();
        assert!(host.forced_by_deadline);
        assert!(host.candidate.is_none());
        assert_eq!(host.record_count(), 0);
    }
}
