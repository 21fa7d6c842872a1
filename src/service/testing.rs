//! In-process fakes for the inference runtime and the case store

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::db::{CaseStore, DbError};
use crate::model::{CaseData, CommitBatch};
use crate::service::llm::{CompletionRequest, InferenceError, InferenceRuntime, InferenceTask};

/// Scripted answer to one completion call
pub(crate) enum Reply {
    Text(String),
    Unavailable(String),
    /// Never answers
    Hang,
}

impl Reply {
    pub(crate) fn text(body: impl Into<String>) -> Self {
        Reply::Text(body.into())
    }
}

type Handler = dyn Fn(&CompletionRequest, usize) -> Reply + Send + Sync;

/// Runtime whose answers come from a closure
///
/// The closure receives the request and the 1-based number of the call for
/// that request's task, so `Extract(Host)` calls are numbered by iteration.
pub(crate) struct ScriptedRuntime {
    models: Vec<String>,
    handler: Box<Handler>,
    calls: Mutex<HashMap<InferenceTask, usize>>,
}

impl ScriptedRuntime {
    pub(crate) fn new(
        handler: impl Fn(&CompletionRequest, usize) -> Reply + Send + Sync + 'static,
    ) -> Self {
        Self {
            models: vec!["llama3.2:latest".to_string(), "qwen2.5:7b".to_string()],
            handler: Box::new(handler),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn with_models(mut self, models: &[&str]) -> Self {
        self.models = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub(crate) fn calls_for(&self, task: InferenceTask) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&task)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl InferenceRuntime for ScriptedRuntime {
    async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        Ok(self.models.clone())
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError> {
        let nth = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(request.task).or_insert(0);
            *count += 1;
            *count
        };

        match (self.handler)(request, nth) {
            Reply::Text(body) => Ok(body),
            Reply::Unavailable(reason) => Err(InferenceError::Unavailable(reason)),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Runtime that cannot be reached at all
pub(crate) struct OfflineRuntime;

#[async_trait]
impl InferenceRuntime for OfflineRuntime {
    async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        Err(InferenceError::Unavailable("connection refused".to_string()))
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String, InferenceError> {
        Err(InferenceError::Unavailable("connection refused".to_string()))
    }
}

/// Case store kept in memory; a batch becomes visible in one step
#[derive(Default)]
pub(crate) struct MemoryCaseStore {
    cases: Mutex<HashMap<String, CaseData>>,
    fail_writes: AtomicBool,
    write_attempts: AtomicUsize,
}

impl MemoryCaseStore {
    pub(crate) fn failing() -> Self {
        let store = Self::default();
        store.fail_writes.store(true, Ordering::SeqCst);
        store
    }

    pub(crate) fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaseStore for MemoryCaseStore {
    async fn write_batch(&self, batch: &CommitBatch) -> Result<(), DbError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::Connection(sqlx::Error::PoolTimedOut));
        }

        let mut cases = self.cases.lock().unwrap();
        let case = cases.entry(batch.case_id.clone()).or_default();
        case.host_iocs.extend(batch.host_iocs.iter().cloned());
        case.network_iocs.extend(batch.network_iocs.iter().cloned());
        case.timeline_events.extend(batch.timeline_events.iter().cloned());
        Ok(())
    }

    async fn read_case_data(&self, case_id: &str) -> Result<CaseData, DbError> {
        Ok(self
            .cases
            .lock()
            .unwrap()
            .get(case_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// JSON body of an extractor reply with one network indicator
pub(crate) fn network_reply(indicators: &[&str]) -> String {
    let records: Vec<serde_json::Value> = indicators
        .iter()
        .map(|indicator| {
            serde_json::json!({
                "indicator_type": if indicator.parse::<std::net::IpAddr>().is_ok() { "ip" } else { "domain" },
                "indicator": indicator,
                "source": "Proxy Logs",
            })
        })
        .collect();
    serde_json::json!({ "records": records }).to_string()
}

/// JSON body of an extractor reply with host file indicators
pub(crate) fn host_reply(indicators: &[&str]) -> String {
    let records: Vec<serde_json::Value> = indicators
        .iter()
        .map(|indicator| {
            serde_json::json!({
                "indicator_type": "file",
                "indicator": indicator,
                "source": "EDR",
            })
        })
        .collect();
    serde_json::json!({ "records": records }).to_string()
}

/// JSON body of an extractor reply with timeline events on `WS-01`
pub(crate) fn timeline_reply(activities: &[&str]) -> String {
    let records: Vec<serde_json::Value> = activities
        .iter()
        .enumerate()
        .map(|(i, activity)| {
            serde_json::json!({
                "timestamp_utc": format!("2024-03-01T10:{:02}:00Z", i),
                "timestamp_type": "Event Time",
                "status_tag": "Confirmed",
                "system_name": "WS-01",
                "activity": activity,
                "evidence_source": "Sysmon",
            })
        })
        .collect();
    serde_json::json!({ "records": records }).to_string()
}

pub(crate) fn triage_reply(host: bool, network: bool, timeline: bool) -> String {
    serde_json::json!({
        "host": { "applicable": host, "confidence": 0.9 },
        "network": { "applicable": network, "confidence": 0.9 },
        "timeline": { "applicable": timeline, "confidence": 0.9 },
    })
    .to_string()
}

pub(crate) fn verdict_reply(accepted: bool, feedback: &str) -> String {
    serde_json::json!({ "accepted": accepted, "feedback": feedback }).to_string()
}
