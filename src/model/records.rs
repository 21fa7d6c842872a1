use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::Category;

/// Whether the evaluator accepted the iteration that produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum RecordStatus {
    Confirmed,
    Unconfirmed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Confirmed => "Confirmed",
            RecordStatus::Unconfirmed => "Unconfirmed",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("confirmed") {
            RecordStatus::Confirmed
        } else {
            RecordStatus::Unconfirmed
        }
    }
}

/// Which workflow run, capability and iteration produced a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Provenance {
    pub run_id: String,
    pub capability: Category,
    pub iteration: u32,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HostIoc {
    pub indicator_id: String,
    pub case_id: String,
    pub indicator_type: String,
    pub indicator: String,
    pub full_path: Option<String>,
    pub sha256: Option<String>,
    pub sha1: Option<String>,
    pub md5: Option<String>,
    pub type_purpose: Option<String>,
    pub size_bytes: Option<i64>,
    /// Where the indicator was observed, as reported in the narrative
    pub source: String,
    pub submitted_by: Option<String>,
    pub notes: Option<String>,
    pub status: RecordStatus,
    pub provenance: Provenance,
    pub date_added: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NetworkIoc {
    pub indicator_id: String,
    pub case_id: String,
    pub indicator_type: String,
    pub indicator: String,
    pub initial_lead: Option<String>,
    pub details_comments: Option<String>,
    pub earliest_evidence_utc: Option<DateTime<Utc>>,
    pub attack_alignment: Option<String>,
    pub source: String,
    pub submitted_by: Option<String>,
    pub notes: Option<String>,
    pub status: RecordStatus,
    pub provenance: Provenance,
    pub date_added: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TimelineEvent {
    pub event_id: String,
    pub case_id: String,
    pub timestamp_utc: DateTime<Utc>,
    pub timestamp_type: String,
    /// Event classification from the narrative (Confirmed, Suspicious, Benign)
    pub status_tag: String,
    pub system_name: String,
    pub activity: String,
    pub evidence_source: String,
    pub details_comments: Option<String>,
    pub attack_alignment: Option<String>,
    pub size_bytes: Option<i64>,
    pub hash: Option<String>,
    pub submitted_by: Option<String>,
    pub notes: Option<String>,
    pub status: RecordStatus,
    pub provenance: Provenance,
    pub date_added: DateTime<Utc>,
}

/// All committed artifacts of a case
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CaseData {
    pub host_iocs: Vec<HostIoc>,
    pub network_iocs: Vec<NetworkIoc>,
    pub timeline_events: Vec<TimelineEvent>,
}

/// Per-category record counts of one workflow run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RunSummary {
    pub host: usize,
    pub network: usize,
    pub timeline: usize,
}

/// Records of one workflow run, written as a single logical batch
#[derive(Debug, Clone)]
pub struct CommitBatch {
    pub case_id: String,
    pub run_id: String,
    pub host_iocs: Vec<HostIoc>,
    pub network_iocs: Vec<NetworkIoc>,
    pub timeline_events: Vec<TimelineEvent>,
}

impl CommitBatch {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            host: self.host_iocs.len(),
            network: self.network_iocs.len(),
            timeline: self.timeline_events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.host_iocs.is_empty() && self.network_iocs.is_empty() && self.timeline_events.is_empty()
    }
}
