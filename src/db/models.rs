//! Database rows for case artifacts

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::model::{Category, HostIoc, NetworkIoc, Provenance, RecordStatus, TimelineEvent};

#[derive(Debug, Clone, FromRow)]
pub struct HostIocRow {
    pub indicator_id: String,
    pub case_id: String,
    pub run_id: String,
    pub indicator_type: String,
    pub indicator: String,
    pub full_path: Option<String>,
    pub sha256: Option<String>,
    pub sha1: Option<String>,
    pub md5: Option<String>,
    pub type_purpose: Option<String>,
    pub size_bytes: Option<i64>,
    pub source: String,
    pub submitted_by: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    pub capability: String,
    pub iteration: i32,
    pub model: String,
    pub date_added: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct NetworkIocRow {
    pub indicator_id: String,
    pub case_id: String,
    pub run_id: String,
    pub indicator_type: String,
    pub indicator: String,
    pub initial_lead: Option<String>,
    pub details_comments: Option<String>,
    pub earliest_evidence_utc: Option<DateTime<Utc>>,
    pub attack_alignment: Option<String>,
    pub source: String,
    pub submitted_by: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    pub capability: String,
    pub iteration: i32,
    pub model: String,
    pub date_added: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct TimelineRow {
    pub event_id: String,
    pub case_id: String,
    pub run_id: String,
    pub timestamp_utc: DateTime<Utc>,
    pub timestamp_type: String,
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
    pub status: String,
    pub capability: String,
    pub iteration: i32,
    pub model: String,
    pub date_added: DateTime<Utc>,
}

/// Helper to convert Category to string for database storage
pub fn category_to_string(category: Category) -> &'static str {
    category.as_str()
}

fn category_from_string(value: &str) -> Result<Category, String> {
    match value {
        "host" => Ok(Category::Host),
        "network" => Ok(Category::Network),
        "timeline" => Ok(Category::Timeline),
        other => Err(format!("Unknown capability: {}", other)),
    }
}

fn provenance(run_id: String, capability: &str, iteration: i32, model: String) -> Result<Provenance, String> {
    Ok(Provenance {
        run_id,
        capability: category_from_string(capability)?,
        iteration: u32::try_from(iteration).map_err(|e| format!("Invalid iteration: {}", e))?,
        model,
    })
}

impl HostIocRow {
    /// Convert database row to domain model
    pub fn into_domain(self) -> Result<HostIoc, String> {
        let provenance = provenance(self.run_id, &self.capability, self.iteration, self.model)?;
        Ok(HostIoc {
            indicator_id: self.indicator_id,
            case_id: self.case_id,
            indicator_type: self.indicator_type,
            indicator: self.indicator,
            full_path: self.full_path,
            sha256: self.sha256,
            sha1: self.sha1,
            md5: self.md5,
            type_purpose: self.type_purpose,
            size_bytes: self.size_bytes,
            source: self.source,
            submitted_by: self.submitted_by,
            notes: self.notes,
            status: RecordStatus::parse(&self.status),
            provenance,
            date_added: self.date_added,
        })
    }
}

impl NetworkIocRow {
    /// Convert database row to domain model
    pub fn into_domain(self) -> Result<NetworkIoc, String> {
        let provenance = provenance(self.run_id, &self.capability, self.iteration, self.model)?;
        Ok(NetworkIoc {
            indicator_id: self.indicator_id,
            case_id: self.case_id,
            indicator_type: self.indicator_type,
            indicator: self.indicator,
            initial_lead: self.initial_lead,
            details_comments: self.details_comments,
            earliest_evidence_utc: self.earliest_evidence_utc,
            attack_alignment: self.attack_alignment,
            source: self.source,
            submitted_by: self.submitted_by,
            notes: self.notes,
            status: RecordStatus::parse(&self.status),
            provenance,
            date_added: self.date_added,
        })
    }
}

impl TimelineRow {
    /// Convert database row to domain model
    pub fn into_domain(self) -> Result<TimelineEvent, String> {
        let provenance = provenance(self.run_id, &self.capability, self.iteration, self.model)?;
        Ok(TimelineEvent {
            event_id: self.event_id,
            case_id: self.case_id,
            timestamp_utc: self.timestamp_utc,
            timestamp_type: self.timestamp_type,
            status_tag: self.status_tag,
            system_name: self.system_name,
            activity: self.activity,
            evidence_source: self.evidence_source,
            details_comments: self.details_comments,
            attack_alignment: self.attack_alignment,
            size_bytes: self.size_bytes,
            hash: self.hash,
            submitted_by: self.submitted_by,
            notes: self.notes,
            status: RecordStatus::parse(&self.status),
            provenance,
            date_added: self.date_added,
        })
    }
}
