//! LLM-extractable models for triage, extraction and evaluation

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::model::normalize::{
    collapse_whitespace, non_empty, normalize_host_indicator, normalize_network_indicator,
    truncate_chars,
};
use crate::model::Category;
use crate::model::limits;

const MAX_NOTES_CHARS: usize = 800;
const MAX_TIMELINE_NOTES_CHARS: usize = 1000;

pub const HOST_INDICATOR_TYPES: &[&str] = &[
    "file",
    "process",
    "registry",
    "service",
    "driver",
    "scheduled_task",
];

pub const NETWORK_INDICATOR_TYPES: &[&str] = &["ip", "domain", "fqdn", "url", "uri", "ja3", "ja3s"];

pub const TIMESTAMP_TYPES: &[&str] = &[
    "Creation Time",
    "Execution Time",
    "Event Time",
    "Discovery Time",
];

pub const STATUS_TAGS: &[&str] = &["Confirmed", "Suspicious", "Benign"];

const UNKNOWN_SYSTEM: &str = "Unknown";

/// Optional free text, cut to the column width
fn clipped(value: Option<String>, max_chars: usize) -> Option<String> {
    non_empty(value).map(|v| truncate_chars(&v, max_chars))
}

/// Optional exact value (hashes), dropped when it cannot be stored whole
fn fitting(value: Option<String>, max_chars: usize) -> Option<String> {
    non_empty(value).filter(|v| v.chars().count() <= max_chars)
}

fn check_width(what: &str, field: &str, value: &str, max_chars: usize) -> Result<(), String> {
    if value.chars().count() > max_chars {
        return Err(format!(
            "{} {} is longer than {} characters",
            what, field, max_chars
        ));
    }
    Ok(())
}

/// A record type one extractor capability produces
pub trait CategoryRecord:
    JsonSchema + DeserializeOwned + Serialize + Clone + fmt::Debug + Send + Sync + 'static
{
    const CATEGORY: Category;

    /// Check and clean the record in place; `Err` describes why it must be dropped
    fn validate(&mut self) -> Result<(), String>;

    /// Normalized value under which two records are the same observation
    fn dedup_key(&self) -> String;
}

/// Envelope the model must return for every extractor
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedRecords<T> {
    pub records: Vec<T>,
}

/// A host-based indicator of compromise
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedHostIoc {
    /// One of: file, process, registry, service, driver, scheduled_task
    pub indicator_type: String,
    /// The IOC itself (file name, process name, registry key, ...)
    pub indicator: String,
    /// Full path of the artifact, if known
    pub full_path: Option<String>,
    pub sha256: Option<String>,
    pub sha1: Option<String>,
    pub md5: Option<String>,
    /// Purpose or context of the artifact (e.g. 'persistence', 'dropper')
    pub type_purpose: Option<String>,
    pub size_bytes: Option<i64>,
    /// Where the IOC was observed (e.g. 'EDR', 'Sysmon', 'Analyst Observation')
    #[serde(default)]
    pub source: String,
    /// Analyst or system that reported the IOC
    pub submitted_by: Option<String>,
    pub notes: Option<String>,
}

/// A network-based indicator of compromise
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedNetworkIoc {
    /// One of: ip, domain, fqdn, url, uri, ja3, ja3s
    pub indicator_type: String,
    /// The IOC itself (IP address, domain, URL, fingerprint)
    pub indicator: String,
    /// Lead or context that surfaced the indicator
    pub initial_lead: Option<String>,
    pub details_comments: Option<String>,
    /// Earliest evidence time, ISO-8601 UTC with Z suffix
    pub earliest_evidence_utc: Option<String>,
    /// MITRE ATT&CK alignment, if clearly implied
    pub attack_alignment: Option<String>,
    /// Where the IOC was observed (e.g. 'Firewall', 'Proxy Logs')
    #[serde(default)]
    pub source: String,
    pub submitted_by: Option<String>,
    pub notes: Option<String>,
}

/// A discrete event in the incident timeline
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedTimelineEvent {
    /// When the event occurred, ISO-8601 UTC with Z suffix
    pub timestamp_utc: String,
    /// One of: Creation Time, Execution Time, Event Time, Discovery Time
    pub timestamp_type: String,
    /// One of: Confirmed, Suspicious, Benign
    pub status_tag: String,
    /// Hostname or asset where the event happened; 'Unknown' if not stated
    pub system_name: Option<String>,
    /// What happened
    pub activity: String,
    /// Evidence source (e.g. 'Sysmon', 'MFT', 'Firewall')
    pub evidence_source: String,
    pub details_comments: Option<String>,
    pub attack_alignment: Option<String>,
    pub size_bytes: Option<i64>,
    pub hash: Option<String>,
    pub submitted_by: Option<String>,
    pub notes: Option<String>,
}

impl ExtractedTimelineEvent {
    /// Parsed event time; only valid after `validate` succeeded
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_utc(&self.timestamp_utc)
    }
}

impl ExtractedNetworkIoc {
    pub fn parsed_earliest_evidence(&self) -> Option<DateTime<Utc>> {
        self.earliest_evidence_utc.as_deref().and_then(parse_utc)
    }
}

const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parse an ISO-8601 timestamp into UTC
///
/// Values with an offset are converted; values without one (including bare
/// dates, taken at midnight) are read as UTC.
pub fn parse_utc(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

impl CategoryRecord for ExtractedHostIoc {
    const CATEGORY: Category = Category::Host;

    fn validate(&mut self) -> Result<(), String> {
        self.indicator = collapse_whitespace(&self.indicator);
        if self.indicator.is_empty() {
            return Err("host record has an empty indicator".to_string());
        }
        check_width("host record", "indicator", &self.indicator, limits::INDICATOR)?;

        self.indicator_type = self.indicator_type.trim().to_lowercase();
        if !HOST_INDICATOR_TYPES.contains(&self.indicator_type.as_str()) {
            return Err(format!(
                "host indicator '{}' has unsupported indicator_type '{}'",
                self.indicator, self.indicator_type
            ));
        }

        if let Some(size) = self.size_bytes
            && size < 0
        {
            self.size_bytes = None;
        }

        self.full_path = clipped(self.full_path.take(), limits::FULL_PATH);
        self.sha256 = fitting(self.sha256.take(), limits::SHA256).map(|h| h.to_lowercase());
        self.sha1 = fitting(self.sha1.take(), limits::SHA1).map(|h| h.to_lowercase());
        self.md5 = fitting(self.md5.take(), limits::MD5).map(|h| h.to_lowercase());
        self.type_purpose = clipped(self.type_purpose.take(), limits::TYPE_PURPOSE);
        self.submitted_by = clipped(self.submitted_by.take(), limits::SUBMITTED_BY);
        self.notes = clipped(self.notes.take(), MAX_NOTES_CHARS);
        self.source = truncate_chars(self.source.trim(), limits::SOURCE);

        Ok(())
    }

    fn dedup_key(&self) -> String {
        normalize_host_indicator(&self.indicator)
    }
}

impl CategoryRecord for ExtractedNetworkIoc {
    const CATEGORY: Category = Category::Network;

    fn validate(&mut self) -> Result<(), String> {
        self.indicator = self.indicator.trim().to_string();
        if self.indicator.is_empty() {
            return Err("network record has an empty indicator".to_string());
        }
        check_width("network record", "indicator", &self.indicator, limits::INDICATOR)?;

        self.indicator_type = self.indicator_type.trim().to_lowercase();
        if !NETWORK_INDICATOR_TYPES.contains(&self.indicator_type.as_str()) {
            return Err(format!(
                "network indicator '{}' has unsupported indicator_type '{}'",
                self.indicator, self.indicator_type
            ));
        }

        // Domains are stored lowercase, URLs as seen
        if matches!(self.indicator_type.as_str(), "domain" | "fqdn") {
            self.indicator = self.indicator.to_lowercase();
        }

        self.earliest_evidence_utc = non_empty(self.earliest_evidence_utc.take());
        if let Some(ref ts) = self.earliest_evidence_utc
            && parse_utc(ts).is_none()
        {
            return Err(format!(
                "network indicator '{}' has an invalid earliest_evidence_utc '{}'",
                self.indicator, ts
            ));
        }

        self.initial_lead = clipped(self.initial_lead.take(), limits::INITIAL_LEAD);
        self.details_comments = non_empty(self.details_comments.take());
        self.attack_alignment = clipped(self.attack_alignment.take(), limits::ATTACK_ALIGNMENT);
        self.submitted_by = clipped(self.submitted_by.take(), limits::SUBMITTED_BY);
        self.notes = clipped(self.notes.take(), MAX_NOTES_CHARS);
        self.source = truncate_chars(self.source.trim(), limits::SOURCE);

        Ok(())
    }

    fn dedup_key(&self) -> String {
        normalize_network_indicator(&self.indicator)
    }
}

impl CategoryRecord for ExtractedTimelineEvent {
    const CATEGORY: Category = Category::Timeline;

    fn validate(&mut self) -> Result<(), String> {
        self.activity = collapse_whitespace(&self.activity);
        if self.activity.is_empty() {
            return Err("timeline event has an empty activity".to_string());
        }
        check_width("timeline event", "activity", &self.activity, limits::ACTIVITY)?;

        if parse_utc(&self.timestamp_utc).is_none() {
            return Err(format!(
                "timeline event '{}' has an invalid timestamp_utc '{}'",
                self.activity, self.timestamp_utc
            ));
        }

        if !TIMESTAMP_TYPES.contains(&self.timestamp_type.trim()) {
            return Err(format!(
                "timeline event '{}' has unsupported timestamp_type '{}'",
                self.activity, self.timestamp_type
            ));
        }
        self.timestamp_type = self.timestamp_type.trim().to_string();

        // Unknown tags are downgraded rather than dropped
        let tag = self.status_tag.trim();
        self.status_tag = STATUS_TAGS
            .iter()
            .find(|t| t.eq_ignore_ascii_case(tag))
            .unwrap_or(&"Suspicious")
            .to_string();

        self.system_name = Some(
            clipped(self.system_name.take(), limits::SYSTEM_NAME)
                .unwrap_or_else(|| UNKNOWN_SYSTEM.to_string()),
        );

        if let Some(size) = self.size_bytes
            && size < 0
        {
            self.size_bytes = None;
        }

        self.evidence_source = truncate_chars(self.evidence_source.trim(), limits::EVIDENCE_SOURCE);
        self.details_comments = clipped(self.details_comments.take(), MAX_TIMELINE_NOTES_CHARS);
        self.attack_alignment = clipped(self.attack_alignment.take(), limits::ATTACK_ALIGNMENT);
        self.hash = fitting(self.hash.take(), limits::HASH);
        self.submitted_by = clipped(self.submitted_by.take(), limits::SUBMITTED_BY);
        self.notes = clipped(self.notes.take(), MAX_TIMELINE_NOTES_CHARS);

        Ok(())
    }

    fn dedup_key(&self) -> String {
        let when = self
            .parsed_timestamp()
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| self.timestamp_utc.trim().to_string());
        format!(
            "{}|{}|{}",
            when,
            self.system_name.as_deref().unwrap_or(UNKNOWN_SYSTEM).to_lowercase(),
            collapse_whitespace(&self.activity).to_lowercase()
        )
    }
}

/// Applicability signal for one category
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedApplicability {
    /// True if the narrative likely contains this kind of artifact
    pub applicable: bool,
    /// Confidence between 0.0 and 1.0
    pub confidence: f32,
}

/// Triage classification over the three extractor capabilities
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedTriage {
    pub host: ExtractedApplicability,
    pub network: ExtractedApplicability,
    pub timeline: ExtractedApplicability,
}

impl ExtractedTriage {
    pub fn signal(&self, category: Category) -> &ExtractedApplicability {
        match category {
            Category::Host => &self.host,
            Category::Network => &self.network,
            Category::Timeline => &self.timeline,
        }
    }
}

/// Evaluator judgement of one candidate extraction
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedVerdict {
    /// True only if the extraction is complete and correct
    pub accepted: bool,
    /// Concrete, actionable gaps or errors; empty when accepted
    #[serde(default)]
    pub feedback: String,
}
