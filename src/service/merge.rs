//! Merge stage: deduplicate session results and build the commit batch

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::extraction::{
    CategoryRecord, ExtractedHostIoc, ExtractedNetworkIoc, ExtractedTimelineEvent,
};
use crate::model::{
    Category, CommitBatch, HostIoc, NetworkIoc, Provenance, RecordStatus, TimelineEvent,
};
use crate::service::refinement::{RunOutcome, SessionOutcome};

/// A surviving record with the tags it is committed under
struct Tagged<R> {
    record: R,
    status: RecordStatus,
    provenance: Provenance,
}

/// Combine the per-category session results into one batch
///
/// Within each category the first record seen for a normalized key wins;
/// later duplicates are dropped. Records are `Confirmed` only if they come
/// from the iteration the evaluator accepted.
pub fn merge_run(case_id: &str, run_id: &str, outcome: &RunOutcome) -> CommitBatch {
    let now = Utc::now();

    let host_iocs = surviving(run_id, outcome.host.as_ref())
        .into_iter()
        .map(|tagged| host_ioc(case_id, tagged, now))
        .collect::<Vec<_>>();

    let network_iocs = surviving(run_id, outcome.network.as_ref())
        .into_iter()
        .map(|tagged| network_ioc(case_id, tagged, now))
        .collect::<Vec<_>>();

    let timeline_events = surviving(run_id, outcome.timeline.as_ref())
        .into_iter()
        .filter_map(|tagged| timeline_event(case_id, tagged, now))
        .collect::<Vec<_>>();

    let batch = CommitBatch {
        case_id: case_id.to_string(),
        run_id: run_id.to_string(),
        host_iocs,
        network_iocs,
        timeline_events,
    };

    let summary = batch.summary();
    tracing::info!(
        case_id = %case_id,
        run_id = %run_id,
        host = summary.host,
        network = summary.network,
        timeline = summary.timeline,
        "Merged run results"
    );

    batch
}

fn surviving<R: CategoryRecord>(
    run_id: &str,
    outcome: Option<&SessionOutcome<R>>,
) -> Vec<Tagged<R>> {
    let Some(outcome) = outcome else {
        return Vec::new();
    };
    let Some(candidate) = outcome.candidate.as_ref() else {
        return Vec::new();
    };

    let status = if outcome.is_confirmed() {
        RecordStatus::Confirmed
    } else {
        RecordStatus::Unconfirmed
    };

    let records = dedup_records(candidate.records.iter().cloned());
    let dropped = candidate.records.len() - records.len();
    if dropped > 0 {
        tracing::debug!(
            category = %R::CATEGORY,
            dropped = dropped,
            "Dropped duplicate records"
        );
    }

    records
        .into_iter()
        .map(|record| Tagged {
            record,
            status,
            provenance: Provenance {
                run_id: run_id.to_string(),
                capability: R::CATEGORY,
                iteration: candidate.iteration,
                model: candidate.model.clone(),
            },
        })
        .collect()
}

/// Keep the first record of every normalized key, in input order
pub fn dedup_records<R: CategoryRecord>(records: impl IntoIterator<Item = R>) -> Vec<R> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.dedup_key()))
        .collect()
}

fn record_id(category: Category) -> String {
    format!("{}-{}", category.id_prefix(), Uuid::new_v4())
}

fn host_ioc(case_id: &str, tagged: Tagged<ExtractedHostIoc>, now: DateTime<Utc>) -> HostIoc {
    let Tagged {
        record,
        status,
        provenance,
    } = tagged;

    HostIoc {
        indicator_id: record_id(Category::Host),
        case_id: case_id.to_string(),
        indicator_type: record.indicator_type,
        indicator: record.indicator,
        full_path: record.full_path,
        sha256: record.sha256,
        sha1: record.sha1,
        md5: record.md5,
        type_purpose: record.type_purpose,
        size_bytes: record.size_bytes,
        source: record.source,
        submitted_by: record.submitted_by,
        notes: record.notes,
        status,
        provenance,
        date_added: now,
    }
}

fn network_ioc(
    case_id: &str,
    tagged: Tagged<ExtractedNetworkIoc>,
    now: DateTime<Utc>,
) -> NetworkIoc {
    let earliest_evidence_utc = tagged.record.parsed_earliest_evidence();
    let Tagged {
        record,
        status,
        provenance,
    } = tagged;

    NetworkIoc {
        indicator_id: record_id(Category::Network),
        case_id: case_id.to_string(),
        indicator_type: record.indicator_type,
        indicator: record.indicator,
        initial_lead: record.initial_lead,
        details_comments: record.details_comments,
        earliest_evidence_utc,
        attack_alignment: record.attack_alignment,
        source: record.source,
        submitted_by: record.submitted_by,
        notes: record.notes,
        status,
        provenance,
        date_added: now,
    }
}

fn timeline_event(
    case_id: &str,
    tagged: Tagged<ExtractedTimelineEvent>,
    now: DateTime<Utc>,
) -> Option<TimelineEvent> {
    let Some(timestamp_utc) = tagged.record.parsed_timestamp() else {
        tracing::warn!(
            case_id = %case_id,
            timestamp = %tagged.record.timestamp_utc,
            "Skipping timeline event with unparseable timestamp"
        );
        return None;
    };
    let Tagged {
        record,
        status,
        provenance,
    } = tagged;

    Some(TimelineEvent {
        event_id: record_id(Category::Timeline),
        case_id: case_id.to_string(),
        timestamp_utc,
        timestamp_type: record.timestamp_type,
        status_tag: record.status_tag,
        system_name: record.system_name.unwrap_or_else(|| "Unknown".to_string()),
        activity: record.activity,
        evidence_source: record.evidence_source,
        details_comments: record.details_comments,
        attack_alignment: record.attack_alignment,
        size_bytes: record.size_bytes,
        hash: record.hash,
        submitted_by: record.submitted_by,
        notes: record.notes,
        status,
        provenance,
        date_added: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExtractionCandidate;
    use crate::service::refinement::SessionState;

    fn network(indicator_type: &str, indicator: &str) -> ExtractedNetworkIoc {
        ExtractedNetworkIoc {
            indicator_type: indicator_type.to_string(),
            indicator: indicator.to_string(),
            initial_lead: None,
            details_comments: None,
            earliest_evidence_utc: Some("2024-03-01T10:00:00Z".to_string()),
            attack_alignment: None,
            source: "Firewall".to_string(),
            submitted_by: None,
            notes: None,
        }
    }

    fn outcome<R>(
        category: Category,
        state: SessionState,
        iteration: u32,
        accepted_iteration: Option<u32>,
        records: Vec<R>,
    ) -> SessionOutcome<R> {
        SessionOutcome {
            category,
            state,
            iterations: iteration,
            accepted_iteration,
            candidate: Some(ExtractionCandidate::new(category, iteration, "llama3.2", records)),
            feedback_history: Vec::new(),
            verdicts: Vec::new(),
            forced_by_deadline: false,
        }
    }

    #[test]
    fn test_duplicate_indicators_collapse() {
        let run = RunOutcome {
            network: Some(outcome(
                Category::Network,
                SessionState::Accepted,
                1,
                Some(1),
                vec![
                    network("ip", "1.2.3.4"),
                    network("ip", "1[.]2[.]3[.]4"),
                    network("ip", " 1.2.3.4 "),
                    network("domain", "evil.example.com"),
                ],
            )),
            ..RunOutcome::default()
        };

        let batch = merge_run("CASE-1", "run-1", &run);

        assert_eq!(batch.network_iocs.len(), 2);
        assert_eq!(batch.network_iocs[0].indicator, "1.2.3.4");
        assert_eq!(batch.network_iocs[1].indicator, "evil.example.com");
        assert!(batch.host_iocs.is_empty());
        assert!(batch.timeline_events.is_empty());
    }

    #[test]
    fn test_accepted_iteration_is_confirmed() {
        let run = RunOutcome {
            network: Some(outcome(
                Category::Network,
                SessionState::Accepted,
                2,
                Some(2),
                vec![network("ip", "1.2.3.4")],
            )),
            ..RunOutcome::default()
        };

        let batch = merge_run("CASE-1", "run-1", &run);
        let ioc = &batch.network_iocs[0];

        assert_eq!(ioc.status, RecordStatus::Confirmed);
        assert_eq!(ioc.provenance.iteration, 2);
        assert_eq!(ioc.provenance.capability, Category::Network);
        assert_eq!(ioc.provenance.run_id, "run-1");
        assert!(ioc.indicator_id.starts_with("N-"));
        assert!(ioc.earliest_evidence_utc.is_some());
    }

    #[test]
    fn test_exhausted_records_are_unconfirmed() {
        let run = RunOutcome {
            network: Some(outcome(
                Category::Network,
                SessionState::Exhausted,
                3,
                None,
                vec![network("ip", "1.2.3.4")],
            )),
            ..RunOutcome::default()
        };

        let batch = merge_run("CASE-1", "run-1", &run);

        assert_eq!(batch.network_iocs[0].status, RecordStatus::Unconfirmed);
        assert_eq!(batch.network_iocs[0].provenance.iteration, 3);
    }

    #[test]
    fn test_record_ids_are_unique() {
        let run = RunOutcome {
            network: Some(outcome(
                Category::Network,
                SessionState::Accepted,
                1,
                Some(1),
                vec![network("ip", "1.2.3.4"), network("ip", "5.6.7.8")],
            )),
            ..RunOutcome::default()
        };

        let batch = merge_run("CASE-1", "run-1", &run);

        assert_ne!(
            batch.network_iocs[0].indicator_id,
            batch.network_iocs[1].indicator_id
        );
        for ioc in &batch.network_iocs {
            assert!(ioc.indicator_id.starts_with("N-"));
            assert!(ioc.indicator_id.len() <= crate::model::limits::RECORD_ID);
        }
    }

    #[test]
    fn test_empty_run_gives_empty_batch() {
        let batch = merge_run("CASE-1", "run-1", &RunOutcome::default());
        assert!(batch.is_empty());
        assert_eq!(batch.summary().host, 0);
    }
}
