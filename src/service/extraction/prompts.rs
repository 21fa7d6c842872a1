//! Prompts for the host, network and timeline extractors

use crate::model::{Category, Narrative};

/// System prompt for host-based IOC extraction
pub const HOST_SYSTEM_PROMPT: &str = r#"You are a cybersecurity analyst. Extract ONLY **host-based** IOCs from the incident narrative.

## Scope (allowed)

- Files, processes, services, drivers, DLLs, local executables
- Registry keys/values
- Local file paths
- Scheduled tasks
- Local user/host artifacts (NOT network identifiers)

## Out of scope (exclude completely)

- Any IP addresses (v4/v6), domains, FQDNs, URLs, URIs, ports, beacons
- Pure network telemetry (flows, DNS-only data)
- High-level events without a host artifact

## Requirements

- `indicator_type` must be one of: 'file', 'process', 'registry', 'service', 'driver', 'scheduled_task'
- `source` and `submitted_by` are short human labels (e.g. 'Sysmon', 'analyst1')
- `size_bytes` is an integer or null
- Use null for absent hashes and for an unknown `full_path`
- Keep `notes` under 800 characters

Return only the JSON object. If no host IOCs exist, return an empty `records` array."#;

/// System prompt for network-based IOC extraction
pub const NETWORK_SYSTEM_PROMPT: &str = r#"You are a cybersecurity analyst. Extract ONLY **network-based** IOCs from the incident narrative.

## Scope (allowed)

- IP addresses (v4/v6), domains, FQDNs, URLs/URIs
- Ports if strongly bound to the indicator or lead
- JA3/JA3S fingerprints if explicitly present
- C2 / beaconing endpoints from proxy, firewall or EDR logs

## Out of scope (exclude completely)

- File names/paths, processes, registry, scheduled tasks, host-side artifacts
- Generic events without a network indicator

## Requirements

- `indicator_type` must be one of: 'ip', 'domain', 'fqdn', 'url', 'uri', 'ja3', 'ja3s'
- Normalize domains to lowercase; preserve URLs as seen
- `earliest_evidence_utc` is ISO-8601 with a Z suffix if present, else null
- Keep `attack_alignment` concise (MITRE style) if clearly implied, else null
- Keep `notes` under 800 characters

Return only the JSON object. If no network IOCs exist, return an empty `records` array."#;

/// System prompt for timeline extraction
pub const TIMELINE_SYSTEM_PROMPT: &str = r#"You are a cybersecurity analyst. Extract **timeline events** (not raw IOCs) from the incident narrative.

## Scope (include)

- Discrete activities with timestamps or clear temporal ordering
- Actor/tool behaviors (e.g. 'psexec launched', 'credential dump'), hostnames and sources
- Evidence sources (e.g. 'Sysmon', 'MFT', 'Firewall')

## Out of scope

- Pure indicators without an event context
- Free-floating IOCs with no time semantics

## Requirements

- `timestamp_utc` is the time the event occurred (or the best specific time), ISO-8601 with a Z suffix
- `timestamp_type` is one of: 'Creation Time', 'Execution Time', 'Event Time', 'Discovery Time'
- `status_tag` is one of: 'Confirmed', 'Suspicious', 'Benign'
- `system_name` must not be null: use the hostname or asset label if present, otherwise 'Unknown'
- `attack_alignment` is a concise MITRE tactic if clear, else null
- `size_bytes` is an integer or null; `hash` is a string or null
- Keep `details_comments` and `notes` under 1000 characters

Return only the JSON object. If no timeline events exist, return an empty `records` array."#;

pub fn system_prompt(category: Category) -> &'static str {
    match category {
        Category::Host => HOST_SYSTEM_PROMPT,
        Category::Network => NETWORK_SYSTEM_PROMPT,
        Category::Timeline => TIMELINE_SYSTEM_PROMPT,
    }
}

/// Build the user prompt for one extraction attempt
///
/// On refinement the previous attempt and the evaluator's feedback are
/// appended so the model corrects specific gaps instead of starting over.
pub fn build_extraction_prompt(
    narrative: &Narrative,
    previous: Option<&str>,
    feedback: Option<&str>,
    validation_notes: &[String],
) -> String {
    let mut prompt = format!("Incident Description:\n\n{}\n", narrative.text);

    if let Some(previous) = previous {
        prompt.push_str("\n---\n\n## Your Previous Attempt\n\n");
        prompt.push_str(previous);
        prompt.push('\n');
    }

    if !validation_notes.is_empty() {
        prompt.push_str("\n## Records Rejected By Validation\n\n");
        for note in validation_notes {
            prompt.push_str("- ");
            prompt.push_str(note);
            prompt.push('\n');
        }
    }

    if let Some(feedback) = feedback {
        prompt.push_str(
            "\nYour previous attempt was not perfect. Please improve it based on this feedback:\n\n",
        );
        prompt.push_str(feedback);
        prompt.push('\n');
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_has_no_feedback_section() {
        let narrative = Narrative::new("CASE-1", "evil.exe dropped in C:\\Temp");
        let prompt = build_extraction_prompt(&narrative, None, None, &[]);

        assert!(prompt.contains("evil.exe dropped"));
        assert!(!prompt.contains("previous attempt"));
        assert!(!prompt.contains("Previous Attempt"));
    }

    #[test]
    fn test_refinement_includes_feedback_and_notes() {
        let narrative = Narrative::new("CASE-1", "evil.exe dropped in C:\\Temp");
        let notes = vec!["host indicator 'x' has unsupported indicator_type 'ip'".to_string()];
        let prompt = build_extraction_prompt(
            &narrative,
            Some(r#"{"records": []}"#),
            Some("missed evil.exe"),
            &notes,
        );

        assert!(prompt.contains("missed evil.exe"));
        assert!(prompt.contains("unsupported indicator_type"));
        assert!(prompt.contains(r#"{"records": []}"#));
    }
}
