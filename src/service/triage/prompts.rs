//! Prompts for narrative triage

use crate::model::Narrative;

/// System prompt for triage classification
pub const TRIAGE_SYSTEM_PROMPT: &str = r#"You are a cybersecurity analyst triage expert. Your task is to decide which kinds of artifacts an incident description contains, so that only the relevant extractors run.

## Categories

- **host**: host-based Indicators of Compromise. Files, processes, services, drivers, DLLs, registry keys or values, local file paths, scheduled tasks.
- **network**: network-based Indicators of Compromise. IP addresses (v4/v6), domains, FQDNs, URLs/URIs, JA3/JA3S fingerprints, C2 or beaconing endpoints.
- **timeline**: discrete activities with timestamps or a clear temporal ordering (e.g. 'psexec launched at 10:42', 'credentials dumped the next morning').

## Rules

- Mark a category applicable when the description likely contains at least one artifact of that kind.
- A description with ONLY IPs and domains is network-only: host is NOT applicable.
- When in doubt, mark the category applicable. Missing a category loses evidence; an extra pass costs only time.
- `confidence` is a number between 0.0 and 1.0.

Return only the JSON object, no commentary."#;

/// Build triage prompt from the narrative
pub fn build_triage_prompt(narrative: &Narrative) -> String {
    format!(
        "Incident Description (case {}):\n\n{}",
        narrative.case_id, narrative.text
    )
}
