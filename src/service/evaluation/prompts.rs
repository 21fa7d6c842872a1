//! Prompts for candidate evaluation

use crate::model::{Category, Narrative};

/// System prompt for the quality-control reviewer
pub const EVALUATION_SYSTEM_PROMPT: &str = r#"You are a senior cybersecurity analyst responsible for quality control of extracted incident artifacts.

You receive an incident description and a set of records that another analyst extracted from it. Re-read the description independently, then judge the extraction.

## Your task

1. Check correctness: every record must be supported by the description and use the required field formats.
2. Check completeness: list any artifact of the requested kind that the description mentions but the extraction missed.
3. Check scope: records of another kind (e.g. an IP address in a host extraction) are errors.

## Output

- `accepted`: true only if the extraction is complete and correct and needs no changes.
- `feedback`: when not accepted, brief and actionable points naming concrete gaps
  (e.g. "Missed the C2 domain mentioned in paragraph 2.", "indicator_type of svchost.exe should be 'process'.").
  Leave it empty when accepted.

Do not try to fix the records yourself. Return only the JSON object."#;

/// Build the review prompt for one candidate
pub fn build_evaluation_prompt(
    narrative: &Narrative,
    category: Category,
    records_json: &str,
    validation_notes: &[String],
) -> String {
    let mut prompt = format!(
        r#"Review the following {category} records extracted from the incident description.

## Incident Description

{}

## Extracted {category} Records

{records_json}
"#,
        narrative.text
    );

    if !validation_notes.is_empty() {
        prompt.push_str("\n## Records Dropped By Format Validation\n\n");
        for note in validation_notes {
            prompt.push_str("- ");
            prompt.push_str(note);
            prompt.push('\n');
        }
    }

    prompt
}
