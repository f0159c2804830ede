//! `[FINDING] ... [/FINDING]` block grammar parser (§4.5, §6). This is the
//! one place raw model text crosses into domain types, matching the
//! teacher's policy-engine idiom of parsing a structured text format into
//! typed records in one dedicated function (`integrations/policy_engine/engine.rs`).

use std::time::SystemTime;

use crate::types::{Category, Disposition, Finding, FindingId, FindingSource, Severity};

#[derive(Debug, Clone, Default)]
pub struct ParsedFinding {
    pub key: Option<String>,
    pub severity: Option<String>,
    pub category: Option<String>,
    pub resource: Option<String>,
    pub resource_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub recommendation: Option<String>,
    pub evidence: Option<String>,
}

/// Scans `text` for `[FINDING]`/`[/FINDING]` delimited blocks and parses
/// `KEY: value` lines (case-insensitive key) inside each. A block missing
/// `title` or `description` is dropped.
pub fn parse_finding_blocks(text: &str) -> Vec<ParsedFinding> {
    let mut out = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("[FINDING]") {
        let after_start = &rest[start + "[FINDING]".len()..];
        let Some(end) = after_start.find("[/FINDING]") else { break };
        let block = &after_start[..end];
        rest = &after_start[end + "[/FINDING]".len()..];

        let parsed = parse_block(block);
        if parsed.title.is_some() && parsed.description.is_some() {
            out.push(parsed);
        }
    }

    out
}

fn parse_block(block: &str) -> ParsedFinding {
    let mut parsed = ParsedFinding::default();
    for line in block.lines() {
        let line = line.trim();
        let Some((key, value)) = line.split_once(':').or_else(|| line.split_once('=')) else { continue };
        let key = key.trim().to_ascii_uppercase();
        let value = value.trim().to_string();
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            "KEY" => parsed.key = Some(value),
            "SEVERITY" => parsed.severity = Some(value),
            "CATEGORY" => parsed.category = Some(value),
            "RESOURCE" => parsed.resource = Some(value),
            "RESOURCE_TYPE" => parsed.resource_type = Some(value),
            "TITLE" => parsed.title = Some(value),
            "DESCRIPTION" => parsed.description = Some(value),
            "RECOMMENDATION" => parsed.recommendation = Some(value),
            "EVIDENCE" => parsed.evidence = Some(value),
            _ => {}
        }
    }
    parsed
}

/// Converts a parsed block into a domain `Finding`, defaulting an unknown
/// severity to `info` and an unknown category to `performance`.
pub fn into_finding(parsed: ParsedFinding, now: SystemTime) -> Finding {
    let title = parsed.title.unwrap_or_default();
    let resource_id = parsed.resource.unwrap_or_default();
    let category = parsed
        .category
        .map(|c| Category::from_str_loose(&c))
        .unwrap_or(Category::Performance);

    Finding {
        id: FindingId(uuid::Uuid::nil()),
        key: crate::types::normalize_key(&title),
        severity: parsed.severity.map(|s| Severity::from_str_loose(&s)).unwrap_or(Severity::Info),
        category,
        resource_name: resource_id.clone(),
        resource_id,
        resource_type: parsed.resource_type.unwrap_or_else(|| "unknown".to_string()),
        node: None,
        title,
        description: parsed.description.unwrap_or_default(),
        recommendation: parsed.recommendation,
        evidence: parsed.evidence,
        source: FindingSource::Patrol,
        detected_at: now,
        last_seen_at: now,
        disposition: Disposition::Active,
        user_note: None,
        times_raised: 1,
        alert_id: None,
        investigation: Default::default(),
    }
}
