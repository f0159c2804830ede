//! Deterministic tool classifier (§4.3): maps a tool name to a `ToolKind`
//! using a fixed precedence of lookup tables rather than branching
//! heuristics, the same "encode as data, not control flow" idiom the
//! teacher's policy engine uses for its rule tables
//! (`integrations/policy_engine/engine.rs`).

use super::ToolKind;

/// Tier 1: exact tool-name overrides. Checked first so a specific tool can
/// always be pinned regardless of what its name or declared kind would
/// otherwise suggest.
const EXACT_OVERRIDES: &[(&str, ToolKind)] = &[
    ("pulse_query", ToolKind::Resolve),
    ("pulse_read", ToolKind::Read),
    ("pulse_metrics", ToolKind::Read),
    ("pulse_docker", ToolKind::Read),
    ("pulse_control", ToolKind::Write),
];

/// Tier 2: name-prefix rules, longest-prefix-first.
const PREFIX_RULES: &[(&str, ToolKind)] = &[
    ("resolve_", ToolKind::Resolve),
    ("lookup_", ToolKind::Resolve),
    ("find_", ToolKind::Resolve),
    ("write_", ToolKind::Write),
    ("set_", ToolKind::Write),
    ("update_", ToolKind::Write),
    ("delete_", ToolKind::Write),
    ("create_", ToolKind::Write),
    ("control_", ToolKind::Write),
    ("restart_", ToolKind::Write),
    ("read_", ToolKind::Read),
    ("get_", ToolKind::Read),
    ("list_", ToolKind::Read),
    ("query_", ToolKind::Read),
];

/// Tier 3: name-substring rules for tools that don't follow a verb-prefix
/// naming convention but still carry a recognizable action word.
const SUBSTRING_RULES: &[(&str, ToolKind)] = &[
    ("docker", ToolKind::Read),
    ("metrics", ToolKind::Read),
    ("control", ToolKind::Write),
    ("mutate", ToolKind::Write),
];

/// Tier 4: fallback when nothing above matched.
const DEFAULT_KIND: ToolKind = ToolKind::Read;

pub struct ToolClassifier;

impl ToolClassifier {
    /// Classifies `tool_name` by walking tiers 1-4 in order and returning the
    /// first match; falls back to `DEFAULT_KIND`.
    pub fn classify(tool_name: &str) -> ToolKind {
        if let Some((_, kind)) = EXACT_OVERRIDES.iter().find(|(name, _)| *name == tool_name) {
            return *kind;
        }

        if let Some((_, kind)) = PREFIX_RULES
            .iter()
            .filter(|(prefix, _)| tool_name.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
        {
            return *kind;
        }

        if let Some((_, kind)) = SUBSTRING_RULES.iter().find(|(needle, _)| tool_name.contains(needle)) {
            return *kind;
        }

        DEFAULT_KIND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_overrides_win_over_prefix_rules() {
        // "pulse_query" would otherwise not match any prefix rule, so this
        // also exercises the override tier in isolation.
        assert_eq!(ToolClassifier::classify("pulse_query"), ToolKind::Resolve);
        assert_eq!(ToolClassifier::classify("pulse_read"), ToolKind::Read);
        assert_eq!(ToolClassifier::classify("pulse_control"), ToolKind::Write);
        assert_eq!(ToolClassifier::classify("pulse_docker"), ToolKind::Read);
        assert_eq!(ToolClassifier::classify("pulse_metrics"), ToolKind::Read);
    }

    #[test]
    fn prefix_rules_pick_longest_match() {
        assert_eq!(ToolClassifier::classify("write_config"), ToolKind::Write);
        assert_eq!(ToolClassifier::classify("get_status"), ToolKind::Read);
        assert_eq!(ToolClassifier::classify("resolve_host"), ToolKind::Resolve);
    }

    #[test]
    fn substring_rules_catch_non_prefixed_names() {
        assert_eq!(ToolClassifier::classify("container_docker_inspect"), ToolKind::Read);
        assert_eq!(ToolClassifier::classify("node_control_panel"), ToolKind::Write);
    }

    #[test]
    fn unknown_tool_defaults_to_read() {
        assert_eq!(ToolClassifier::classify("frobnicate"), ToolKind::Read);
    }
}
