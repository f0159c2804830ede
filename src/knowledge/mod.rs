//! Knowledge Extractor (§4.10): deterministic fact extraction from known
//! tool-result shapes, plus fact-key prediction for the agentic loop's
//! fact gate. Grounded on the teacher's `StandardRAGEngine` deterministic
//! helpers (`extract_keywords`/`extract_entities`, `rag/engine.rs`): plain
//! data-driven functions over JSON rather than a model call.

use serde_json::Value;

use crate::types::KnowledgeFact;

/// Prefix table mapping a fact key's leading segment to a category, used
/// when a single tool's output mixes several kinds of facts.
const CATEGORY_PREFIXES: &[(&str, &str)] = &[
    ("storage:", "storage"),
    ("node:", "node"),
    ("guest:", "guest"),
    ("docker:", "docker"),
    ("backup:", "backup"),
    ("k8s:", "kubernetes"),
];

fn infer_category(key: &str) -> &'static str {
    CATEGORY_PREFIXES
        .iter()
        .find(|(prefix, _)| key.starts_with(prefix))
        .map(|(_, category)| *category)
        .unwrap_or("general")
}

pub struct KnowledgeExtractor;

impl KnowledgeExtractor {
    /// Parses `result` (the raw JSON a tool returned) into zero or more
    /// facts, keyed deterministically by `tool` and `args` so repeat calls
    /// with the same inputs produce the same key.
    pub fn extract(tool: &str, args: &Value, result: &Value) -> Vec<KnowledgeFact> {
        let mut facts = Vec::new();

        match tool {
            "pulse_query" | "resolve_host" => {
                if let Some(resolved) = result.get("resource_id").and_then(Value::as_str) {
                    let key = format!("resolve:{}", args.get("name").and_then(Value::as_str).unwrap_or("?"));
                    facts.push(KnowledgeFact::new(infer_category(&key), key, resolved));
                }
            }
            "pulse_read" | "get_status" => {
                if let Some(obj) = result.as_object() {
                    for (field, value) in obj {
                        let key = format!("node:{field}");
                        facts.push(KnowledgeFact::new(infer_category(&key), key, value.to_string()));
                    }
                }
            }
            "pulse_docker" | "list_containers" => {
                let items = result.get("containers").and_then(Value::as_array).cloned().unwrap_or_default();
                let key = "docker:containers:queried".to_string();
                facts.push(KnowledgeFact::new(infer_category(&key), key, items.len().to_string()));
                for item in &items {
                    if let Some(name) = item.get("name").and_then(Value::as_str) {
                        let key = format!("docker:container:{name}:status");
                        let status = item.get("status").and_then(Value::as_str).unwrap_or("unknown");
                        facts.push(KnowledgeFact::new(infer_category(&key), key, status));
                    }
                }
            }
            "pulse_metrics" | "get_metrics" => {
                if let Some(obj) = result.as_object() {
                    for (field, value) in obj {
                        let key = format!("node:metric:{field}");
                        facts.push(KnowledgeFact::new(infer_category(&key), key, value.to_string()));
                    }
                }
            }
            "storage_pools" | "list_storage_pools" => {
                let items = result.get("pools").and_then(Value::as_array).cloned().unwrap_or_default();
                let key = "storage:pools:queried".to_string();
                facts.push(KnowledgeFact::new(infer_category(&key), key, items.len().to_string()));
            }
            _ => {}
        }

        facts
    }

    /// Returns the subset of fact keys computable from `(tool, args)` alone,
    /// before the tool has actually run, used by the agentic loop's fact
    /// gate to short-circuit a redundant call.
    pub fn predict_fact_keys(tool: &str, args: &Value) -> Vec<String> {
        match tool {
            "pulse_query" | "resolve_host" => {
                vec![format!("resolve:{}", args.get("name").and_then(Value::as_str).unwrap_or("?"))]
            }
            "pulse_docker" | "list_containers" => vec!["docker:containers:queried".to_string()],
            "storage_pools" | "list_storage_pools" => vec!["storage:pools:queried".to_string()],
            _ => Vec::new(),
        }
    }

    /// Expands a marker key (e.g. `storage:pools:queried`) to the wildcard
    /// family it stands in for, so the fact gate can match any previously
    /// cached fact under that family.
    pub fn expand_marker(key: &str) -> Option<String> {
        key.strip_suffix(":queried").map(|prefix| format!("{prefix}:*"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_resolve_produces_single_fact() {
        let args = json!({"name": "pve-node-1"});
        let result = json!({"resource_id": "node-abc"});
        let facts = KnowledgeExtractor::extract("pulse_query", &args, &result);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].key, "resolve:pve-node-1");
        assert_eq!(facts[0].value, "node-abc");
    }

    #[test]
    fn extract_docker_emits_marker_even_when_empty() {
        let args = json!({});
        let result = json!({"containers": []});
        let facts = KnowledgeExtractor::extract("pulse_docker", &args, &result);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].key, "docker:containers:queried");
        assert_eq!(facts[0].value, "0");
    }

    #[test]
    fn predict_fact_keys_matches_extraction_key() {
        let args = json!({"name": "pve-node-1"});
        assert_eq!(
            KnowledgeExtractor::predict_fact_keys("pulse_query", &args),
            vec!["resolve:pve-node-1".to_string()]
        );
    }

    #[test]
    fn expand_marker_strips_queried_suffix() {
        assert_eq!(
            KnowledgeExtractor::expand_marker("storage:pools:queried"),
            Some("storage:pools:*".to_string())
        );
        assert_eq!(KnowledgeExtractor::expand_marker("node:cpu"), None);
    }
}
