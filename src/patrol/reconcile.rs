//! Reconciliation (§4.5): auto-resolves findings the model implicitly
//! stopped reporting, unless the run itself errored.

use crate::types::FindingId;

#[derive(Debug, Clone, Default)]
pub struct ReconciliationInput {
    pub seeded: Vec<FindingId>,
    pub reported: Vec<FindingId>,
    pub resolved_by_model: Vec<FindingId>,
    pub errored: bool,
}

/// Returns the ids to auto-resolve: present in `seeded`, absent from both
/// `reported` and `resolved_by_model`. Empty when `errored` is set, since a
/// failed run carries no signal about what's still present.
pub fn reconcile(input: &ReconciliationInput) -> Vec<FindingId> {
    if input.errored {
        return Vec::new();
    }
    input
        .seeded
        .iter()
        .filter(|id| !input.reported.contains(id) && !input.resolved_by_model.contains(id))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<FindingId> {
        (0..n).map(|_| FindingId::new()).collect()
    }

    #[test]
    fn auto_resolves_findings_dropped_from_report() {
        let seeded = ids(3);
        let input = ReconciliationInput {
            seeded: seeded.clone(),
            reported: vec![seeded[0]],
            resolved_by_model: Vec::new(),
            errored: false,
        };
        let resolved = reconcile(&input);
        assert_eq!(resolved.len(), 2);
        assert!(resolved.contains(&seeded[1]));
        assert!(resolved.contains(&seeded[2]));
    }

    #[test]
    fn errored_run_skips_reconciliation() {
        let seeded = ids(2);
        let input = ReconciliationInput {
            seeded,
            reported: Vec::new(),
            resolved_by_model: Vec::new(),
            errored: true,
        };
        assert!(reconcile(&input).is_empty());
    }

    #[test]
    fn explicitly_resolved_by_model_excluded_from_double_resolve() {
        let seeded = ids(2);
        let input = ReconciliationInput {
            seeded: seeded.clone(),
            reported: Vec::new(),
            resolved_by_model: vec![seeded[0]],
            errored: false,
        };
        let resolved = reconcile(&input);
        assert_eq!(resolved, vec![seeded[1]]);
    }

    #[test]
    fn findings_not_seeded_are_untouched() {
        let seeded = ids(1);
        let outside = FindingId::new();
        let input = ReconciliationInput {
            seeded,
            reported: Vec::new(),
            resolved_by_model: Vec::new(),
            errored: false,
        };
        let resolved = reconcile(&input);
        assert!(!resolved.contains(&outside));
    }
}
