//! Category quotas: integer targets derived from a total and ratios, and the
//! per-batch priority allocation.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;

/// One category's share of the total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryQuota {
    pub category: String,
    pub ratio: f64,
    pub target: u64,
}

/// How many items a batch should request for a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub category: String,
    pub count: u64,
}

/// `target[c] = floor(total * ratio[c])`, with the rounding remainder added to
/// the first category. The targets always sum to `total` when the ratios
/// sum to at most 1.0.
pub fn compute_targets(total: u64, ratios: &IndexMap<String, f64>) -> Vec<CategoryQuota> {
    let mut quotas: Vec<CategoryQuota> = ratios
        .iter()
        .map(|(category, &ratio)| CategoryQuota {
            category: category.clone(),
            ratio,
            target: (total as f64 * ratio.max(0.0)).floor() as u64,
        })
        .collect();

    let assigned: u64 = quotas.iter().map(|q| q.target).sum();
    if let Some(first) = quotas.first_mut() {
        if assigned <= total {
            first.target += total - assigned;
        } else {
            // Ratios summing past 1.0 are rejected by config validation; trim
            // the first category as far as it goes.
            first.target = first.target.saturating_sub(assigned - total);
        }
    }
    quotas
}

/// Ordered set of quotas keyed by category.
#[derive(Debug, Clone, Default)]
pub struct QuotaPlan {
    total: u64,
    quotas: Vec<CategoryQuota>,
}

impl QuotaPlan {
    pub fn new(total: u64, ratios: &IndexMap<String, f64>) -> Self {
        Self {
            total,
            quotas: compute_targets(total, ratios),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn quotas(&self) -> &[CategoryQuota] {
        &self.quotas
    }

    pub fn target(&self, category: &str) -> Option<u64> {
        self.quotas
            .iter()
            .find(|q| q.category == category)
            .map(|q| q.target)
    }

    /// Greedy allocation of `batch_size` items across unfinished categories.
    ///
    /// Categories are ranked by `remaining / target`, highest first, and each
    /// gets `max(1, floor(batch_size * priority))` capped by its remaining
    /// count and by what is left of the batch.
    pub fn priority_allocation(
        &self,
        generated: &HashMap<String, u64>,
        batch_size: u64,
    ) -> Vec<Allocation> {
        let mut candidates: Vec<(&str, u64, f64)> = self
            .quotas
            .iter()
            .filter(|q| q.target > 0)
            .filter_map(|q| {
                let done = generated.get(&q.category).copied().unwrap_or(0);
                let remaining = q.target.saturating_sub(done);
                (remaining > 0).then(|| {
                    (
                        q.category.as_str(),
                        remaining,
                        remaining as f64 / q.target as f64,
                    )
                })
            })
            .collect();

        // Stable sort keeps plan order among equal priorities.
        candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut allocation = Vec::new();
        let mut allocated = 0u64;
        for (category, remaining, priority) in candidates {
            if allocated >= batch_size {
                break;
            }
            let wanted = ((batch_size as f64 * priority).floor() as u64).max(1);
            let count = wanted.min(remaining).min(batch_size - allocated);
            allocation.push(Allocation {
                category: category.to_string(),
                count,
            });
            allocated += count;
        }
        allocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratios(pairs: &[(&str, f64)]) -> IndexMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn targets_sum_to_total() {
        let r = convoforge_config::default_category_ratios();
        for total in [0, 1, 7, 99, 100, 101, 6000, 12_345] {
            let sum: u64 = compute_targets(total, &r).iter().map(|q| q.target).sum();
            assert_eq!(sum, total, "total {total}");
        }
    }

    #[test]
    fn remainder_goes_to_first_category() {
        let quotas = compute_targets(10, &ratios(&[("a", 1.0 / 3.0), ("b", 1.0 / 3.0), ("c", 1.0 / 3.0)]));
        assert_eq!(
            quotas.iter().map(|q| q.target).collect::<Vec<_>>(),
            vec![4, 3, 3]
        );
    }

    #[test]
    fn default_plan_for_6000() {
        let plan = QuotaPlan::new(6000, &convoforge_config::default_category_ratios());
        assert_eq!(plan.target("get_address_details_by_address"), Some(600));
        assert_eq!(plan.target("list_latest_txs"), Some(240));
        assert_eq!(plan.target("not_a_tool"), None);
    }

    #[test]
    fn met_category_gets_nothing() {
        let plan = QuotaPlan::new(100, &ratios(&[("A", 0.6), ("B", 0.4)]));
        assert_eq!(plan.target("A"), Some(60));
        assert_eq!(plan.target("B"), Some(40));

        let generated: HashMap<String, u64> =
            [("A".to_string(), 60), ("B".to_string(), 10)].into();
        let alloc = plan.priority_allocation(&generated, 10);
        assert!(!alloc.is_empty());
        assert!(alloc.iter().all(|a| a.category == "B"));
        assert!(alloc.iter().map(|a| a.count).sum::<u64>() <= 10);
    }

    #[test]
    fn never_exceeds_remaining() {
        let plan = QuotaPlan::new(20, &ratios(&[("A", 0.5), ("B", 0.25), ("C", 0.25)]));
        let generated: HashMap<String, u64> =
            [("A".to_string(), 9), ("B".to_string(), 3)].into();
        let alloc = plan.priority_allocation(&generated, 50);
        for a in &alloc {
            let target = plan.target(&a.category).unwrap();
            let done = generated.get(&a.category).copied().unwrap_or(0);
            assert!(a.count <= target - done, "{a:?}");
        }
        // C untouched ranks first.
        assert_eq!(alloc[0].category, "C");
    }

    #[test]
    fn everything_met_allocates_nothing() {
        let plan = QuotaPlan::new(4, &ratios(&[("A", 0.5), ("B", 0.5)]));
        let generated: HashMap<String, u64> =
            [("A".to_string(), 2), ("B".to_string(), 5)].into();
        assert!(plan.priority_allocation(&generated, 10).is_empty());
    }
}
