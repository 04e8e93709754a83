//! Quota tracker: dedup checks, recording and progress reporting on top of a
//! [`QuotaPlan`] and a persisted [`GenerationState`].

use anyhow::Result;
use convoforge_core::ConversationRecord;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::classify::{LanguageStyle, UserRole};
use crate::quota::{Allocation, QuotaPlan};
use crate::signature::{extract_addresses, extract_tx_hashes, signature_of};
use crate::state::{GenerationState, PARAM_ADDRESSES, PARAM_TX_HASHES};

/// Share of its pro-rata progress a category must reach to not be lagging.
const LAGGING_THRESHOLD: f64 = 0.8;

/// Why a produced item was or was not kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Recorded,
    DuplicateSignature,
    QuotaMet,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryProgress {
    pub category: String,
    pub generated: u64,
    pub target: u64,
}

impl CategoryProgress {
    pub fn percent(&self) -> f64 {
        if self.target == 0 {
            return 100.0;
        }
        self.generated as f64 / self.target as f64 * 100.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total_generated: u64,
    pub total_target: u64,
    pub completion_rate: f64,
    pub categories: Vec<CategoryProgress>,
    pub roles: BTreeMap<String, u64>,
    pub styles: BTreeMap<String, u64>,
    pub role_targets: BTreeMap<String, f64>,
    pub style_targets: BTreeMap<String, f64>,
    pub used_signatures: usize,
    pub used_addresses: usize,
    pub used_tx_hashes: usize,
}

pub struct QuotaTracker {
    plan: QuotaPlan,
    state: GenerationState,
    path: Option<PathBuf>,
}

impl QuotaTracker {
    /// Tracker backed by a state file, loaded now and rewritten on every record.
    pub fn open(path: impl AsRef<Path>, total: u64, ratios: &IndexMap<String, f64>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = GenerationState::load(&path)?;
        Ok(Self {
            plan: QuotaPlan::new(total, ratios),
            state,
            path: Some(path),
        })
    }

    /// Tracker that never touches disk.
    pub fn in_memory(total: u64, ratios: &IndexMap<String, f64>) -> Self {
        Self {
            plan: QuotaPlan::new(total, ratios),
            state: GenerationState::default(),
            path: None,
        }
    }

    pub fn plan(&self) -> &QuotaPlan {
        &self.plan
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    /// Whether the category has reached its target. Categories outside the
    /// plan never do.
    pub fn quota_met(&self, category: &str) -> bool {
        match self.plan.target(category) {
            Some(target) => self.state.generated(category) >= target,
            None => false,
        }
    }

    /// True when the question's signature was already used, or the category
    /// (if given) has met its quota.
    pub fn check_duplicate(&self, question: &str, category: Option<&str>) -> bool {
        if self.state.has_signature(&signature_of(question)) {
            return true;
        }
        category.map(|c| self.quota_met(c)).unwrap_or(false)
    }

    /// Record a produced conversation.
    ///
    /// Adds the signatures and parameter literals of every asking turn, bumps
    /// the counters and persists the state before returning.
    pub fn record_generated(
        &mut self,
        record: &ConversationRecord,
        category: &str,
        role: Option<UserRole>,
        style: Option<LanguageStyle>,
    ) -> Result<()> {
        for turn in record.conversations.iter().filter(|t| t.from.is_asker()) {
            self.state.used_questions.insert(signature_of(&turn.value));
            for address in extract_addresses(&turn.value) {
                self.state.add_parameter(PARAM_ADDRESSES, address);
            }
            for hash in extract_tx_hashes(&turn.value) {
                self.state.add_parameter(PARAM_TX_HASHES, hash);
            }
        }

        *self
            .state
            .generated_count
            .entry(category.to_string())
            .or_insert(0) += 1;
        if let Some(role) = role {
            *self.state.role_count.entry(role.to_string()).or_insert(0) += 1;
        }
        if let Some(style) = style {
            *self.state.style_count.entry(style.to_string()).or_insert(0) += 1;
        }
        self.state.total_generated += 1;

        self.persist()
    }

    /// Dedup-then-record in one step: the item is recorded only if its
    /// question is new and its category still has room.
    pub fn admit(
        &mut self,
        record: &ConversationRecord,
        category: &str,
        role: Option<UserRole>,
        style: Option<LanguageStyle>,
    ) -> Result<Admission> {
        if let Some(question) = record.user_question() {
            if self.state.has_signature(&signature_of(question)) {
                debug!(category, "Discarding item with a used question signature");
                return Ok(Admission::DuplicateSignature);
            }
        }
        if self.quota_met(category) {
            debug!(category, "Discarding item for a category at quota");
            return Ok(Admission::QuotaMet);
        }
        self.record_generated(record, category, role, style)?;
        Ok(Admission::Recorded)
    }

    /// Copy of the current state, to roll back records that never reached a
    /// checkpoint.
    pub fn snapshot(&self) -> GenerationState {
        self.state.clone()
    }

    /// Replace the state with an earlier snapshot and persist it.
    pub fn restore(&mut self, state: GenerationState) -> Result<()> {
        self.state = state;
        self.persist()
    }

    pub fn priority_allocation(&self, batch_size: u64) -> Vec<Allocation> {
        self.plan
            .priority_allocation(&self.state.generated_count, batch_size)
    }

    pub fn completion_rate(&self) -> f64 {
        if self.plan.total() == 0 {
            return 1.0;
        }
        self.state.total_generated as f64 / self.plan.total() as f64
    }

    /// Categories below 80% of the share they should have at the current
    /// overall completion rate.
    pub fn lagging_categories(&self) -> Vec<String> {
        let rate = self.completion_rate();
        self.plan
            .quotas()
            .iter()
            .filter(|q| {
                (self.state.generated(&q.category) as f64)
                    < q.target as f64 * rate * LAGGING_THRESHOLD
            })
            .map(|q| q.category.clone())
            .collect()
    }

    pub fn statistics(&self) -> Statistics {
        let categories = self
            .plan
            .quotas()
            .iter()
            .map(|q| CategoryProgress {
                category: q.category.clone(),
                generated: self.state.generated(&q.category),
                target: q.target,
            })
            .collect();

        Statistics {
            total_generated: self.state.total_generated,
            total_target: self.plan.total(),
            completion_rate: self.completion_rate(),
            categories,
            roles: self.state.role_count.clone().into_iter().collect(),
            styles: self.state.style_count.clone().into_iter().collect(),
            role_targets: UserRole::ALL
                .iter()
                .map(|r| (r.to_string(), r.target_ratio()))
                .collect(),
            style_targets: LanguageStyle::ALL
                .iter()
                .map(|s| (s.to_string(), s.target_ratio()))
                .collect(),
            used_signatures: self.state.used_questions.len(),
            used_addresses: self.state.used(PARAM_ADDRESSES),
            used_tx_hashes: self.state.used(PARAM_TX_HASHES),
        }
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        self.state.save(path).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Failed to persist generation state");
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoforge_core::{Speaker, Turn};

    fn ratios(pairs: &[(&str, f64)]) -> IndexMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn question(text: &str) -> ConversationRecord {
        ConversationRecord::new(vec![
            Turn::new(Speaker::System, "sys"),
            Turn::new(Speaker::User, text),
        ])
    }

    #[test]
    fn record_then_duplicate_is_detected() {
        let mut tracker = QuotaTracker::in_memory(10, &ratios(&[("A", 1.0)]));
        let rec = question("Show block 10");
        assert!(!tracker.check_duplicate("Show block 10", Some("A")));
        tracker
            .record_generated(&rec, "A", Some(UserRole::Novice), None)
            .unwrap();
        // Same pattern with a different number.
        assert!(tracker.check_duplicate("Show block 99", None));
        assert_eq!(tracker.state().generated("A"), 1);
        assert_eq!(tracker.state().role_count["novice"], 1);
    }

    #[test]
    fn records_parameters() {
        let mut tracker = QuotaTracker::in_memory(10, &ratios(&[("A", 1.0)]));
        let addr = format!("0x{}", "b".repeat(40));
        let hash = format!("0x{}", "c".repeat(64));
        let rec = question(&format!("查询 {addr} 和 {hash}"));
        tracker.record_generated(&rec, "A", None, None).unwrap();
        let stats = tracker.statistics();
        assert_eq!(stats.used_addresses, 1);
        assert_eq!(stats.used_tx_hashes, 1);
        assert_eq!(stats.used_signatures, 1);
    }

    #[test]
    fn sixty_forty_scenario() {
        let mut tracker = QuotaTracker::in_memory(100, &ratios(&[("A", 0.6), ("B", 0.4)]));
        for i in 0..60 {
            let rec = question(&format!("a question variant {}", "x".repeat(i + 1)));
            tracker.record_generated(&rec, "A", None, None).unwrap();
        }
        for i in 0..10 {
            let rec = question(&format!("b question variant {}", "y".repeat(i + 1)));
            tracker.record_generated(&rec, "B", None, None).unwrap();
        }
        assert!(tracker.quota_met("A"));
        assert!(tracker.check_duplicate("a brand new question", Some("A")));

        let alloc = tracker.priority_allocation(10);
        assert!(!alloc.is_empty());
        assert!(alloc.iter().all(|a| a.category == "B"));
    }

    #[test]
    fn admit_discards_duplicates_and_full_categories() {
        let mut tracker = QuotaTracker::in_memory(2, &ratios(&[("A", 0.5), ("B", 0.5)]));
        assert_eq!(
            tracker.admit(&question("first"), "A", None, None).unwrap(),
            Admission::Recorded
        );
        assert_eq!(
            tracker.admit(&question("first!"), "B", None, None).unwrap(),
            Admission::DuplicateSignature
        );
        assert_eq!(
            tracker.admit(&question("second"), "A", None, None).unwrap(),
            Admission::QuotaMet
        );
        // Unplanned categories are counted but never full.
        assert_eq!(
            tracker.admit(&question("third"), "direct_reply", None, None).unwrap(),
            Admission::Recorded
        );
        assert_eq!(tracker.state().total_generated, 2);
    }

    #[test]
    fn persists_after_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generation_state.json");
        let r = ratios(&[("A", 1.0)]);
        {
            let mut tracker = QuotaTracker::open(&path, 5, &r).unwrap();
            tracker
                .record_generated(&question("persist me"), "A", None, Some(LanguageStyle::Colloquial))
                .unwrap();
        }
        let reopened = QuotaTracker::open(&path, 5, &r).unwrap();
        assert_eq!(reopened.state().total_generated, 1);
        assert!(reopened.check_duplicate("persist me", None));
        assert_eq!(reopened.state().style_count["colloquial"], 1);
    }

    #[test]
    fn restore_forgets_records_made_after_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generation_state.json");
        let r = ratios(&[("A", 1.0)]);
        let mut tracker = QuotaTracker::open(&path, 5, &r).unwrap();
        tracker.admit(&question("kept question"), "A", None, None).unwrap();

        let before = tracker.snapshot();
        tracker.admit(&question("rolled back question"), "A", None, None).unwrap();
        assert_eq!(tracker.state().total_generated, 2);
        tracker.restore(before).unwrap();

        let reopened = QuotaTracker::open(&path, 5, &r).unwrap();
        assert_eq!(reopened.state().total_generated, 1);
        assert!(reopened.check_duplicate("kept question", None));
        assert!(!reopened.check_duplicate("rolled back question", None));
    }

    #[test]
    fn lagging_categories_below_pro_rata_share() {
        let mut tracker = QuotaTracker::in_memory(100, &ratios(&[("A", 0.5), ("B", 0.5)]));
        for i in 0..20 {
            let rec = question(&format!("question {}", "z".repeat(i + 1)));
            tracker.record_generated(&rec, "A", None, None).unwrap();
        }
        // rate 0.2: B expects 10 * 0.8 = 8 and has 0.
        assert_eq!(tracker.lagging_categories(), vec!["B".to_string()]);
    }
}
