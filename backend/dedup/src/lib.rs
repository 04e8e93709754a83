//! Signature engine and quota tracker.
//!
//! Decides whether a produced question is new, which categories still need
//! items, and keeps the generation state on disk.

pub mod classify;
pub mod quota;
pub mod signature;
pub mod state;
pub mod tracker;

pub use classify::{infer_role, infer_style, LanguageStyle, UserRole};
pub use quota::{compute_targets, Allocation, CategoryQuota, QuotaPlan};
pub use signature::{extract_addresses, extract_tx_hashes, signature_of};
pub use state::GenerationState;
pub use tracker::{Admission, CategoryProgress, QuotaTracker, Statistics};
