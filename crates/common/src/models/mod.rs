//! Data model shared by every pipeline stage

mod claim_map;
mod evidence;
mod verification;
mod work_item;

pub use claim_map::ClaimMap;
pub use evidence::{EvidenceOrigin, EvidenceRecord};
pub use verification::{Judgment, Relationship, VerificationRecord, UNVERIFIED_REASONING};
pub use work_item::WorkItem;

/// Claim text mapped to the search queries generated for it
pub type ClaimQueries = ClaimMap<Vec<String>>;

/// Claim text mapped to the evidence retrieved for it
pub type ClaimEvidence = ClaimMap<Vec<EvidenceRecord>>;

/// Claim text mapped to one judgment per evidence record
pub type ClaimVerifications = ClaimMap<Vec<VerificationRecord>>;

/// Placeholder substituted for a work item that failed permanently.
///
/// Lets a batch complete with one result per input even when some items
/// exhaust their retry budget.
pub trait Sentinel {
    fn sentinel() -> Self;
}

impl<T> Sentinel for Vec<T> {
    fn sentinel() -> Self {
        Vec::new()
    }
}

impl<T> Sentinel for Option<T> {
    fn sentinel() -> Self {
        None
    }
}

impl Sentinel for String {
    fn sentinel() -> Self {
        String::new()
    }
}
