//! Folding several identities into the most senior one.
//!
//! # Invariants
//! - The survivor is the oldest primary (`created_at`, then `id`).
//! - Each demoted primary's dependents are repointed in the same step, so no
//!   contact is left linked to a secondary.
//! - Atomicity comes from the caller's transaction.

use crate::model::contact::{Contact, ContactId};
use crate::repo::contact_repo::ContactRepository;
use crate::resolve::{ConsistencyFault, IdentityFamily, IdentityResult};
use log::info;

/// Result of one merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Survivor family as re-read after all writes.
    pub family: IdentityFamily,
    pub demoted_ids: Vec<ContactId>,
    /// Dependents repointed from demoted primaries onto the survivor.
    pub relinked_count: usize,
}

pub fn merge_primaries<R: ContactRepository>(
    repo: &R,
    primaries: &[Contact],
) -> IdentityResult<MergeOutcome> {
    let survivor = primaries
        .iter()
        .min_by(|left, right| left.seniority_cmp(right))
        .ok_or(ConsistencyFault::ComponentWithoutPrimary {
            contact_ids: Vec::new(),
        })?;

    let mut demoted_ids = Vec::new();
    let mut relinked_count = 0;
    for absorbed in primaries.iter().filter(|contact| contact.id != survivor.id) {
        repo.demote_to_secondary(absorbed.id, survivor.id)?;
        relinked_count += repo.relink_secondaries(absorbed.id, survivor.id)?;
        demoted_ids.push(absorbed.id);
    }

    let family = IdentityFamily::load(repo, survivor.id)?;
    info!(
        "event=identity_merge module=resolve status=ok survivor_id={} demoted_count={} relinked_count={} family_size={}",
        survivor.id,
        demoted_ids.len(),
        relinked_count,
        family.secondaries.len() + 1
    );

    Ok(MergeOutcome {
        family,
        demoted_ids,
        relinked_count,
    })
}
