//! Connected-component expansion over the `linked_id` relation.
//!
//! # Invariants
//! - Iterative worklist with a visited map; terminates on cyclic data.
//! - Tombstoned contacts are never visited.
//! - Every returned link must target a visited primary.

use crate::model::contact::{Contact, ContactId};
use crate::repo::contact_repo::ContactRepository;
use crate::resolve::{ConsistencyFault, IdentityResult};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};

/// Returns every active contact reachable from `seeds`, oldest first.
///
/// Walks both directions: up through `linked_id` and down through contacts
/// linking to the current one. Dependents are listed for secondaries too, so
/// malformed chains are still fully discovered and then rejected.
pub fn expand_components<R: ContactRepository>(
    repo: &R,
    seeds: &[Contact],
) -> IdentityResult<Vec<Contact>> {
    let mut visited: BTreeMap<ContactId, Contact> = BTreeMap::new();
    let mut pending: VecDeque<ContactId> = VecDeque::new();

    for seed in seeds {
        if let Entry::Vacant(entry) = visited.entry(seed.id) {
            entry.insert(seed.clone());
            pending.push_back(seed.id);
        }
    }

    while let Some(id) = pending.pop_front() {
        let linked_id = visited.get(&id).and_then(|contact| contact.linked_id);

        if let Some(linked_id) = linked_id {
            if !visited.contains_key(&linked_id) {
                let linked = repo.get_contact(linked_id)?.ok_or(ConsistencyFault::OrphanLink {
                    contact_id: id,
                    linked_id,
                })?;
                visited.insert(linked_id, linked);
                pending.push_back(linked_id);
            }
        }

        for dependent in repo.list_linked_to(id)? {
            if let Entry::Vacant(entry) = visited.entry(dependent.id) {
                pending.push_back(dependent.id);
                entry.insert(dependent);
            }
        }
    }

    for contact in visited.values() {
        let Some(linked_id) = contact.linked_id else {
            continue;
        };
        match visited.get(&linked_id) {
            Some(target) if target.is_primary() => {}
            Some(_) => {
                return Err(ConsistencyFault::LinkToSecondary {
                    contact_id: contact.id,
                    linked_id,
                }
                .into())
            }
            None => {
                return Err(ConsistencyFault::OrphanLink {
                    contact_id: contact.id,
                    linked_id,
                }
                .into())
            }
        }
    }

    let mut contacts: Vec<Contact> = visited.into_values().collect();
    contacts.sort_by(Contact::seniority_cmp);
    Ok(contacts)
}
