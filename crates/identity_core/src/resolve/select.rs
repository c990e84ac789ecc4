//! Primary extraction and seniority ordering.

use crate::model::contact::{Contact, ContactId};
use std::collections::BTreeMap;

/// Distinct primaries of `contacts`, oldest first (`created_at`, then `id`).
///
/// The length of the result selects the identify branch: create, extend, or
/// merge.
pub fn select_primaries(contacts: &[Contact]) -> Vec<Contact> {
    let mut by_id: BTreeMap<ContactId, &Contact> = BTreeMap::new();
    for contact in contacts.iter().filter(|contact| contact.is_primary()) {
        by_id.entry(contact.id).or_insert(contact);
    }

    let mut primaries: Vec<Contact> = by_id.into_values().cloned().collect();
    primaries.sort_by(Contact::seniority_cmp);
    primaries
}
