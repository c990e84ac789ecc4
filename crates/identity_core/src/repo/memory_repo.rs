//! In-memory contact repository.
//!
//! # Responsibility
//! - Provide a deterministic, dependency-free `ContactRepository` for tests
//!   and embedded callers.
//! - Mirror SQLite ordering, tombstone and transaction semantics.
//!
//! # Invariants
//! - Ids are assigned monotonically and never reused.
//! - Each write is stamped from a logical clock that advances 1 ms per write.
//! - A failed transaction restores the exact pre-transaction state.

use crate::model::contact::{
    Contact, ContactId, ContactValidationError, LinkPrecedence, NewContact,
};
use crate::repo::contact_repo::{ContactRepository, RepoError, RepoResult};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

const CLOCK_START_MS: i64 = 1_000;

#[derive(Debug, Clone)]
struct MemoryState {
    rows: BTreeMap<ContactId, Contact>,
    next_id: ContactId,
    clock_ms: i64,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
            clock_ms: CLOCK_START_MS,
        }
    }
}

impl MemoryState {
    fn tick(&mut self) -> i64 {
        let now = self.clock_ms;
        self.clock_ms += 1;
        now
    }

    fn active_sorted<P>(&self, predicate: P) -> Vec<Contact>
    where
        P: Fn(&Contact) -> bool,
    {
        let mut contacts: Vec<Contact> = self
            .rows
            .values()
            .filter(|contact| contact.is_active() && predicate(contact))
            .cloned()
            .collect();
        contacts.sort_by(Contact::seniority_cmp);
        contacts
    }
}

/// Mutex-guarded in-memory contact store.
#[derive(Debug, Default)]
pub struct InMemoryContactRepository {
    state: Mutex<MemoryState>,
    // Held for the whole of `with_transaction` so transactions serialize.
    tx_gate: Mutex<()>,
}

impl InMemoryContactRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the timestamp stamped on the next write.
    pub fn set_clock(&self, now_ms: i64) -> RepoResult<()> {
        self.lock()?.clock_ms = now_ms;
        Ok(())
    }

    /// Inserts a fully-formed row as-is, keeping its id and timestamps.
    ///
    /// Only the per-row link shape is validated, so fixtures can describe
    /// broken graphs (orphan links, links to secondaries, tombstones).
    pub fn insert_raw(&self, contact: Contact) -> RepoResult<()> {
        contact.validate()?;
        let mut state = self.lock()?;
        if state.rows.contains_key(&contact.id) {
            return Err(RepoError::Conflict {
                id: contact.id,
                message: "id already exists".to_string(),
            });
        }
        state.next_id = state.next_id.max(contact.id + 1);
        state.rows.insert(contact.id, contact);
        Ok(())
    }

    /// Every stored row, tombstones included, ordered by id.
    pub fn all_contacts(&self) -> RepoResult<Vec<Contact>> {
        Ok(self.lock()?.rows.values().cloned().collect())
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| RepoError::Backend("poisoned lock: contact state".to_string()))
    }
}

impl ContactRepository for InMemoryContactRepository {
    fn find_matching(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> RepoResult<Vec<Contact>> {
        if email.is_none() && phone_number.is_none() {
            return Ok(Vec::new());
        }
        let state = self.lock()?;
        Ok(state.active_sorted(|contact| {
            let email_hit = email.is_some() && contact.email.as_deref() == email;
            let phone_hit =
                phone_number.is_some() && contact.phone_number.as_deref() == phone_number;
            email_hit || phone_hit
        }))
    }

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        let state = self.lock()?;
        Ok(state
            .rows
            .get(&id)
            .filter(|contact| contact.is_active())
            .cloned())
    }

    fn list_linked_to(&self, id: ContactId) -> RepoResult<Vec<Contact>> {
        let state = self.lock()?;
        Ok(state.active_sorted(|contact| contact.linked_id == Some(id)))
    }

    fn create_contact(&self, contact: &NewContact) -> RepoResult<Contact> {
        contact.validate()?;
        let mut state = self.lock()?;
        if let Some(linked_id) = contact.linked_id {
            if !state.rows.contains_key(&linked_id) {
                return Err(RepoError::NotFound(linked_id));
            }
        }

        let id = state.next_id;
        state.next_id += 1;
        let now = state.tick();
        let stored = Contact {
            id,
            email: contact.email.clone(),
            phone_number: contact.phone_number.clone(),
            linked_id: contact.linked_id,
            link_precedence: contact.link_precedence,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.rows.insert(id, stored.clone());
        Ok(stored)
    }

    fn demote_to_secondary(&self, id: ContactId, primary_id: ContactId) -> RepoResult<()> {
        if id == primary_id {
            return Err(ContactValidationError::SelfLink(id).into());
        }
        let mut state = self.lock()?;
        let now = state.tick();
        let contact = state
            .rows
            .get_mut(&id)
            .filter(|contact| contact.is_active())
            .ok_or(RepoError::NotFound(id))?;
        if !contact.is_primary() {
            return Err(RepoError::Conflict {
                id,
                message: "contact is no longer primary".to_string(),
            });
        }
        contact.link_precedence = LinkPrecedence::Secondary;
        contact.linked_id = Some(primary_id);
        contact.updated_at = now;
        Ok(())
    }

    fn relink_secondaries(&self, from: ContactId, to: ContactId) -> RepoResult<usize> {
        let mut state = self.lock()?;
        let now = state.tick();
        let mut changed = 0;
        for contact in state.rows.values_mut() {
            if contact.linked_id == Some(from) {
                contact.linked_id = Some(to);
                contact.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>,
    {
        let _gate = self
            .tx_gate
            .lock()
            .map_err(|_| E::from(RepoError::Backend("poisoned lock: transaction".to_string())))?;
        let snapshot = self.lock().map_err(E::from)?.clone();

        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                *self.lock().map_err(E::from)? = snapshot;
                Err(err)
            }
        }
    }
}
