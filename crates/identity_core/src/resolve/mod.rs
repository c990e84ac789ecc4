//! Identity-graph resolution pipeline.
//!
//! # Responsibility
//! - Match, expand, elect, merge and enrich contact families for one
//!   identify call.
//! - Detect inconsistent graph shapes instead of answering from them.
//!
//! # Invariants
//! - Every function here runs against a repository already inside the
//!   caller's transaction; nothing here opens or commits one.
//! - A family returned from `resolve` has exactly one primary and every
//!   secondary links directly to it.

use crate::model::contact::{Contact, ContactId, NewContact};
use crate::model::identify::IdentifyRequest;
use crate::repo::contact_repo::{ContactRepository, RepoError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod expand;
pub mod matcher;
pub mod merge;
pub mod response;
pub mod secondary;
pub mod select;

pub type IdentityResult<T> = Result<T, IdentityError>;

/// Graph shapes that break the primary/secondary invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyFault {
    /// `linked_id` does not resolve to an active contact.
    OrphanLink {
        contact_id: ContactId,
        linked_id: ContactId,
    },
    /// `linked_id` points at a secondary instead of a primary.
    LinkToSecondary {
        contact_id: ContactId,
        linked_id: ContactId,
    },
    /// Linked contacts were found but none of them is primary.
    ComponentWithoutPrimary { contact_ids: Vec<ContactId> },
    /// A single connected component holds more than one primary.
    MultiplePrimaries { primary_ids: Vec<ContactId> },
    /// Primary expected to exist is missing or tombstoned.
    MissingPrimary(ContactId),
    /// Family member is not a secondary of the family primary.
    BrokenFamily {
        primary_id: ContactId,
        contact_id: ContactId,
    },
}

impl Display for ConsistencyFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrphanLink {
                contact_id,
                linked_id,
            } => write!(
                f,
                "contact {contact_id} links to missing contact {linked_id}"
            ),
            Self::LinkToSecondary {
                contact_id,
                linked_id,
            } => write!(
                f,
                "contact {contact_id} links to secondary contact {linked_id}"
            ),
            Self::ComponentWithoutPrimary { contact_ids } => {
                write!(f, "linked contacts {contact_ids:?} have no primary")
            }
            Self::MultiplePrimaries { primary_ids } => {
                write!(f, "one component holds primaries {primary_ids:?}")
            }
            Self::MissingPrimary(id) => write!(f, "primary contact {id} is missing"),
            Self::BrokenFamily {
                primary_id,
                contact_id,
            } => write!(
                f,
                "contact {contact_id} is not a secondary of primary {primary_id}"
            ),
        }
    }
}

impl Error for ConsistencyFault {}

/// Errors from identity resolution.
#[derive(Debug)]
pub enum IdentityError {
    /// Neither email nor phone number was supplied.
    EmptyRequest,
    /// Store failure, propagated unchanged.
    Repo(RepoError),
    /// The contact graph violates its invariants.
    Inconsistent(ConsistencyFault),
}

impl IdentityError {
    /// True for transient store failures; the whole call may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Repo(err) if err.is_transient())
    }
}

impl Display for IdentityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "either email or phone number must be provided"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Inconsistent(fault) => write!(f, "inconsistent contact graph: {fault}"),
        }
    }
}

impl Error for IdentityError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::EmptyRequest => None,
            Self::Repo(err) => Some(err),
            Self::Inconsistent(fault) => Some(fault),
        }
    }
}

impl From<RepoError> for IdentityError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<ConsistencyFault> for IdentityError {
    fn from(value: ConsistencyFault) -> Self {
        Self::Inconsistent(value)
    }
}

/// One primary and its secondaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityFamily {
    pub primary: Contact,
    /// Ordered by `created_at`, then `id`.
    pub secondaries: Vec<Contact>,
}

impl IdentityFamily {
    pub fn new(primary: Contact, mut secondaries: Vec<Contact>) -> Self {
        secondaries.sort_by(Contact::seniority_cmp);
        Self {
            primary,
            secondaries,
        }
    }

    /// Picks `primary` and its direct dependents out of an expanded set.
    pub fn from_expanded(primary: &Contact, expanded: &[Contact]) -> Self {
        let secondaries = expanded
            .iter()
            .filter(|contact| contact.linked_id == Some(primary.id))
            .cloned()
            .collect();
        Self::new(primary.clone(), secondaries)
    }

    /// Reads the family rooted at `primary_id` from the store.
    pub fn load<R: ContactRepository>(repo: &R, primary_id: ContactId) -> IdentityResult<Self> {
        let primary = repo
            .get_contact(primary_id)?
            .ok_or(ConsistencyFault::MissingPrimary(primary_id))?;
        let secondaries = repo.list_linked_to(primary_id)?;
        Ok(Self::new(primary, secondaries))
    }

    /// Primary first, then secondaries in creation order.
    pub fn members(&self) -> impl Iterator<Item = &Contact> {
        std::iter::once(&self.primary).chain(self.secondaries.iter())
    }

    pub fn push_secondary(&mut self, contact: Contact) {
        self.secondaries.push(contact);
        self.secondaries.sort_by(Contact::seniority_cmp);
    }

    /// Checks the one-primary, depth-one link shape.
    pub fn verify(&self) -> Result<(), ConsistencyFault> {
        let primary_id = self.primary.id;
        if !self.primary.is_primary() || self.primary.linked_id.is_some() {
            return Err(ConsistencyFault::MissingPrimary(primary_id));
        }
        for contact in &self.secondaries {
            if contact.is_primary() || contact.linked_id != Some(primary_id) {
                return Err(ConsistencyFault::BrokenFamily {
                    primary_id,
                    contact_id: contact.id,
                });
            }
        }
        Ok(())
    }
}

/// Which decision branch an identify call took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionBranch {
    /// No match: a new primary was created.
    NewIdentity,
    /// Exactly one identity matched.
    Existing,
    /// Several identities matched and were merged.
    Merged,
}

impl ResolutionBranch {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewIdentity => "new_identity",
            Self::Existing => "existing",
            Self::Merged => "merged",
        }
    }
}

/// Result of running the pipeline once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub family: IdentityFamily,
    pub branch: ResolutionBranch,
    /// Contact inserted by this call, if any.
    pub created_id: Option<ContactId>,
    /// Former primaries folded into the survivor.
    pub demoted_ids: Vec<ContactId>,
}

/// Runs match, expand, elect, merge and enrich for one normalized request.
pub fn resolve<R: ContactRepository>(
    repo: &R,
    request: &IdentifyRequest,
) -> IdentityResult<Resolution> {
    let matches = matcher::find_direct_matches(repo, request)?;
    let expanded = expand::expand_components(repo, &matches)?;
    let primaries = select::select_primaries(&expanded);

    let (mut family, branch, demoted_ids) = match primaries.as_slice() {
        [] => {
            if !expanded.is_empty() {
                return Err(ConsistencyFault::ComponentWithoutPrimary {
                    contact_ids: expanded.iter().map(|contact| contact.id).collect(),
                }
                .into());
            }
            let primary = repo.create_contact(&NewContact::primary(
                request.email.clone(),
                request.phone_number.clone(),
            ))?;
            let created_id = Some(primary.id);
            let family = IdentityFamily::new(primary, Vec::new());
            family.verify()?;
            return Ok(Resolution {
                family,
                branch: ResolutionBranch::NewIdentity,
                created_id,
                demoted_ids: Vec::new(),
            });
        }
        [primary] => (
            IdentityFamily::from_expanded(primary, &expanded),
            ResolutionBranch::Existing,
            Vec::new(),
        ),
        _ => {
            let outcome = merge::merge_primaries(repo, &primaries)?;
            (outcome.family, ResolutionBranch::Merged, outcome.demoted_ids)
        }
    };

    let mut created_id = None;
    if secondary::should_create_secondary(&family, request) {
        let contact = repo.create_contact(&NewContact::secondary(
            request.email.clone(),
            request.phone_number.clone(),
            family.primary.id,
        ))?;
        created_id = Some(contact.id);
        family.push_secondary(contact);
    }

    family.verify()?;
    Ok(Resolution {
        family,
        branch,
        created_id,
        demoted_ids,
    })
}

/// Resolves the family containing `contact_id` without writing.
///
/// Returns `None` when the contact does not exist or is tombstoned.
pub fn family_of<R: ContactRepository>(
    repo: &R,
    contact_id: ContactId,
) -> IdentityResult<Option<IdentityFamily>> {
    let Some(contact) = repo.get_contact(contact_id)? else {
        return Ok(None);
    };
    let expanded = expand::expand_components(repo, std::slice::from_ref(&contact))?;
    let primaries = select::select_primaries(&expanded);

    let family = match primaries.as_slice() {
        [primary] => IdentityFamily::from_expanded(primary, &expanded),
        [] => {
            return Err(ConsistencyFault::ComponentWithoutPrimary {
                contact_ids: expanded.iter().map(|contact| contact.id).collect(),
            }
            .into())
        }
        _ => {
            return Err(ConsistencyFault::MultiplePrimaries {
                primary_ids: primaries.iter().map(|contact| contact.id).collect(),
            }
            .into())
        }
    };
    family.verify()?;
    Ok(Some(family))
}
