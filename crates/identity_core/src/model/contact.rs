//! Contact domain model.
//!
//! # Responsibility
//! - Define the single persisted entity of the identity graph.
//! - Validate link shape (primary/secondary) before persistence.
//!
//! # Invariants
//! - `id` is assigned by the store and never reused.
//! - A primary has no `linked_id`; a secondary always has one.
//! - `created_at` is immutable and orders seniority; `id` breaks ties.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned contact identifier.
pub type ContactId = i64;

/// Position of a contact inside its identity family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPrecedence {
    /// Canonical root record of an identity.
    Primary,
    /// Record known to belong to the same person as its linked primary.
    Secondary,
}

impl LinkPrecedence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "primary" => Some(Self::Primary),
            "secondary" => Some(Self::Secondary),
            _ => None,
        }
    }
}

/// Validation errors for contact link shape and identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactValidationError {
    /// Neither email nor phone number is present.
    MissingIdentifier,
    /// A primary contact carries a `linked_id`.
    PrimaryWithLink { linked_id: ContactId },
    /// A secondary contact has no `linked_id`.
    SecondaryWithoutLink,
    /// A contact links to itself.
    SelfLink(ContactId),
}

impl Display for ContactValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingIdentifier => {
                write!(f, "contact must have an email or a phone number")
            }
            Self::PrimaryWithLink { linked_id } => {
                write!(f, "primary contact must not link to contact {linked_id}")
            }
            Self::SecondaryWithoutLink => write!(f, "secondary contact must have a linked_id"),
            Self::SelfLink(id) => write!(f, "contact {id} links to itself"),
        }
    }
}

impl Error for ContactValidationError {}

/// Persisted contact record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Primary this contact belongs to. Set only on secondaries.
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
    /// Epoch ms. Immutable after insert.
    pub created_at: i64,
    /// Epoch ms. Refreshed by every update.
    pub updated_at: i64,
    /// Epoch ms tombstone. Tombstoned rows are invisible to resolution reads.
    pub deleted_at: Option<i64>,
}

impl Contact {
    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Seniority order: older first, lower id first on equal timestamps.
    pub fn seniority_cmp(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then(self.id.cmp(&other.id))
    }

    pub fn validate(&self) -> Result<(), ContactValidationError> {
        validate_shape(
            Some(self.id),
            self.email.as_deref(),
            self.phone_number.as_deref(),
            self.linked_id,
            self.link_precedence,
        )
    }
}

/// Insert payload; the store assigns `id` and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
}

impl NewContact {
    /// Payload for a brand-new identity.
    pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
        }
    }

    /// Payload for new information arriving on an existing identity.
    pub fn secondary(
        email: Option<String>,
        phone_number: Option<String>,
        primary_id: ContactId,
    ) -> Self {
        Self {
            email,
            phone_number,
            linked_id: Some(primary_id),
            link_precedence: LinkPrecedence::Secondary,
        }
    }

    pub fn validate(&self) -> Result<(), ContactValidationError> {
        validate_shape(
            None,
            self.email.as_deref(),
            self.phone_number.as_deref(),
            self.linked_id,
            self.link_precedence,
        )
    }
}

fn validate_shape(
    id: Option<ContactId>,
    email: Option<&str>,
    phone_number: Option<&str>,
    linked_id: Option<ContactId>,
    link_precedence: LinkPrecedence,
) -> Result<(), ContactValidationError> {
    if email.is_none() && phone_number.is_none() {
        return Err(ContactValidationError::MissingIdentifier);
    }

    match (link_precedence, linked_id) {
        (LinkPrecedence::Primary, Some(linked_id)) => {
            Err(ContactValidationError::PrimaryWithLink { linked_id })
        }
        (LinkPrecedence::Secondary, None) => Err(ContactValidationError::SecondaryWithoutLink),
        (LinkPrecedence::Secondary, Some(linked_id)) if id == Some(linked_id) => {
            Err(ContactValidationError::SelfLink(linked_id))
        }
        _ => Ok(()),
    }
}
