//! Domain model for contact identity resolution.
//!
//! # Responsibility
//! - Define the contact record and the request/response shapes of `identify`.
//! - Keep contact-level invariants next to the data they constrain.
//!
//! # Invariants
//! - Every contact carries at least one identifier (email or phone number).
//! - Deletion is represented by the `deleted_at` tombstone, not hard delete.

pub mod contact;
pub mod identify;
