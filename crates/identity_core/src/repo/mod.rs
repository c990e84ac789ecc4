//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the store contract the identity pipeline runs against.
//! - Isolate SQLite query details from resolution logic.
//!
//! # Invariants
//! - Repository writes validate contact link shape before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to DB transport errors.

pub mod contact_repo;
pub mod memory_repo;
