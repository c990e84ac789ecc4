//! Core identity resolution for contact records.
//! This crate is the single source of truth for identity-graph invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod resolve;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::contact::{Contact, ContactId, ContactValidationError, LinkPrecedence, NewContact};
pub use model::identify::{ContactSummary, IdentifyRequest, IdentifyResponse};
pub use repo::contact_repo::{ContactRepository, RepoError, RepoResult, SqliteContactRepository};
pub use repo::memory_repo::InMemoryContactRepository;
pub use resolve::{
    ConsistencyFault, IdentityError, IdentityFamily, IdentityResult, Resolution, ResolutionBranch,
};
pub use service::identity_service::IdentityService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
