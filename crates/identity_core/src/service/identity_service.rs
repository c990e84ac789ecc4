//! Identify use-case service.
//!
//! # Responsibility
//! - Run the resolution pipeline once per request inside one transaction.
//! - Emit metadata-only diagnostics for each call.
//!
//! # Invariants
//! - Match, expand, decide and every write share one transaction; any error
//!   rolls all of them back.
//! - No implicit retries: transient store failures are returned unchanged.
//! - Identifier values are never logged.

use crate::model::contact::ContactId;
use crate::model::identify::{IdentifyRequest, IdentifyResponse};
use crate::repo::contact_repo::ContactRepository;
use crate::resolve::response::build_response;
use crate::resolve::{family_of, resolve, IdentityError, IdentityResult};
use log::{error, info, warn};
use std::time::Instant;

/// Identity resolution facade over an injected contact repository.
pub struct IdentityService<R: ContactRepository> {
    repo: R,
}

impl<R: ContactRepository> IdentityService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Borrow of the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Resolves the identity behind `request`, creating, extending or merging
    /// contact families as needed.
    ///
    /// # Errors
    /// - `EmptyRequest` when neither identifier is non-blank.
    /// - `Repo` for store failures; see `IdentityError::is_retryable`.
    /// - `Inconsistent` when the stored graph breaks its invariants.
    pub fn identify(&self, request: &IdentifyRequest) -> IdentityResult<IdentifyResponse> {
        let started_at = Instant::now();
        let request = request.normalized().ok_or(IdentityError::EmptyRequest)?;

        let result = self
            .repo
            .with_transaction(|repo| resolve(repo, &request));

        match result {
            Ok(resolution) => {
                info!(
                    "event=identify module=service status=ok branch={} primary_id={} created_id={} demoted_count={} family_size={} has_email={} has_phone={} duration_ms={}",
                    resolution.branch.as_str(),
                    resolution.family.primary.id,
                    resolution
                        .created_id
                        .map_or_else(|| "none".to_string(), |id| id.to_string()),
                    resolution.demoted_ids.len(),
                    resolution.family.secondaries.len() + 1,
                    request.email.is_some(),
                    request.phone_number.is_some(),
                    started_at.elapsed().as_millis()
                );
                Ok(build_response(&resolution.family))
            }
            Err(err) => {
                log_failure("identify", &err, started_at);
                Err(err)
            }
        }
    }

    /// Summary of the family containing `contact_id`, or `None` when no active
    /// contact has that id. Never writes.
    pub fn family_of(&self, contact_id: ContactId) -> IdentityResult<Option<IdentifyResponse>> {
        let started_at = Instant::now();
        let result = self
            .repo
            .with_transaction(|repo| family_of(repo, contact_id));

        match result {
            Ok(family) => {
                info!(
                    "event=family_lookup module=service status=ok contact_id={} found={} duration_ms={}",
                    contact_id,
                    family.is_some(),
                    started_at.elapsed().as_millis()
                );
                Ok(family.as_ref().map(build_response))
            }
            Err(err) => {
                log_failure("family_lookup", &err, started_at);
                Err(err)
            }
        }
    }
}

fn log_failure(event: &str, err: &IdentityError, started_at: Instant) {
    let duration_ms = started_at.elapsed().as_millis();
    match err {
        IdentityError::Inconsistent(fault) => error!(
            "event={event} module=service status=error error_code=graph_inconsistent duration_ms={duration_ms} error={fault}"
        ),
        err if err.is_retryable() => warn!(
            "event={event} module=service status=error error_code=store_busy retryable=true duration_ms={duration_ms} error={err}"
        ),
        err => error!(
            "event={event} module=service status=error error_code=store_failed duration_ms={duration_ms} error={err}"
        ),
    }
}
