//! Direct identifier matching.

use crate::model::contact::Contact;
use crate::model::identify::IdentifyRequest;
use crate::repo::contact_repo::{ContactRepository, RepoResult};

/// Active contacts sharing the request's email or phone number, oldest first.
///
/// An identifier missing from the request adds no clause; it never matches
/// contacts whose field is NULL.
pub fn find_direct_matches<R: ContactRepository>(
    repo: &R,
    request: &IdentifyRequest,
) -> RepoResult<Vec<Contact>> {
    repo.find_matching(request.email.as_deref(), request.phone_number.as_deref())
}
