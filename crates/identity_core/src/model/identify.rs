//! Request and response shapes of the `identify` use case.

use crate::model::contact::ContactId;
use serde::{Deserialize, Serialize};

/// Identifiers supplied by one identify call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl IdentifyRequest {
    pub fn new(email: Option<&str>, phone_number: Option<&str>) -> Self {
        Self {
            email: email.map(str::to_owned),
            phone_number: phone_number.map(str::to_owned),
        }
    }

    /// Drops blank identifiers.
    ///
    /// Returns `None` when no identifier remains. Non-blank values are kept
    /// verbatim since matching is exact-string.
    pub fn normalized(&self) -> Option<Self> {
        let email = non_blank(self.email.as_deref());
        let phone_number = non_blank(self.phone_number.as_deref());
        if email.is_none() && phone_number.is_none() {
            return None;
        }
        Some(Self {
            email,
            phone_number,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .filter(|value| !value.trim().is_empty())
        .map(str::to_owned)
}

/// Caller-facing summary of one resolved identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSummary {
    pub primary_contact_id: ContactId,
    /// Deduplicated, primary's email first.
    pub emails: Vec<String>,
    /// Deduplicated, primary's phone number first.
    pub phone_numbers: Vec<String>,
    /// Creation order.
    pub secondary_contact_ids: Vec<ContactId>,
}

/// Envelope returned by `identify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
    pub contact: ContactSummary,
}
