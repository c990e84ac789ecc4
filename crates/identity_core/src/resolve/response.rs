//! Projection of a resolved family into the caller-facing summary.

use crate::model::identify::{ContactSummary, IdentifyResponse};
use crate::resolve::IdentityFamily;

pub fn build_response(family: &IdentityFamily) -> IdentifyResponse {
    let mut emails: Vec<String> = Vec::new();
    let mut phone_numbers: Vec<String> = Vec::new();

    for member in family.members() {
        push_unique(&mut emails, member.email.as_deref());
        push_unique(&mut phone_numbers, member.phone_number.as_deref());
    }

    IdentifyResponse {
        contact: ContactSummary {
            primary_contact_id: family.primary.id,
            emails,
            phone_numbers,
            secondary_contact_ids: family.secondaries.iter().map(|contact| contact.id).collect(),
        },
    }
}

fn push_unique(values: &mut Vec<String>, value: Option<&str>) {
    if let Some(value) = value {
        if !values.iter().any(|existing| existing == value) {
            values.push(value.to_string());
        }
    }
}
