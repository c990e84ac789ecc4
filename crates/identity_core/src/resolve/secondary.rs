//! Decides whether an identify call adds a new contact to a family.

use crate::model::identify::IdentifyRequest;
use crate::resolve::IdentityFamily;

/// Returns true when the request carries a contact point the family lacks.
///
/// Rules, first match wins:
/// 1. A member already has exactly this `(email, phone)` pair: no.
///    An absent field equals only an absent field.
/// 2. Both identifiers given and at least one is new to the family: yes.
/// 3. Only email given and no member has it: yes.
/// 4. Only phone given and no member has it: yes.
/// 5. Otherwise: no.
pub fn should_create_secondary(family: &IdentityFamily, request: &IdentifyRequest) -> bool {
    let email = request.email.as_deref();
    let phone_number = request.phone_number.as_deref();

    let exact_duplicate = family.members().any(|member| {
        member.email.as_deref() == email && member.phone_number.as_deref() == phone_number
    });
    if exact_duplicate {
        return false;
    }

    let email_known = |email: &str| {
        family
            .members()
            .any(|member| member.email.as_deref() == Some(email))
    };
    let phone_known = |phone_number: &str| {
        family
            .members()
            .any(|member| member.phone_number.as_deref() == Some(phone_number))
    };

    match (email, phone_number) {
        (Some(email), Some(phone_number)) => !email_known(email) || !phone_known(phone_number),
        (Some(email), None) => !email_known(email),
        (None, Some(phone_number)) => !phone_known(phone_number),
        (None, None) => false,
    }
}
